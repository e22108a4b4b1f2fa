use serde::{Deserialize, Serialize};

/// 控制面板发给核心进程的消息
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PanelMessage {
    Touch { x: i32, y: i32, pressed: bool },
    Volume { value: i32 },
}

/// 核心进程推送给控制面板的状态
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusUpdate {
    Status { state: LinkStatus },
    Volume { value: u8 },
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    Recording,
    Idle,
}

impl StatusUpdate {
    pub fn state(state: LinkStatus) -> Self {
        Self::Status { state }
    }
}
