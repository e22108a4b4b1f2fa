use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::audio::VolumeControl;
use crate::config::PanelSettings;
use crate::gesture::Gesture;
use crate::protocol::{PanelMessage, StatusUpdate};

// 控制面板进程和核心进程通过本地UDP通信，端口在配置中指定
// 面板上报触摸和音量，核心推送连接/录音状态
pub struct PanelBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    gestures: watch::Sender<Gesture>,
    volume: VolumeControl,
    buffer_size: usize,
}

impl PanelBridge {
    pub async fn new(
        settings: &PanelSettings,
        gestures: watch::Sender<Gesture>,
        volume: VolumeControl,
    ) -> anyhow::Result<Self> {
        // 绑定本地UDP端口
        let socket =
            UdpSocket::bind(format!("{}:{}", settings.local_ip, settings.local_port)).await?;
        let target_addr = format!("{}:{}", settings.remote_ip, settings.remote_port);
        log::info!(
            "Panel bridge listening on {}, pushing status to {}",
            socket.local_addr()?,
            target_addr
        );

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            gestures,
            volume,
            buffer_size: settings.buffer_size.max(64),
        })
    }

    pub async fn run(&self, mut status_rx: mpsc::Receiver<StatusUpdate>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, _) = received?;
                    if len == 0 {
                        continue;
                    }
                    if let Some(echo) = self.handle_datagram(&buf[..len]) {
                        if let Err(e) = self.send_status(&echo).await {
                            log::warn!("Failed to send to panel: {}", e);
                        }
                    }
                }
                Some(update) = status_rx.recv() => {
                    if let Err(e) = self.send_status(&update).await {
                        log::warn!("Failed to send to panel: {}", e);
                    }
                }
            }
        }
    }

    /// Apply one panel datagram. A volume change is echoed back with the
    /// clamped value.
    pub fn handle_datagram(&self, data: &[u8]) -> Option<StatusUpdate> {
        let message = match serde_json::from_slice::<PanelMessage>(data) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Ignoring malformed panel message: {}", e);
                return None;
            }
        };

        match message {
            PanelMessage::Touch { x, y, pressed } => {
                // 主循环已退出时发送失败，忽略即可
                let _ = self.gestures.send(Gesture { x, y, pressed });
                None
            }
            PanelMessage::Volume { value } => {
                let stored = self.volume.set(value);
                log::info!("Volume set to {}", stored);
                Some(StatusUpdate::Volume { value: stored })
            }
        }
    }

    pub async fn send_status(&self, update: &StatusUpdate) -> anyhow::Result<()> {
        let json = serde_json::to_vec(update)?;
        self.socket.send_to(&json, &self.target_addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bridge() -> (PanelBridge, watch::Receiver<Gesture>, VolumeControl) {
        let settings = PanelSettings {
            local_port: 0,
            ..PanelSettings::default()
        };
        let (tx, rx) = watch::channel(Gesture::default());
        let volume = VolumeControl::new(50);
        let bridge = PanelBridge::new(&settings, tx, volume.clone()).await.unwrap();
        (bridge, rx, volume)
    }

    #[tokio::test]
    async fn test_touch_updates_gesture() {
        let (bridge, rx, _volume) = bridge().await;
        let echo = bridge.handle_datagram(br#"{"type":"touch","x":20,"y":260,"pressed":true}"#);
        assert!(echo.is_none());
        assert_eq!(*rx.borrow(), Gesture::press(20, 260));
    }

    #[tokio::test]
    async fn test_volume_is_clamped_and_echoed() {
        let (bridge, _rx, volume) = bridge().await;
        let echo = bridge.handle_datagram(br#"{"type":"volume","value":180}"#);
        assert_eq!(echo, Some(StatusUpdate::Volume { value: 100 }));
        assert_eq!(volume.get(), 100);
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let (bridge, rx, volume) = bridge().await;
        assert!(bridge.handle_datagram(b"not json").is_none());
        assert_eq!(*rx.borrow(), Gesture::default());
        assert_eq!(volume.get(), 50);
    }
}
