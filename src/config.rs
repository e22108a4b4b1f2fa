use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::audio::frame::BYTES_PER_SAMPLE;
use crate::error::{PipelineError, Result};
use crate::gesture::RecordZone;

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "WALKIE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub network: NetworkSettings,
    pub heartbeat: HeartbeatSettings,
    pub audio: AudioSettings,
    pub panel: PanelSettings,
    pub pipeline: PipelineSettings,
}

// 远端服务器配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NetworkSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
    pub handshake_timeout_ms: u64,
    /// 每次 poll 最多取出的事件数
    pub max_events_per_poll: usize,
    /// 发送队列长度
    pub outbound_queue: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/ws".to_string(),
            secure: false,
            handshake_timeout_ms: 5000,
            max_events_per_poll: 16,
            outbound_queue: 8,
        }
    }
}

impl NetworkSettings {
    pub fn endpoint(&self) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Url::parse(&format!("{}://{}:{}{}", scheme, self.host, self.port, path))
            .map_err(|e| PipelineError::Config(format!("invalid endpoint: {}", e)))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

// 心跳配置：探测间隔、响应超时、连续丢失次数阈值
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub disconnect_threshold: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            timeout_ms: 3_000,
            disconnect_threshold: 2,
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// 音频设备配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AudioSettings {
    /// ALSA device name (e.g. "default", "plughw:0,0")
    pub device: String,
    pub sample_rate: u32,
    /// Bytes per capture read; must be even.
    pub chunk_size: usize,
    /// Capture buffer capacity in chunks.
    pub max_chunks: usize,
    pub read_timeout_ms: u64,
    /// Playback write deadline, 0 blocks until the device accepts everything.
    pub write_timeout_ms: u64,
    /// Initial playback volume, 0..=100.
    pub volume: i32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 16000,
            chunk_size: 1024,
            max_chunks: 160,
            read_timeout_ms: 100,
            write_timeout_ms: 2000,
            volume: 50,
        }
    }
}

impl AudioSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    /// Time the hardware needs to produce one chunk, rounded up to whole ms.
    pub fn chunk_duration_ms(&self) -> u64 {
        let samples = (self.chunk_size / BYTES_PER_SAMPLE) as u64;
        (samples * 1000).div_ceil(u64::from(self.sample_rate.max(1)))
    }
}

// 控制面板进程通过本地UDP通信
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PanelSettings {
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    pub buffer_size: usize,
    pub record_zone: RecordZone,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            local_ip: "127.0.0.1".to_string(),
            local_port: 5676,
            remote_ip: "127.0.0.1".to_string(),
            remote_port: 5677,
            buffer_size: 1024,
            record_zone: RecordZone::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    /// 主循环每次迭代后的休眠时间
    pub tick_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { tick_ms: 10 }
    }
}

impl PipelineSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Config {
    /// 读取配置文件，路径由 WALKIE_CONFIG 指定，默认 config.toml
    /// 文件不存在时使用默认配置
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("{} not found, using default configuration", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.chunk_size == 0 || audio.chunk_size % 2 != 0 {
            return Err(PipelineError::Config(format!(
                "audio.chunk_size must be a non-zero even number, got {}",
                audio.chunk_size
            )));
        }
        if audio.max_chunks == 0 {
            return Err(PipelineError::Config("audio.max_chunks must be at least 1".into()));
        }
        if audio.sample_rate == 0 {
            return Err(PipelineError::Config("audio.sample_rate must be positive".into()));
        }
        if audio.read_timeout_ms == 0 {
            return Err(PipelineError::Config("audio.read_timeout_ms must be positive".into()));
        }
        // 一次读取必须能在超时内填满一个块
        if audio.chunk_duration_ms() > audio.read_timeout_ms {
            return Err(PipelineError::Config(format!(
                "audio.chunk_size {} takes {} ms at {} Hz, longer than read_timeout_ms {}",
                audio.chunk_size,
                audio.chunk_duration_ms(),
                audio.sample_rate,
                audio.read_timeout_ms
            )));
        }
        let zone = &self.panel.record_zone;
        if zone.width <= 0 || zone.height <= 0 {
            return Err(PipelineError::Config(format!(
                "panel.record_zone must have a positive size, got {}x{}",
                zone.width, zone.height
            )));
        }
        let heartbeat = &self.heartbeat;
        if heartbeat.interval_ms == 0 || heartbeat.timeout_ms == 0 {
            return Err(PipelineError::Config(
                "heartbeat interval and timeout must be positive".into(),
            ));
        }
        if heartbeat.disconnect_threshold == 0 {
            return Err(PipelineError::Config(
                "heartbeat.disconnect_threshold must be at least 1".into(),
            ));
        }
        if self.network.max_events_per_poll == 0 || self.network.outbound_queue == 0 {
            return Err(PipelineError::Config(
                "network.max_events_per_poll and network.outbound_queue must be positive".into(),
            ));
        }
        self.network.endpoint()?;
        Ok(())
    }
}
