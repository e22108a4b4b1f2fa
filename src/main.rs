use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::{Notify, mpsc, watch};
use url::Url;

use walkie_linux_rs::audio::{AlsaDevice, AudioDevice, DeviceMode, VolumeControl};
use walkie_linux_rs::config::Config;
use walkie_linux_rs::gesture::Gesture;
use walkie_linux_rs::net_link::WsTransport;
use walkie_linux_rs::orchestrator::{RunExit, StreamOrchestrator};
use walkie_linux_rs::panel_bridge::PanelBridge;
use walkie_linux_rs::protocol::StatusUpdate;

const MAX_RETRY_DELAY_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::load().context("Failed to load configuration")?;
    let endpoint = config.network.endpoint()?;

    // 音量由面板写入，主循环读取
    let volume = VolumeControl::new(config.audio.volume);
    let (tx_gesture, rx_gesture) = watch::channel(Gesture::default());
    let (tx_status, rx_status) = mpsc::channel::<StatusUpdate>(32);

    // 启动控制面板桥，接收触摸和音量，推送状态
    let panel = PanelBridge::new(&config.panel, tx_gesture, volume.clone())
        .await
        .context("Failed to start panel bridge")?;
    tokio::spawn(async move {
        if let Err(e) = panel.run(rx_status).await {
            log::error!("PanelBridge error: {}", e);
        }
    });

    // 监听 Ctrl+C 信号
    let running = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(Notify::new());
    {
        let running = running.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                log::info!("Received Ctrl+C, shutting down...");
                running.store(false, Ordering::SeqCst);
                shutdown.notify_waiters();
            }
        });
    }

    let Some(transport) = connect_with_backoff(&endpoint, &config, &running, &shutdown).await else {
        return Ok(());
    };

    // 设备默认处于播放模式
    let mut device = AlsaDevice::new(&config.audio);
    device
        .configure(DeviceMode::Playback)
        .context("Failed to open playback device")?;

    let mut orchestrator = StreamOrchestrator::new(&config, transport, device, rx_gesture, volume)?
        .with_status(tx_status);
    log::info!("Walkie core started, peer {}", endpoint);

    // 音频主循环跑在阻塞线程上，断线后在这里重连
    loop {
        let flag = running.clone();
        let (returned, exit) = tokio::task::spawn_blocking(move || {
            let exit = orchestrator.run(&flag);
            (orchestrator, exit)
        })
        .await
        .context("Audio pipeline thread panicked")?;
        orchestrator = returned;

        match exit {
            RunExit::Shutdown => break,
            RunExit::LinkLost => {
                match connect_with_backoff(&endpoint, &config, &running, &shutdown).await {
                    Some(transport) => orchestrator.replace_transport(transport),
                    None => break,
                }
            }
        }
    }

    log::info!("Walkie core stopped");
    Ok(())
}

// 连接失败时重试，指数退避，收到退出信号则放弃
async fn connect_with_backoff(
    endpoint: &Url,
    config: &Config,
    running: &AtomicBool,
    shutdown: &Notify,
) -> Option<WsTransport> {
    let mut retry_delay = 1;
    while running.load(Ordering::SeqCst) {
        match WsTransport::connect(endpoint, &config.heartbeat, &config.network).await {
            Ok(transport) => return Some(transport),
            Err(e) => {
                log::error!("{}. Retrying in {}s...", e, retry_delay);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(retry_delay)) => {}
                    _ = shutdown.notified() => return None,
                }
                retry_delay = std::cmp::min(retry_delay * 2, MAX_RETRY_DELAY_SECS);
            }
        }
    }
    None
}
