use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use url::Url;

use crate::audio::frame::try_copy_payload;
use crate::config::{HeartbeatSettings, NetworkSettings};
use crate::error::{PipelineError, Result};
use crate::heartbeat::{Heartbeat, HeartbeatAction};

/// 接收队列长度，录音期间主循环不读取事件
/// 需要足够容纳服务器下发的音频
const INBOUND_QUEUE: usize = 256;
const MIN_HEARTBEAT_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// What a call to [`TransportLink::poll`] can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    MessageReceived(Vec<u8>),
    Error(String),
}

/// A persistent binary-message connection to one remote peer.
pub trait TransportLink {
    /// Never blocks. Returns at most one batch of pending events.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Fire-and-forget. Fails at once when not connected; nothing is queued
    /// for a later retry.
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    fn state(&self) -> ConnectionState;
}

// 会话任务上报给 WsTransport 的事件
#[derive(Debug)]
enum NetEvent {
    Connected,
    Disconnected(String),
    Binary(Vec<u8>),
    Error(String),
}

#[derive(Debug)]
enum NetCommand {
    SendBinary(Vec<u8>),
}

/// WebSocket implementation of [`TransportLink`].
///
/// The socket lives in a tokio task; this handle only touches channels, so it
/// can be polled from the blocking audio thread.
pub struct WsTransport {
    events: mpsc::Receiver<NetEvent>,
    commands: mpsc::Sender<NetCommand>,
    state: ConnectionState,
    max_events: usize,
}

impl WsTransport {
    /// Complete the WebSocket handshake and start the session task.
    ///
    /// The returned link is still `Disconnected`; the first `poll` reports
    /// `Connected`.
    pub async fn connect(
        endpoint: &Url,
        heartbeat: &HeartbeatSettings,
        network: &NetworkSettings,
    ) -> Result<Self> {
        log::info!("Connecting to {}...", endpoint);
        let (ws_stream, _) = tokio::time::timeout(
            network.handshake_timeout(),
            connect_async(endpoint.as_str()),
        )
        .await
        .map_err(|_| PipelineError::connection(format!("handshake with {} timed out", endpoint)))?
        .map_err(|e| {
            PipelineError::connection(format!("handshake with {} failed: {}", endpoint, e))
        })?;
        log::info!("Connected to {}", endpoint);

        let (tx_event, rx_event) = mpsc::channel(INBOUND_QUEUE);
        let (tx_cmd, rx_cmd) = mpsc::channel(network.outbound_queue.max(1));

        // Connected 必须排在会话任务的任何事件之前
        tx_event
            .try_send(NetEvent::Connected)
            .map_err(|e| PipelineError::connection(format!("event queue unavailable: {}", e)))?;

        let session = NetSession {
            tx: tx_event,
            rx_cmd,
            heartbeat: Heartbeat::new(heartbeat, Instant::now()),
            tick: heartbeat_tick(heartbeat),
            threshold: heartbeat.disconnect_threshold,
        };
        tokio::spawn(session.run(ws_stream));

        Ok(Self::from_channels(rx_event, tx_cmd, network.max_events_per_poll))
    }

    fn from_channels(
        events: mpsc::Receiver<NetEvent>,
        commands: mpsc::Sender<NetCommand>,
        max_events: usize,
    ) -> Self {
        Self {
            events,
            commands,
            state: ConnectionState::Disconnected,
            max_events: max_events.max(1),
        }
    }

    fn apply(&mut self, event: NetEvent) -> Option<TransportEvent> {
        match event {
            NetEvent::Connected => {
                if self.state == ConnectionState::Connected {
                    return None;
                }
                self.state = ConnectionState::Connected;
                Some(TransportEvent::Connected)
            }
            NetEvent::Disconnected(reason) => {
                if self.state == ConnectionState::Disconnected {
                    log::debug!("Ignoring repeated disconnect: {}", reason);
                    return None;
                }
                log::warn!("WebSocket disconnected: {}", reason);
                self.state = ConnectionState::Disconnected;
                Some(TransportEvent::Disconnected)
            }
            NetEvent::Binary(data) => Some(TransportEvent::MessageReceived(data)),
            NetEvent::Error(detail) => Some(TransportEvent::Error(detail)),
        }
    }
}

impl TransportLink for WsTransport {
    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut batch = Vec::new();
        while batch.len() < self.max_events {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // 会话任务已退出
                    let ended = NetEvent::Disconnected("session ended".into());
                    if let Some(event) = self.apply(ended) {
                        batch.push(event);
                    }
                    break;
                }
            };
            if let Some(event) = self.apply(event) {
                batch.push(event);
            }
        }
        batch
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(PipelineError::connection("not connected"));
        }
        self.commands
            .try_send(NetCommand::SendBinary(payload.to_vec()))
            .map_err(|e| match e {
                TrySendError::Full(_) => PipelineError::connection("outbound queue full"),
                TrySendError::Closed(_) => PipelineError::connection("session closed"),
            })
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

fn heartbeat_tick(settings: &HeartbeatSettings) -> Duration {
    (settings.interval().min(settings.timeout()) / 4).max(MIN_HEARTBEAT_TICK)
}

// 持有 WebSocket 的会话任务，不做重连
struct NetSession {
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
    heartbeat: Heartbeat,
    tick: Duration,
    threshold: u32,
}

impl NetSession {
    async fn run(mut self, ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let reason = match self.drive(ws_stream).await {
            Ok(()) => "closed by client".to_string(),
            Err(e) => e.to_string(),
        };
        let _ = self.tx.send(NetEvent::Disconnected(reason)).await;
    }

    async fn drive(
        &mut self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> anyhow::Result<()> {
        let (mut write, mut read) = ws_stream.split();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let event = match try_copy_payload(&data) {
                                Ok(bytes) => NetEvent::Binary(bytes),
                                Err(e) => {
                                    log::error!("Dropping inbound message: {}", e);
                                    NetEvent::Error(e.to_string())
                                }
                            };
                            self.tx.send(event).await?;
                        }
                        Some(Ok(Message::Text(text))) => {
                            log::debug!("Ignoring text frame: {}", text.as_str());
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.on_response();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(anyhow::anyhow!("Server closed connection: {:?}", frame));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(anyhow::anyhow!("Connection closed")),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendBinary(data)) => {
                            let len = data.len();
                            write.send(Message::Binary(data.into())).await?;
                            log::debug!("Sent {} bytes to server", len);
                        }
                        None => {
                            // WsTransport 已被丢弃
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                _ = ticker.tick() => {
                    match self.heartbeat.poll(Instant::now()) {
                        HeartbeatAction::SendProbe => {
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatAction::Expired => {
                            return Err(anyhow::anyhow!(
                                "{} consecutive heartbeat probes missed",
                                self.threshold
                            ));
                        }
                        HeartbeatAction::Idle => {}
                    }
                }
            }
        }
    }
}
