mod common;

use std::sync::atomic::AtomicBool;

use common::{MockTransport, ScriptedDevice, ScriptedGestures, pcm, samples};
use tokio::sync::mpsc;
use walkie_linux_rs::audio::{DeviceMode, VolumeControl};
use walkie_linux_rs::config::Config;
use walkie_linux_rs::controller::{RecordingState, StopReason};
use walkie_linux_rs::gesture::Gesture;
use walkie_linux_rs::net_link::{ConnectionState, TransportEvent};
use walkie_linux_rs::orchestrator::{RunExit, StreamOrchestrator};
use walkie_linux_rs::protocol::{LinkStatus, StatusUpdate};

const CHUNK: usize = 8;

type Orchestrator = StreamOrchestrator<MockTransport, ScriptedDevice, ScriptedGestures>;

fn config() -> Config {
    let mut config = Config::default();
    config.audio.chunk_size = CHUNK;
    config.audio.max_chunks = 10;
    config.pipeline.tick_ms = 0;
    config
}

fn orchestrator(
    transport: MockTransport,
    device: ScriptedDevice,
    gestures: ScriptedGestures,
    volume: i32,
) -> Orchestrator {
    StreamOrchestrator::new(&config(), transport, device, gestures, VolumeControl::new(volume))
        .unwrap()
}

fn no_gestures() -> ScriptedGestures {
    ScriptedGestures::new([])
}

fn in_zone() -> Gesture {
    Gesture::press(20, 260)
}

#[test]
fn test_press_and_release_sends_one_message() {
    let transport = MockTransport::with_batches([vec![TransportEvent::Connected]]);
    let device = ScriptedDevice::with_reads([Ok(50), Ok(60)]);
    let gestures = ScriptedGestures::new([in_zone(), in_zone(), Gesture::release()]);
    let mut orch = orchestrator(transport, device, gestures, 100);

    let report = orch.tick();

    let session = report.session.expect("a session should have run");
    assert_eq!(session.stop_reason, StopReason::Released);
    assert_eq!(orch.transport().sent.len(), 1);
    assert_eq!(orch.transport().sent[0].len(), 2 * CHUNK);
    assert_eq!(orch.controller().buffer().offset(), 0);
    assert_eq!(orch.controller().state(), RecordingState::Idle);
    assert_eq!(orch.connection_state(), ConnectionState::Connected);

    // Released: the next tick does not start another session.
    let report = orch.tick();
    assert!(report.session.is_none());
    assert_eq!(orch.transport().sent.len(), 1);
}

#[test]
fn test_held_press_flushes_when_full() {
    let transport = MockTransport::with_batches([vec![TransportEvent::Connected]]);
    let gestures = ScriptedGestures::new([in_zone()]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), gestures, 100);

    let report = orch.tick();

    assert_eq!(report.session.unwrap().stop_reason, StopReason::BufferFull);
    assert_eq!(orch.transport().sent, vec![vec![0u8; 10 * CHUNK]]);
    assert_eq!(orch.device().mode, Some(DeviceMode::Playback));
}

#[test]
fn test_press_outside_zone_does_not_record() {
    let transport = MockTransport::connected();
    let gestures = ScriptedGestures::new([Gesture::press(200, 260), Gesture::press(20, 100)]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), gestures, 100);

    assert!(orch.tick().session.is_none());
    assert!(orch.tick().session.is_none());
    assert!(orch.device().configures.is_empty());
}

#[test]
fn test_inbound_audio_is_companded_and_played() {
    let transport = MockTransport::with_batches([vec![
        TransportEvent::Connected,
        TransportEvent::MessageReceived(pcm(&[20000, -20000, 15500, 1000])),
    ]]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), no_gestures(), 100);

    let report = orch.tick();

    assert_eq!(report.played, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(orch.device().writes.len(), 1);
    assert_eq!(samples(&orch.device().writes[0]), vec![17288, -17288, 15417, 1000]);
}

#[test]
fn test_playback_follows_current_volume() {
    let transport = MockTransport::with_batches([
        vec![TransportEvent::MessageReceived(pcm(&[20000]))],
        vec![TransportEvent::MessageReceived(pcm(&[20000]))],
    ]);
    let volume = VolumeControl::new(50);
    let mut orch = StreamOrchestrator::new(
        &config(),
        transport,
        ScriptedDevice::playback(),
        ScriptedGestures::new([]),
        volume.clone(),
    )
    .unwrap();

    orch.tick();
    volume.set(0);
    orch.tick();

    assert_eq!(samples(&orch.device().writes[0]), vec![8644]);
    assert_eq!(samples(&orch.device().writes[1]), vec![0]);
}

#[test]
fn test_malformed_payloads_are_dropped() {
    let transport = MockTransport::with_batches([vec![
        TransportEvent::MessageReceived(Vec::new()),
        TransportEvent::MessageReceived(vec![1, 2, 3]),
        TransportEvent::Error("allocation failure".into()),
    ]]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), no_gestures(), 100);

    let report = orch.tick();

    assert_eq!(report.events, 3);
    assert_eq!(report.dropped, 2);
    assert_eq!(report.played, 0);
    assert!(orch.device().writes.is_empty());
}

#[test]
fn test_write_failure_restores_playback_configuration() {
    let transport =
        MockTransport::with_batches([vec![TransportEvent::MessageReceived(pcm(&[1, 2]))]]);
    let mut device = ScriptedDevice::playback();
    device.write_failures = 1;
    let mut orch = orchestrator(transport, device, ScriptedGestures::new([]), 100);

    let report = orch.tick();

    assert_eq!(report.dropped, 1);
    assert_eq!(orch.device().resets, 1);
    assert_eq!(orch.device().configures, vec![DeviceMode::Playback]);
    assert_eq!(orch.device().mode, Some(DeviceMode::Playback));
}

#[test]
fn test_playback_recovers_after_broken_stream() {
    // The device still reports Playback after the failure; only a reopen
    // clears the broken stream.
    let transport = MockTransport::with_batches([
        vec![TransportEvent::MessageReceived(pcm(&[1, 2]))],
        vec![TransportEvent::MessageReceived(pcm(&[3, 4]))],
    ]);
    let mut device = ScriptedDevice::playback();
    device.write_failures = 1;
    let mut orch = orchestrator(transport, device, ScriptedGestures::new([]), 100);

    assert_eq!(orch.tick().dropped, 1);
    assert!(!orch.device().broken);
    assert_eq!(orch.device().opens, 1);

    let report = orch.tick();
    assert_eq!(report.played, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(samples(&orch.device().writes[0]), vec![3, 4]);
}

#[test]
fn test_inbound_audio_waits_while_recording() {
    // Audio queued behind the press is only played on the following tick.
    let transport = MockTransport::with_batches([
        vec![TransportEvent::Connected],
        vec![TransportEvent::MessageReceived(pcm(&[7, 7]))],
    ]);
    let device = ScriptedDevice::with_reads([Ok(1)]);
    let gestures = ScriptedGestures::new([in_zone(), Gesture::release()]);
    let mut orch = orchestrator(transport, device, gestures, 100);

    let first = orch.tick();
    assert!(first.session.is_some());
    assert!(orch.device().writes.is_empty());

    let second = orch.tick();
    assert_eq!(second.played, 1);
    assert_eq!(orch.device().writes.len(), 1);
}

#[test]
fn test_press_in_link_lost_tick_does_not_record() {
    let transport = MockTransport::with_batches([
        vec![TransportEvent::Connected],
        vec![TransportEvent::Disconnected],
    ]);
    let gestures = ScriptedGestures::new([Gesture::release(), in_zone()]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), gestures, 100);

    assert!(orch.tick().session.is_none());
    let report = orch.tick();

    assert!(report.link_lost);
    assert!(report.session.is_none());
    assert!(orch.device().configures.is_empty());
    assert_eq!(orch.controller().state(), RecordingState::Idle);
}

#[test]
fn test_disconnect_ends_run_with_link_lost() {
    let transport = MockTransport::with_batches([
        vec![TransportEvent::Connected],
        vec![TransportEvent::Disconnected],
    ]);
    let mut orch = orchestrator(transport, ScriptedDevice::playback(), no_gestures(), 100);
    let running = AtomicBool::new(true);

    assert_eq!(orch.run(&running), RunExit::LinkLost);
    assert_eq!(orch.connection_state(), ConnectionState::Disconnected);

    orch.replace_transport(MockTransport::with_batches([vec![TransportEvent::Connected]]));
    orch.tick();
    assert_eq!(orch.connection_state(), ConnectionState::Connected);
}

#[test]
fn test_run_stops_when_flag_cleared() {
    let mut orch = orchestrator(
        MockTransport::connected(),
        ScriptedDevice::playback(),
        ScriptedGestures::new([]),
        100,
    );
    let running = AtomicBool::new(false);
    assert_eq!(orch.run(&running), RunExit::Shutdown);
}

#[test]
fn test_status_updates_follow_link_and_recording() {
    let (tx, mut rx) = mpsc::channel(16);
    let transport = MockTransport::with_batches([vec![TransportEvent::Connected]]);
    let device = ScriptedDevice::with_reads([Ok(1)]);
    let gestures = ScriptedGestures::new([in_zone(), Gesture::release()]);
    let mut orch = orchestrator(transport, device, gestures, 100).with_status(tx);

    orch.tick();

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(
        updates,
        vec![
            StatusUpdate::state(LinkStatus::Connected),
            StatusUpdate::state(LinkStatus::Recording),
            StatusUpdate::state(LinkStatus::Idle),
        ]
    );
}
