//! Metrics recorded by a live session.
//!
//! The global recorder can only be installed once per process, so this file
//! holds a single test that walks a session through its counted paths.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::time::Duration;

use parking_lot::Mutex;
use symi_gateway::symi_protocol::*;
use symi_gateway::{event_channel, Connector, EventReceiver, GatewayConfig, GatewayEvent, GatewaySession};
use symi_metrics::{describe_metrics, metric_defs, InMemoryRecorder};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const GATEWAY: &str = "metrics-gateway";

struct PipeConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
}

impl Connector for PipeConnector {
    type Stream = DuplexStream;

    fn connect(&self) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        let next = self.streams.lock().pop_front();
        async move {
            next.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "gateway offline"))
        }
    }

    fn describe(&self) -> String {
        GATEWAY.to_string()
    }
}

async fn push(remote: &mut DuplexStream, opcode: u8, status: u8, payload: &[u8]) {
    let frame = FrameCodec::encode_response(opcode, status, payload).unwrap();
    remote.write_all(&frame).await.unwrap();
}

async fn next_event(rx: &mut EventReceiver) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Push a device-count response and wait for it, so everything sent before
/// it has been dispatched.
async fn barrier(remote: &mut DuplexStream, rx: &mut EventReceiver, count: u8) {
    push(remote, OP_DEVICE_COUNT_RSP, STATUS_SUCCESS, &[count]).await;
    loop {
        if let GatewayEvent::GatewayInfoUpdated(info) = next_event(rx).await {
            if info.device_count == Some(count) {
                return;
            }
        }
    }
}

fn counter(recorder: &InMemoryRecorder, metric: &str) -> u64 {
    recorder.counter_with(metric, "gateway", GATEWAY)
}

#[tokio::test]
async fn test_session_records_link_and_registry_metrics() {
    let recorder = InMemoryRecorder::new();
    symi_metrics::metrics::set_global_recorder(recorder.clone())
        .expect("no other recorder in this test binary");
    describe_metrics();
    assert!(recorder.description(metric_defs::FRAMES_CORRUPT.name).is_some());

    let (local, mut remote) = tokio::io::duplex(1024);
    let connector = PipeConnector {
        streams: Mutex::new(VecDeque::from([local])),
    };
    let (tx, mut rx) = event_channel();
    // Keep the node-event resync out of the command assertions
    let config = GatewayConfig {
        status_sync_delay_ms: 60_000,
        ..GatewayConfig::default()
    };
    let session = GatewaySession::new(connector, config, tx);
    session.connect().await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        GatewayEvent::ConnectionChanged { connected: true }
    );
    assert_eq!(counter(&recorder, metric_defs::CONNECTS.name), 1);

    // ========================================================================
    // Device list
    // ========================================================================

    let record = DeviceListRecord {
        batch_size: 1,
        index: 0,
        mac: MacAddress::new([0xA4, 0xC1, 0x38, 0x00, 0x20, 0x01]),
        network_address: 0x0142,
        vendor_id: SYMI_VENDOR_ID,
        device_type: DEVICE_TYPE_LIGHT,
        device_sub_type: 0,
        online: true,
        only_tmall: false,
    };
    push(&mut remote, OP_DEVICE_LIST_RSP, STATUS_SUCCESS, &record.encode()).await;
    assert!(matches!(
        next_event(&mut rx).await,
        GatewayEvent::DeviceDiscovered(_)
    ));
    assert_eq!(
        recorder.counter_with(
            metric_defs::FRAMES_DECODED.name,
            "opcode",
            opcode_name(OP_DEVICE_LIST_RSP)
        ),
        1
    );

    // ========================================================================
    // Corruption and unknown addresses are counted, not fatal
    // ========================================================================

    let mut bad = FrameCodec::encode_response(OP_NODE_NOTIFY, STATUS_NODE_STATUS, &[1, 0, 2, 2]).unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    remote.write_all(&bad).await.unwrap();
    push(&mut remote, OP_NODE_NOTIFY, STATUS_NODE_STATUS, &[0x99, 0x09, MSG_TYPE_SWITCH, 0x02]).await;
    barrier(&mut remote, &mut rx, 1).await;

    assert_eq!(
        recorder.gauge_with(metric_defs::REGISTRY_DEVICES.name, "gateway", GATEWAY),
        Some(1.0)
    );
    assert_eq!(counter(&recorder, metric_defs::FRAMES_CORRUPT.name), 1);
    assert!(counter(&recorder, metric_defs::BYTES_DISCARDED.name) >= 1);
    assert_eq!(counter(&recorder, metric_defs::NODE_EVENTS_DROPPED.name), 1);
    // 21-byte list, two 9-byte node frames, 6-byte count
    assert_eq!(counter(&recorder, metric_defs::BYTES_RECEIVED.name), 45);

    // ========================================================================
    // Commands
    // ========================================================================

    session.read_software_version().await.unwrap();
    let expected = Command::ReadSoftwareVersion.encode().unwrap();
    let mut received = vec![0u8; expected.len()];
    remote.read_exact(&mut received).await.unwrap();
    assert_eq!(received, expected);
    assert_eq!(
        recorder.counter_with(
            metric_defs::COMMANDS_SENT.name,
            "command",
            Command::ReadSoftwareVersion.name()
        ),
        1
    );
    assert!(recorder.snapshot().histograms[metric_defs::COMMAND_WRITE_TIME.name].count >= 1);

    // ========================================================================
    // Link loss
    // ========================================================================

    drop(remote);
    loop {
        if next_event(&mut rx).await == (GatewayEvent::ConnectionChanged { connected: false }) {
            break;
        }
    }
    assert_eq!(counter(&recorder, metric_defs::DISCONNECTS.name), 1);
    assert_eq!(counter(&recorder, metric_defs::COMMANDS_FAILED.name), 0);
}
