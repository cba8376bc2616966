//! S7Client Integration Tests
//!
//! Drives the client against the simulated PLC:
//! - size/parse gate rejects without transport calls
//! - FIFO execution of queued jobs
//! - byte order and bit addressing end to end
//! - disconnected policy and session release

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::mpsc;
use std::time::Duration;

use s7_comlink::{
    status, ClientError, ClientOptions, MemoryArea, S7Client, S7Transport, SimulatedPlc,
    StatusCode, TransportCall,
};

const PLC_ADDRESS: &str = "192.168.0.10";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn test_plc() -> SimulatedPlc {
    SimulatedPlc::new().with_data_block(1, 64).with_data_block(1000, 256)
}

async fn connected_client(plc: &SimulatedPlc) -> S7Client {
    let client = S7Client::new(plc.clone()).unwrap();
    assert_eq!(client.connect_async(PLC_ADDRESS, 0, 1).await.unwrap(), status::OK);
    client
}

// ============================================================================
// Validation Gate
// ============================================================================

#[tokio::test]
async fn test_size_mismatch_rejected_without_transport_call() {
    let plc = test_plc();
    let client = connected_client(&plc).await;
    plc.clear_calls();

    assert!(!client.read::<u32>("EB1000", |_, _| panic!("must not complete")));
    assert!(!client.write("EB1000", 1u16, |_| panic!("must not complete")));
    assert!(!client.read::<bool>("DB1.DBW2", |_, _| {}));

    let err = client.try_read::<u32>("EB1000", |_, _| {}).unwrap_err();
    assert!(matches!(
        err,
        ClientError::SizeMismatch {
            expected: 1,
            actual: 4,
            ..
        }
    ));

    client.shutdown().unwrap();
    // Only the release on shutdown reached the transport
    assert_eq!(plc.calls(), vec![TransportCall::Disconnect]);
}

#[tokio::test]
async fn test_parse_error_rejected_without_transport_call() {
    let plc = test_plc();
    let client = S7Client::new(plc.clone()).unwrap();

    assert!(!client.read::<u8>("XY1", |_, _| {}));
    assert!(!client.read::<u8>("EB", |_, _| {}));
    assert!(!client.write("DB1.DBX5", true, |_| {}));
    assert!(matches!(
        client.read_async::<u8>("EB 1").await,
        Err(ClientError::Address(_))
    ));

    client.shutdown().unwrap();
    assert_eq!(plc.call_count(), 0);
}

// ============================================================================
// Data Exchange
// ============================================================================

#[tokio::test]
async fn test_word_round_trip_through_plc() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    assert_eq!(
        client.write_async("DB1000.DBW100", 0x1234u16).await.unwrap(),
        status::OK
    );
    // Stored most significant byte first
    assert_eq!(
        plc.peek(MemoryArea::DataBlock, 1000, 100, 2),
        Some(vec![0x12, 0x34])
    );

    let (value, code) = client.read_async::<u16>("DB1000.DBW100").await.unwrap();
    assert_eq!(code, status::OK);
    assert_eq!(value, 0x1234);
}

#[tokio::test]
async fn test_dword_and_real() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    client.write_async("MD0", 0x1122_3344u32).await.unwrap();
    assert_eq!(
        plc.peek(MemoryArea::Merkers, 0, 0, 4),
        Some(vec![0x11, 0x22, 0x33, 0x44])
    );

    plc.poke(MemoryArea::DataBlock, 1, 8, &[0x42, 0x28, 0x00, 0x00]);
    let (value, code) = client.read_async::<f32>("DB1.DBD8").await.unwrap();
    assert_eq!(code, status::OK);
    assert!((value - 42.0).abs() < f32::EPSILON);

    let (value, _) = client.read_async::<i32>("MD0").await.unwrap();
    assert_eq!(value, 0x1122_3344);
}

#[tokio::test]
async fn test_bit_addresses() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    client.write_async("DB1.DBX5.1", true).await.unwrap();
    assert_eq!(plc.peek(MemoryArea::DataBlock, 1, 5, 1), Some(vec![0b0000_0010]));

    plc.poke(MemoryArea::ProcessInputs, 0, 5, &[0b0010_0000]);
    let (value, code) = client.read_async::<bool>("E5.5").await.unwrap();
    assert_eq!(code, status::OK);
    assert!(value);
    let (value, _) = client.read_async::<bool>("E5.4").await.unwrap();
    assert!(!value);

    // Transport sees absolute bit indices
    let calls = plc.calls();
    assert!(calls.contains(&TransportCall::Read {
        area: MemoryArea::ProcessInputs.code(),
        db_number: 0,
        start: 45,
        amount: 1,
        word_len: 0x01,
    }));
}

#[tokio::test]
async fn test_transport_status_forwarded() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    let (value, code) = client.read_async::<u8>("DB7.DBB0").await.unwrap();
    assert_eq!(code, status::ITEM_NOT_AVAILABLE);
    assert_eq!(value, 0);

    let code = client.write_async("DB1.DBW63", 1u16).await.unwrap();
    assert_eq!(code, status::ADDRESS_OUT_OF_RANGE);
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_callbacks_complete_in_submission_order() {
    let plc = test_plc().with_latency(Duration::from_millis(2));
    let client = S7Client::new(plc.clone()).unwrap();
    let (tx, rx) = mpsc::channel::<String>();

    let events = tx.clone();
    client.connect(PLC_ADDRESS, 0, 2, move |code| {
        events.send(format!("connect:{code}")).unwrap();
    });
    for i in 0..10u16 {
        let events = tx.clone();
        assert!(client.write("DB1.DBW0", i, move |code| {
            events.send(format!("write:{i}:{code}")).unwrap();
        }));
    }
    let events = tx.clone();
    assert!(client.read::<u16>("DB1.DBW0", move |value, code| {
        events.send(format!("read:{value}:{code}")).unwrap();
    }));
    let events = tx;
    client.disconnect(move |code| {
        events.send(format!("disconnect:{code}")).unwrap();
    });

    let mut expected = vec!["connect:0".to_string()];
    expected.extend((0..10).map(|i| format!("write:{i}:0")));
    expected.push("read:9:0".to_string());
    expected.push("disconnect:0".to_string());

    let received: Vec<String> = (0..expected.len())
        .map(|_| rx.recv_timeout(RECV_TIMEOUT).unwrap())
        .collect();
    assert_eq!(received, expected);
    assert!(!client.is_connected());
    assert_eq!(plc.endpoint(), Some((PLC_ADDRESS.to_string(), 0, 2)));
}

#[tokio::test]
async fn test_write_then_read_observes_write() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    let write = client.write_async("AW4", 0xBEEFu16);
    let read = client.read_async::<u16>("AW4");
    // Both queued before either is awaited
    let (write, read) = tokio::join!(write, read);
    assert_eq!(write.unwrap(), status::OK);
    assert_eq!(read.unwrap(), (0xBEEF, status::OK));
}

// ============================================================================
// Connection State
// ============================================================================

#[tokio::test]
async fn test_guarded_when_disconnected() {
    let plc = test_plc();
    let client = S7Client::new(plc.clone()).unwrap();

    // Accepted synchronously, refused at execution time
    let (value, code) = client.read_async::<u8>("MB0").await.unwrap();
    assert_eq!((value, code), (0, status::TCP_NOT_CONNECTED));
    assert_eq!(
        client.write_async("MB0", 7u8).await.unwrap(),
        status::TCP_NOT_CONNECTED
    );
    assert_eq!(plc.call_count(), 0);
}

#[tokio::test]
async fn test_forwarded_when_guard_disabled() {
    let plc = test_plc();
    let options = ClientOptions {
        guard_disconnected: false,
        ..Default::default()
    };
    let client = S7Client::with_options(plc.clone(), options).unwrap();

    let (_, code) = client.read_async::<u8>("MB0").await.unwrap();
    assert_eq!(code, status::TCP_NOT_CONNECTED);
    assert_eq!(plc.call_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_keeps_disconnected() {
    let plc = test_plc().fail_connect_with(status::TCP_CONNECTION_FAILED);
    let client = S7Client::new(plc.clone()).unwrap();

    let code = client.connect_async(PLC_ADDRESS, 0, 1).await.unwrap();
    assert_eq!(code, status::TCP_CONNECTION_FAILED);
    assert!(!client.is_connected());

    plc.set_connect_failure(None);
    assert_eq!(client.connect_async(PLC_ADDRESS, 0, 1).await.unwrap(), status::OK);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let plc = test_plc();
    let client = S7Client::new(plc.clone()).unwrap();

    assert_eq!(client.disconnect_async().await.unwrap(), status::OK);
    assert_eq!(client.disconnect_async().await.unwrap(), status::OK);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_drop_releases_session() {
    let plc = test_plc();
    let client = connected_client(&plc).await;
    assert!(plc.is_connected());

    drop(client);
    // Worker exits asynchronously after the queue closes
    for _ in 0..100 {
        if !plc.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!plc.is_connected());
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_worker() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    assert!(client.read::<u8>("MB1", |_, _| panic!("callback failure")));
    let (_, code) = client.read_async::<u8>("MB1").await.unwrap();
    assert_eq!(code, status::OK);
}

#[tokio::test]
async fn test_failed_reconnect_keeps_link() {
    let plc = test_plc();
    let client = connected_client(&plc).await;

    plc.set_connect_failure(Some(status::TCP_CONNECTION_FAILED));
    let code = client.connect_async(PLC_ADDRESS, 0, 1).await.unwrap();
    assert_eq!(code, status::TCP_CONNECTION_FAILED);
    assert!(client.is_connected());

    let (_, code) = client.read_async::<u8>("MB0").await.unwrap();
    assert_eq!(code, status::OK);
}

// ============================================================================
// Transport Faults
// ============================================================================

/// Simulated PLC whose read/write of byte offset 99 panics
struct FaultyPlc(SimulatedPlc);

const FAULT_OFFSET: u32 = 99;

impl S7Transport for FaultyPlc {
    fn connect_to(&mut self, address: &str, rack: u16, slot: u16) -> StatusCode {
        self.0.connect_to(address, rack, slot)
    }

    fn disconnect(&mut self) -> StatusCode {
        self.0.disconnect()
    }

    fn read_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
        buffer: &mut [u8],
    ) -> StatusCode {
        if start == FAULT_OFFSET {
            buffer.fill(0xEE);
            panic!("native read fault");
        }
        self.0.read_area(area, db_number, start, amount, word_len, buffer)
    }

    fn write_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
        buffer: &[u8],
    ) -> StatusCode {
        if start == FAULT_OFFSET {
            panic!("native write fault");
        }
        self.0.write_area(area, db_number, start, amount, word_len, buffer)
    }
}

#[tokio::test]
async fn test_transport_panic_completes_job_and_keeps_worker() {
    let plc = test_plc();
    let client = S7Client::new(FaultyPlc(plc.clone())).unwrap();
    assert_eq!(client.connect_async(PLC_ADDRESS, 0, 1).await.unwrap(), status::OK);

    let (value, code) = client.read_async::<u8>("MB99").await.unwrap();
    assert_eq!((value, code), (0, status::TRANSPORT_FAULT));
    assert_eq!(
        client.write_async("MB99", 1u8).await.unwrap(),
        status::TRANSPORT_FAULT
    );

    // Later jobs still run, callbacks included
    let (tx, rx) = mpsc::channel();
    assert!(client.read::<u8>("MB1", move |_, code| tx.send(code).unwrap()));
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), status::OK);

    let (tx, rx) = mpsc::channel();
    client.connect(PLC_ADDRESS, 0, 1, move |code| tx.send(code).unwrap());
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), status::OK);
    assert_eq!(client.write_async("MB1", 5u8).await.unwrap(), status::OK);

    client.shutdown().unwrap();
    assert!(!plc.is_connected());
}
