//! Simulated PLC
//!
//! In-memory [`S7Transport`] for testing client logic and tooling without a
//! PLC on the network. Clones share the same process image, so a test can
//! hand one clone to the client and inspect memory and call history through
//! another.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::address::{MemoryArea, WordLength};
use crate::transport::{status, S7Transport, StatusCode};

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Bytes in each of the E, A and M images
    pub image_size: usize,
    /// Number of counter words
    pub counters: usize,
    /// Number of timer words
    pub timers: usize,
    /// Data blocks available on the simulated CPU
    pub data_blocks: Vec<DataBlockConfig>,
    /// Artificial delay applied to every transport call
    pub latency_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            image_size: 1024,
            counters: 256,
            timers: 256,
            data_blocks: Vec::new(),
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBlockConfig {
    pub number: u16,
    pub size: usize,
}

/// Transport call as recorded by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect {
        address: String,
        rack: u16,
        slot: u16,
    },
    Disconnect,
    Read {
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
    },
    Write {
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
        data: Vec<u8>,
    },
}

#[derive(Debug)]
struct PlcState {
    connected: bool,
    endpoint: Option<(String, u16, u16)>,
    connect_failure: Option<StatusCode>,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
    merkers: Vec<u8>,
    counters: Vec<u8>,
    timers: Vec<u8>,
    data_blocks: HashMap<u16, Vec<u8>>,
    calls: Vec<TransportCall>,
}

impl PlcState {
    fn memory(&mut self, area: MemoryArea, db_number: u16) -> Option<&mut Vec<u8>> {
        match area {
            MemoryArea::ProcessInputs => Some(&mut self.inputs),
            MemoryArea::ProcessOutputs => Some(&mut self.outputs),
            MemoryArea::Merkers => Some(&mut self.merkers),
            MemoryArea::Counters => Some(&mut self.counters),
            MemoryArea::Timers => Some(&mut self.timers),
            MemoryArea::DataBlock => self.data_blocks.get_mut(&db_number),
        }
    }
}

/// Region touched by one read/write
enum Span {
    Bit { byte: usize, bit: u8 },
    Bytes { start: usize, len: usize },
}

impl Span {
    fn locate(word_len: u8, start: u32, amount: u32, buffer_len: usize) -> Result<Self, StatusCode> {
        let word_len = WordLength::try_from(word_len).map_err(|_| status::INVALID_WORD_LEN)?;
        if word_len == WordLength::Bit {
            if amount != 1 || buffer_len < 1 {
                return Err(status::INVALID_PARAMS);
            }
            return Ok(Span::Bit {
                byte: (start / 8) as usize,
                bit: (start % 8) as u8,
            });
        }

        let len = (amount as usize)
            .checked_mul(word_len.unit_size())
            .ok_or(status::INVALID_PARAMS)?;
        if len == 0 || buffer_len < len {
            return Err(status::INVALID_PARAMS);
        }
        Ok(Span::Bytes {
            start: start as usize,
            len,
        })
    }

    fn end(&self) -> Option<usize> {
        match self {
            Span::Bit { byte, .. } => byte.checked_add(1),
            Span::Bytes { start, len } => start.checked_add(*len),
        }
    }
}

/// In-memory S7 CPU
#[derive(Debug, Clone)]
pub struct SimulatedPlc {
    state: Arc<Mutex<PlcState>>,
    latency: Duration,
}

impl SimulatedPlc {
    pub fn new() -> Self {
        Self::from_config(&SimulatorConfig::default())
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        let data_blocks = config
            .data_blocks
            .iter()
            .map(|db| (db.number, vec![0u8; db.size]))
            .collect();

        Self {
            state: Arc::new(Mutex::new(PlcState {
                connected: false,
                endpoint: None,
                connect_failure: None,
                inputs: vec![0u8; config.image_size],
                outputs: vec![0u8; config.image_size],
                merkers: vec![0u8; config.image_size],
                counters: vec![0u8; config.counters * 2],
                timers: vec![0u8; config.timers * 2],
                data_blocks,
                calls: Vec::new(),
            })),
            latency: Duration::from_millis(config.latency_ms),
        }
    }

    /// Add (or replace) a zeroed data block
    pub fn with_data_block(self, number: u16, size: usize) -> Self {
        self.state.lock().data_blocks.insert(number, vec![0u8; size]);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every connect attempt fail with `code`
    pub fn fail_connect_with(self, code: StatusCode) -> Self {
        self.set_connect_failure(Some(code));
        self
    }

    pub fn set_connect_failure(&self, code: Option<StatusCode>) {
        self.state.lock().connect_failure = code;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Address, rack and slot of the last successful connect
    pub fn endpoint(&self) -> Option<(String, u16, u16)> {
        self.state.lock().endpoint.clone()
    }

    /// Copy `len` bytes out of an area
    pub fn peek(&self, area: MemoryArea, db_number: u16, offset: usize, len: usize) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let memory = state.memory(area, db_number)?;
        memory.get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
    }

    /// Overwrite bytes in an area, `false` when out of range
    pub fn poke(&self, area: MemoryArea, db_number: u16, offset: usize, data: &[u8]) -> bool {
        let mut state = self.state.lock();
        let Some(memory) = state.memory(area, db_number) else {
            return false;
        };
        match offset
            .checked_add(data.len())
            .and_then(|end| memory.get_mut(offset..end))
        {
            Some(target) => {
                target.copy_from_slice(data);
                true
            },
            None => false,
        }
    }

    /// Every transport call seen so far, in execution order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn delay(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }

    /// Resolve area/span for a data access, enforcing connection and bounds
    fn access<R>(
        state: &mut PlcState,
        area: u8,
        db_number: u16,
        span: Result<Span, StatusCode>,
        op: impl FnOnce(&mut [u8], Span) -> R,
    ) -> Result<R, StatusCode> {
        if !state.connected {
            return Err(status::TCP_NOT_CONNECTED);
        }
        let area = MemoryArea::try_from(area).map_err(|_| status::ITEM_NOT_AVAILABLE)?;
        let span = span?;
        let memory = state
            .memory(area, db_number)
            .ok_or(status::ITEM_NOT_AVAILABLE)?
            .as_mut_slice();

        match span.end() {
            Some(end) if end <= memory.len() => Ok(op(memory, span)),
            _ => Err(status::ADDRESS_OUT_OF_RANGE),
        }
    }
}

impl Default for SimulatedPlc {
    fn default() -> Self {
        Self::new()
    }
}

impl S7Transport for SimulatedPlc {
    fn connect_to(&mut self, address: &str, rack: u16, slot: u16) -> StatusCode {
        self.delay();
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Connect {
            address: address.to_string(),
            rack,
            slot,
        });

        if let Some(code) = state.connect_failure {
            debug!("Simulated connect refused: {} ({:#x})", address, code);
            return code;
        }

        state.connected = true;
        state.endpoint = Some((address.to_string(), rack, slot));
        debug!("Simulated PLC connected: {} rack={} slot={}", address, rack, slot);
        status::OK
    }

    fn disconnect(&mut self) -> StatusCode {
        self.delay();
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Disconnect);
        state.connected = false;
        status::OK
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
        self.delay();
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Read {
            area,
            db_number,
            start,
            amount,
            word_len,
        });

        let span = Span::locate(word_len, start, amount, buffer.len());
        let result = Self::access(&mut state, area, db_number, span, |memory, span| match span {
            Span::Bit { byte, bit } => buffer[0] = (memory[byte] >> bit) & 1,
            Span::Bytes { start, len } => buffer[..len].copy_from_slice(&memory[start..start + len]),
        });

        result.err().unwrap_or(status::OK)
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
        self.delay();
        let mut state = self.state.lock();
        let span = Span::locate(word_len, start, amount, buffer.len());
        let data = match &span {
            Ok(Span::Bit { .. }) => buffer[..1].to_vec(),
            Ok(Span::Bytes { len, .. }) => buffer[..*len].to_vec(),
            Err(_) => buffer.to_vec(),
        };
        state.calls.push(TransportCall::Write {
            area,
            db_number,
            start,
            amount,
            word_len,
            data,
        });

        let result = Self::access(&mut state, area, db_number, span, |memory, span| match span {
            Span::Bit { byte, bit } => {
                if buffer[0] & 0x01 != 0 {
                    memory[byte] |= 1 << bit;
                } else {
                    memory[byte] &= !(1 << bit);
                }
            },
            Span::Bytes { start, len } => memory[start..start + len].copy_from_slice(&buffer[..len]),
        });

        result.err().unwrap_or(status::OK)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const DB: u8 = MemoryArea::DataBlock.code();
    const MK: u8 = MemoryArea::Merkers.code();
    const BIT: u8 = WordLength::Bit.code();
    const BYTE: u8 = WordLength::Byte.code();

    fn connected_plc() -> SimulatedPlc {
        let mut plc = SimulatedPlc::new().with_data_block(1, 16);
        assert_eq!(plc.connect_to("192.168.0.1", 0, 1), status::OK);
        plc
    }

    #[test]
    fn test_requires_connection() {
        let mut plc = SimulatedPlc::new();
        let mut buf = [0u8; 1];
        assert_eq!(
            plc.read_area(MK, 0, 0, 1, BYTE, &mut buf),
            status::TCP_NOT_CONNECTED
        );
        assert_eq!(plc.call_count(), 1);
    }

    #[test]
    fn test_connect_failure() {
        let mut plc = SimulatedPlc::new().fail_connect_with(status::TCP_CONNECTION_FAILED);
        assert_eq!(
            plc.connect_to("10.0.0.1", 0, 2),
            status::TCP_CONNECTION_FAILED
        );
        assert!(!plc.is_connected());
        assert_eq!(plc.endpoint(), None);

        plc.set_connect_failure(None);
        assert_eq!(plc.connect_to("10.0.0.1", 0, 2), status::OK);
        assert_eq!(plc.endpoint(), Some(("10.0.0.1".to_string(), 0, 2)));
    }

    #[test]
    fn test_byte_read_write() {
        let mut plc = connected_plc();
        assert_eq!(
            plc.write_area(DB, 1, 4, 2, BYTE, &[0x12, 0x34]),
            status::OK
        );
        assert_eq!(plc.peek(MemoryArea::DataBlock, 1, 4, 2), Some(vec![0x12, 0x34]));

        let mut buf = [0u8; 2];
        assert_eq!(plc.read_area(DB, 1, 4, 2, BYTE, &mut buf), status::OK);
        assert_eq!(buf, [0x12, 0x34]);
    }

    #[test]
    fn test_bit_addressing_uses_absolute_bit_index() {
        let mut plc = connected_plc();
        // DB1.DBX5.1 -> bit 41
        assert_eq!(plc.write_area(DB, 1, 41, 1, BIT, &[1]), status::OK);
        assert_eq!(plc.peek(MemoryArea::DataBlock, 1, 5, 1), Some(vec![0b0000_0010]));

        let mut buf = [0u8; 1];
        assert_eq!(plc.read_area(DB, 1, 41, 1, BIT, &mut buf), status::OK);
        assert_eq!(buf[0], 1);

        assert_eq!(plc.write_area(DB, 1, 41, 1, BIT, &[0]), status::OK);
        assert_eq!(plc.peek(MemoryArea::DataBlock, 1, 5, 1), Some(vec![0]));
    }

    #[test]
    fn test_errors() {
        let mut plc = connected_plc();
        let mut buf = [0u8; 4];
        assert_eq!(
            plc.read_area(DB, 9, 0, 1, BYTE, &mut buf),
            status::ITEM_NOT_AVAILABLE
        );
        assert_eq!(
            plc.read_area(0x42, 0, 0, 1, BYTE, &mut buf),
            status::ITEM_NOT_AVAILABLE
        );
        assert_eq!(
            plc.read_area(DB, 1, 15, 2, BYTE, &mut buf),
            status::ADDRESS_OUT_OF_RANGE
        );
        assert_eq!(
            plc.read_area(DB, 1, 0, 1, 0x03, &mut buf),
            status::INVALID_WORD_LEN
        );
        assert_eq!(
            plc.read_area(DB, 1, 0, 8, BYTE, &mut buf),
            status::INVALID_PARAMS
        );
        assert_eq!(
            plc.read_area(DB, 1, 0, 2, BIT, &mut buf),
            status::INVALID_PARAMS
        );
    }

    #[test]
    fn test_call_log() {
        let mut plc = connected_plc();
        let mut buf = [0u8; 1];
        plc.read_area(MK, 0, 3, 1, BYTE, &mut buf);
        plc.disconnect();

        assert_eq!(
            plc.calls(),
            vec![
                TransportCall::Connect {
                    address: "192.168.0.1".to_string(),
                    rack: 0,
                    slot: 1
                },
                TransportCall::Read {
                    area: MK,
                    db_number: 0,
                    start: 3,
                    amount: 1,
                    word_len: BYTE
                },
                TransportCall::Disconnect,
            ]
        );
        assert!(!plc.is_connected());

        plc.clear_calls();
        assert_eq!(plc.call_count(), 0);
    }

    #[test]
    fn test_poke_bounds() {
        let plc = SimulatedPlc::new().with_data_block(3, 4);
        assert!(plc.poke(MemoryArea::DataBlock, 3, 2, &[1, 2]));
        assert!(!plc.poke(MemoryArea::DataBlock, 3, 3, &[1, 2]));
        assert!(!plc.poke(MemoryArea::DataBlock, 4, 0, &[1]));
        assert_eq!(plc.peek(MemoryArea::DataBlock, 3, 0, 4), Some(vec![0, 0, 1, 2]));
        assert_eq!(plc.peek(MemoryArea::DataBlock, 3, 3, 2), None);
    }

    #[test]
    fn test_from_config() {
        let config = SimulatorConfig {
            image_size: 8,
            data_blocks: vec![DataBlockConfig { number: 10, size: 32 }],
            ..Default::default()
        };
        let plc = SimulatedPlc::from_config(&config);
        assert!(plc.peek(MemoryArea::Merkers, 0, 0, 8).is_some());
        assert!(plc.peek(MemoryArea::Merkers, 0, 0, 9).is_none());
        assert!(plc.peek(MemoryArea::DataBlock, 10, 0, 32).is_some());
        assert!(plc.peek(MemoryArea::Counters, 0, 0, 512).is_some());
    }
}
