//! Transport boundary
//!
//! The client never speaks the wire protocol itself. It hands area codes,
//! offsets and buffers to an [`S7Transport`], which is the owner of the
//! native connection handle. Constructing a transport value creates the
//! handle; dropping it releases the handle.

/// Status returned by every transport call, `0` means success
pub type StatusCode = i32;

/// Four-operation transport primitive
///
/// Calls are blocking and are only ever issued from the client worker
/// thread, one at a time.
pub trait S7Transport: Send + 'static {
    /// Connect to the PLC at `address` (rack/slot addressing)
    fn connect_to(&mut self, address: &str, rack: u16, slot: u16) -> StatusCode;

    /// Drop the connection; must be harmless when not connected
    fn disconnect(&mut self) -> StatusCode;

    /// Read `amount` elements of `word_len` starting at `start`
    fn read_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
        buffer: &mut [u8],
    ) -> StatusCode;

    /// Write `amount` elements of `word_len` starting at `start`
    fn write_area(
        &mut self,
        area: u8,
        db_number: u16,
        start: u32,
        amount: u32,
        word_len: u8,
        buffer: &[u8],
    ) -> StatusCode;
}

impl<T: S7Transport + ?Sized> S7Transport for Box<T> {
    fn connect_to(&mut self, address: &str, rack: u16, slot: u16) -> StatusCode {
        (**self).connect_to(address, rack, slot)
    }

    fn disconnect(&mut self) -> StatusCode {
        (**self).disconnect()
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
        (**self).read_area(area, db_number, start, amount, word_len, buffer)
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
        (**self).write_area(area, db_number, start, amount, word_len, buffer)
    }
}

/// Status codes produced by this crate
///
/// Values follow the layout of common S7 client libraries: TCP level
/// errors in the low word, client level errors in the high word. Negative
/// codes are raised by the client itself, never by a transport.
pub mod status {
    use super::StatusCode;

    pub const OK: StatusCode = 0;
    pub const TCP_CONNECTION_FAILED: StatusCode = 0x0000_0003;
    pub const TCP_NOT_CONNECTED: StatusCode = 0x0000_0009;
    pub const INVALID_PARAMS: StatusCode = 0x0020_0000;
    pub const INVALID_WORD_LEN: StatusCode = 0x0050_0000;
    pub const ADDRESS_OUT_OF_RANGE: StatusCode = 0x0090_0000;
    pub const ITEM_NOT_AVAILABLE: StatusCode = 0x00C0_0000;
    /// Transport call panicked, the job was abandoned
    pub const TRANSPORT_FAULT: StatusCode = -1;
    /// Client worker is gone, the job never ran
    pub const CLIENT_STOPPED: StatusCode = -2;

    pub fn is_ok(code: StatusCode) -> bool {
        code == OK
    }

    /// Human readable text for a status code
    pub fn describe(code: StatusCode) -> &'static str {
        match code {
            OK => "OK",
            TCP_CONNECTION_FAILED => "TCP : Connection failed",
            TCP_NOT_CONNECTED => "TCP : Not connected",
            INVALID_PARAMS => "CLI : Invalid parameters",
            INVALID_WORD_LEN => "CLI : Invalid word length",
            ADDRESS_OUT_OF_RANGE => "CPU : Address out of range",
            ITEM_NOT_AVAILABLE => "CPU : Item not available",
            TRANSPORT_FAULT => "CLI : Transport fault",
            CLIENT_STOPPED => "CLI : Client stopped",
            _ => "Unknown error",
        }
    }
}
