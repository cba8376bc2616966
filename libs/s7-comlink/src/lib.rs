//! S7 Communication Link Library
//!
//! Address notation, value codec and a serialized client for Siemens S7 PLCs.
//!
//! # Architecture
//!
//! - **address**: `EB1000` / `E5.5` / `DB1.DBW4` / `DB1.DBX5.1` → [`AddressDescriptor`]
//! - **value**: [`S7Value`] types and wire byte order
//! - **transport**: the four-call [`S7Transport`] boundary and status codes
//! - **client**: [`S7Client`], one worker thread owning the transport
//! - **simulator**: [`SimulatedPlc`], an in-memory transport
//!
//! # Example
//!
//! ```no_run
//! use s7_comlink::{S7Client, SimulatedPlc};
//!
//! # async fn demo() -> s7_comlink::Result<()> {
//! let client = S7Client::new(SimulatedPlc::new().with_data_block(1, 64))?;
//! client.connect_async("192.168.0.10", 0, 1).await?;
//! client.write_async("DB1.DBW4", 1234u16).await?;
//! let (value, status) = client.read_async::<u16>("DB1.DBW4").await?;
//! assert_eq!((value, status), (1234, 0));
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod client;
pub mod error;
pub mod simulator;
pub mod transport;
pub mod value;

pub use address::{parse, AccessWidth, AddressDescriptor, MemoryArea, WordLength};
pub use client::{ClientOptions, S7Client};
pub use error::{AddressParseError, ClientError, Result};
pub use simulator::{DataBlockConfig, SimulatedPlc, SimulatorConfig, TransportCall};
pub use transport::{status, S7Transport, StatusCode};
pub use value::{from_wire_order, to_wire_order, S7Value};
