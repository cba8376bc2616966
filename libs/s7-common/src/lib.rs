//! S7 Common Library
//!
//! Configuration loading, logging setup and the ambient error type shared by
//! the S7 crates and tools.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Common prelude for S7 tools
pub mod prelude {
    pub use crate::config::{load_config, load_config_from_file};
    pub use crate::error::{Error, Result};
    pub use crate::logging::{init_logging, LogConfig};
    pub use tracing::{debug, error, info, trace, warn};
}
