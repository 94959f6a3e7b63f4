//! Logging bootstrap and timing helpers.

mod logging;
mod timer;

pub use logging::{init_logging, LoggingError};
pub use timer::SpanTimer;
