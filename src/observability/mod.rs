//! Observability: structured logging to console and a rotating file

pub mod logging;
pub mod rotating_file;

// Re-export for convenience
pub use logging::{build_logging, parse_level, FileSink, LogFormat, LogHandle, LoggingError, LoggingOptions};
pub use rotating_file::RotatingFileWriter;
