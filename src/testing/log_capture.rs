//! In-memory log sink for asserting on log output

use crate::observability::LogHandle;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;

/// Everything written through a [`capture_logs`] handle
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Number of lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|line| line.contains(needle)).count()
    }
}

pub struct CapturedWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buffer: self.buffer.clone(),
        }
    }
}

/// A DEBUG-level text handle that writes into memory
pub fn capture_logs() -> (LogHandle, CapturedLogs) {
    let captured = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .finish();

    (LogHandle::from_dispatch(Dispatch::new(subscriber)), captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_logs() {
        let (handle, logs) = capture_logs();
        tracing::dispatcher::with_default(handle.dispatch(), || {
            tracing::info!("first");
            tracing::warn!("second");
            tracing::trace!("too verbose");
        });

        assert!(logs.contains("first"));
        assert_eq!(logs.count("WARN"), 1);
        assert!(!logs.contains("too verbose"));
    }
}
