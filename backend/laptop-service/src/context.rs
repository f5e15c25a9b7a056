//! Per-call cancellation and deadline signal
//!
//! Handlers that loop (search, upload, rate) check the context before every
//! step so a caller that gave up, or whose deadline passed, stops the work
//! promptly instead of leaving it running against the stores.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tonic::metadata::MetadataMap;

use crate::error::{LaptopError, Result};

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

type CancelProbe = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Option<CancelProbe>,
}

impl CallContext {
    /// Context with the deadline the caller sent in `grpc-timeout`, if any
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let deadline = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| Instant::now() + timeout);

        Self {
            deadline,
            cancelled: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a probe that reports whether the peer stopped listening
    pub fn with_cancel_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancelled = Some(Box::new(probe));
        self
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Canceled` if the peer went away, `DeadlineExceeded` once the deadline passed
    pub fn check(&self) -> Result<()> {
        if self.cancelled.as_ref().is_some_and(|probe| probe()) {
            return Err(LaptopError::Canceled);
        }

        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(LaptopError::DeadlineExceeded);
        }

        Ok(())
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("deadline", &self.deadline)
            .field("has_cancel_probe", &self.cancelled.is_some())
            .finish()
    }
}

/// Parse a `grpc-timeout` value: at most 8 ASCII digits followed by a unit
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };

    Some(timeout)
}
