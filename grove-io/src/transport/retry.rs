//! Bounded retry for flaky bus primitives

use crate::error::{Error, Result};
use std::io;
use std::thread;
use std::time::Duration;

/// Fixed-count, fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Run `op` until it succeeds or the retries are spent
    ///
    /// The last OS error is returned as [`Error::TransportIo`] tagged with
    /// `operation`.
    pub fn run<T, F>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> io::Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => {
                    if attempt > 0 {
                        log::debug!("{} succeeded after {} retries", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!(
                        "{} failed ({}), retry {}/{}",
                        operation,
                        e,
                        attempt,
                        self.retries
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(source) => return Err(Error::TransportIo { operation, source }),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(9, Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_from_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let value = policy
            .run("read_byte", || {
                calls += 1;
                if calls < 3 {
                    Err(io::Error::other("nak"))
                } else {
                    Ok(7u8)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_retries() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let err = policy
            .run::<(), _>("write_frame", || {
                calls += 1;
                Err(io::Error::other("bus stuck"))
            })
            .unwrap_err();
        assert_eq!(calls, 10);
        match err {
            Error::TransportIo { operation, .. } => assert_eq!(operation, "write_frame"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
