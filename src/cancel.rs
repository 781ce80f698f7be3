// src/cancel.rs

//! Cooperative cancellation
//!
//! A `CancelToken` is a cloneable flag threaded through every operation that
//! blocks on I/O. Long-running loops call [`CancelToken::check`] between
//! units of work; byte copies go through [`CancelReader`], which checks the
//! token before each read.

use crate::error::{Error, Result};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
///
/// Cloning produces a handle to the same flag. The default token is never
/// cancelled unless [`CancelToken::cancel`] is called on one of its clones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, untripped token
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag; all clones observe the cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been tripped
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Error::Cancelled` if the flag has been tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Reader adapter that fails once the token trips
///
/// The error kind is deliberately not `Interrupted`, which `std::io::copy`
/// retries; a cancelled copy must stop. Callers inspect the token to
/// distinguish cancellation from a genuine I/O failure.
pub struct CancelReader<'a, R> {
    token: &'a CancelToken,
    inner: R,
}

impl<'a, R: Read> CancelReader<'a, R> {
    pub fn new(token: &'a CancelToken, inner: R) -> Self {
        Self { token, inner }
    }
}

impl<R: Read> Read for CancelReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "operation cancelled"));
        }
        self.inner.read(buf)
    }
}
