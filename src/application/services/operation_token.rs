//! Latest-wins guard for asynchronous operations.
//!
//! Each logical operation captures a [`Ticket`] when it starts. Starting a
//! newer operation, or invalidating the token, makes every older ticket
//! stale; results carried by a stale ticket are dropped by the caller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic session token shared by one family of operations.
#[derive(Debug, Default)]
pub struct OperationToken {
    current: AtomicU64,
}

impl OperationToken {
    /// Creates a token with no operation started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new operation, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket<'_> {
        let value = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket { token: self, value }
    }

    /// Joins the current operation without superseding it.
    pub fn ticket(&self) -> Ticket<'_> {
        Ticket {
            token: self,
            value: self.current.load(Ordering::SeqCst),
        }
    }

    /// Makes every outstanding ticket stale.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs `operation` as a new operation; `None` if it was superseded
    /// before completing.
    pub async fn run<F>(&self, operation: F) -> Option<F::Output>
    where
        F: Future,
    {
        let ticket = self.begin();
        let output = operation.await;
        ticket.is_current().then_some(output)
    }
}

/// Marker captured at the start of an operation.
#[derive(Debug, Clone, Copy)]
pub struct Ticket<'a> {
    token: &'a OperationToken,
    value: u64,
}

impl Ticket<'_> {
    /// Returns true if no newer operation has started since this ticket.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.token.current.load(Ordering::SeqCst) == self.value
    }
}
