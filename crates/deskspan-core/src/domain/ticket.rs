//! Session tickets.
//!
//! Every successful handshake is identified by a [`Ticket`].  Tickets compare
//! by value, are never reused while their session is live, and come from a
//! process-local monotonically increasing counter, so they are practically
//! unique for the lifetime of the server process.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque identifier for one connected-target session.
///
/// [`Ticket::LOCAL`] is reserved for the server's own machine and is never
/// handed out by a [`TicketCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u32);

impl Ticket {
    /// The local machine's session id.
    pub const LOCAL: Ticket = Ticket(0);

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing [`Ticket`] allocator.
///
/// The counter is bumped once per *attempted* registration; a ticket burned
/// on a rejected handshake is never handed out again.
pub struct TicketCounter {
    // `fetch_add` keeps allocation race-free between concurrent handshakes.
    next: AtomicU32,
}

impl TicketCounter {
    /// Creates a counter whose first allocation is ticket 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocates the next ticket.
    pub fn allocate(&self) -> Ticket {
        Ticket(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TicketCounter {
    fn default() -> Self {
        Self::new()
    }
}
