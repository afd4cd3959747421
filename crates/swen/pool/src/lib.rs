//! # SWEN Pool - Bounded Change Ticket Pool
//!
//! Holds the open [`ChangeTicket`](swen_types::ChangeTicket)s and enforces
//! the hard capacity bound:
//!
//! - `create` checks capacity, stale tickets and per-service uniqueness and
//!   inserts under a single writer lock
//! - `enforce_limit` expires the oldest evictable tickets when the pool is
//!   over its bound (after a restore, for example)
//! - stale tickets pause new work until they are resolved or evicted
//! - reads are served from a published snapshot and never block writers
//!
//! Side effects of creation (proposal notification) run in the background
//! with bounded retry, and approved tickets are handed to a
//! [`ChangeExecutor`] whose outcome drives `Applying -> Applied | Failed`.

pub mod config;
pub mod error;
pub mod executor;
pub mod notify;
pub mod pool;
pub mod report;
pub mod store;

pub use config::{BackoffConfig, PoolConfig};
pub use error::{NotifyError, PoolError, PoolResult};
pub use executor::{ApplyOutcome, ChangeExecutor, ExecutorWorker, LoggingExecutor};
pub use notify::{
    ChangeProposal, FileProposalNotifier, NotificationDispatcher, TicketNotifier,
    NOTIFICATIONS_SUBSYSTEM,
};
pub use pool::{Admission, ChangeTicketPool, PoolEvent, RestoreReport};
pub use report::{AlertSeverity, PoolStatus, StaleAlert, StatusReport};
pub use store::{FileTicketStore, InMemoryTicketStore, TicketStore};
