//! SWEN daemon
//!
//! Wires the engine, policy gate, ticket pool and health loop into one
//! process and drives the two periodic actors:
//!
//! - the decision cycle (telemetry → decision → policy → ticket)
//! - the health and remediation loop
//!
//! Both mutate the ticket pool only through its own serialized operations.
//! One process owns a state directory at a time; other processes read it
//! through a [`StateView`] and hand ticket actions to the owner through
//! the [`ControlInbox`].

pub mod config;
pub mod control;
pub mod cycle;
pub mod error;
pub mod lock;
pub mod runtime;
pub mod scheduler;
pub mod view;

pub use config::SwenConfig;
pub use control::{ControlInbox, ControlOutcome, ControlRequest, TicketAction};
pub use cycle::{CycleSummary, DecisionCycle, OpenedTicket, Skipped};
pub use error::{DaemonError, DaemonResult};
pub use lock::StateLock;
pub use runtime::{Runtime, POOL_SUBSYSTEM};
pub use scheduler::{ControlPoll, Scheduler};
pub use view::StateView;
