//! `swend tickets`: operator resolution of open tickets.
//!
//! Listing reads the state directory without taking ownership. Resolutions
//! are applied directly when no daemon owns the directory, and otherwise
//! queued for the running daemon, which applies them within
//! `cycle.control_poll_secs`.

use anyhow::Context;
use clap::Subcommand;
use swen_daemon::{
    ControlInbox, ControlRequest, DaemonError, Runtime, StateView, SwenConfig, TicketAction,
};
use swen_types::{ChangeTicket, TicketId};

use crate::output::{print_info, print_output, print_success, OutputFormat, TicketRow};
/// Ticket subcommands
#[derive(Subcommand)]
pub enum TicketCommands {
    /// List open tickets, oldest first
    List,

    /// Approve a pending or reviewed ticket
    Approve {
        /// Ticket ID
        ticket_id: String,
    },

    /// Reject a ticket under review
    Reject {
        /// Ticket ID
        ticket_id: String,

        /// Reason recorded on the ticket
        #[arg(short, long, default_value = "rejected by operator")]
        reason: String,
    },

    /// Expire a pending or reviewed ticket immediately
    Evict {
        /// Ticket ID
        ticket_id: String,
    },
}

/// Execute a ticket command
pub async fn execute(
    command: TicketCommands,
    config: SwenConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let (ticket_id, action) = match command {
        TicketCommands::List => {
            let view = StateView::open(config)
                .await
                .context("failed to read persisted state")?;
            print_output(&view.pool.list(), |t| TicketRow::from(t), format)?;
            return Ok(());
        }
        TicketCommands::Approve { ticket_id } => (ticket_id, TicketAction::Approve),
        TicketCommands::Reject { ticket_id, reason } => (ticket_id, TicketAction::Reject { reason }),
        TicketCommands::Evict { ticket_id } => (ticket_id, TicketAction::Evict),
    };
    let id = parse_id(&ticket_id)?;

    match Runtime::open(config.clone(), None).await {
        Ok(runtime) => {
            let ticket = action.apply(&runtime.pool, &id).await?;
            print_success(&describe(&action, &ticket));
        }
        Err(DaemonError::Locked { .. }) => {
            let view = StateView::open(config.clone())
                .await
                .context("failed to read persisted state")?;
            if view.pool.get(&id).is_none() {
                anyhow::bail!("no open ticket {}", id);
            }
            let path = ControlInbox::new(config.paths.control_dir())
                .submit(&ControlRequest::new(id.clone(), action.clone()))
                .await?;
            print_info(&format!(
                "swend is running; queued {} of {} ({})",
                action,
                id,
                path.display()
            ));
        }
        Err(e) => return Err(e).context("failed to load persisted state"),
    }
    Ok(())
}

fn describe(action: &TicketAction, ticket: &ChangeTicket) -> String {
    match action {
        TicketAction::Approve => format!(
            "Approved {} ({} → {})",
            ticket.service, ticket.from_provider, ticket.to_provider
        ),
        TicketAction::Reject { .. } => format!("Rejected ticket for {}", ticket.service),
        TicketAction::Evict => format!("Evicted ticket for {}", ticket.service),
    }
}

fn parse_id(raw: &str) -> Result<TicketId, DaemonError> {
    TicketId::parse(raw).ok_or_else(|| DaemonError::InvalidTicketId(raw.to_string()))
}
