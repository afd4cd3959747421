//! Periodic actors: the decision cycle, the health loop and the operator
//! request poll.

use std::sync::Arc;
use std::time::Duration;

use swen_health::HealthLoop;
use swen_pool::ChangeTicketPool;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use crate::control::ControlInbox;
use crate::cycle::DecisionCycle;

/// Where operator requests arrive and the pool they act on.
pub struct ControlPoll {
    pub inbox: ControlInbox,
    pub pool: Arc<ChangeTicketPool>,
    pub interval: Duration,
}

/// Scheduler state
pub struct Scheduler {
    cycle: Arc<DecisionCycle>,
    health: Arc<HealthLoop>,
    cycle_interval: Duration,
    health_interval: Duration,
    control: Option<ControlPoll>,
    running: Arc<RwLock<bool>>,
    shutdown: Notify,
}

impl Scheduler {
    pub fn new(
        cycle: Arc<DecisionCycle>,
        health: Arc<HealthLoop>,
        cycle_interval: Duration,
        health_interval: Duration,
        control: Option<ControlPoll>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cycle,
            health,
            cycle_interval,
            health_interval,
            control,
            running: Arc::new(RwLock::new(false)),
            shutdown: Notify::new(),
        })
    }

    /// Run all loops until [`Scheduler::shutdown`] is called.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            cycle_interval_secs = self.cycle_interval.as_secs(),
            health_interval_secs = self.health_interval.as_secs(),
            "Scheduler started"
        );

        // Spawn decision loop
        let decision_scheduler = self.clone();
        let decision_handle = tokio::spawn(async move {
            let mut ticker = interval(decision_scheduler.cycle_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = decision_scheduler.shutdown.notified() => break,
                }

                if !*decision_scheduler.running.read().await {
                    break;
                }

                // The cycle body runs in its own task and is always awaited,
                // so shutdown never interrupts a ticket half-created.
                let cycle = decision_scheduler.cycle.clone();
                match tokio::spawn(async move { cycle.run_cycle().await }).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Decision cycle failed"),
                    Err(e) => tracing::error!(error = %e, "Decision cycle task panicked"),
                }
            }
        });

        // Spawn health loop
        let health = self.health.clone();
        let health_interval = self.health_interval;
        let health_handle = tokio::spawn(async move {
            health.run_continuous(health_interval).await;
        });

        // Spawn operator request poll
        let control_scheduler = self.clone();
        let control_handle = tokio::spawn(async move {
            let Some(control) = &control_scheduler.control else {
                return;
            };
            let mut ticker = interval(control.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = control_scheduler.shutdown.notified() => break,
                }

                if !*control_scheduler.running.read().await {
                    break;
                }

                if let Err(e) = control.inbox.drain(&control.pool).await {
                    tracing::error!(error = %e, "Failed to apply operator requests");
                }
            }
        });

        let _ = tokio::join!(decision_handle, health_handle, control_handle);

        tracing::info!("Scheduler stopped");
    }

    /// Stop all loops. In-progress cycles finish first.
    pub async fn shutdown(&self) {
        {
            let mut running = self.running.write().await;
            *running = false;
        }
        self.shutdown.notify_waiters();
        self.health.stop().await;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
