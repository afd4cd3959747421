//! Command implementations for swend.

pub mod cycle;
pub mod health;
pub mod run;
pub mod tickets;
