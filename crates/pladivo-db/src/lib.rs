//! Persistence layer: row models, embedded migrations, connection pooling
//! and query functions for event plans, tasks, contracts, payments and the
//! notification outbox.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
