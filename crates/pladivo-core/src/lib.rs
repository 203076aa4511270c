//! Domain logic for the pladivo event workflow and payment reconciliation
//! service.

pub mod auth;
pub mod contract;
pub mod error;
pub mod fanout;
pub mod notify;
pub mod payment;
pub mod workflow;

pub use error::{DomainError, DomainResult};
