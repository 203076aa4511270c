pub mod contracts;
pub mod event_plans;
pub mod outbox;
pub mod payments;
pub mod tasks;
