//! Payment codes, VietQR links and Sepay webhook reconciliation.

pub mod code;
pub mod extract;
pub mod reconcile;
pub mod webhook;

pub use code::{BankAccount, assign_payment_details, generate_payment_code};
pub use extract::{extract_payment_code_from_content, resolve_payment_code};
pub use reconcile::{ReconcileOutcome, reconcile_payment};
pub use webhook::SepayWebhookPayload;
