//! Domain models for the panel.
//!
//! These are validated domain objects, separate from the database row types
//! that live next to each repository.

pub mod payment;
pub mod session;
pub mod transaction;
pub mod user;

pub use payment::{
    NewPaymentRecord, PAYMENT_BIN_TTL_HOURS, PaymentRecord, PaymentUpdate, payment_bin_ttl,
};
pub use session::CurrentUser;
pub use transaction::Transaction;
pub use user::UserAccount;
