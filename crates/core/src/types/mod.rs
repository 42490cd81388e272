//! Core types for the Spoti Boost panel.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod payment_order;
pub mod phone;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Amount, AmountError};
pub use payment_order::{DEFAULT_ORDER_PREFIX, PaymentOrderId};
pub use phone::{
    DEFAULT_COUNTRY_CODE, Msisdn, PhoneError, PhoneFormat, PhoneNormalizer, SUBSCRIBER_DIGITS,
};
pub use status::*;
