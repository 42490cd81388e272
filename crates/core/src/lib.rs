//! Spoti Boost Core - Shared types library.
//!
//! This crate provides the value types used across the Spoti Boost components:
//! - `panel` - The reseller panel web application
//! - `cli` - Command-line tools for migrations and housekeeping
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Phone normalization, order id generation and amount
//! validation live here so they can be tested without any infrastructure.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, amounts, emails, phone numbers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
