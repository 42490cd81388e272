//! Spoti Boost panel library.
//!
//! The panel binary is a thin shell over this crate: configuration, the
//! ZenoPay client, storage, the reconciliation service and the HTTP routes
//! all live here so they can be tested without a running server.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod zenopay;
