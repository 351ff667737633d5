//! MarketPulse Core - Shared domain types.
//!
//! This crate provides the types used across the MarketPulse components:
//! - `web` - Marketplace web application (storefront, vendor and admin dashboards)
//! - `integration-tests` - End-to-end tests against a fake backend
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, quantities, emails, roles,
//!   statuses, page envelopes and price trends

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
