//! Domain models for the web application.
//!
//! - [`session`] - Identity and session state stored per browser
//! - [`cart`] - Locally mirrored cart with quantity-adjustment rules

pub mod cart;
pub mod session;

pub use cart::Cart;
pub use session::{AuthTokens, CurrentIdentity, SessionState, keys as session_keys};
