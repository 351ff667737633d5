//! Services layered over the backend client.
//!
//! - [`cart`] - Optimistic cart updates
//! - [`wishlist`] - Wishlist with optimistic removal
//! - [`notifications`] - Transient per-identity notices

pub mod cart;
pub mod notifications;
pub mod wishlist;

pub use cart::{CART_UPDATE_FAILED, CartBackend, CartService, Optimistic};
pub use notifications::{Notice, NoticeLevel, Notifications};
pub use wishlist::{WISHLIST_UPDATE_FAILED, WishlistService};
