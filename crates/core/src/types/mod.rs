//! Core types for Clementine.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod id;
pub mod order;
pub mod realtime;
pub mod status;

pub use cart::{Cart, CartItem, CartProduct};
pub use catalog::{Product, ProductAttribute, ProductVariant, Review, ReviewAuthor};
pub use customer::{Address, Customer, User, Wishlist};
pub use id::*;
pub use order::{Order, OrderItem, ShippingAddress};
pub use realtime::RealtimeEvent;
pub use status::*;
