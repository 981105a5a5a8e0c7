//! Core types for Grocer.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;

pub use cart::{CartBackend, CartIdentity, CartLineItem, CartProduct, CartStatus, subtotal};
pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
