//! Grocer storefront cart library.
//!
//! Keeps a shopper's cart consistent between the device (for guests) and the
//! remote record store (for signed-in shoppers). [`cart::CartManager`] owns
//! the in-memory cart; the other modules provide the storage, identity, and
//! configuration it is wired up with.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod db;
pub mod identity;
pub mod remote;
pub mod storage;

pub use cart::CartManager;
