//! Persistent accessory cache.
//!
//! The accessory host keeps every accessory it has registered in a redb
//! database so that a restart can hand them back to the bridge before the
//! bus connection is made.

pub mod accessory_cache;
pub mod error;

pub use accessory_cache::AccessoryStore;
pub use error::{Error, Result};
