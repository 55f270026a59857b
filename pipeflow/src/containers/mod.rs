//! Attribute containers and the shared container store.
//!
//! This module provides:
//! - The `AttributeContainer` trait every exchanged data type implements
//! - `ContainerRef`, the shared-mutable handle modules receive
//! - `ContainerStore`, the thread-safe registry keyed by container type

mod interface;
mod store;

pub use interface::{AttributeContainer, ContainerRef};
pub use store::ContainerStore;
