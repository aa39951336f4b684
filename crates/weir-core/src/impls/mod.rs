//! Port implementations for development and tests.
//!
//! Production backends live in their own crates (`weir-redis`); this module
//! holds what a single process needs to run without one.

pub mod inmem_store;

pub use self::inmem_store::InMemoryStore;
