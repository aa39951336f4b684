//! Ports - seams to the outside world.
//!
//! The only external collaborator of this crate is the store itself. Both
//! primitives are written against the `CoordinationStore` trait, never
//! against a concrete client, so backends can be swapped per deployment.

pub mod store;

pub use self::store::CoordinationStore;
