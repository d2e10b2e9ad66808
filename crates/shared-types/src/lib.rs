//! # Shared Types Crate
//!
//! This crate contains the vocabulary every other tunnel crate speaks: the
//! exchange identifier, the ordered case-insensitive header map, and the
//! request/response descriptors exchanged during a tunnelled HTTP exchange.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: descriptors are defined once and serialized
//!   the same way on both ends of the tunnel.
//! - **Metadata Only**: descriptors never carry body bytes; bodies stream as
//!   raw chunks on per-exchange channels.
//! - **Order Preserving**: headers keep insertion order through a
//!   serialize/deserialize round-trip.

pub mod entities;
pub mod errors;
pub mod headers;

pub use entities::*;
pub use errors::*;
pub use headers::Headers;
