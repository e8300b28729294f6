//! monshin-core
//!
//! Pure domain types, snapshot formats, and name normalization.
//! No storage or HTTP dependency — this is the shared vocabulary of the
//! Monshin system.

pub mod error;
pub mod models;
pub mod normalize;
