//! monshin-store
//!
//! Backend-agnostic persistence for the Monshin questionnaire service.
//!
//! The [`backend::PersistenceBackend`] trait is the capability contract every
//! storage adapter implements. Two adapters ship here: [`sqlite`] (the
//! default — local relational store, optionally write-through mirroring
//! sessions to CouchDB) and [`firestore`] (feature-gated, registered as a
//! plugin). Application code reaches the active adapter only through
//! [`context::PersistenceContext`], chosen once at startup from
//! configuration.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
#[cfg(feature = "firestore")]
pub mod firestore;
pub mod plugin;
pub mod sqlite;
