//! Local mirror of a remote launch catalog.
//!
//! [`sync`] pages launches from a [`source::RemoteSource`] into the SQLite
//! store in [`db`], checkpointing after every page. [`query`] answers
//! filtered, paginated reads over the same store.

pub mod config;
pub mod db;
pub mod models;
pub mod query;
pub mod source;
pub mod sync;
