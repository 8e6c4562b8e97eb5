//! # anonimku-store
//!
//! SQLite persistence for the AnonimKu matchmaking service.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed operations for users, matches,
//! messages and reveal requests.  Every operation that touches more than one
//! row runs inside a `BEGIN IMMEDIATE` transaction, so concurrent writers
//! (threads holding their own connection, or separate processes) are
//! serialized on the database write lock and never observe a half-applied
//! pairing, termination or reveal.

pub mod database;
pub mod matches;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reveals;
pub mod users;

mod error;
mod rows;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
