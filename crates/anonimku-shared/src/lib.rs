//! # anonimku-shared
//!
//! Types shared between the AnonimKu server and its clients: identifiers,
//! row models, change events, the WebSocket subscription protocol and the
//! input validation rules both sides agree on.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;
pub mod validation;
