//! Client library for the AnonimKu server.
//!
//! [`api::ApiClient`] wraps the HTTP routes, [`search`] implements the
//! polling match search, [`subscription::EventStream`] receives pushed
//! changes, and [`conversation::Conversation`] folds those changes into the
//! state one open chat needs.

pub mod api;
pub mod conversation;
pub mod error;
pub mod search;
pub mod subscription;

pub use api::{ApiClient, RevealOutcome};
pub use conversation::Conversation;
pub use error::{ClientError, Result};
pub use search::{search_for_match, MatchFinder, SearchOptions, SearchOutcome};
pub use subscription::EventStream;
