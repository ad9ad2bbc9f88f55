//! Client for an undocumented social-media web surface.
//!
//! The surface was never meant for programmatic consumption: full-detail
//! data lives in a JSON blob embedded in HTML pages, and listings are
//! cursor-based GraphQL-style connections with variably shaped payloads.
//! This crate scrapes the embedded blob, signs and issues the paginated
//! queries, and normalizes every response into a session-scoped,
//! de-duplicated entity graph.
//!
//! Listing drivers follow a pull model: each call fetches and decodes one
//! page, then hands the continuation cursor back to the caller.

pub mod client;
pub mod config;
pub mod entities;
pub mod errors;
pub mod paging;

pub use client::{AccountClient, Challenge, WebClient};
pub use config::ClientConfig;
pub use entities::{Account, Comment, Location, Media, Registry, Story, Tag};
pub use errors::{DispatchTable, Error, ErrorClass, Result, VerificationMethod};
pub use paging::Listing;
