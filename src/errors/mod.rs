use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dispatch;

pub use dispatch::{DispatchTable, ErrorClass};

pub type Result<T> = std::result::Result<T, Error>;

/// One selectable verification method offered by a checkpoint page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error for '{url}': {source}")]
    Internet {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to '{url}' returned status code '{status}'")]
    Status { url: String, status: u16 },

    #[error("unexpected response from '{url}': {reason}")]
    UnexpectedResponse { url: String, reason: String },

    #[error("cannot auth user with username '{username}': {message}")]
    Auth { username: String, message: String },

    #[error("cannot auth user with username '{username}': need verification by checkpoint")]
    Checkpoint {
        username: String,
        checkpoint_url: String,
        /// Forward/replay navigation links exposed by the challenge page.
        navigation: HashMap<String, String>,
        /// Verification-method choices the caller can resume with.
        types: Vec<VerificationMethod>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("cannot build http client: {0}")]
    Transport(#[source] reqwest::Error),
}

impl Error {
    pub fn unexpected(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::UnexpectedResponse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// URL the failing request was addressed to, when the error carries one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Internet { url, .. }
            | Error::Status { url, .. }
            | Error::UnexpectedResponse { url, .. } => Some(url),
            Error::Checkpoint { checkpoint_url, .. } => Some(checkpoint_url),
            _ => None,
        }
    }
}
