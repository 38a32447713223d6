//! Producer/viewer role detection
//!
//! The first data message on a fresh connection decides its role. A producer
//! announces itself either with the bare token:
//!
//! ```text
//! raspberry-pi
//! ```
//!
//! or with a JSON envelope whose `type` is the token:
//!
//! ```text
//! {"type": "raspberry-pi"}
//! ```
//!
//! Anything else (including unparseable data) makes the connection a viewer.

use serde::Deserialize;

use crate::channel::FramePayload;
use crate::registry::Role;

/// Identification token sent by the camera device
pub const DEFAULT_PRODUCER_TOKEN: &str = "raspberry-pi";

#[derive(Debug, Deserialize)]
struct Identification {
    #[serde(rename = "type")]
    kind: String,
}

/// Decides the role of a connection from its first message
#[derive(Debug, Clone)]
pub struct RoleClassifier {
    token: String,
}

impl RoleClassifier {
    /// Create a classifier recognizing the given producer token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The producer identification token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Classify a connection from its first message
    ///
    /// Never returns [`Role::Unclassified`].
    pub fn classify(&self, first_message: &FramePayload) -> Role {
        match first_message.as_text() {
            Some(text) if self.is_identification(text) => Role::Producer,
            _ => Role::Viewer,
        }
    }

    fn is_identification(&self, text: &str) -> bool {
        if text == self.token {
            return true;
        }

        // Skip the JSON parser for anything that cannot be an object
        if !text.trim_start().starts_with('{') {
            return false;
        }

        serde_json::from_str::<Identification>(text)
            .map(|id| id.kind == self.token)
            .unwrap_or(false)
    }
}

impl Default for RoleClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCER_TOKEN)
    }
}
