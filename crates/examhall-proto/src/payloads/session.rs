//! Session payload types: login handshake.

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Participant identity sent with a login request.
///
/// `external_id` is the admission key: the coordinator holds at most one
/// session per `external_id`. Missing fields decode as empty strings so the
/// coordinator can answer with an admission rejection instead of silently
/// dropping the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantIdentity {
    /// Externally assigned identifier (student number)
    #[serde(rename = "id", default, deserialize_with = "null_as_default")]
    pub external_id: String,
    /// Human readable name
    #[serde(rename = "name", default, deserialize_with = "null_as_default")]
    pub display_name: String,
    /// Network address; overwritten by the coordinator with the peer address
    #[serde(rename = "ip", default, deserialize_with = "null_as_default")]
    pub address: String,
    /// True while the identity is bound to a live session
    #[serde(default, deserialize_with = "null_as_default")]
    pub online: bool,
}

impl ParticipantIdentity {
    /// Create an offline identity with no address.
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            address: String::new(),
            online: false,
        }
    }

    /// Returns the name of the first required field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.external_id.trim().is_empty() {
            Some("id")
        } else if self.display_name.trim().is_empty() {
            Some("name")
        } else {
            None
        }
    }
}

/// Coordinator answer to a login request.
///
/// A rejected login is terminal: the coordinator closes the connection right
/// after writing this response, and the participant stops reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Whether the session was admitted
    pub success: bool,
    /// Human readable outcome
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

impl LoginResponse {
    /// Successful admission.
    pub fn accepted(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    /// Rejected admission with a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { success: false, message: reason.into() }
    }
}
