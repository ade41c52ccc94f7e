//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File transfer identifier
///
/// Kept as an opaque string so identifiers minted by a remote server or read
/// back from a resume record survive round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote contact identifier (MSISDN in international format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(String);

impl ContactId {
    /// Parse a contact identifier from a phone number or a SIP/tel URI.
    ///
    /// Accepts `+33612345678`, `sip:+33612345678@operator.com` and
    /// `tel:+33612345678` forms.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let number = Self::extract_number(raw);
        if !number.starts_with('+') {
            return Err(format!("Contact number must be international: '{}'", raw));
        }
        let digits = &number[1..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid contact number: '{}'", raw));
        }
        Ok(Self(number))
    }

    fn extract_number(raw: &str) -> String {
        let stripped = raw
            .trim()
            .trim_start_matches("sip:")
            .trim_start_matches("tel:");
        let user_part = stripped.split('@').next().unwrap_or(stripped);
        // Drop URI parameters such as ;user=phone
        let user_part = user_part.split(';').next().unwrap_or(user_part);
        user_part.to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SIP URI form of this contact for a given home domain
    pub fn to_sip_uri(&self, domain: &str) -> String {
        format!("sip:{}@{}", self.0, domain)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of a shared content item (file, image, live stream)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    /// Location of the content (local file path or remote URL)
    pub uri: String,
    /// MIME type
    pub mime_type: String,
    /// Size in bytes (0 for live content)
    pub size: u64,
    /// File name presented to the user
    pub name: String,
}

impl ContentDescriptor {
    pub fn new(
        uri: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            size,
            name: name.into(),
        }
    }
}
