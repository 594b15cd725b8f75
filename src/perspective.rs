//! Shared Perspective Model
//!
//! The description of a sharing arrangement that a link language gets built
//! for. The sharing-mode tag is kept verbatim so an unknown tag can travel
//! as far as the selector and be rejected there by name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::templates::SelectError;

/// How a shared perspective is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SharingMode {
    /// No DNA, link data lives in content-addressed storage.
    Permissionless,
    /// Single social-context DNA.
    Holochain,
    /// Channel flavoured social-context DNA.
    HolochainChannel,
}

impl SharingMode {
    pub const ALL: [SharingMode; 3] = [
        SharingMode::Permissionless,
        SharingMode::Holochain,
        SharingMode::HolochainChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SharingMode::Permissionless => "permissionless",
            SharingMode::Holochain => "holochain",
            SharingMode::HolochainChannel => "holochainChannel",
        }
    }
}

impl fmt::Display for SharingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharingMode {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SharingMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| SelectError::UnsupportedMode(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPerspective {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sharing-mode tag, e.g. `"permissionless"`.
    #[serde(rename = "type")]
    pub sharing_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_expression_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_expression_languages: Vec<String>,
    /// Mode specific fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SharedPerspective {
    pub fn new(name: impl Into<String>, mode: SharingMode) -> Self {
        Self {
            name: name.into(),
            description: None,
            sharing_type: mode.as_str().to_string(),
            link_languages: vec![],
            allowed_expression_languages: vec![],
            required_expression_languages: vec![],
            extra: serde_json::Map::new(),
        }
    }

    /// Parse the sharing-mode tag.
    pub fn sharing_mode(&self) -> Result<SharingMode, SelectError> {
        self.sharing_type.parse()
    }
}
