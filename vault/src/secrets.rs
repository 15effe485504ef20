//! Secret types and structures as they appear on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Generic Vault response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    /// Server-assigned request ID
    #[serde(default)]
    pub request_id: String,
    /// Lease ID, empty for unleased responses
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease can be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Response payload
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Auth section of login responses
    #[serde(default)]
    pub auth: Option<SecretAuth>,
    /// Server warnings
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl Secret {
    /// Wrap a data mapping in an otherwise empty envelope.
    #[must_use]
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Token carried by this response.
    ///
    /// Login responses carry it in `auth.client_token`; token lookups carry
    /// it in `data.id`.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        if let Some(auth) = &self.auth {
            if !auth.client_token.is_empty() {
                return Some(&auth.client_token);
            }
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// String field from `data`.
    #[must_use]
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }
}

/// Vault auth section.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretAuth {
    /// Issued token
    pub client_token: String,
    /// Token accessor
    #[serde(default)]
    pub accessor: String,
    /// Policies attached to the token
    #[serde(default)]
    pub policies: Vec<String>,
    /// Policies from the token itself, excluding identity policies
    #[serde(default)]
    pub token_policies: Vec<String>,
    /// Auth method metadata
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// Token TTL in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token can be renewed
    #[serde(default)]
    pub renewable: bool,
}

impl std::fmt::Debug for SecretAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretAuth")
            .field("client_token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

/// One entry of the `sys/mounts` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Engine type, e.g. `kv`
    #[serde(rename = "type", default)]
    pub mount_type: String,
    /// Mount description
    #[serde(default)]
    pub description: String,
    /// Engine options; KV mounts carry `version` here
    #[serde(default)]
    pub options: Option<HashMap<String, String>>,
}

impl MountInfo {
    /// Value of a mount option.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.as_ref()?.get(name).map(String::as_str)
    }
}
