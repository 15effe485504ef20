//! AWS STS credentials issued by Vault's AWS secrets engine, cached until
//! their lease runs out.

use crate::{
    client::SecretStoreClient,
    error::{VaultError, VaultResult},
    secrets::Secret,
};
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde_json::Map;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Mount used when none is configured.
pub const DEFAULT_AWS_BACKEND: &str = "aws";

/// Temporary AWS access keys.
#[derive(Clone)]
pub struct StsCredentials {
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: SecretString,
    /// STS session token
    pub session_token: SecretString,
    /// Provider label, `vault-sts-{role}`
    pub provider_name: String,
    /// Instant the lease runs out
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("provider_name", &self.provider_name)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl StsCredentials {
    /// Expired once the lease has elapsed.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn from_secret(secret: &Secret, provider_name: String, issued_at: DateTime<Utc>) -> VaultResult<Self> {
        let field = |name: &str| {
            secret
                .data_str(name)
                .ok_or_else(|| VaultError::data_shape(format!("sts response has no string field {name}")))
        };

        let expires_at = i64::try_from(secret.lease_duration)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lease| issued_at.checked_add_signed(lease))
            .ok_or_else(|| VaultError::data_shape("sts lease duration out of range"))?;

        Ok(Self {
            access_key_id: field("access_key")?.to_string(),
            secret_access_key: SecretString::from(field("secret_key")?),
            session_token: SecretString::from(field("security_token")?),
            provider_name,
            expires_at,
        })
    }
}

/// Caches one set of STS credentials for a Vault AWS role.
///
/// Refreshes are serialised: concurrent callers that find the cache stale
/// wait for a single backend request instead of each issuing one.
#[derive(Debug)]
pub struct StsCredentialCache<C> {
    client: C,
    backend: String,
    role: String,
    cached: Mutex<Option<StsCredentials>>,
}

impl<C: SecretStoreClient> StsCredentialCache<C> {
    /// Cache for `role` on the default `aws` mount.
    #[must_use]
    pub fn new(client: C, role: impl Into<String>) -> Self {
        Self {
            client,
            backend: DEFAULT_AWS_BACKEND.to_string(),
            role: role.into(),
            cached: Mutex::new(None),
        }
    }

    /// Use the AWS secrets engine mounted at `backend`. Empty means `aws`.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        let backend = backend.into();
        self.backend = if backend.is_empty() {
            DEFAULT_AWS_BACKEND.to_string()
        } else {
            backend
        };
        self
    }

    /// Path credentials are requested from.
    #[must_use]
    pub fn sts_endpoint(&self) -> String {
        format!("{}/sts/{}", self.backend, self.role)
    }

    /// `true` when nothing is cached or the cached lease has elapsed.
    pub async fn is_expired(&self) -> bool {
        self.cached
            .lock()
            .await
            .as_ref()
            .is_none_or(|c| c.is_expired_at(Utc::now()))
    }

    /// Expiry of the cached credentials, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.lock().await.as_ref().map(|c| c.expires_at)
    }

    /// Cached credentials while valid, otherwise freshly issued ones.
    ///
    /// # Errors
    ///
    /// Returns the backend error if issuing fails; the previous cache entry is
    /// kept so the next call retries.
    #[instrument(skip(self), fields(role = %self.role, backend = %self.backend))]
    pub async fn retrieve(&self) -> VaultResult<StsCredentials> {
        let mut cached = self.cached.lock().await;

        let now = Utc::now();
        if let Some(creds) = cached.as_ref().filter(|c| !c.is_expired_at(now)) {
            debug!(expires_at = %creds.expires_at, "Using cached STS credentials");
            return Ok(creds.clone());
        }

        let secret = self
            .client
            .write(&self.sts_endpoint(), Map::new())
            .await
            .inspect_err(|e| warn!(error = %e, "Unable to get STS credentials using vault role"))?
            .ok_or_else(|| VaultError::data_shape("sts request returned no response body"))?;

        let creds = StsCredentials::from_secret(&secret, format!("vault-sts-{}", self.role), Utc::now())?;
        info!(expires_at = %creds.expires_at, "Issued STS credentials");

        *cached = Some(creds.clone());
        Ok(creds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sts_secret(lease_duration: u64) -> Secret {
        serde_json::from_value(json!({
            "lease_duration": lease_duration,
            "data": {
                "access_key": "ASIAEXAMPLE",
                "secret_key": "wJalrXUtnFEMI",
                "security_token": "FwoGZXIvYXdzE"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_credentials_from_secret() {
        let issued = Utc::now();
        let creds = StsCredentials::from_secret(&sts_secret(900), "vault-sts-r".into(), issued).unwrap();
        assert_eq!(creds.access_key_id, "ASIAEXAMPLE");
        assert_eq!(creds.expires_at, issued + TimeDelta::seconds(900));
    }

    #[test]
    fn test_missing_field_is_data_shape() {
        let secret = Secret::with_data(serde_json::Map::new());
        assert!(matches!(
            StsCredentials::from_secret(&secret, "p".into(), Utc::now()),
            Err(VaultError::DataShape(_))
        ));
    }

    #[test]
    fn test_lease_past_max_date_is_data_shape() {
        for lease in [10_000_000_000_000, u64::MAX] {
            assert!(matches!(
                StsCredentials::from_secret(&sts_secret(lease), "p".into(), Utc::now()),
                Err(VaultError::DataShape(_))
            ));
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let issued = Utc::now();
        let creds = StsCredentials::from_secret(&sts_secret(60), "p".into(), issued).unwrap();
        assert!(!creds.is_expired_at(issued));
        assert!(!creds.is_expired_at(issued + TimeDelta::seconds(59)));
        assert!(creds.is_expired_at(issued + TimeDelta::seconds(60)));
        assert!(creds.is_expired_at(issued + TimeDelta::seconds(61)));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let creds = StsCredentials::from_secret(&sts_secret(60), "p".into(), Utc::now()).unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("wJalrXUtnFEMI"));
        assert!(!debug.contains("FwoGZXIvYXdzE"));
        assert!(debug.contains("ASIAEXAMPLE"));
    }
}
