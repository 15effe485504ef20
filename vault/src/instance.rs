//! EC2 instance profile login.
//!
//! The instance identity document is a PKCS#7 signature served by the
//! link-local metadata endpoint. Vault's AWS auth method verifies it and
//! returns a session token for the requested role.

use crate::{
    client::SecretStoreClient,
    error::{VaultError, VaultResult},
    secrets::SecretAuth,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Metadata endpoint serving the signed identity document.
pub const EC2_IDENTITY_PKCS7_URL: &str =
    "http://169.254.169.254/latest/dynamic/instance-identity/pkcs7";

/// Source of the signed instance identity document.
#[async_trait]
pub trait InstanceIdentityProvider: Send + Sync {
    /// Raw document bytes; may contain line breaks.
    async fn identity_document(&self) -> VaultResult<Vec<u8>>;
}

/// Fetches the identity document from the EC2 metadata service.
#[derive(Debug, Clone)]
pub struct Ec2IdentityProvider {
    http: Client,
    url: String,
}

impl Ec2IdentityProvider {
    /// Provider for the standard metadata endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> VaultResult<Self> {
        Self::with_url(EC2_IDENTITY_PKCS7_URL)
    }

    /// Provider for a non-standard endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_url(url: impl Into<String>) -> VaultResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(VaultError::Http)?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl InstanceIdentityProvider for Ec2IdentityProvider {
    async fn identity_document(&self) -> VaultResult<Vec<u8>> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| VaultError::IdentityDocument(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::IdentityDocument(format!("Status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| VaultError::IdentityDocument(format!("unable to read response body: {e}")))?;
        Ok(body.to_vec())
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "pkcs7")]
    signature: String,
    role: &'a str,
    nonce: &'a str,
}

/// Logs in to Vault with the instance's identity document.
#[derive(Debug, Clone)]
pub struct InstanceProfileLogin<C, P> {
    client: C,
    identity: P,
    mount: String,
}

impl<C: SecretStoreClient, P: InstanceIdentityProvider> InstanceProfileLogin<C, P> {
    /// Login against the `aws` auth mount.
    #[must_use]
    pub fn new(client: C, identity: P) -> Self {
        Self {
            client,
            identity,
            mount: "aws".to_string(),
        }
    }

    /// Use a different auth mount.
    #[must_use]
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    /// Login path for the configured mount.
    #[must_use]
    pub fn login_path(&self) -> String {
        format!("auth/{}/login", self.mount)
    }

    /// Authenticate as `role`.
    ///
    /// The nonce guards against the same document being replayed from
    /// another machine once the first login has bound it.
    ///
    /// # Errors
    ///
    /// Every failure is returned: fetching the document, the login call, or a
    /// response without an `auth` section.
    #[instrument(skip(self, nonce), fields(mount = %self.mount))]
    pub async fn login(&self, role: &str, nonce: &str) -> VaultResult<SecretAuth> {
        let document = self.identity.identity_document().await?;
        let signature = single_line(&document)?;

        let body = match serde_json::to_value(LoginRequest {
            signature,
            role,
            nonce,
        })? {
            serde_json::Value::Object(map) => map,
            _ => return Err(VaultError::data_shape("login request is not an object")),
        };

        let secret = self
            .client
            .write(&self.login_path(), body)
            .await?
            .ok_or_else(|| VaultError::auth_failed("login returned no response body"))?;

        let auth = secret
            .auth
            .ok_or_else(|| VaultError::data_shape("login response has no auth section"))?;

        info!(
            lease_duration = auth.lease_duration,
            policies = ?auth.policies,
            "Logged in with instance profile"
        );
        Ok(auth)
    }
}

/// Vault wants the signature as one line.
fn single_line(document: &[u8]) -> VaultResult<String> {
    let text = std::str::from_utf8(document)
        .map_err(|e| VaultError::IdentityDocument(format!("document is not UTF-8: {e}")))?;
    Ok(text.chars().filter(|c| *c != '\n' && *c != '\r').collect())
}
