//! Vault HTTP client and the backend capability the rest of the crate uses.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    secrets::{MountInfo, Secret},
    token::default_chain,
};
use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, Method};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Operations a Vault backend offers to this crate.
///
/// Implementations must be cheap to clone-with-token: validation derives a
/// fresh client per candidate token rather than mutating a shared one.
#[async_trait]
pub trait SecretStoreClient: Send + Sync {
    /// Read a path. `Ok(None)` means Vault has nothing there.
    async fn read(&self, path: &str) -> VaultResult<Option<Secret>>;

    /// Write `body` to a path. Endpoints answering 204 yield `Ok(None)`.
    async fn write(&self, path: &str, body: Map<String, Value>) -> VaultResult<Option<Secret>>;

    /// Delete a path.
    async fn delete(&self, path: &str) -> VaultResult<()>;

    /// Mount table keyed by mount path with a trailing slash.
    async fn list_mounts(&self) -> VaultResult<HashMap<String, MountInfo>>;

    /// Look up the token this client carries.
    async fn lookup_self(&self) -> VaultResult<Secret>;

    /// Independent client carrying `token`.
    #[must_use]
    fn with_token(&self, token: &SecretString) -> Self
    where
        Self: Sized;
}

/// Vault client over HTTP.
#[derive(Clone)]
pub struct HttpVaultClient {
    addr: String,
    http: Client,
    token: Option<SecretString>,
}

impl std::fmt::Debug for HttpVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVaultClient")
            .field("addr", &self.addr)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpVaultClient {
    /// Create a client without a token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if a configured CA bundle or
    /// client identity cannot be loaded.
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let mut builder = Client::builder().timeout(config.timeout).use_rustls_tls();

        if let Some(ca) = &config.ca_cert {
            let pem = read_pem(ca)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| VaultError::InvalidConfig(format!("CA bundle {}: {e}", ca.display())))?;
            builder = builder.add_root_certificate(cert);
        }

        match (&config.client_cert, &config.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert)?;
                pem.push(b'\n');
                pem.extend(read_pem(key)?);
                let identity = Identity::from_pem(&pem)
                    .map_err(|e| VaultError::InvalidConfig(format!("client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(VaultError::InvalidConfig(
                    "client certificate and key must be configured together".to_string(),
                ));
            }
        }

        let http = builder.build().map_err(VaultError::Http)?;

        Ok(Self {
            addr: config.addr.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    /// Server address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> VaultResult<Option<Value>> {
        let url = format!("{}/v1/{}", self.addr, path.trim_start_matches('/'));
        let is_read = method == Method::GET;
        let mut request = self.http.request(method, &url);

        if let Some(token) = &self.token {
            request = request.header("X-Vault-Token", token.expose_secret());
        }
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        let status = response.status();
        // Only a read may treat 404 as "nothing there"; on writes and deletes it
        // means the route is not mounted.
        match status.as_u16() {
            204 => return Ok(None),
            404 if is_read => return Ok(None),
            403 => return Err(VaultError::PermissionDenied(path.to_string())),
            429 => return Err(VaultError::RateLimited),
            _ if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                let msg = format!("Status {status}: {text}");
                return Err(match status.as_u16() {
                    400 => VaultError::bad_request(msg),
                    401 => VaultError::auth_failed(msg),
                    404 => VaultError::not_found(path),
                    _ => VaultError::unavailable(msg),
                });
            }
            _ => {}
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn secret(
        &self,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> VaultResult<Option<Secret>> {
        match self.request(method, path, body).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

fn read_pem(path: &Path) -> VaultResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| VaultError::InvalidConfig(format!("unable to read {}: {e}", path.display())))
}

#[async_trait]
impl SecretStoreClient for HttpVaultClient {
    #[instrument(skip(self))]
    async fn read(&self, path: &str) -> VaultResult<Option<Secret>> {
        debug!(path, "Reading secret");
        self.secret(Method::GET, path, None).await
    }

    #[instrument(skip(self, body))]
    async fn write(&self, path: &str, body: Map<String, Value>) -> VaultResult<Option<Secret>> {
        debug!(path, "Writing secret");
        self.secret(Method::PUT, path, Some(&body)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> VaultResult<()> {
        debug!(path, "Deleting secret");
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn list_mounts(&self) -> VaultResult<HashMap<String, MountInfo>> {
        let value = self
            .request(Method::GET, "sys/mounts", None)
            .await?
            .ok_or_else(|| VaultError::not_found("sys/mounts"))?;
        parse_mount_table(value)
    }

    async fn lookup_self(&self) -> VaultResult<Secret> {
        self.secret(Method::GET, "auth/token/lookup-self", None)
            .await?
            .ok_or_else(|| VaultError::auth_failed("token lookup returned no data"))
    }

    fn with_token(&self, token: &SecretString) -> Self {
        Self {
            addr: self.addr.clone(),
            http: self.http.clone(),
            token: Some(token.clone()),
        }
    }
}

/// Newer servers nest the table under `data` and repeat it at the top level
/// next to envelope fields; older ones only have the top level.
fn parse_mount_table(value: Value) -> VaultResult<HashMap<String, MountInfo>> {
    let table = match value {
        Value::Object(mut top) => match top.remove("data") {
            Some(Value::Object(data)) => data,
            _ => top,
        },
        _ => return Err(VaultError::data_shape("mount table is not an object")),
    };

    Ok(table
        .into_iter()
        .filter(|(_, v)| v.get("type").is_some())
        .filter_map(|(path, v)| serde_json::from_value(v).ok().map(|info| (path, info)))
        .collect())
}

/// Build an HTTP client and attach the first valid token the default chain
/// resolves.
///
/// # Errors
///
/// Returns [`VaultError::NoTokenFound`] when no strategy yields a valid token,
/// or the error of a strategy that failed unexpectedly.
#[instrument(skip(config), fields(addr = %config.addr))]
pub async fn connect(config: &VaultConfig) -> VaultResult<HttpVaultClient> {
    let client = HttpVaultClient::new(config)?;
    let token = default_chain(&client, config).retrieve_token().await?;
    info!("Authenticated with Vault");
    Ok(client.with_token(&token))
}
