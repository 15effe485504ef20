//! Token resolution: ordered strategies, each validated against Vault.
//!
//! A strategy answers with a candidate (`Ok(Some(_))`), with "nothing to
//! offer here" (`Ok(None)`), or with an error. Only the error stops the
//! chain; a candidate Vault rejects is dropped and the next strategy runs.

use crate::{
    client::SecretStoreClient,
    config::{DEFAULT_TOKEN_FILE, VaultConfig},
    error::{VaultError, VaultResult},
};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Map;
use std::path::PathBuf;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

/// Something that may be able to produce a token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Produce a candidate token, `None` when unavailable here.
    async fn retrieve_token(&self) -> VaultResult<Option<SecretString>>;
}

/// Decides whether a candidate token is usable.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `true` if the backend accepts `token`.
    async fn is_valid(&self, token: &SecretString) -> bool;
}

/// The authentication mechanisms the default chain knows about.
#[derive(Debug, Clone)]
pub enum AuthStrategy<C> {
    /// Token from an environment variable.
    EnvironmentToken {
        /// Variable name
        var: String,
    },
    /// Token written by `vault login`.
    LocalLoginFile {
        /// File override; `None` means `~/.vault-token`
        path: Option<PathBuf>,
    },
    /// Login through the TLS certificate auth method. The transport's client
    /// certificate is the credential, the request body is empty.
    CertificateLogin {
        /// Client used for the login call
        client: C,
        /// Auth mount, usually `cert`
        mount: String,
    },
}

impl<C> AuthStrategy<C> {
    /// Certificate login against `auth/cert/login`.
    #[must_use]
    pub fn certificate(client: C) -> Self {
        Self::CertificateLogin {
            client,
            mount: "cert".to_string(),
        }
    }
}

#[async_trait]
impl<C: SecretStoreClient> TokenSource for AuthStrategy<C> {
    fn name(&self) -> &str {
        match self {
            Self::EnvironmentToken { .. } => "environment",
            Self::LocalLoginFile { .. } => "login-file",
            Self::CertificateLogin { .. } => "cert-login",
        }
    }

    async fn retrieve_token(&self) -> VaultResult<Option<SecretString>> {
        match self {
            Self::EnvironmentToken { var } => Ok(env_token(var)),
            Self::LocalLoginFile { path } => login_file_token(path.as_ref()).await,
            Self::CertificateLogin { client, mount } => Ok(cert_login_token(client, mount).await),
        }
    }
}

fn env_token(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
}

async fn login_file_token(path: Option<&PathBuf>) -> VaultResult<Option<SecretString>> {
    let path = match path {
        Some(p) => p.clone(),
        None => dirs::home_dir()
            .ok_or_else(|| VaultError::InvalidConfig("unable to determine home directory".into()))?
            .join(DEFAULT_TOKEN_FILE),
    };

    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(c) => Zeroizing::new(c),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Login token file unavailable");
            return Ok(None);
        }
    };

    let token = contents.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(SecretString::from(token)))
}

async fn cert_login_token<C: SecretStoreClient>(client: &C, mount: &str) -> Option<SecretString> {
    let path = format!("auth/{mount}/login");
    match client.write(&path, Map::new()).await {
        Ok(Some(secret)) => secret.token_id().map(SecretString::from),
        Ok(None) => None,
        Err(e) => {
            debug!(path, error = %e, "Certificate login unavailable");
            None
        }
    }
}

/// Validates a token by looking it up on a client that carries it.
#[derive(Debug, Clone)]
pub struct LookupSelfValidator<C> {
    client: C,
}

impl<C> LookupSelfValidator<C> {
    /// Validate against `client`'s server.
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: SecretStoreClient> TokenValidator for LookupSelfValidator<C> {
    async fn is_valid(&self, token: &SecretString) -> bool {
        match self.client.with_token(token).lookup_self().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Token rejected by lookup-self");
                false
            }
        }
    }
}

/// Ordered token sources; the first valid candidate wins.
#[derive(Debug, Clone)]
pub struct TokenChain<S, V> {
    sources: Vec<S>,
    validator: V,
}

impl<S: TokenSource, V: TokenValidator> TokenChain<S, V> {
    /// Chain over `sources`, tried in order.
    #[must_use]
    pub const fn new(sources: Vec<S>, validator: V) -> Self {
        Self { sources, validator }
    }

    /// Sources in the order they are tried.
    #[must_use]
    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Resolve a token.
    ///
    /// # Errors
    ///
    /// [`VaultError::TokenSource`] if a source fails unexpectedly (later
    /// sources are not consulted), [`VaultError::NoTokenFound`] if no source
    /// yields a valid token.
    #[instrument(skip(self))]
    pub async fn retrieve_token(&self) -> VaultResult<SecretString> {
        for source in &self.sources {
            let candidate = match source.retrieve_token().await {
                Ok(Some(token)) => token,
                Ok(None) => {
                    debug!(source = source.name(), "No token available");
                    continue;
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Token source failed");
                    return Err(VaultError::token_source(source.name(), e));
                }
            };

            if self.validator.is_valid(&candidate).await {
                debug!(source = source.name(), "Resolved valid token");
                return Ok(candidate);
            }
            debug!(source = source.name(), "Discarding invalid token");
        }

        Err(VaultError::NoTokenFound)
    }
}

/// Environment variable, then login file, then certificate login, each
/// validated with lookup-self against `client`.
#[must_use]
pub fn default_chain<C>(client: &C, config: &VaultConfig) -> TokenChain<AuthStrategy<C>, LookupSelfValidator<C>>
where
    C: SecretStoreClient + Clone,
{
    TokenChain::new(
        vec![
            AuthStrategy::EnvironmentToken {
                var: config.token_env_var.clone(),
            },
            AuthStrategy::LocalLoginFile {
                path: config.token_file.clone(),
            },
            AuthStrategy::CertificateLogin {
                client: client.clone(),
                mount: config.cert_auth_mount.clone(),
            },
        ],
        LookupSelfValidator::new(client.clone()),
    )
}
