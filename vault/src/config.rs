//! Vault client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable carrying a pre-existing token.
pub const DEFAULT_TOKEN_ENV_VAR: &str = "VAULT_TOKEN";

/// File written by `vault login`, relative to the home directory.
pub const DEFAULT_TOKEN_FILE: &str = ".vault-token";

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Request timeout
    pub timeout: Duration,
    /// Environment variable consulted for a token
    pub token_env_var: String,
    /// Login file override; `None` means `~/.vault-token`
    pub token_file: Option<PathBuf>,
    /// Mount of the TLS certificate auth method
    pub cert_auth_mount: String,
    /// Mount of the AWS auth method used for instance profile login
    pub aws_auth_mount: String,
    /// PEM bundle of CAs trusted for the Vault server
    pub ca_cert: Option<PathBuf>,
    /// PEM client certificate presented to Vault
    pub client_cert: Option<PathBuf>,
    /// PEM private key for `client_cert`
    pub client_key: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: std::env::var("VAULT_ADDR")
                .unwrap_or_else(|_| "https://127.0.0.1:8200".to_string()),
            timeout: Duration::from_secs(60),
            token_env_var: DEFAULT_TOKEN_ENV_VAR.to_string(),
            token_file: None,
            cert_auth_mount: "cert".to_string(),
            aws_auth_mount: "aws".to_string(),
            ca_cert: env_path("VAULT_CACERT"),
            client_cert: env_path("VAULT_CLIENT_CERT"),
            client_key: env_path("VAULT_CLIENT_KEY"),
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl VaultConfig {
    /// Create a new configuration for the given server address.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the environment variable consulted for a token.
    #[must_use]
    pub fn with_token_env_var(mut self, var: impl Into<String>) -> Self {
        self.token_env_var = var.into();
        self
    }

    /// Read the login token from `path` instead of `~/.vault-token`.
    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Set the certificate auth mount.
    #[must_use]
    pub fn with_cert_auth_mount(mut self, mount: impl Into<String>) -> Self {
        self.cert_auth_mount = mount.into();
        self
    }

    /// Set the AWS auth mount.
    #[must_use]
    pub fn with_aws_auth_mount(mut self, mount: impl Into<String>) -> Self {
        self.aws_auth_mount = mount.into();
        self
    }

    /// Present a client certificate on every connection.
    #[must_use]
    pub fn with_client_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Trust the CA bundle at `path`.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }
}
