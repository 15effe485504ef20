//! KV secrets engine access for version 1 and version 2 mounts.
//!
//! The two versions disagree on paths and payloads:
//!
//! | | v1 | v2 |
//! |---|---|---|
//! | data path | `{mount}/{key}` | `{mount}/data/{key}` |
//! | write body | the data | `{"data": ..., "options": {"cas": n}}` |
//! | read body | the data | `{"data": ..., "metadata": ...}` |
//!
//! A [`KvStore`] is bound to one version for its whole life. Nothing checks
//! that it matches the mount; use [`KvStore::discover`] or
//! [`get_mount_version`] to find out.

use crate::{
    client::SecretStoreClient,
    error::{VaultError, VaultResult},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// KV engine version of a mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KvVersion {
    /// Unversioned engine
    V1,
    /// Versioned engine
    #[default]
    V2,
}

impl KvVersion {
    /// Map a mount's numeric version. Anything other than 1 is treated as 2.
    #[must_use]
    pub const fn from_number(version: u32) -> Self {
        match version {
            1 => Self::V1,
            _ => Self::V2,
        }
    }
}

/// Options for create/update on a v2 mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Version the secret must currently be at; 0 means "must not exist".
    #[serde(rename = "cas")]
    pub cas_version: u64,
}

/// Data and metadata of the latest version of a secret.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretRecord {
    /// Secret key/value pairs
    pub data: Map<String, Value>,
    /// Always empty on v1 mounts.
    pub metadata: Map<String, Value>,
}

/// Determine the KV version of the engine mounted at `mount_path`.
///
/// Needs read access to `sys/mounts`.
///
/// # Errors
///
/// [`VaultError::MountNotFound`] when the mount does not exist,
/// [`VaultError::MountVersionUnspecified`] when it has no `version` option,
/// [`VaultError::InvalidMountVersion`] when the option is not a number.
#[instrument(skip(client))]
pub async fn get_mount_version<C: SecretStoreClient>(client: &C, mount_path: &str) -> VaultResult<u32> {
    let mounts = client.list_mounts().await?;

    let mount = mounts
        .get(&format!("{mount_path}/"))
        .ok_or_else(|| VaultError::MountNotFound(mount_path.to_string()))?;

    let raw = mount
        .option("version")
        .ok_or_else(|| VaultError::MountVersionUnspecified(mount_path.to_string()))?;

    raw.parse().map_err(|_| VaultError::InvalidMountVersion {
        mount: mount_path.to_string(),
        value: raw.to_string(),
    })
}

/// Key/value access to one KV mount.
#[derive(Debug, Clone)]
pub struct KvStore<C> {
    client: C,
    mount: String,
    version: KvVersion,
}

impl<C: SecretStoreClient> KvStore<C> {
    /// Store for the engine mounted at `mount`, assumed to be `version`.
    #[must_use]
    pub fn new(client: C, mount: impl Into<String>, version: KvVersion) -> Self {
        Self {
            client,
            mount: mount.into(),
            version,
        }
    }

    /// Store whose version is read from the mount table.
    ///
    /// # Errors
    ///
    /// Fails as [`get_mount_version`] does.
    pub async fn discover(client: C, mount: impl Into<String>) -> VaultResult<Self> {
        let mount = mount.into();
        let version = KvVersion::from_number(get_mount_version(&client, &mount).await?);
        debug!(mount, ?version, "Discovered KV version");
        Ok(Self::new(client, mount, version))
    }

    /// Mount path.
    #[must_use]
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Engine version this store speaks.
    #[must_use]
    pub const fn version(&self) -> KvVersion {
        self.version
    }

    /// Physical path of `key`.
    #[must_use]
    pub fn data_path(&self, key: &str) -> String {
        match self.version {
            KvVersion::V1 => format!("{}/{key}", self.mount),
            KvVersion::V2 => format!("{}/data/{key}", self.mount),
        }
    }

    /// Read the latest version of `key`.
    ///
    /// # Errors
    ///
    /// [`VaultError::SecretNotFound`] when the secret is absent or the read
    /// fails, [`VaultError::DataShape`] when a v2 payload lacks its nested
    /// `data` or `metadata` objects.
    #[instrument(skip(self), fields(mount = %self.mount))]
    pub async fn read_latest(&self, key: &str) -> VaultResult<SecretRecord> {
        let path = self.data_path(key);

        let secret = match self.client.read(&path).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(VaultError::not_found(path)),
            Err(e) => {
                debug!(path, error = %e, "Reading latest version failed");
                return Err(VaultError::not_found(path));
            }
        };

        let mut payload = secret.data.unwrap_or_default();

        match self.version {
            KvVersion::V1 => Ok(SecretRecord {
                data: payload,
                metadata: Map::new(),
            }),
            KvVersion::V2 => {
                let data = take_object(&mut payload, "data")?;
                let metadata = take_object(&mut payload, "metadata")?;
                Ok(SecretRecord { data, metadata })
            }
        }
    }

    /// Write a new version of `key`.
    ///
    /// `options` only apply to v2 mounts, where Vault rejects the write if the
    /// secret's current version differs from `cas_version`.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self, data), fields(mount = %self.mount))]
    pub async fn write(
        &self,
        key: &str,
        data: Map<String, Value>,
        options: Option<WriteOptions>,
    ) -> VaultResult<()> {
        let body = match self.version {
            KvVersion::V1 => data,
            KvVersion::V2 => {
                let mut wrapped = Map::new();
                wrapped.insert("data".to_string(), Value::Object(data));
                if let Some(opts) = options {
                    wrapped.insert("options".to_string(), serde_json::to_value(opts)?);
                }
                wrapped
            }
        };

        self.client.write(&self.data_path(key), body).await?;
        Ok(())
    }

    /// Delete the latest version of `key`. On v1 mounts this removes the
    /// secret outright.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self), fields(mount = %self.mount))]
    pub async fn delete_latest(&self, key: &str) -> VaultResult<()> {
        self.client.delete(&self.data_path(key)).await
    }
}

fn take_object(payload: &mut Map<String, Value>, field: &str) -> VaultResult<Map<String, Value>> {
    match payload.remove(field) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(VaultError::data_shape(format!(
            "error extracting {field} from latest version of secret"
        ))),
    }
}
