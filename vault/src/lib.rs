//! HashiCorp Vault helpers for unattended services.
//!
//! - token resolution from the environment, `~/.vault-token` or TLS
//!   certificate login, validated against the server
//! - EC2 instance profile login
//! - cached AWS STS credentials from the AWS secrets engine
//! - KV access that hides the v1/v2 payload differences

pub mod client;
pub mod config;
pub mod error;
pub mod instance;
pub mod kv;
pub mod secrets;
pub mod sts;
pub mod token;

pub use client::{HttpVaultClient, SecretStoreClient, connect};
pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use instance::{Ec2IdentityProvider, InstanceIdentityProvider, InstanceProfileLogin};
pub use kv::{KvStore, KvVersion, SecretRecord, WriteOptions, get_mount_version};
pub use secrets::{MountInfo, Secret, SecretAuth};
pub use sts::{StsCredentialCache, StsCredentials};
pub use token::{AuthStrategy, LookupSelfValidator, TokenChain, TokenSource, TokenValidator, default_chain};
