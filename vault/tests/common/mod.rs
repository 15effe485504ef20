//! In-memory Vault double for integration tests.
//!
//! Speaks both KV envelope shapes, keeps a mount table, accepts a fixed set
//! of tokens on lookup-self and answers other writes from canned responses.

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use vault_helper::{MountInfo, Secret, SecretStoreClient, VaultError, VaultResult};

#[derive(Default)]
struct State {
    mounts: HashMap<String, MountInfo>,
    kv: HashMap<String, (u64, Map<String, Value>)>,
    raw_reads: HashMap<String, Value>,
    failing_reads: HashSet<String>,
    valid_tokens: HashSet<String>,
    canned: HashMap<String, Result<Secret, String>>,
    writes: Vec<(String, Map<String, Value>)>,
    deletes: Vec<String>,
}

/// Shared-state fake; clones see the same backend.
#[derive(Clone, Default)]
pub struct FakeVault {
    state: Arc<Mutex<State>>,
    token: Option<String>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake with `secret/` as KV v2 and `kv1/` as KV v1.
    pub fn with_kv_mounts() -> Self {
        let vault = Self::new();
        vault.mount("secret", "kv", Some("2"));
        vault.mount("kv1", "kv", Some("1"));
        vault
    }

    pub fn mount(&self, path: &str, mount_type: &str, version: Option<&str>) {
        let options = version.map(|v| HashMap::from([("version".to_string(), v.to_string())]));
        self.state.lock().unwrap().mounts.insert(
            format!("{path}/"),
            MountInfo {
                mount_type: mount_type.to_string(),
                description: String::new(),
                options,
            },
        );
    }

    pub fn accept_token(&self, token: &str) {
        self.state.lock().unwrap().valid_tokens.insert(token.to_string());
    }

    /// Answer writes to `path` with `secret`.
    pub fn respond(&self, path: &str, secret: Secret) {
        self.state.lock().unwrap().canned.insert(path.to_string(), Ok(secret));
    }

    /// Fail writes to `path`.
    pub fn fail(&self, path: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .canned
            .insert(path.to_string(), Err(message.to_string()));
    }

    /// Answer reads of `path` with `data` verbatim, bypassing KV handling.
    pub fn raw_read(&self, path: &str, data: Value) {
        self.state.lock().unwrap().raw_reads.insert(path.to_string(), data);
    }

    /// Make reads of `path` fail at the transport.
    pub fn fail_read(&self, path: &str) {
        self.state.lock().unwrap().failing_reads.insert(path.to_string());
    }

    pub fn writes_to(&self, path: &str) -> Vec<Map<String, Value>> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn kv_version(state: &State, path: &str) -> Option<(String, u32)> {
        state.mounts.iter().find_map(|(mount, info)| {
            let version = info.option("version")?.parse().ok()?;
            path.starts_with(mount.as_str()).then(|| (mount.clone(), version))
        })
    }
}

fn v2_metadata(version: u64) -> Value {
    json!({
        "created_time": "2018-03-22T02:24:06.945319214Z",
        "deletion_time": "",
        "destroyed": false,
        "version": version
    })
}

#[async_trait]
impl SecretStoreClient for FakeVault {
    async fn read(&self, path: &str) -> VaultResult<Option<Secret>> {
        let state = self.state.lock().unwrap();

        if state.failing_reads.contains(path) {
            return Err(VaultError::unavailable("connection reset"));
        }
        if let Some(Value::Object(raw)) = state.raw_reads.get(path) {
            return Ok(Some(Secret::with_data(raw.clone())));
        }

        let Some((version, stored)) = state.kv.get(path) else {
            return Ok(None);
        };

        let data = match Self::kv_version(&state, path) {
            Some((_, 1)) => stored.clone(),
            _ => json!({"data": stored, "metadata": v2_metadata(*version)})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };
        Ok(Some(Secret::with_data(data)))
    }

    async fn write(&self, path: &str, body: Map<String, Value>) -> VaultResult<Option<Secret>> {
        let mut state = self.state.lock().unwrap();
        state.writes.push((path.to_string(), body.clone()));

        if let Some(canned) = state.canned.get(path) {
            return canned.clone().map(Some).map_err(VaultError::unavailable);
        }

        match Self::kv_version(&state, path) {
            Some((_, 1)) => {
                state.kv.insert(path.to_string(), (0, body));
                Ok(None)
            }
            Some((_, _)) => {
                let current = state.kv.get(path).map_or(0, |(v, _)| *v);
                if let Some(cas) = body.get("options").and_then(|o| o.get("cas")).and_then(Value::as_u64) {
                    if cas != current {
                        return Err(VaultError::bad_request(
                            "Status 400 Bad Request: check-and-set parameter did not match the current version",
                        ));
                    }
                }
                let Some(Value::Object(data)) = body.get("data").cloned() else {
                    return Err(VaultError::bad_request("Status 400 Bad Request: no data provided"));
                };
                state.kv.insert(path.to_string(), (current + 1, data));
                Ok(Some(Secret::with_data(
                    v2_metadata(current + 1).as_object().cloned().unwrap_or_default(),
                )))
            }
            None => Err(VaultError::not_found(path)),
        }
    }

    async fn delete(&self, path: &str) -> VaultResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(path.to_string());
        state.kv.remove(path);
        Ok(())
    }

    async fn list_mounts(&self) -> VaultResult<HashMap<String, MountInfo>> {
        Ok(self.state.lock().unwrap().mounts.clone())
    }

    async fn lookup_self(&self) -> VaultResult<Secret> {
        let state = self.state.lock().unwrap();
        match &self.token {
            Some(token) if state.valid_tokens.contains(token) => {
                let mut data = Map::new();
                data.insert("id".to_string(), Value::String(token.clone()));
                Ok(Secret::with_data(data))
            }
            _ => Err(VaultError::PermissionDenied("auth/token/lookup-self".to_string())),
        }
    }

    fn with_token(&self, token: &SecretString) -> Self {
        Self {
            state: Arc::clone(&self.state),
            token: Some(token.expose_secret().to_string()),
        }
    }
}

/// Login response as Vault's auth methods return it.
pub fn login_response(client_token: &str) -> Secret {
    serde_json::from_value(json!({
        "auth": {
            "renewable": true,
            "lease_duration": 1_800_000,
            "metadata": {"role": "dev-role", "auth_type": "ec2"},
            "policies": ["default", "dev"],
            "accessor": "20b89871-e6f2-1160-fb29-31c2f6d4645e",
            "client_token": client_token
        }
    }))
    .unwrap()
}

/// STS response from the AWS secrets engine.
pub fn sts_response(access_key: &str, lease_duration: u64) -> Secret {
    serde_json::from_value(json!({
        "lease_id": "aws/sts/deploy/abc",
        "lease_duration": lease_duration,
        "renewable": false,
        "data": {
            "access_key": access_key,
            "secret_key": "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            "security_token": "FwoGZXIvYXdzEBYaDH"
        }
    }))
    .unwrap()
}
