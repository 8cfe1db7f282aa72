// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the rebalancer front ends
//!
//! Loaded from the JSON document at `REBALANCE_CONFIG`. The same file is
//! shared with other mako tooling, so unknown fields are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/opt/smartdc/mako/etc/mako_rebalancer_config.json";

#[derive(Clone, Debug, Deserialize)]
pub struct RebalancerConfig {
    /// Storage id of this node; selects the instruction queue.
    pub manta_storage_id: String,

    pub moray: MorayConfig,

    #[serde(default)]
    pub manta: MantaConfig,

    /// Where instruction files are discovered.
    #[serde(default)]
    pub instructions: InstructionSource,

    /// Root of the local object store (`<root>/<account>/<objectId>`).
    #[serde(default = "default_manta_root")]
    pub manta_root: PathBuf,

    /// Base URL of the local storage service used for tombstone MOVEs.
    #[serde(default = "default_local_storage_url")]
    pub local_storage_url: String,

    /// Compare the local file's MD5 with the instruction before sending it.
    #[serde(default)]
    pub verify_checksum: bool,

    /// Keep an instruction file when any of its batches failed.
    #[serde(default)]
    pub retain_failed_files: bool,

    /// Per-request bound for storage-node and namespace HTTP requests.
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorayConfig {
    pub host: String,
    pub port: u16,
    /// Milliseconds.
    pub connect_timeout: u64,
}

impl MorayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MantaConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_manta_user")]
    pub user: String,
    /// Request signing key. Without it requests go out unsigned.
    #[serde(default)]
    pub sign: Option<SignConfig>,
}

impl Default for MantaConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: default_manta_user(),
            sign: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignConfig {
    /// RSA private key, PKCS#1 or PKCS#8 PEM.
    pub key: PathBuf,
    /// Expected MD5 fingerprint of `key`.
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InstructionSource {
    /// The Manta directory service at `manta.url`.
    #[default]
    Manta,
    /// A local directory standing in for the namespace root.
    Local { root: PathBuf },
}

fn default_manta_root() -> PathBuf {
    PathBuf::from("/manta")
}

fn default_local_storage_url() -> String {
    "http://localhost".to_string()
}

fn default_manta_user() -> String {
    "poseidon".to_string()
}

impl RebalancerConfig {
    /// Load and validate configuration from a JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.manta_storage_id.is_empty() {
            bail!("manta_storage_id must not be empty");
        }
        if self.moray.host.is_empty() {
            bail!("moray.host must not be empty");
        }
        if self.manta.user.is_empty() {
            bail!("manta.user must not be empty");
        }
        if self.instructions == InstructionSource::Manta && self.manta.url.is_none() {
            bail!("manta.url is required when instructions come from manta");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = RebalancerConfig::from_json(
            r#"{
                "manta_storage_id": "1.stor.example.com",
                "moray": {"host": "1.moray.example.com", "port": 2020, "connectTimeout": 2000},
                "manta": {"url": "https://manta.example.com"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.manta.user, "poseidon");
        assert_eq!(config.instructions, InstructionSource::Manta);
        assert_eq!(config.manta_root, PathBuf::from("/manta"));
        assert_eq!(config.local_storage_url, "http://localhost");
        assert_eq!(config.moray.timeout(), Duration::from_secs(2));
        assert!(config.http_timeout().is_none());
        assert!(!config.verify_checksum);
        assert!(!config.retain_failed_files);
    }

    #[test]
    fn test_local_instruction_source() {
        let config = RebalancerConfig::from_json(
            r#"{
                "manta_storage_id": "1.stor",
                "moray": {"host": "m", "port": 2020, "connectTimeout": 100},
                "instructions": {"type": "local", "root": "/var/tmp/instructions"},
                "http_timeout_secs": 30,
                "sign": {"keyId": "ignored"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.instructions,
            InstructionSource::Local {
                root: PathBuf::from("/var/tmp/instructions")
            }
        );
        assert_eq!(config.http_timeout(), Some(Duration::from_secs(30)));
        assert!(config.manta.sign.is_none());
    }

    #[test]
    fn test_manta_signing_key() {
        let config = RebalancerConfig::from_json(
            r#"{
                "manta_storage_id": "1.stor",
                "moray": {"host": "m", "port": 2020, "connectTimeout": 100},
                "manta": {
                    "url": "https://manta.example.com",
                    "user": "poseidon",
                    "sign": {"key": "/root/.ssh/sdc.id_rsa", "keyId": "a9:c4:31"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.manta.sign,
            Some(SignConfig {
                key: PathBuf::from("/root/.ssh/sdc.id_rsa"),
                key_id: Some("a9:c4:31".to_string()),
            })
        );
    }

    #[test]
    fn test_manta_source_requires_url() {
        let err = RebalancerConfig::from_json(
            r#"{
                "manta_storage_id": "1.stor",
                "moray": {"host": "m", "port": 2020, "connectTimeout": 100}
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("manta.url"));
    }

    #[test]
    fn test_missing_moray_fields_rejected() {
        assert!(
            RebalancerConfig::from_json(
                r#"{"manta_storage_id": "1.stor", "moray": {"host": "m", "port": 2020}}"#
            )
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_from_file_reports_path() {
        let err = RebalancerConfig::from_file(Path::new("/nonexistent/rebalance.json"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/rebalance.json"));
    }
}
