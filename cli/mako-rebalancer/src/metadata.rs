// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2020 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Metadata store seam
//!
//! The pipeline only needs point reads and conditional writes, so it talks
//! to a [`MetadataStore`] rather than to Moray directly. [`MorayClient`] is
//! the production implementation.

use async_trait::async_trait;
use moray::{MethodOptions, MorayClient, MorayError};
use serde_json::Value;
use thiserror::Error;

use crate::config::MorayConfig;
use crate::types::MetadataRecord;

/// Error type for metadata operations
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata record not found: {key}")]
    NotFound { key: String },

    #[error("etag conflict on {key}: {message}")]
    EtagConflict { key: String, message: String },

    #[error("moray error: {0}")]
    Moray(#[source] MorayError),

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

impl From<MorayError> for MetadataError {
    fn from(err: MorayError) -> Self {
        match err {
            MorayError::NotFound { key, .. } => MetadataError::NotFound { key },
            MorayError::EtagConflict { key, message, .. } => {
                MetadataError::EtagConflict { key, message }
            }
            other => MetadataError::Moray(other),
        }
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the current record for `key`.
    async fn get(&self, bucket: &str, key: &str) -> Result<MetadataRecord, MetadataError>;

    /// Write `value` only if the stored record still has `etag`. Returns the
    /// new etag.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        etag: &str,
    ) -> Result<String, MetadataError>;

    async fn close(&self);
}

#[async_trait]
impl MetadataStore for MorayClient {
    async fn get(&self, bucket: &str, key: &str) -> Result<MetadataRecord, MetadataError> {
        let obj = self
            .get_object(bucket, key, &MethodOptions::default())
            .await?;
        Ok(obj.into())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        etag: &str,
    ) -> Result<String, MetadataError> {
        let etag = self
            .put_object(bucket, key, value, &MethodOptions::with_etag(etag))
            .await?;
        Ok(etag)
    }

    async fn close(&self) {
        MorayClient::close(self).await;
    }
}

/// Open the Moray connection described by `config`.
pub async fn connect_moray(config: &MorayConfig) -> Result<MorayClient, MetadataError> {
    let client = MorayClient::connect(&config.host, config.port, config.timeout()).await?;
    Ok(client)
}
