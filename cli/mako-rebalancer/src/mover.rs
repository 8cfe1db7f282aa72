// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2020 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Object transfer
//!
//! Copies the local replica of an object to its destination shark. The
//! destination is checked with HEAD first so a repeated run does not resend
//! bytes that already arrived.

use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use reqwest::{Body, Client, header};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::types::{Batch, Shark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// The destination already had the object.
    AlreadyPresent,
    Transferred { bytes: u64 },
}

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("failed to read {path}: {source}")]
    LocalRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch for {path}: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        computed: String,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },
}

pub struct DataMover {
    client: Client,
    manta_root: PathBuf,
    verify_checksum: bool,
}

impl DataMover {
    pub fn new(client: Client, manta_root: impl Into<PathBuf>, verify_checksum: bool) -> Self {
        Self {
            client,
            manta_root: manta_root.into(),
            verify_checksum,
        }
    }

    /// Local replica path: `<manta_root>/<account>/<objectId>`.
    pub fn local_path(&self, account: &str, object_id: &str) -> PathBuf {
        self.manta_root.join(account).join(object_id)
    }

    pub fn destination_url(shark: &Shark, account: &str, object_id: &str) -> String {
        format!("http://{}/{}/{}", shark.manta_storage_id, account, object_id)
    }

    /// Send the batch's object to its new shark unless it is already there.
    pub async fn move_object(&self, batch: &Batch, account: &str) -> Result<Transfer, MoveError> {
        let first = batch.first();
        let object_id = batch.object_id();
        let url = Self::destination_url(&first.new_shark, account, object_id);
        let local = self.local_path(account, object_id);

        let head = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|source| MoveError::Http {
                url: url.clone(),
                source,
            })?;
        if head.status().is_success() {
            tracing::info!(object_id = %object_id, url = %url, "Object already exists on destination");
            return Ok(Transfer::AlreadyPresent);
        }
        tracing::debug!(object_id = %object_id, url = %url, status = %head.status(), "Starting transfer");

        if self.verify_checksum {
            self.verify(&local, first.md5.as_deref()).await?;
        }

        let file = File::open(&local).await.map_err(|source| MoveError::LocalRead {
            path: local.display().to_string(),
            source,
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| MoveError::LocalRead {
                path: local.display().to_string(),
                source,
            })?
            .len();

        let response = self
            .client
            .put(&url)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|source| MoveError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MoveError::Status {
                method: "PUT",
                url,
                status: status.as_u16(),
            });
        }

        tracing::info!(object_id = %object_id, url = %url, bytes = size, "Finished transfer");
        Ok(Transfer::Transferred { bytes: size })
    }

    async fn verify(&self, local: &Path, expected: Option<&str>) -> Result<(), MoveError> {
        let Some(expected) = expected else {
            tracing::warn!(path = %local.display(), "Instruction carries no md5, skipping checksum");
            return Ok(());
        };

        let computed = file_md5(local).await.map_err(|source| MoveError::LocalRead {
            path: local.display().to_string(),
            source,
        })?;
        if computed != expected {
            return Err(MoveError::ChecksumMismatch {
                path: local.display().to_string(),
                expected: expected.to_string(),
                computed,
            });
        }
        Ok(())
    }
}

/// Base64 MD5 of a file, read in chunks.
pub async fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        hasher.finalize(),
    ))
}
