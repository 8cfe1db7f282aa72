// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared fixtures for the rebalancer integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mako_rebalancer::metadata::{MetadataError, MetadataStore};
use mako_rebalancer::types::{Instruction, MANTA_BUCKET, MetadataRecord, Shark};
use serde_json::{Value, json};

pub const OLD_SHARK: &str = "1.stor.example.com";
pub const DATACENTER: &str = "dc1";
pub const ACCOUNT: &str = "acct";

#[derive(Default)]
struct Inner {
    records: HashMap<String, (Value, u64)>,
    /// Keys whose reads fail with a non-benign error.
    broken: HashSet<String>,
    /// Keys whose next write is rejected as an etag conflict.
    conflict_next_put: HashSet<String>,
    puts: Vec<String>,
    gets: Vec<String>,
}

/// In-memory metadata store. Etags are `E<generation>`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    closes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record at generation 1 with the given sharks.
    pub fn insert(&self, key: &str, object_id: &str, sharks: &[Shark]) {
        let value = json!({
            "key": key,
            "objectId": object_id,
            "contentLength": 11,
            "sharks": sharks,
            "headers": {"m-custom": "keep"},
        });
        self.inner
            .lock()
            .unwrap()
            .records
            .insert(key.to_string(), (value, 1));
    }

    /// Bump a record's generation without changing its value.
    pub fn touch(&self, key: &str) {
        if let Some(entry) = self.inner.lock().unwrap().records.get_mut(key) {
            entry.1 += 1;
        }
    }

    pub fn break_key(&self, key: &str) {
        self.inner.lock().unwrap().broken.insert(key.to_string());
    }

    pub fn conflict_next_put(&self, key: &str) {
        self.inner
            .lock()
            .unwrap()
            .conflict_next_put
            .insert(key.to_string());
    }

    pub fn value(&self, key: &str) -> Value {
        self.inner.lock().unwrap().records[key].0.clone()
    }

    pub fn etag(&self, key: &str) -> String {
        format!("E{}", self.inner.lock().unwrap().records[key].1)
    }

    pub fn storage_ids(&self, key: &str) -> Vec<String> {
        self.value(key)["sharks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["manta_storage_id"].as_str().unwrap().to_string())
            .collect()
    }

    /// Keys written, in write order.
    pub fn puts(&self) -> Vec<String> {
        self.inner.lock().unwrap().puts.clone()
    }

    /// Keys read, in read order.
    pub fn gets(&self) -> Vec<String> {
        self.inner.lock().unwrap().gets.clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<MetadataRecord, MetadataError> {
        assert_eq!(bucket, MANTA_BUCKET);
        let mut inner = self.inner.lock().unwrap();
        inner.gets.push(key.to_string());

        if inner.broken.contains(key) {
            return Err(MetadataError::Unavailable(format!("{} is broken", key)));
        }
        match inner.records.get(key) {
            Some((value, generation)) => Ok(MetadataRecord {
                bucket: bucket.to_string(),
                key: key.to_string(),
                value: value.clone(),
                etag: format!("E{}", generation),
            }),
            None => Err(MetadataError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn put(
        &self,
        _bucket: &str,
        key: &str,
        value: &Value,
        etag: &str,
    ) -> Result<String, MetadataError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.conflict_next_put.remove(key) {
            return Err(MetadataError::EtagConflict {
                key: key.to_string(),
                message: "injected".to_string(),
            });
        }

        let generation = match inner.records.get(key) {
            Some((_, g)) if format!("E{}", g) == etag => g + 1,
            _ => {
                return Err(MetadataError::EtagConflict {
                    key: key.to_string(),
                    message: format!("expected {}", etag),
                });
            }
        };
        inner
            .records
            .insert(key.to_string(), (value.clone(), generation));
        inner.puts.push(key.to_string());
        Ok(format!("E{}", generation))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Closing a shared store through an `Arc` lets tests inspect it after the
/// coordinator has finished with it.
pub struct SharedStore(pub std::sync::Arc<MemoryStore>);

#[async_trait]
impl MetadataStore for SharedStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<MetadataRecord, MetadataError> {
        self.0.get(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        etag: &str,
    ) -> Result<String, MetadataError> {
        self.0.put(bucket, key, value, etag).await
    }

    async fn close(&self) {
        self.0.close().await
    }
}

pub fn old_shark() -> Shark {
    Shark::new(OLD_SHARK, DATACENTER)
}

pub fn instruction(object_id: &str, key: &str, new_storage_id: &str, etag: &str) -> Instruction {
    Instruction {
        object_id: object_id.to_string(),
        key: key.to_string(),
        md5: Some("XrY7u+Ae7tCTyyK7j1rNww==".to_string()),
        creator: None,
        owner: Some(ACCOUNT.to_string()),
        old_shark: old_shark(),
        new_shark: Shark::new(new_storage_id, DATACENTER),
        moray_etag: etag.to_string(),
    }
}

pub fn ndjson(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(|i| serde_json::to_string(i).unwrap() + "\n")
        .collect()
}

/// Write `contents` at namespace path `path` below `root`.
pub fn write_object(root: &Path, path: &str, contents: impl AsRef<[u8]>) {
    let local = root.join(path.trim_start_matches('/'));
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(local, contents).unwrap();
}

/// Place a local replica holding `hello world`.
pub fn write_replica(manta_root: &Path, object_id: &str) {
    let dir = manta_root.join(ACCOUNT);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(object_id), b"hello world").unwrap();
}
