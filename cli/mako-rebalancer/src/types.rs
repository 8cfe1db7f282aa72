// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Instruction and metadata types shared by the pipeline stages.

use moray::MorayObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Moray bucket holding object metadata.
pub const MANTA_BUCKET: &str = "manta";

/// A storage node reference as it appears in instructions and in the
/// `sharks` array of object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shark {
    pub manta_storage_id: String,
    pub datacenter: String,
}

impl Shark {
    pub fn new(manta_storage_id: &str, datacenter: &str) -> Self {
        Self {
            manta_storage_id: manta_storage_id.to_string(),
            datacenter: datacenter.to_string(),
        }
    }

    /// Whether a raw `sharks` entry refers to this shark.
    pub fn matches(&self, entry: &Value) -> bool {
        entry.get("manta_storage_id").and_then(Value::as_str) == Some(&self.manta_storage_id)
            && entry.get("datacenter").and_then(Value::as_str) == Some(&self.datacenter)
    }
}

/// One line of an instruction file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub object_id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub old_shark: Shark,
    pub new_shark: Shark,
    pub moray_etag: String,
}

impl Instruction {
    /// Account the bytes are stored under. Links are stored under the
    /// creator, so it takes precedence over the owner.
    pub fn account(&self) -> Option<&str> {
        self.creator.as_deref().or(self.owner.as_deref())
    }
}

/// All instructions for one object, in file order. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    instructions: Vec<Instruction>,
}

impl Batch {
    /// Returns `None` for an empty list.
    pub fn new(instructions: Vec<Instruction>) -> Option<Batch> {
        if instructions.is_empty() {
            None
        } else {
            Some(Batch { instructions })
        }
    }

    /// The instruction the object-level stages work from.
    pub fn first(&self) -> &Instruction {
        &self.instructions[0]
    }

    pub fn object_id(&self) -> &str {
        &self.first().object_id
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn keys(&self) -> Vec<String> {
        self.instructions.iter().map(|i| i.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A metadata record as read from the store; `etag` is the
/// compare-and-swap token for the next write.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub bucket: String,
    pub key: String,
    pub value: Value,
    pub etag: String,
}

impl From<MorayObject> for MetadataRecord {
    fn from(obj: MorayObject) -> Self {
        Self {
            bucket: obj.bucket,
            key: obj.key,
            value: obj.value,
            etag: obj.etag,
        }
    }
}
