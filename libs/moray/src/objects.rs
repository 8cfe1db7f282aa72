// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Object types and request encoding for the Moray object methods.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// An object as returned by `getObject`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MorayObject {
    pub bucket: String,
    pub key: String,
    pub value: Value,
    #[serde(rename = "_id", default)]
    pub id: u64,
    #[serde(rename = "_etag")]
    pub etag: String,
    #[serde(rename = "_mtime", default)]
    pub mtime: u64,
}

/// Write precondition for `putObject`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Etag {
    /// No precondition.
    #[default]
    Undefined,
    /// The stored object must currently have this etag.
    Specified(String),
    /// The object must not exist yet.
    Nulled,
}

#[derive(Debug, Clone)]
pub struct MethodOptions {
    pub req_id: String,
    pub etag: Etag,
    /// Ask Moray to bypass its bucket cache on reads.
    pub no_cache: bool,
}

impl Default for MethodOptions {
    fn default() -> Self {
        Self {
            req_id: Uuid::new_v4().to_string(),
            etag: Etag::Undefined,
            no_cache: true,
        }
    }
}

impl MethodOptions {
    pub fn with_etag(etag: &str) -> Self {
        Self {
            etag: Etag::Specified(etag.to_string()),
            ..Self::default()
        }
    }

    fn to_value(&self) -> Value {
        let mut opts = Map::new();
        opts.insert("req_id".to_string(), Value::String(self.req_id.clone()));
        if self.no_cache {
            opts.insert("noCache".to_string(), Value::Bool(true));
        }
        match &self.etag {
            Etag::Undefined => (),
            Etag::Specified(etag) => {
                opts.insert("etag".to_string(), Value::String(etag.clone()));
            }
            Etag::Nulled => {
                opts.insert("etag".to_string(), Value::Null);
            }
        }
        Value::Object(opts)
    }
}

pub(crate) fn get_object_args(bucket: &str, key: &str, opts: &MethodOptions) -> Value {
    json!([bucket, key, opts.to_value()])
}

pub(crate) fn put_object_args(bucket: &str, key: &str, value: &Value, opts: &MethodOptions) -> Value {
    json!([bucket, key, value, opts.to_value()])
}
