// Copyright 2020 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Moray client implementation over a single multiplexed Fast connection.

use std::time::Duration;

use fast_rpc::{FastClient, FastError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::objects::{self, MethodOptions, MorayObject};

const OBJECT_NOT_FOUND: &str = "ObjectNotFoundError";
const ETAG_CONFLICT: &str = "EtagConflictError";

/// Error type for Moray operations
#[derive(Debug, Error)]
pub enum MorayError {
    #[error("Object not found: bucket={bucket} key={key}")]
    NotFound { bucket: String, key: String },

    #[error("Etag conflict: bucket={bucket} key={key}: {message}")]
    EtagConflict {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Moray server error {name}: {message}")]
    Server { name: String, message: String },

    #[error("Moray connection error: {0}")]
    Connection(#[source] FastError),

    #[error("Unexpected Moray response: {0}")]
    Protocol(String),
}

impl MorayError {
    fn from_fast(err: FastError, bucket: &str, key: &str) -> MorayError {
        match err {
            FastError::Server(e) if e.name == OBJECT_NOT_FOUND => MorayError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            FastError::Server(e) if e.name == ETAG_CONFLICT => MorayError::EtagConflict {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.message,
            },
            FastError::Server(e) => MorayError::Server {
                name: e.name,
                message: e.message,
            },
            other => MorayError::Connection(other),
        }
    }
}

/// A client for interacting with a Moray service.
///
/// One TCP connection is opened by [`MorayClient::connect`] and shared by
/// every call until [`MorayClient::close`].
pub struct MorayClient {
    fast: FastClient,
    address: String,
}

impl MorayClient {
    /// Connect to the Moray server at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established within
    /// `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<MorayClient, MorayError> {
        let address = format!("{}:{}", host, port);
        let fast = FastClient::connect((host.to_string(), port), connect_timeout)
            .await
            .map_err(MorayError::Connection)?;

        info!(address = %address, "connected to moray");
        Ok(MorayClient { fast, address })
    }

    /// Get a specific object by key.
    ///
    /// # Errors
    ///
    /// [`MorayError::NotFound`] if the key does not exist in `bucket`.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        opts: &MethodOptions,
    ) -> Result<MorayObject, MorayError> {
        debug!(bucket = %bucket, key = %key, req_id = %opts.req_id, "getObject");

        let mut results = self
            .fast
            .call("getObject", objects::get_object_args(bucket, key, opts))
            .await
            .map_err(|e| MorayError::from_fast(e, bucket, key))?;

        if results.len() != 1 {
            return Err(MorayError::Protocol(format!(
                "getObject returned {} results for {}",
                results.len(),
                key
            )));
        }

        serde_json::from_value(results.remove(0))
            .map_err(|e| MorayError::Protocol(format!("invalid object for {}: {}", key, e)))
    }

    /// Store an object in a bucket, returning the new etag.
    ///
    /// # Errors
    ///
    /// [`MorayError::EtagConflict`] if `opts.etag` does not match the stored
    /// object.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        opts: &MethodOptions,
    ) -> Result<String, MorayError> {
        debug!(bucket = %bucket, key = %key, req_id = %opts.req_id, "putObject");

        let results = self
            .fast
            .call("putObject", objects::put_object_args(bucket, key, value, opts))
            .await
            .map_err(|e| MorayError::from_fast(e, bucket, key))?;

        results
            .iter()
            .find_map(|r| r.get("etag").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| MorayError::Protocol(format!("putObject for {} returned no etag", key)))
    }

    /// Close the connection once in-flight calls have completed.
    pub async fn close(&self) {
        self.fast.close().await;
        info!(address = %self.address, "closed moray connection");
    }
}
