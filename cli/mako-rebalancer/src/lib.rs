// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Mako rebalancer
//!
//! Runs on a storage node ("mako") and works through instruction files
//! produced by the shark-assignment generator. For every object named in an
//! instruction file it:
//!
//! - Re-reads the object's metadata from Moray and checks the etag captured
//!   when the instruction was generated
//! - Copies the local replica to the destination storage node
//! - Re-points the metadata from the old shark to the new one
//! - Moves the local replica into the dated tombstone area
//!
//! The `mako-shark-reassign` front end runs only the metadata half of that
//! pipeline.

use std::time::Duration;

pub mod auth;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod grouper;
pub mod instructions;
pub mod metadata;
pub mod mover;
pub mod pipeline;
pub mod reconcile;
pub mod tombstone;
pub mod types;
pub mod updater;

/// Build the HTTP client shared by the instruction namespace and the
/// storage-node stages.
///
/// `timeout`, when set, bounds each request including its body transfer.
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Result<reqwest::Client> {
    // reqwest is built without a default rustls provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}
