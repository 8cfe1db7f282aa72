// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fast is a streaming JSON RPC protocol spoken over TCP by Moray and other
//! Manta services.
//!
//! - [`protocol`] - message types and the tokio-util codec
//! - [`client`] - an async client that multiplexes calls over one connection
//! - [`server`] - a connection handler used to build small Fast servers

pub mod client;
pub mod protocol;
pub mod server;

pub use client::FastClient;
pub use protocol::{FastError, FastMessage, FastMessageData, FastMessageServerError, FastRpc};
