// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Moray client library for interacting with Moray key-value stores.
//!
//! Moray is a JSON key-value store built on top of PostgreSQL and spoken to
//! over Fast RPC. This crate covers the point operations needed to
//! read-modify-write object metadata under etag preconditions.

pub mod client;
pub mod objects;

pub use client::{MorayClient, MorayError};
pub use objects::{Etag, MethodOptions, MorayObject};
