// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! `mako-rebalance`: Move objects listed in this storage node's rebalance queue to their new sharks.

use std::process::ExitCode;

use tracing::error;

use mako_rebalancer::cli::{self, Args};
use mako_rebalancer::pipeline::RebalanceMode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_as("mako-rebalance");
    cli::init_tracing();

    match cli::run(RebalanceMode::Move, args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "mako-rebalance failed");
            ExitCode::FAILURE
        }
    }
}
