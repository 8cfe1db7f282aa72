// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Shared front end for the `mako-rebalance` and `mako-shark-reassign`
//! binaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::{info, warn};

use crate::auth::RequestSigner;
use crate::build_http_client;
use crate::config::{DEFAULT_CONFIG_PATH, InstructionSource, RebalancerConfig};
use crate::coordinator::{Coordinator, RunOptions, RunSummary};
use crate::instructions::{InstructionNamespace, LocalNamespace, MantaNamespace};
use crate::metadata::connect_moray;
use crate::mover::DataMover;
use crate::pipeline::RebalanceMode;
use crate::tombstone::Tombstoner;

const DEFAULT_LOG_FILTER: &str = "mako_rebalancer=info,moray=info,fast_rpc=warn";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Maximum number of instruction objects to process (negative for all)
    #[arg(allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Path to the rebalancer configuration file
    #[arg(short, long, env = "REBALANCE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Keep instruction objects whose batches did not all succeed
    #[arg(long)]
    pub retain_failed: bool,
}

impl Args {
    /// Parse the process arguments, reporting usage under `bin_name`.
    pub fn parse_as(bin_name: &'static str) -> Args {
        let matches = Args::command().name(bin_name).get_matches();
        Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }
}

/// Work limit from the command line: absent or negative means no limit.
pub fn work_limit(limit: Option<i64>) -> Option<usize> {
    limit.and_then(|l| usize::try_from(l).ok())
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        ))
        .init();
}

/// Load configuration and run the coordinator once in `mode`.
pub async fn run(mode: RebalanceMode, args: Args) -> Result<RunSummary> {
    let mut config = RebalancerConfig::from_file(&args.config).await?;
    if args.retain_failed {
        config.retain_failed_files = true;
    }
    info!(
        config = %args.config.display(),
        manta_storage_id = %config.manta_storage_id,
        moray = %format!("{}:{}", config.moray.host, config.moray.port),
        mode = %mode,
        "Loaded configuration"
    );

    let client = build_http_client(config.http_timeout()).context("Failed to build HTTP client")?;
    let options = RunOptions {
        mode,
        queue_dir: mode.queue_dir(&config.manta.user, &config.manta_storage_id),
        work_limit: work_limit(args.limit),
        retain_failed_files: config.retain_failed_files,
    };

    match &config.instructions {
        InstructionSource::Manta => {
            let url = config
                .manta
                .url
                .as_deref()
                .context("manta.url is required for manta instructions")?;
            let mut namespace = MantaNamespace::new(client.clone(), url);
            match &config.manta.sign {
                Some(sign) => {
                    let signer = RequestSigner::from_file(
                        &config.manta.user,
                        &sign.key,
                        sign.key_id.as_deref(),
                    )
                    .await
                    .with_context(|| format!("Failed to load signing key {}", sign.key.display()))?;
                    info!(key_id = %signer.key_id(), "Signing manta requests");
                    namespace = namespace.with_signer(signer);
                }
                None => warn!("No manta.sign key configured, manta requests are unsigned"),
            }
            run_with(namespace, client, &config, options).await
        }
        InstructionSource::Local { root } => {
            run_with(LocalNamespace::new(root.clone()), client, &config, options).await
        }
    }
}

async fn run_with<N: InstructionNamespace>(
    namespace: N,
    client: reqwest::Client,
    config: &RebalancerConfig,
    options: RunOptions,
) -> Result<RunSummary> {
    let mover = DataMover::new(client.clone(), config.manta_root.clone(), config.verify_checksum);
    let tombstoner = Tombstoner::new(client, &config.local_storage_url);
    let coordinator = Coordinator::new(namespace, mover, tombstoner, options);

    let summary = coordinator
        .run(|| connect_moray(&config.moray))
        .await
        .context("Rebalance run failed")?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_work_limit() {
        assert_eq!(work_limit(None), None);
        assert_eq!(work_limit(Some(-1)), None);
        assert_eq!(work_limit(Some(0)), Some(0));
        assert_eq!(work_limit(Some(3)), Some(3));
    }

    #[test]
    fn test_args_accept_negative_limit() {
        let args = Args::try_parse_from(["mako-rebalance", "-c", "/tmp/c.json", "-5"]).unwrap();
        assert_eq!(args.limit, Some(-5));
        assert_eq!(args.config, PathBuf::from("/tmp/c.json"));
        assert!(!args.retain_failed);

        let args = Args::try_parse_from(["mako-rebalance", "--retain-failed", "2"]).unwrap();
        assert_eq!(args.limit, Some(2));
        assert!(args.retain_failed);
    }
}
