// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Rebalance run driver
//!
//! A run discovers the instruction files queued for this storage node,
//! then works through them one at a time in sequence order, and through
//! each file one batch at a time. A file is deleted once its batch loop has
//! finished; deletion is the only record that a file was processed.

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::grouper::BatchGrouper;
use crate::instructions::{
    Discovery, DiscoveryError, InstructionNamespace, InstructionObject, NamespaceError, discover,
};
use crate::metadata::{MetadataError, MetadataStore};
use crate::mover::{DataMover, Transfer};
use crate::pipeline::{BatchOutcome, BatchPipeline, RebalanceMode};
use crate::tombstone::{Retirement, Tombstoner};
use crate::updater::KeyUpdate;

/// Fatal errors that abort a run.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to connect to metadata store: {0}")]
    Connect(#[source] MetadataError),

    #[error("failed to fetch instruction object {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: NamespaceError,
    },

    #[error("failed to delete instruction object {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: NamespaceError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Discover,
    ProcessFiles,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::Discover => "discover",
            RunState::ProcessFiles => "process_files",
            RunState::Done => "done",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RebalanceMode,
    pub queue_dir: String,
    /// Maximum number of instruction files to process; `None` for all.
    pub work_limit: Option<usize>,
    /// Keep a file when any of its batches failed.
    pub retain_failed_files: bool,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_deleted: usize,
    pub files_retained: usize,
    pub batches_completed: usize,
    pub batches_noop: usize,
    pub batches_failed: usize,
    pub malformed_lines: usize,
    pub objects_transferred: usize,
    pub objects_present: usize,
    pub bytes_transferred: u64,
    pub keys_updated: usize,
    pub keys_conflicted: usize,
    pub keys_stale: usize,
    pub keys_missing: usize,
    pub replicas_tombstoned: usize,
    pub replicas_gone: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Completed(report) => {
                self.batches_completed += 1;
                self.keys_stale += report.drops.stale;
                self.keys_missing += report.drops.missing;
                match report.transfer {
                    Some(Transfer::Transferred { bytes }) => {
                        self.objects_transferred += 1;
                        self.bytes_transferred += bytes;
                    }
                    Some(Transfer::AlreadyPresent) => self.objects_present += 1,
                    None => (),
                }
                for update in &report.updates {
                    match update {
                        KeyUpdate::Updated { .. } => self.keys_updated += 1,
                        KeyUpdate::Conflict { .. } => self.keys_conflicted += 1,
                    }
                }
                match report.retirement {
                    Some(Retirement::Retired) => self.replicas_tombstoned += 1,
                    Some(Retirement::AlreadyGone) => self.replicas_gone += 1,
                    None => (),
                }
            }
            BatchOutcome::NothingToDo(drops) => {
                self.batches_noop += 1;
                self.keys_stale += drops.stale;
                self.keys_missing += drops.missing;
            }
            BatchOutcome::Failed(_) => self.batches_failed += 1,
        }
    }

    pub fn log(&self, mode: RebalanceMode) {
        info!(
            mode = %mode,
            files_discovered = self.files_discovered,
            files_processed = self.files_processed,
            files_deleted = self.files_deleted,
            files_retained = self.files_retained,
            batches_completed = self.batches_completed,
            batches_noop = self.batches_noop,
            batches_failed = self.batches_failed,
            malformed_lines = self.malformed_lines,
            objects_transferred = self.objects_transferred,
            objects_present = self.objects_present,
            bytes_transferred = self.bytes_transferred,
            keys_updated = self.keys_updated,
            keys_conflicted = self.keys_conflicted,
            keys_stale = self.keys_stale,
            keys_missing = self.keys_missing,
            replicas_tombstoned = self.replicas_tombstoned,
            replicas_gone = self.replicas_gone,
            "Rebalance run summary"
        );
    }
}

pub struct Coordinator<N> {
    namespace: N,
    mover: DataMover,
    tombstoner: Tombstoner,
    options: RunOptions,
}

impl<N: InstructionNamespace> Coordinator<N> {
    pub fn new(namespace: N, mover: DataMover, tombstoner: Tombstoner, options: RunOptions) -> Self {
        Self {
            namespace,
            mover,
            tombstoner,
            options,
        }
    }

    /// Run once. `connect` opens the metadata store; it is only called when
    /// there is work, and the store is closed before returning.
    pub async fn run<S, F, Fut>(&self, connect: F) -> Result<RunSummary, RebalanceError>
    where
        S: MetadataStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, MetadataError>>,
    {
        let mode = self.options.mode;
        let mut summary = RunSummary::default();
        enter(RunState::Init);

        enter(RunState::Discover);
        let discovery = discover(&self.namespace, &self.options.queue_dir, mode.recursive()).await?;
        let objects = match discovery {
            Discovery::Empty => {
                enter(RunState::Done);
                summary.log(mode);
                return Ok(summary);
            }
            Discovery::Found(objects) => objects,
        };
        summary.files_discovered = objects.len();

        let limit = self
            .options
            .work_limit
            .map_or(objects.len(), |l| l.min(objects.len()));
        if limit == 0 {
            info!(files = objects.len(), "Work limit is zero, not processing any files");
            enter(RunState::Done);
            summary.log(mode);
            return Ok(summary);
        }

        let store = connect().await.map_err(RebalanceError::Connect)?;
        info!("Connected to metadata store");

        enter(RunState::ProcessFiles);
        let result = self
            .process_files(&store, &objects[..limit], &mut summary)
            .await;
        store.close().await;
        result?;

        enter(RunState::Done);
        summary.log(mode);
        Ok(summary)
    }

    async fn process_files(
        &self,
        store: &dyn MetadataStore,
        objects: &[InstructionObject],
        summary: &mut RunSummary,
    ) -> Result<(), RebalanceError> {
        let pipeline = BatchPipeline::new(self.options.mode, store, &self.mover, &self.tombstoner);

        for (index, object) in objects.iter().enumerate() {
            let span = info_span!("instruction_object", name = %object.name, index);
            self.process_file(&pipeline, object, summary)
                .instrument(span)
                .await?;
        }
        Ok(())
    }

    async fn process_file(
        &self,
        pipeline: &BatchPipeline<'_>,
        object: &InstructionObject,
        summary: &mut RunSummary,
    ) -> Result<(), RebalanceError> {
        info!(path = %object.path, "Processing instruction object");

        let mut reader = self
            .namespace
            .open(&object.path)
            .await
            .map_err(|source| RebalanceError::Fetch {
                path: object.path.clone(),
                source,
            })?;

        let mut buf = Vec::new();
        let mut grouper = BatchGrouper::new();
        let mut failed = 0;
        let mut truncated = false;

        loop {
            buf.clear();
            let batch = match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => grouper.push_bytes(&buf),
                Err(e) => {
                    error!(path = %object.path, error = %e, "Error reading instruction object");
                    truncated = true;
                    break;
                }
            };
            if let Some(batch) = batch {
                let outcome = pipeline.run(&batch).await;
                failed += usize::from(matches!(outcome, BatchOutcome::Failed(_)));
                summary.record(&outcome);
            }
        }
        if let Some(batch) = grouper.finish() {
            let outcome = pipeline.run(&batch).await;
            failed += usize::from(matches!(outcome, BatchOutcome::Failed(_)));
            summary.record(&outcome);
        }
        summary.malformed_lines += grouper.malformed();
        summary.files_processed += 1;
        info!(path = %object.path, failed_batches = failed, truncated, "Done reading instruction object");

        if (failed > 0 || truncated) && self.options.retain_failed_files {
            warn!(path = %object.path, failed_batches = failed, truncated, "Retaining instruction object");
            summary.files_retained += 1;
            return Ok(());
        }

        self.namespace
            .remove(&object.path)
            .await
            .map_err(|source| RebalanceError::Delete {
                path: object.path.clone(),
                source,
            })?;
        summary.files_deleted += 1;
        info!(path = %object.path, "Done with instruction object");
        Ok(())
    }
}

fn enter(state: RunState) {
    debug!(state = %state, "Rebalance run state");
}
