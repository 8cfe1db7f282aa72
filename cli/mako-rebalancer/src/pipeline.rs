// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Per-batch pipeline
//!
//! A batch moves through reconcile, move, update and tombstone in that
//! order. Metadata is only rewritten once the new shark holds the bytes, and
//! the local replica is only retired once metadata points elsewhere, so a
//! failure at any stage leaves the object readable and the next run picks
//! up where this one stopped.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use crate::metadata::{MetadataError, MetadataStore};
use crate::mover::{DataMover, MoveError, Transfer};
use crate::reconcile::{KeyDrops, reconcile};
use crate::tombstone::{Retirement, TombstoneError, Tombstoner};
use crate::types::Batch;
use crate::updater::{KeyUpdate, UpdateError, update_sharks};

/// Which queue is worked and which stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceMode {
    /// Copy bytes, re-point metadata, retire the local replica.
    Move,
    /// Re-point metadata only.
    Reassign,
}

impl RebalanceMode {
    /// Queue directory for `storage_id` under `user`'s namespace.
    pub fn queue_dir(&self, user: &str, storage_id: &str) -> String {
        let queue = match self {
            RebalanceMode::Move => "do",
            RebalanceMode::Reassign => "update",
        };
        format!("/{}/stor/manta_shark_assign/{}/{}", user, queue, storage_id)
    }

    /// The update queue is nested in sub-directories by its generator.
    pub fn recursive(&self) -> bool {
        matches!(self, RebalanceMode::Reassign)
    }
}

impl fmt::Display for RebalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceMode::Move => write!(f, "move"),
            RebalanceMode::Reassign => write!(f, "reassign"),
        }
    }
}

/// Errors that fail a single batch.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("reconcile failed: {0}")]
    Reconcile(#[source] MetadataError),

    #[error("instruction names neither creator nor owner")]
    NoAccount,

    #[error("transfer failed: {0}")]
    Move(#[from] MoveError),

    #[error("metadata update failed: {0}")]
    Update(#[from] UpdateError),

    #[error("tombstone failed: {0}")]
    Tombstone(#[from] TombstoneError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub object_id: String,
    /// `None` when the mode does not move data.
    pub transfer: Option<Transfer>,
    pub updates: Vec<KeyUpdate>,
    pub drops: KeyDrops,
    pub retirement: Option<Retirement>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub object_id: String,
    pub keys: Vec<String>,
    pub error: StageError,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed(BatchReport),
    /// Every key was stale or missing.
    NothingToDo(KeyDrops),
    Failed(BatchFailure),
}

pub struct BatchPipeline<'a> {
    mode: RebalanceMode,
    store: &'a dyn MetadataStore,
    mover: &'a DataMover,
    tombstoner: &'a Tombstoner,
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        mode: RebalanceMode,
        store: &'a dyn MetadataStore,
        mover: &'a DataMover,
        tombstoner: &'a Tombstoner,
    ) -> Self {
        Self {
            mode,
            store,
            mover,
            tombstoner,
        }
    }

    /// Run every stage for `batch`. Failures are logged and returned as
    /// [`BatchOutcome::Failed`]; they never abort the caller.
    pub async fn run(&self, batch: &Batch) -> BatchOutcome {
        info!(object_id = %batch.object_id(), keys = batch.len(), mode = %self.mode, "Starting pipeline for object");

        match self.stages(batch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let keys = batch.keys();
                error!(
                    object_id = %batch.object_id(),
                    keys = ?keys,
                    error = %e,
                    "Error processing object"
                );
                BatchOutcome::Failed(BatchFailure {
                    object_id: batch.object_id().to_string(),
                    keys,
                    error: e,
                })
            }
        }
    }

    async fn stages(&self, batch: &Batch) -> Result<BatchOutcome, StageError> {
        let reconciliation = reconcile(self.store, batch)
            .await
            .map_err(StageError::Reconcile)?;
        if reconciliation.is_empty() {
            info!(object_id = %batch.object_id(), "No current metadata for object, nothing to do");
            return Ok(BatchOutcome::NothingToDo(reconciliation.drops));
        }

        let survivors = &reconciliation.survivors;
        let report = match self.mode {
            RebalanceMode::Move => {
                let account = batch.first().account().ok_or(StageError::NoAccount)?;
                let transfer = self.mover.move_object(batch, account).await?;
                let updates = update_sharks(self.store, survivors).await?;
                let retirement = self.tombstoner.retire(account, batch.object_id()).await?;
                BatchReport {
                    object_id: batch.object_id().to_string(),
                    transfer: Some(transfer),
                    updates,
                    drops: reconciliation.drops,
                    retirement: Some(retirement),
                }
            }
            RebalanceMode::Reassign => BatchReport {
                object_id: batch.object_id().to_string(),
                transfer: None,
                updates: update_sharks(self.store, survivors).await?,
                drops: reconciliation.drops,
                retirement: None,
            },
        };

        Ok(BatchOutcome::Completed(report))
    }
}
