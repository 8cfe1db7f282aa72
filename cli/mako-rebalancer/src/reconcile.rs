// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Re-read metadata for a batch and drop keys that changed since the
//! instruction was generated.

use futures_util::future::join_all;
use tracing::info;

use crate::metadata::{MetadataError, MetadataStore};
use crate::types::{Batch, Instruction, MANTA_BUCKET, MetadataRecord};

/// An instruction whose metadata still has the expected etag.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub instruction: Instruction,
    pub record: MetadataRecord,
}

/// Keys dropped during reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyDrops {
    pub stale: usize,
    pub missing: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Surviving keys, in batch order.
    pub survivors: Vec<Reconciled>,
    pub drops: KeyDrops,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.survivors.is_empty()
    }
}

/// Fetch every key of `batch` concurrently and keep those whose etag still
/// matches. Missing and stale keys are dropped; any other read failure fails
/// the whole batch.
pub async fn reconcile(
    store: &dyn MetadataStore,
    batch: &Batch,
) -> Result<Reconciliation, MetadataError> {
    let reads = batch
        .instructions()
        .iter()
        .map(|i| store.get(MANTA_BUCKET, &i.key));
    let results = join_all(reads).await;

    let mut survivors = Vec::with_capacity(batch.len());
    let mut drops = KeyDrops::default();

    for (instruction, result) in batch.instructions().iter().zip(results) {
        match result {
            Ok(record) if record.etag == instruction.moray_etag => {
                info!(object_id = %instruction.object_id, key = %instruction.key, "Got metadata for key");
                survivors.push(Reconciled {
                    instruction: instruction.clone(),
                    record,
                });
            }
            Ok(record) => {
                info!(
                    object_id = %instruction.object_id,
                    key = %instruction.key,
                    etag = %record.etag,
                    expected_etag = %instruction.moray_etag,
                    "Metadata etag mismatch, ignoring key"
                );
                drops.stale += 1;
            }
            Err(MetadataError::NotFound { .. }) => {
                info!(object_id = %instruction.object_id, key = %instruction.key, "Metadata not found, ignoring key");
                drops.missing += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Reconciliation { survivors, drops })
}
