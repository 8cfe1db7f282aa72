// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2020 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Re-point object metadata from the old shark to the new one.

use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::metadata::{MetadataError, MetadataStore};
use crate::reconcile::Reconciled;
use crate::types::Shark;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyUpdate {
    Updated { key: String, etag: String },
    /// The record changed between read and write; left as is.
    Conflict { key: String },
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("metadata for {key} has no sharks array")]
    NoSharks { key: String },

    #[error("failed to update {key}: {source}")]
    Metadata {
        key: String,
        #[source]
        source: MetadataError,
    },
}

/// Replace every entry of `value.sharks` equal to `old` with `new`. Returns
/// how many entries were replaced.
pub fn replace_shark(value: &mut Value, old: &Shark, new: &Shark) -> Option<usize> {
    let sharks = value.get_mut("sharks")?.as_array_mut()?;
    let replacement = serde_json::json!({
        "manta_storage_id": new.manta_storage_id,
        "datacenter": new.datacenter,
    });

    let mut replaced = 0;
    for entry in sharks.iter_mut().filter(|s| old.matches(s)) {
        *entry = replacement.clone();
        replaced += 1;
    }
    Some(replaced)
}

async fn update_one(store: &dyn MetadataStore, survivor: &Reconciled) -> Result<KeyUpdate, UpdateError> {
    let instruction = &survivor.instruction;
    let record = &survivor.record;
    let key = record.key.clone();

    let mut value = record.value.clone();
    let replaced = replace_shark(&mut value, &instruction.old_shark, &instruction.new_shark)
        .ok_or_else(|| UpdateError::NoSharks { key: key.clone() })?;
    if replaced == 0 {
        warn!(
            object_id = %instruction.object_id,
            key = %key,
            old_shark = %instruction.old_shark.manta_storage_id,
            "Old shark not present in metadata, writing back unchanged"
        );
    }

    info!(
        object_id = %instruction.object_id,
        key = %key,
        sharks = %value["sharks"],
        "Updating metadata"
    );

    match store.put(&record.bucket, &key, &value, &record.etag).await {
        Ok(etag) => Ok(KeyUpdate::Updated { key, etag }),
        Err(MetadataError::EtagConflict { .. }) => {
            info!(object_id = %instruction.object_id, key = %key, "Etag conflict, leaving record");
            Ok(KeyUpdate::Conflict { key })
        }
        Err(source) => Err(UpdateError::Metadata { key, source }),
    }
}

/// Update every surviving key concurrently. Returns once all writes have
/// finished; the first failure in batch order is reported.
pub async fn update_sharks(
    store: &dyn MetadataStore,
    survivors: &[Reconciled],
) -> Result<Vec<KeyUpdate>, UpdateError> {
    let results = join_all(survivors.iter().map(|s| update_one(store, s))).await;
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn test_replace_shark_leaves_other_fields() {
        let mut value = json!({
            "objectId": "o1",
            "contentMD5": "abc",
            "sharks": [
                {"manta_storage_id": "1.stor", "datacenter": "dc1"},
                {"manta_storage_id": "3.stor", "datacenter": "dc2"}
            ],
            "headers": {"x-custom": "kept"}
        });
        let before = value.clone();

        let n = replace_shark(
            &mut value,
            &Shark::new("1.stor", "dc1"),
            &Shark::new("2.stor", "dc1"),
        )
        .unwrap();

        assert_eq!(n, 1);
        assert_eq!(value["sharks"][0]["manta_storage_id"], "2.stor");
        assert_eq!(value["sharks"][1], before["sharks"][1]);
        assert_eq!(value["headers"], before["headers"]);
        assert_eq!(value["contentMD5"], "abc");
    }

    #[test]
    fn test_replace_shark_requires_datacenter_match() {
        let mut value = json!({"sharks": [{"manta_storage_id": "1.stor", "datacenter": "dc9"}]});
        let n = replace_shark(
            &mut value,
            &Shark::new("1.stor", "dc1"),
            &Shark::new("2.stor", "dc1"),
        )
        .unwrap();
        assert_eq!(n, 0);
        assert_eq!(value["sharks"][0]["datacenter"], "dc9");
    }

    #[test]
    fn test_replace_shark_without_sharks_array() {
        let old = Shark::new("1.stor", "dc1");
        let new = Shark::new("2.stor", "dc1");
        assert!(replace_shark(&mut json!({}), &old, &new).is_none());
        assert!(replace_shark(&mut json!({"sharks": "nope"}), &old, &new).is_none());
    }
}
