// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Retire the local replica into the dated tombstone area.

use chrono::{NaiveDate, Utc};
use http::Method;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    Retired,
    /// The local replica was already moved or removed.
    AlreadyGone,
}

#[derive(Debug, Error)]
pub enum TombstoneError {
    #[error(transparent)]
    InvalidMethod(#[from] http::method::InvalidMethod),

    #[error("MOVE {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("MOVE {url} returned {status}")]
    Status { url: String, status: u16 },
}

/// `Destination` path for an object retired on `date`.
pub fn tombstone_path(object_id: &str, date: NaiveDate) -> String {
    format!("/tombstone/{}/{}", date.format("%Y-%m-%d"), object_id)
}

pub struct Tombstoner {
    client: Client,
    local_storage_url: String,
}

impl Tombstoner {
    pub fn new(client: Client, local_storage_url: &str) -> Self {
        Self {
            client,
            local_storage_url: local_storage_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn retire(&self, account: &str, object_id: &str) -> Result<Retirement, TombstoneError> {
        let url = format!("{}/{}/{}", self.local_storage_url, account, object_id);
        let destination = tombstone_path(object_id, Utc::now().date_naive());

        info!(object_id = %object_id, url = %url, destination = %destination, "Tombstoning object");

        let response = self
            .client
            .request(Method::from_bytes(b"MOVE")?, &url)
            .header("Destination", &destination)
            .send()
            .await
            .map_err(|source| TombstoneError::Http {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Retirement::Retired),
            StatusCode::NOT_FOUND => {
                info!(object_id = %object_id, "Local replica already gone");
                Ok(Retirement::AlreadyGone)
            }
            status => Err(TombstoneError::Status {
                url,
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_tombstone_path() {
        let date = NaiveDate::from_ymd_opt(2018, 3, 7).unwrap();
        assert_eq!(tombstone_path("obj-1", date), "/tombstone/2018-03-07/obj-1");
    }
}
