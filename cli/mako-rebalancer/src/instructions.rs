// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2018 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

//! Instruction discovery
//!
//! Instruction files live in a per-shark queue directory. Their names carry
//! a sequence number (`<seq>-X-<rest>`) that defines processing order; the
//! namespace lists them in lexical order, which is not the same thing.
//!
//! Two namespace back ends are provided: [`MantaNamespace`] speaks to a
//! Manta-style directory service over HTTP, [`LocalNamespace`] maps the
//! namespace onto a local directory.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, Response, StatusCode, Url, header};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, RequestSigner};

/// Entries requested per directory listing page.
const LIST_PAGE_SIZE: usize = 1000;

/// Buffered reader over an instruction file body.
pub type InstructionReader = Box<dyn AsyncBufRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid directory entry in {dir}: {message}")]
    InvalidEntry { dir: String, message: String },

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Error)]
#[error("failed to list instruction directory {dir}: {source}")]
pub struct DiscoveryError {
    pub dir: String,
    #[source]
    pub source: NamespaceError,
}

/// An object found in a namespace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub name: String,
    /// Full namespace path of the object.
    pub path: String,
}

#[async_trait]
pub trait InstructionNamespace: Send + Sync {
    /// List the objects in `dir`, descending into sub-directories when
    /// `recursive` is set. Directories themselves are not returned.
    async fn list(&self, dir: &str, recursive: bool)
    -> Result<Vec<NamespaceEntry>, NamespaceError>;

    /// Stream the body of the object at `path`.
    async fn open(&self, path: &str) -> Result<InstructionReader, NamespaceError>;

    /// Unlink the object at `path`. Removing an object that is already gone
    /// succeeds.
    async fn remove(&self, path: &str) -> Result<(), NamespaceError>;
}

/// An instruction file with its parsed sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionObject {
    pub name: String,
    pub path: String,
    pub sequence: Option<u64>,
}

impl From<NamespaceEntry> for InstructionObject {
    fn from(entry: NamespaceEntry) -> Self {
        Self {
            sequence: sequence_of(&entry.name),
            name: entry.name,
            path: entry.path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The queue directory holds no instruction files.
    Empty,
    /// Instruction files in processing order.
    Found(Vec<InstructionObject>),
}

/// Sequence number embedded in an instruction file name: the leading digits
/// of the text before the first `-X-`, up to the first `-`.
pub fn sequence_of(name: &str) -> Option<u64> {
    let head = name.split("-X-").next().unwrap_or(name);
    let head = head.split('-').next().unwrap_or(head);
    let digits: String = head.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Sort by ascending sequence. Names without a sequence go last; ties are
/// broken by name.
pub fn sort_by_sequence(objects: &mut [InstructionObject]) {
    objects.sort_by(|a, b| {
        (a.sequence.is_none(), a.sequence, &a.name).cmp(&(b.sequence.is_none(), b.sequence, &b.name))
    });
}

/// List `dir` and return its instruction files in processing order.
pub async fn discover<N>(namespace: &N, dir: &str, recursive: bool) -> Result<Discovery, DiscoveryError>
where
    N: InstructionNamespace + ?Sized,
{
    let entries = namespace
        .list(dir, recursive)
        .await
        .map_err(|source| DiscoveryError {
            dir: dir.to_string(),
            source,
        })?;

    if entries.is_empty() {
        info!(dir = %dir, "No instruction objects in directory");
        return Ok(Discovery::Empty);
    }

    let mut objects: Vec<InstructionObject> = entries.into_iter().map(Into::into).collect();
    for obj in objects.iter().filter(|o| o.sequence.is_none()) {
        warn!(name = %obj.name, "Instruction object name has no sequence number, processing last");
    }
    sort_by_sequence(&mut objects);

    info!(
        dir = %dir,
        count = objects.len(),
        first = %objects[0].name,
        "Found instruction objects"
    );
    Ok(Discovery::Found(objects))
}

/// Directory entry as returned by a Manta listing.
#[derive(Debug, Deserialize)]
struct MantaDirEntry {
    name: String,
    #[serde(rename = "type")]
    entry_type: String,
}

/// Manta-style directory service over HTTP.
pub struct MantaNamespace {
    client: Client,
    base_url: String,
    page_size: usize,
    signer: Option<RequestSigner>,
}

impl MantaNamespace {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: LIST_PAGE_SIZE,
            signer: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(2);
        self
    }

    /// Sign every request with `signer`.
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn url(&self, path: &str) -> Result<Url, NamespaceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&url).map_err(|e| NamespaceError::InvalidUrl {
            url,
            message: e.to_string(),
        })
    }

    /// Sign and send a request without a body.
    async fn send(
        &self,
        method: Method,
        url: Url,
        accept: Option<&str>,
    ) -> Result<Response, NamespaceError> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        if let Some(signer) = &self.signer {
            let (date, authorization) = signer.authorize(method.as_str(), &url)?;
            request = request
                .header(header::DATE, date)
                .header(header::AUTHORIZATION, authorization);
        }

        request.send().await.map_err(|source| NamespaceError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch every entry of a single directory, following pagination.
    async fn list_dir(&self, dir: &str) -> Result<Vec<MantaDirEntry>, NamespaceError> {
        let base = self.url(dir)?;
        let mut entries: Vec<MantaDirEntry> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut page_url = base.clone();
            {
                let mut query = page_url.query_pairs_mut();
                query.append_pair("limit", &self.page_size.to_string());
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }

            let response = self
                .send(Method::GET, page_url, Some("application/x-json-stream"))
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(NamespaceError::Status {
                    url: base.to_string(),
                    status: status.as_u16(),
                });
            }
            let body = response.text().await.map_err(|source| NamespaceError::Http {
                url: base.to_string(),
                source,
            })?;

            let mut page = Vec::new();
            for line in body.lines().filter(|l| !l.trim().is_empty()) {
                let entry: MantaDirEntry =
                    serde_json::from_str(line).map_err(|e| NamespaceError::InvalidEntry {
                        dir: dir.to_string(),
                        message: e.to_string(),
                    })?;
                page.push(entry);
            }

            let page_len = page.len();
            let last = page.last().map(|e| e.name.clone());
            // The marker entry is repeated at the head of the next page.
            let skip = match (&marker, page.first()) {
                (Some(m), Some(first)) if *m == first.name => 1,
                _ => 0,
            };
            entries.extend(page.into_iter().skip(skip));

            debug!(dir = %dir, page_len, total = entries.len(), "Listed directory page");

            if page_len < self.page_size || last.is_none() || last == marker {
                break;
            }
            marker = last;
        }

        Ok(entries)
    }
}

#[async_trait]
impl InstructionNamespace for MantaNamespace {
    async fn list(
        &self,
        dir: &str,
        recursive: bool,
    ) -> Result<Vec<NamespaceEntry>, NamespaceError> {
        let mut found = Vec::new();
        let mut pending = vec![dir.trim_end_matches('/').to_string()];

        while let Some(current) = pending.pop() {
            for entry in self.list_dir(&current).await? {
                let path = format!("{}/{}", current, entry.name);
                match entry.entry_type.as_str() {
                    "object" => found.push(NamespaceEntry {
                        name: entry.name,
                        path,
                    }),
                    "directory" if recursive => pending.push(path),
                    _ => (),
                }
            }
        }

        Ok(found)
    }

    async fn open(&self, path: &str) -> Result<InstructionReader, NamespaceError> {
        let url = self.url(path)?;
        let response = self.send(Method::GET, url.clone(), None).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NamespaceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok(Box::new(StreamReader::new(body)))
    }

    async fn remove(&self, path: &str) -> Result<(), NamespaceError> {
        let url = self.url(path)?;
        let response = self.send(Method::DELETE, url.clone(), None).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(path = %path, "Instruction object already removed");
                Ok(())
            }
            s => Err(NamespaceError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

/// Namespace rooted at a local directory. `/a/b` maps to `<root>/a/b`.
pub struct LocalNamespace {
    root: PathBuf,
}

impl LocalNamespace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn local_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn io_error(path: &Path, source: io::Error) -> NamespaceError {
    NamespaceError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl InstructionNamespace for LocalNamespace {
    async fn list(
        &self,
        dir: &str,
        recursive: bool,
    ) -> Result<Vec<NamespaceEntry>, NamespaceError> {
        let mut found = Vec::new();
        let mut pending = vec![dir.trim_end_matches('/').to_string()];

        while let Some(current) = pending.pop() {
            let local = self.local_path(&current);
            let mut read_dir = tokio::fs::read_dir(&local)
                .await
                .map_err(|e| io_error(&local, e))?;

            while let Some(entry) = read_dir.next_entry().await.map_err(|e| io_error(&local, e))? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = format!("{}/{}", current, name);
                let file_type = entry.file_type().await.map_err(|e| io_error(&local, e))?;

                if file_type.is_file() {
                    found.push(NamespaceEntry { name, path });
                } else if file_type.is_dir() && recursive {
                    pending.push(path);
                }
            }
        }

        Ok(found)
    }

    async fn open(&self, path: &str) -> Result<InstructionReader, NamespaceError> {
        let local = self.local_path(path);
        let file = tokio::fs::File::open(&local)
            .await
            .map_err(|e| io_error(&local, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn remove(&self, path: &str) -> Result<(), NamespaceError> {
        let local = self.local_path(path);
        match tokio::fs::remove_file(&local).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path, "Instruction object already removed");
                Ok(())
            }
            Err(e) => Err(io_error(&local, e)),
        }
    }
}
