// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! HTTP Signature authentication for Manta requests
//!
//! Every request to the directory service carries:
//!
//! ```text
//! Date: Thu, 01 Jan 2026 00:00:00 GMT
//! Authorization: Signature keyId="/:user/keys/:md5",algorithm="rsa-sha256",headers="date (request-target)",signature=":base64:"
//! ```
//!
//! The signature covers `date: <date>\n(request-target): <method> <path>`.
//! Operator keys are RSA, in PKCS#1 or PKCS#8 PEM.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::Url;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

pub const ALGORITHM: &str = "rsa-sha256";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read key {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse RSA private key: {0}")]
    KeyParse(String),

    #[error("configured keyId {configured} does not match key fingerprint {actual}")]
    KeyIdMismatch { configured: String, actual: String },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Signs requests on behalf of one Manta user.
pub struct RequestSigner {
    user: String,
    fingerprint: String,
    key: SigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("user", &self.user)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(user: &str, key: RsaPrivateKey) -> Self {
        Self {
            user: user.to_string(),
            fingerprint: md5_fingerprint(&key.to_public_key()),
            key: SigningKey::<Sha256>::new(key),
        }
    }

    /// Parse a PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8
    /// (`BEGIN PRIVATE KEY`) document.
    pub fn from_pem(user: &str, pem: &str) -> Result<Self, AuthError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| AuthError::KeyParse(e.to_string()))?;
        Ok(Self::new(user, key))
    }

    /// Load the key at `path`. When `key_id` is given it must name the
    /// loaded key's MD5 fingerprint.
    pub async fn from_file(
        user: &str,
        path: &Path,
        key_id: Option<&str>,
    ) -> Result<Self, AuthError> {
        let pem = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AuthError::KeyRead {
                path: path.to_path_buf(),
                source,
            })?;
        let signer = Self::from_pem(user, &pem)?;

        if let Some(configured) = key_id {
            let configured = configured.trim_start_matches("MD5:");
            if !configured.eq_ignore_ascii_case(&signer.fingerprint) {
                return Err(AuthError::KeyIdMismatch {
                    configured: configured.to_string(),
                    actual: signer.fingerprint,
                });
            }
        }
        Ok(signer)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// `/:user/keys/:fingerprint`
    pub fn key_id(&self) -> String {
        format!("/{}/keys/{}", self.user, self.fingerprint)
    }

    pub fn signing_string(method: &str, target: &str, date: &str) -> String {
        format!(
            "date: {}\n(request-target): {} {}",
            date,
            method.to_lowercase(),
            target
        )
    }

    /// RFC 2822 date in GMT, as used for the `Date` header.
    pub fn date_header() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Base64 RSA-SHA256 signature of `data`.
    pub fn sign(&self, data: &[u8]) -> Result<String, AuthError> {
        let signature = self
            .key
            .try_sign(data)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature.to_vec()))
    }

    pub fn authorization_header(&self, signature_b64: &str) -> String {
        format!(
            "Signature keyId=\"{}\",algorithm=\"{}\",headers=\"date (request-target)\",signature=\"{}\"",
            self.key_id(),
            ALGORITHM,
            signature_b64
        )
    }

    /// `Date` and `Authorization` header values for a request to `url`.
    pub fn authorize(&self, method: &str, url: &Url) -> Result<(String, String), AuthError> {
        let date = Self::date_header();
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let signature = self.sign(Self::signing_string(method, &target, &date).as_bytes())?;
        Ok((date, self.authorization_header(&signature)))
    }
}

/// Colon-separated MD5 of the key's SSH wire encoding, as printed by
/// `ssh-keygen -l -E md5`.
pub fn md5_fingerprint(key: &RsaPublicKey) -> String {
    let mut blob = Vec::new();
    write_ssh_string(&mut blob, b"ssh-rsa");
    write_ssh_mpint(&mut blob, &key.e().to_bytes_be());
    write_ssh_mpint(&mut blob, &key.n().to_bytes_be());

    Md5::digest(&blob)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn write_ssh_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn write_ssh_mpint(buf: &mut Vec<u8>, value: &[u8]) {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let value = &value[start..];
    if value.first().is_some_and(|&b| b & 0x80 != 0) {
        buf.extend_from_slice(&((value.len() + 1) as u32).to_be_bytes());
        buf.push(0);
    } else {
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    }
    buf.extend_from_slice(value);
}
