// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fast message types and wire codec.
//!
//! Every message is a 15 byte header followed by a JSON payload:
//!
//! ```text
//! 0       1       2       3               7               11              15
//! +-------+-------+-------+---------------+---------------+---------------+
//! |version| type  |status |  message id   |  crc16 (u32)  |  data length  |
//! +-------+-------+-------+---------------+---------------+---------------+
//! ```
//!
//! All integers are big-endian. The payload is `{"m": {...}, "d": ...}`.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

pub const FP_OFF_TYPE: usize = 0x1;
pub const FP_OFF_STATUS: usize = 0x2;
pub const FP_OFF_MSGID: usize = 0x3;
pub const FP_OFF_CRC: usize = 0x7;
pub const FP_OFF_LEN: usize = 0xb;
pub const FP_HEADER_SZ: usize = 0xf;

pub const FP_VERSION_1: u8 = 0x1;
pub const FP_TYPE_JSON: u8 = 0x1;

/// Message ids wrap before reaching the sign bit, matching node-fast.
pub const FP_MSGID_MAX: u32 = i32::MAX as u32;

/// Payloads larger than this are rejected rather than buffered.
pub const FP_MAX_DATA_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FastError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported fast protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported fast message type {0}")]
    UnsupportedType(u8),

    #[error("invalid fast message status {0}")]
    InvalidStatus(u8),

    #[error("fast message {id} failed CRC check: expected {expected}, computed {computed}")]
    CrcMismatch { id: u32, expected: u32, computed: u32 },

    #[error("fast message data length {0} exceeds limit")]
    DataTooLarge(usize),

    #[error("invalid fast message payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server error {}: {}", .0.name, .0.message)]
    Server(FastMessageServerError),

    #[error("fast connection closed: {0}")]
    Closed(String),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FastMessageStatus {
    Data = 0x1,
    End = 0x2,
    Error = 0x3,
}

impl TryFrom<u8> for FastMessageStatus {
    type Error = FastError;

    fn try_from(value: u8) -> Result<Self, FastError> {
        match value {
            0x1 => Ok(FastMessageStatus::Data),
            0x2 => Ok(FastMessageStatus::End),
            0x3 => Ok(FastMessageStatus::Error),
            other => Err(FastError::InvalidStatus(other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FastMessageMetaData {
    pub uts: u64,
    pub name: String,
}

impl FastMessageMetaData {
    pub fn new(name: String) -> FastMessageMetaData {
        let uts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        FastMessageMetaData { uts, name }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FastMessageData {
    pub m: FastMessageMetaData,
    pub d: Value,
}

impl FastMessageData {
    pub fn new(name: String, d: Value) -> FastMessageData {
        FastMessageData {
            m: FastMessageMetaData::new(name),
            d,
        }
    }
}

/// The `d` payload of an error message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FastMessageServerError {
    pub name: String,
    pub message: String,
}

impl FastMessageServerError {
    pub fn new(name: &str, message: &str) -> Self {
        FastMessageServerError {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FastMessage {
    pub id: u32,
    pub status: FastMessageStatus,
    pub data: FastMessageData,
}

impl FastMessage {
    pub fn data(id: u32, data: FastMessageData) -> FastMessage {
        FastMessage {
            id,
            status: FastMessageStatus::Data,
            data,
        }
    }

    pub fn end(id: u32, method: String) -> FastMessage {
        FastMessage {
            id,
            status: FastMessageStatus::End,
            data: FastMessageData::new(method, Value::Array(vec![])),
        }
    }

    pub fn error(id: u32, method: String, err: &FastMessageServerError) -> FastMessage {
        let d = serde_json::to_value(err).unwrap_or(Value::Null);
        FastMessage {
            id,
            status: FastMessageStatus::Error,
            data: FastMessageData::new(method, d),
        }
    }

    /// Interpret the payload of an error message. Servers that send
    /// something other than `{name, message}` get a generic error.
    pub fn server_error(&self) -> FastMessageServerError {
        serde_json::from_value(self.data.d.clone()).unwrap_or_else(|_| {
            FastMessageServerError::new(
                "UnspecifiedServerError",
                "Server reported unspecified error.",
            )
        })
    }
}

/// Generator for outgoing message ids.
#[derive(Debug, Default)]
pub struct FastMessageId(u32);

impl FastMessageId {
    pub fn new() -> FastMessageId {
        FastMessageId(0)
    }

    pub fn next_id(&mut self) -> u32 {
        self.0 = if self.0 >= FP_MSGID_MAX { 1 } else { self.0 + 1 };
        self.0
    }
}

fn crc(data: &[u8]) -> u32 {
    u32::from(crc16::State::<crc16::ARC>::calculate(data))
}

/// Encode `msg` into `buf`.
pub fn encode_msg(msg: &FastMessage, buf: &mut BytesMut) -> Result<(), FastError> {
    let payload = serde_json::to_vec(&msg.data)?;
    if payload.len() > FP_MAX_DATA_LEN {
        return Err(FastError::DataTooLarge(payload.len()));
    }

    buf.reserve(FP_HEADER_SZ + payload.len());
    buf.put_u8(FP_VERSION_1);
    buf.put_u8(FP_TYPE_JSON);
    buf.put_u8(msg.status as u8);
    buf.put_u32(msg.id);
    buf.put_u32(crc(&payload));
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(())
}

/// Try to decode one message from the front of `buf`. Returns `Ok(None)` if
/// the buffer does not yet hold a complete message; otherwise consumes it.
pub fn decode_msg(buf: &mut BytesMut) -> Result<Option<FastMessage>, FastError> {
    if buf.len() < FP_HEADER_SZ {
        return Ok(None);
    }

    let version = buf[0];
    if version != FP_VERSION_1 {
        return Err(FastError::UnsupportedVersion(version));
    }
    let msg_type = buf[FP_OFF_TYPE];
    if msg_type != FP_TYPE_JSON {
        return Err(FastError::UnsupportedType(msg_type));
    }
    let status = FastMessageStatus::try_from(buf[FP_OFF_STATUS])?;
    let id = BigEndian::read_u32(&buf[FP_OFF_MSGID..FP_OFF_CRC]);
    let expected_crc = BigEndian::read_u32(&buf[FP_OFF_CRC..FP_OFF_LEN]);
    let data_len = BigEndian::read_u32(&buf[FP_OFF_LEN..FP_HEADER_SZ]) as usize;

    if data_len > FP_MAX_DATA_LEN {
        return Err(FastError::DataTooLarge(data_len));
    }

    if buf.len() < FP_HEADER_SZ + data_len {
        buf.reserve(FP_HEADER_SZ + data_len - buf.len());
        return Ok(None);
    }

    buf.advance(FP_HEADER_SZ);
    let payload = buf.split_to(data_len);

    let computed = crc(&payload);
    if computed != expected_crc {
        return Err(FastError::CrcMismatch {
            id,
            expected: expected_crc,
            computed,
        });
    }

    let data: FastMessageData = serde_json::from_slice(&payload)?;
    Ok(Some(FastMessage { id, status, data }))
}

/// Codec for framing a byte stream into [`FastMessage`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastRpc;

impl Decoder for FastRpc {
    type Item = FastMessage;
    type Error = FastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FastMessage>, FastError> {
        decode_msg(src)
    }
}

impl Encoder<FastMessage> for FastRpc {
    type Error = FastError;

    fn encode(&mut self, item: FastMessage, dst: &mut BytesMut) -> Result<(), FastError> {
        encode_msg(&item, dst)
    }
}
