// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! This module provides the interface for creating Fast servers.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::protocol::{
    FastError, FastMessage, FastMessageData, FastMessageServerError, FastMessageStatus, FastRpc,
};

/// Handle a Fast protocol connection.
///
/// `handler` is called with the method name and arguments of every request.
/// Each returned value is sent as one data message followed by an end
/// message; an `Err` is sent as an error message.
pub async fn handle_connection<T, F>(socket: T, mut handler: F) -> Result<(), FastError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&str, &Value) -> Result<Vec<Value>, FastMessageServerError> + Send,
{
    let mut framed = Framed::new(socket, FastRpc);

    while let Some(result) = framed.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "failed to process connection");
                return Err(e);
            }
        };

        if msg.status != FastMessageStatus::Data {
            debug!(msg_id = msg.id, "ignoring non-data request");
            continue;
        }

        let method = msg.data.m.name.clone();
        debug!(method = %method, msg_id = msg.id, "processing fast message");

        match handler(&method, &msg.data.d) {
            Ok(values) => {
                for value in values {
                    let data = FastMessageData::new(method.clone(), Value::Array(vec![value]));
                    framed.feed(FastMessage::data(msg.id, data)).await?;
                }
                framed.send(FastMessage::end(msg.id, method)).await?;
            }
            Err(err) => {
                framed.send(FastMessage::error(msg.id, method, &err)).await?;
            }
        }
    }

    Ok(())
}
