// Copyright 2019 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! This module provides the interface for creating Fast clients.
//!
//! A [`FastClient`] owns a single connection. Calls may be issued
//! concurrently; a background task writes requests, tags them with message
//! ids, and routes each response back to its caller by id.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::protocol::{
    FastError, FastMessage, FastMessageData, FastMessageId, FastMessageStatus, FastRpc,
};

/// Requests waiting to be written to the connection.
const REQUEST_QUEUE_DEPTH: usize = 128;

type Reply = oneshot::Sender<Result<Vec<Value>, FastError>>;

enum Request {
    Call {
        method: String,
        args: Value,
        reply: Reply,
    },
    Close,
}

struct Pending {
    method: String,
    results: Vec<Value>,
    reply: Reply,
}

pub struct FastClient {
    requests: mpsc::Sender<Request>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FastClient {
    /// Connect to a Fast server, giving up after `timeout`.
    pub async fn connect<A>(addr: A, timeout: Duration) -> Result<FastClient, FastError>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let label = format!("{:?}", addr);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| FastError::ConnectTimeout(label.clone()))??;
        stream.set_nodelay(true)?;
        debug!(address = %label, "fast connection established");
        Ok(FastClient::from_io(stream))
    }

    /// Wrap an already established transport.
    pub fn from_io<T>(io: T) -> FastClient
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let framed = Framed::new(io, FastRpc);
        let task = tokio::spawn(run_connection(framed, rx));
        FastClient {
            requests: tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Invoke `method` with `args` and collect the `d` payload of every data
    /// message sent before the server ends the call. Array payloads are
    /// flattened, so a method that streams one object per message and one
    /// that returns `[obj]` look the same to the caller.
    pub async fn call(&self, method: &str, args: Value) -> Result<Vec<Value>, FastError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Call {
                method: method.to_string(),
                args,
                reply,
            })
            .await
            .map_err(|_| FastError::Closed("client is closed".to_string()))?;

        rx.await
            .map_err(|_| FastError::Closed("connection task exited".to_string()))?
    }

    /// Stop accepting calls, let in-flight calls finish, and drop the
    /// connection.
    pub async fn close(&self) {
        let _ = self.requests.send(Request::Close).await;
        let task = self.task.lock().await.take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "fast connection task failed");
        }
    }
}

async fn run_connection<T>(framed: Framed<T, FastRpc>, mut requests: mpsc::Receiver<Request>)
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut sink, mut stream) = framed.split();
    let mut ids = FastMessageId::new();
    let mut pending: HashMap<u32, Pending> = HashMap::new();
    let mut accepting = true;

    loop {
        if !accepting && pending.is_empty() {
            break;
        }

        tokio::select! {
            request = requests.recv(), if accepting => match request {
                Some(Request::Call { method, args, reply }) => {
                    let id = ids.next_id();
                    let msg = FastMessage::data(id, FastMessageData::new(method.clone(), args));
                    if let Err(e) = sink.send(msg).await {
                        let reason = e.to_string();
                        let _ = reply.send(Err(e));
                        fail_all(&mut pending, &reason);
                        return;
                    }
                    pending.insert(id, Pending { method, results: Vec::new(), reply });
                }
                Some(Request::Close) | None => accepting = false,
            },
            frame = stream.next() => match frame {
                Some(Ok(msg)) => dispatch(&mut pending, msg),
                Some(Err(e)) => {
                    fail_all(&mut pending, &e.to_string());
                    return;
                }
                None => {
                    fail_all(&mut pending, "server closed the connection");
                    return;
                }
            },
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "error closing fast connection");
    }
}

fn dispatch(pending: &mut HashMap<u32, Pending>, msg: FastMessage) {
    let Some(entry) = pending.get_mut(&msg.id) else {
        warn!(msg_id = msg.id, "fast response for unknown message id");
        return;
    };

    match msg.status {
        FastMessageStatus::Data => match msg.data.d {
            Value::Array(items) => entry.results.extend(items),
            other => entry.results.push(other),
        },
        FastMessageStatus::End => {
            if let Some(done) = pending.remove(&msg.id) {
                debug!(method = %done.method, msg_id = msg.id, "fast call complete");
                let _ = done.reply.send(Ok(done.results));
            }
        }
        FastMessageStatus::Error => {
            let err = msg.server_error();
            if let Some(done) = pending.remove(&msg.id) {
                debug!(
                    method = %done.method,
                    msg_id = msg.id,
                    error = %err.name,
                    "fast call returned error"
                );
                let _ = done.reply.send(Err(FastError::Server(err)));
            }
        }
    }
}

fn fail_all(pending: &mut HashMap<u32, Pending>, reason: &str) {
    for (_, entry) in pending.drain() {
        let _ = entry.reply.send(Err(FastError::Closed(reason.to_string())));
    }
}
