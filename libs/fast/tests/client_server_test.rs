// Copyright 2020 Joyent, Inc.
// Copyright 2026 Edgecast Cloud LLC.

// Tests are allowed to panic and use unwrap/expect
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use fast_rpc::protocol::FastMessageServerError;
use fast_rpc::{FastClient, FastError, server};

fn msg_handler(method: &str, args: &Value) -> Result<Vec<Value>, FastMessageServerError> {
    match method {
        "echo" => Ok(vec![args.clone()]),
        "count" => {
            let n = args[0].as_u64().unwrap_or(0);
            Ok((0..n).map(|i| json!(i)).collect())
        }
        "slow" => {
            std::thread::sleep(Duration::from_millis(20));
            Ok(vec![args.clone()])
        }
        _ => Err(FastMessageServerError::new(
            "UnsupportedMethodError",
            &format!("Unsupported function: {}", method),
        )),
    }
}

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let _ = server::handle_connection(socket, msg_handler).await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn client_server_comms() {
    let addr = start_server().await;
    let client = FastClient::connect(addr, Duration::from_secs(5))
        .await
        .expect("failed to connect");

    for x in 1..20 {
        let data_size = x * 1000;
        let payload = "a".repeat(data_size);
        let result = client.call("echo", json!([payload])).await.unwrap();

        assert_eq!(result.len(), 1);
        let echoed: Vec<String> = serde_json::from_value(result[0].clone()).unwrap();
        assert_eq!(echoed[0].len(), data_size);
    }

    client.close().await;
}

#[tokio::test]
async fn streamed_results_are_collected() {
    let addr = start_server().await;
    let client = FastClient::connect(addr, Duration::from_secs(5)).await.unwrap();

    let result = client.call("count", json!([4])).await.unwrap();
    assert_eq!(result, vec![json!(0), json!(1), json!(2), json!(3)]);

    let empty = client.call("count", json!([0])).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn server_errors_are_returned_to_caller() {
    let addr = start_server().await;
    let client = FastClient::connect(addr, Duration::from_secs(5)).await.unwrap();

    match client.call("nope", json!([])).await {
        Err(FastError::Server(err)) => assert_eq!(err.name, "UnsupportedMethodError"),
        other => panic!("expected server error, got {:?}", other),
    }

    // The connection is still usable afterwards.
    let result = client.call("echo", json!(["ok"])).await.unwrap();
    assert_eq!(result, vec![json!(["ok"])]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_calls_share_one_connection() {
    let addr = start_server().await;
    let client = Arc::new(FastClient::connect(addr, Duration::from_secs(5)).await.unwrap());

    let calls = (0..10).map(|i| {
        let client = Arc::clone(&client);
        async move { client.call("slow", json!([i])).await }
    });
    let results = futures_util::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), vec![json!([i])]);
    }
}

#[tokio::test]
async fn calls_after_close_fail() {
    let addr = start_server().await;
    let client = FastClient::connect(addr, Duration::from_secs(5)).await.unwrap();
    client.close().await;

    assert!(matches!(
        client.call("echo", json!([])).await,
        Err(FastError::Closed(_))
    ));
}
