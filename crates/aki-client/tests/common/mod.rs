//! Scripted HTTP/1.1 server shared by the integration tests.
//!
//! Replays JSON replies in arrival order and records every request it
//! receives. Requests beyond the script get a 500.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Script = Arc<Mutex<VecDeque<(u16, Value)>>>;
type Log = Arc<Mutex<Vec<Captured>>>;

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    /// Path and query, e.g. `/api/validate_key?key=k-1`.
    pub target: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Captured {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("{} {} sent a non-JSON body: {e}", self.method, self.target))
    }
}

pub struct TestServer {
    addr: String,
    requests: Log,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Starts a server on a random port replaying `replies` in order.
    pub async fn start(replies: Vec<(u16, Value)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let script: Script = Arc::new(Mutex::new(VecDeque::from(replies)));
        let requests: Log = Arc::default();
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let script = script.clone();
                                let log = log.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| replay(req, script.clone(), log.clone()));
                                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                        eprintln!("Server error: {}", err);
                                    }
                                });
                            }
                            Err(err) => {
                                eprintln!("Accept error: {}", err);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn replay(req: Request<Incoming>, script: Script, log: Log) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = req.into_body().collect().await?.to_bytes();
    log.lock().unwrap().push(Captured {
        method,
        target,
        content_type,
        body,
    });

    let (status, reply) = script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, json!({"error": "no scripted reply"})));
    Ok(Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&reply).unwrap())))
        .unwrap())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn deferred_replies() -> Vec<(u16, Value)> {
    vec![
        (200, json!({"success": true, "job_id": "JID1"})),
        (
            200,
            json!({
                "success": true,
                "job_state": "processing",
                "progress": {"progress": 40, "queue_position": 0, "estimate": 3, "progress_data": {"text": "Why"}},
            }),
        ),
        (
            200,
            json!({
                "success": true,
                "job_state": "done",
                "progress": {},
                "job_result": {"text": "Why did the chicken...", "num_generated_tokens": 7},
            }),
        ),
    ]
}
