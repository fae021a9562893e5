//! Loopback stand-in for the repository contents API.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};

const CONTENTS_PREFIX: &str = "/repos/acme/tools/contents/";

#[derive(Default)]
struct ApiState {
    files: BTreeMap<String, Vec<u8>>,
    rate_limited: bool,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<ApiState>>;

/// Serves `acme/tools` from an in-memory file map until dropped with the
/// test process.
pub struct StubApi {
    base_url: String,
    state: Shared,
}

impl StubApi {
    pub fn start(files: &[(&str, &[u8])]) -> Self {
        let state: Shared = Arc::new(Mutex::new(ApiState {
            files: files
                .iter()
                .map(|(p, b)| ((*p).to_owned(), b.to_vec()))
                .collect(),
            ..ApiState::default()
        }));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub");
        listener.set_nonblocking(true).expect("nonblocking stub");
        let port = listener.local_addr().expect("stub addr").port();

        let app = Router::new()
            .fallback(contents)
            .with_state(Arc::clone(&state));
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("stub runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("stub listener");
                axum::serve(listener, app).await.expect("serve stub");
            });
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            state,
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Answer every request with an exhausted quota.
    pub fn exhaust_rate_limit(&self) {
        self.state.lock().unwrap().rate_limited = true;
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

async fn contents(State(state): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());
    state.requests.push(target);

    if state.rate_limited {
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() + 3600)
            .unwrap_or_default();
        return (
            StatusCode::FORBIDDEN,
            [
                ("x-ratelimit-remaining", "0".to_owned()),
                ("x-ratelimit-reset", reset.to_string()),
            ],
            Json(json!({ "message": "API rate limit exceeded" })),
        )
            .into_response();
    }

    let Some(path) = uri.path().strip_prefix(CONTENTS_PREFIX) else {
        return not_found();
    };
    let path = path.trim_end_matches('/');

    let wants_raw = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("raw"));
    if wants_raw {
        return match state.files.get(path) {
            Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
            None => not_found(),
        };
    }

    if state.files.contains_key(path) {
        return Json(entry(path, "file")).into_response();
    }
    let prefix = format!("{path}/");
    let mut entries = Vec::new();
    let mut dirs = BTreeSet::new();
    for key in state.files.keys() {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, _)) => {
                dirs.insert(format!("{prefix}{dir}"));
            }
            None => entries.push(entry(key, "file")),
        }
    }
    entries.extend(dirs.iter().map(|d| entry(d, "dir")));
    if entries.is_empty() {
        return not_found();
    }
    Json(Value::Array(entries)).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
}

fn entry(path: &str, kind: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({ "name": name, "path": path, "type": kind })
}
