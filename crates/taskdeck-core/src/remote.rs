use std::future::Future;
use std::time::Duration;

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::task::{RawTodo, RemoteTodoPayload};

/// Remote task collection. Reads are a listing of raw records; writes are
/// per-item create and update calls whose response bodies are ignored.
pub trait TaskRemote: Send + Sync + 'static {
    fn fetch_todos(&self) -> impl Future<Output = anyhow::Result<Vec<RawTodo>>> + Send;

    fn create_todo(
        &self,
        payload: &RemoteTodoPayload,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn update_todo(
        &self,
        id: u64,
        payload: &RemoteTodoPayload,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("remote base URL is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for task remote")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        payload: &RemoteTodoPayload,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_string(payload).context("failed encoding todo payload")?;
        let response = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed requesting {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("remote returned HTTP {status} for {url}"));
        }
        debug!(url, %status, "remote write accepted");
        Ok(())
    }
}

impl TaskRemote for HttpRemote {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn fetch_todos(&self) -> anyhow::Result<Vec<RawTodo>> {
        let url = format!("{}/todos?page=1&limit=10", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("failed requesting {url}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body for {url}"))?;

        if !status.is_success() {
            warn!(url, %status, "task listing returned non-success status");
            return Err(anyhow!("remote returned HTTP {status} for {url}"));
        }

        let todos: Vec<RawTodo> = serde_json::from_str(&body)
            .with_context(|| format!("failed parsing task listing from {url}"))?;
        debug!(count = todos.len(), "fetched remote todos");
        Ok(todos)
    }

    #[instrument(skip(self, payload), fields(base = %self.base_url))]
    async fn create_todo(&self, payload: &RemoteTodoPayload) -> anyhow::Result<()> {
        let url = format!("{}/todos", self.base_url);
        self.send_json(self.client.post(&url), &url, payload).await
    }

    #[instrument(skip(self, payload), fields(base = %self.base_url))]
    async fn update_todo(&self, id: u64, payload: &RemoteTodoPayload) -> anyhow::Result<()> {
        let url = format!("{}/todos/{id}", self.base_url);
        self.send_json(self.client.put(&url), &url, payload).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(RemoteTodoPayload),
    Update { id: u64, payload: RemoteTodoPayload },
}

#[derive(Debug, Default)]
struct MemoryState {
    todos: Vec<RawTodo>,
    calls: Vec<RemoteCall>,
    fail_fetch: bool,
    fail_writes: bool,
}

/// In-process remote used for offline sessions and tests.
///
/// Like the public placeholder API, a create never reports the id it
/// stored, so the manager keeps its own local id. Updates for an id this
/// remote never assigned are stored under that id instead of failing,
/// which keeps edits of locally added tasks working offline.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new(todos: Vec<RawTodo>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                todos,
                ..MemoryState::default()
            }),
        }
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn todos(&self) -> Vec<RawTodo> {
        self.state.lock().todos.clone()
    }
}

impl TaskRemote for MemoryRemote {
    async fn fetch_todos(&self) -> anyhow::Result<Vec<RawTodo>> {
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(anyhow!("memory remote: listing unavailable"));
        }
        Ok(state.todos.clone())
    }

    async fn create_todo(&self, payload: &RemoteTodoPayload) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Create(payload.clone()));
        if state.fail_writes {
            return Err(anyhow!("memory remote: create rejected"));
        }
        let id = state.todos.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        state.todos.push(RawTodo {
            id,
            user_id: Some(payload.user_id),
            title: payload.title.clone(),
            completed: payload.completed,
        });
        Ok(())
    }

    async fn update_todo(&self, id: u64, payload: &RemoteTodoPayload) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Update {
            id,
            payload: payload.clone(),
        });
        if state.fail_writes {
            return Err(anyhow!("memory remote: update rejected"));
        }
        let record = RawTodo {
            id,
            user_id: Some(payload.user_id),
            title: payload.title.clone(),
            completed: payload.completed,
        };
        match state.todos.iter_mut().find(|t| t.id == id) {
            Some(todo) => *todo = record,
            None => {
                debug!(id, "memory remote: storing update for unassigned id");
                state.todos.push(record);
            }
        }
        Ok(())
    }
}
