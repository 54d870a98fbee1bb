//! Scripted relay fakes shared by the chat tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cryptai_relay::{
    ChatRequest, ChatResponse, ChatService, ProofService, ProofStatus, RelayError, RelayResult,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time;

pub(crate) fn relay_unavailable(path: &str) -> RelayError {
    RelayError::Status {
        stage: "scripted",
        url: format!("http://localhost:8000/{path}"),
        status: 502,
        body: "bad gateway".to_string(),
    }
}

/// Answers chat requests in order after a fixed latency, recording every request.
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<RelayResult<ChatResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
    latency: Duration,
}

impl ScriptedChat {
    pub(crate) fn new(replies: Vec<RelayResult<ChatResponse>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatService for ScriptedChat {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, RelayResult<ChatResponse>> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatResponse::default()));
        let latency = self.latency;
        async move {
            time::sleep(latency).await;
            reply
        }
        .boxed()
    }
}

/// Replays scripted proof answers, then keeps answering `pending`.
///
/// A fixed answer registered for one proof id takes precedence over the script.
pub(crate) struct ScriptedProofs {
    script: Mutex<VecDeque<RelayResult<ProofStatus>>>,
    fixed: Mutex<HashMap<String, ProofStatus>>,
    queried: Mutex<Vec<String>>,
}

impl ScriptedProofs {
    pub(crate) fn new(script: Vec<RelayResult<ProofStatus>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fixed: Mutex::new(HashMap::new()),
            queried: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn answer(&self, proof_id: &str, status: ProofStatus) {
        self.fixed.lock().unwrap().insert(proof_id.to_string(), status);
    }

    pub(crate) fn queries(&self) -> usize {
        self.queried.lock().unwrap().len()
    }

    pub(crate) fn queries_for(&self, proof_id: &str) -> usize {
        self.queried
            .lock()
            .unwrap()
            .iter()
            .filter(|queried| *queried == proof_id)
            .count()
    }
}

impl ProofService for ScriptedProofs {
    fn proof_status<'a>(&'a self, proof_id: &'a str) -> BoxFuture<'a, RelayResult<ProofStatus>> {
        self.queried.lock().unwrap().push(proof_id.to_string());
        let fixed = self.fixed.lock().unwrap().get(proof_id).cloned();
        let next = match fixed {
            Some(status) => Ok(status),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ProofStatus::pending())),
        };
        async move { next }.boxed()
    }
}

/// Accepts every status query and never answers it.
#[derive(Default)]
pub(crate) struct SilentProofs {
    queries: AtomicUsize,
}

impl SilentProofs {
    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ProofService for SilentProofs {
    fn proof_status<'a>(&'a self, _proof_id: &'a str) -> BoxFuture<'a, RelayResult<ProofStatus>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().boxed()
    }
}
