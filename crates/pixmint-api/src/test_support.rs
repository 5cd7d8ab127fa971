use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pixmint_db::Database;

use crate::error::ProviderError;
use crate::provider::{ImageProvider, ProviderRequest};
use crate::state::{AppState, AppStateInner};

/// Provider that replays scripted outcomes. Falls back to a fixed URL once the script runs out.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn push(&self, outcome: Result<String, ProviderError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("https://images.test/{}.png", n)))
    }
}

pub fn test_state(starting_tokens: i64) -> (AppState, Arc<ScriptedProvider>) {
    let db = Database::open_in_memory(starting_tokens).unwrap();
    let provider = Arc::new(ScriptedProvider::default());
    let state = AppStateInner::new(db, provider.clone());
    (state, provider)
}
