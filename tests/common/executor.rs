//! Scripted lookup executor for driving the dispatcher without a network

use record_sweep::{Classification, LookupExecutor, Subject, SubjectId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// One recorded call to the executor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub subject_id: SubjectId,
    pub endpoint: String,
}

/// Replays per-subject classification scripts
///
/// Subjects without a script (or whose script ran out) get `fallback`.
/// Subjects marked as gated wait for a permit on `gate` before answering.
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<SubjectId, VecDeque<Classification>>>,
    fallback: Classification,
    calls: Mutex<Vec<Call>>,
    gated: Vec<SubjectId>,
    gate: Arc<Semaphore>,
}

impl ScriptedExecutor {
    pub fn new(fallback: Classification) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            gated: Vec::new(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Answer `subject_id` with `script`, one entry per call
    pub fn script(self, subject_id: &str, script: Vec<Classification>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(SubjectId::new(subject_id), script.into());
        self
    }

    /// Hold calls for `subject_id` until [`ScriptedExecutor::open_gate`]
    pub fn gated(mut self, subject_id: &str) -> Self {
        self.gated.push(SubjectId::new(subject_id));
        self
    }

    /// Release up to `permits` held calls
    pub fn open_gate(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, subject_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.subject_id.as_str() == subject_id)
            .count()
    }
}

#[async_trait::async_trait]
impl LookupExecutor for ScriptedExecutor {
    async fn execute(&self, subject: &Subject, endpoint: &str) -> Classification {
        self.calls.lock().unwrap().push(Call {
            subject_id: subject.id.clone(),
            endpoint: endpoint.to_string(),
        });

        if self.gated.contains(&subject.id) {
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&subject.id)
            .and_then(|script| script.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
