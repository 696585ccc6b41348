use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use sluice_core::{
    CoreError, DataPacket, ElementId, FlowElement, FlowRun, FlowRunId, FlowRunStatus, FlowStore,
};

/// In-memory implementation of the flow store
///
/// Runs, per-run element sequences, and results live in RwLock'd maps.
/// Element order per run is the insertion order of `save_element`
/// calls, which also serves as the `created_at` tiebreak the read side
/// promises.
pub struct InMemoryFlowStore {
    runs: RwLock<HashMap<String, FlowRun>>,
    elements: RwLock<HashMap<String, Vec<FlowElement>>>,
    results: RwLock<HashMap<String, DataPacket>>,
}

impl InMemoryFlowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            elements: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryFlowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save_run(&self, run: &FlowRun) -> Result<FlowRunId, CoreError> {
        let mut runs = self.runs.write().await;

        if runs.contains_key(&run.id.0) {
            return Err(CoreError::StateStoreError(format!(
                "Duplicate flow run id: {}",
                run.id
            )));
        }

        runs.insert(run.id.0.clone(), run.clone());
        Ok(run.id.clone())
    }

    async fn find_run(&self, id: &FlowRunId) -> Result<Option<FlowRun>, CoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id.0).cloned())
    }

    async fn list_runs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<FlowRun>, CoreError> {
        let runs = self.runs.read().await;

        let mut result: Vec<FlowRun> = runs
            .values()
            .filter(|run| run.user_id == user_id)
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);

        Ok(result)
    }

    async fn update_run_status(
        &self,
        id: &FlowRunId,
        status: FlowRunStatus,
    ) -> Result<(), CoreError> {
        let mut runs = self.runs.write().await;

        if let Some(run) = runs.get_mut(&id.0) {
            run.advance_status(status);
        }

        Ok(())
    }

    async fn update_run_completion_time(
        &self,
        id: &FlowRunId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut runs = self.runs.write().await;

        if let Some(run) = runs.get_mut(&id.0) {
            run.completed_at = Some(completed_at);
        }

        Ok(())
    }

    async fn update_run_error_message(
        &self,
        id: &FlowRunId,
        message: &str,
    ) -> Result<(), CoreError> {
        let mut runs = self.runs.write().await;

        if let Some(run) = runs.get_mut(&id.0) {
            run.error_message = Some(message.to_string());
        }

        Ok(())
    }

    async fn save_element(&self, element: &FlowElement) -> Result<ElementId, CoreError> {
        let mut elements = self.elements.write().await;

        elements
            .entry(element.flow_run_id.0.clone())
            .or_default()
            .push(element.clone());

        Ok(element.id.clone())
    }

    async fn elements_for_run(&self, run_id: &FlowRunId) -> Result<Vec<FlowElement>, CoreError> {
        let elements = self.elements.read().await;
        Ok(elements.get(&run_id.0).cloned().unwrap_or_default())
    }

    async fn save_result(&self, run_id: &FlowRunId, result: DataPacket) -> Result<(), CoreError> {
        let mut results = self.results.write().await;
        results.insert(run_id.0.clone(), result.clone());
        drop(results);

        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(&run_id.0) {
            run.result = Some(result);
        }

        Ok(())
    }

    async fn find_result(&self, run_id: &FlowRunId) -> Result<Option<DataPacket>, CoreError> {
        let results = self.results.read().await;
        Ok(results.get(&run_id.0).cloned())
    }
}
