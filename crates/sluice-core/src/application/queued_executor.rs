use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::StreamExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::registry::FlowRegistry;
use crate::config::ExecutorConfig;
use crate::domain::flow_run::{FlowElement, FlowRun, FlowRunId, FlowRunStatus};
use crate::domain::repository::{FlowQueue, FlowStore};
use crate::{CoreError, DataPacket, Flow, FlowRunContext};

/// State shared between the executor handle, the dispatcher, and workers
struct Shared {
    store: Arc<dyn FlowStore>,
    queue: Arc<dyn FlowQueue>,
    registry: Arc<FlowRegistry>,

    /// Concurrency slots; a worker holds one permit for the whole run
    slots: Arc<Semaphore>,

    /// Live cancellation handles, keyed by run id
    ///
    /// A handle is inserted when a worker takes ownership of a run and
    /// removed when the worker exits, so presence here means "a worker
    /// is currently executing this run".
    cancellations: DashMap<String, CancellationToken>,
}

/// Durable, concurrency-limited executor for streaming flows
///
/// Couples the flow store, the flow queue, and the registry: a
/// background dispatcher requeues stalled runs, pops pending ids under
/// a global concurrency cap, and spawns one worker per run. Workers
/// drive the flow's element stream, persist every element and the
/// optional result, and reify every outcome into the run's status.
pub struct QueuedExecutor {
    shared: Arc<Shared>,
    config: ExecutorConfig,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedExecutor {
    /// Create a new executor over the given store, queue, and registry
    ///
    /// The registry must be fully populated before
    /// [`start`](Self::start) is called; it is read-only from here on.
    pub fn new(
        store: Arc<dyn FlowStore>,
        queue: Arc<dyn FlowQueue>,
        registry: Arc<FlowRegistry>,
        config: ExecutorConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                queue,
                registry,
                slots: Arc::new(Semaphore::new(config.max_concurrent)),
                cancellations: DashMap::new(),
            }),
            config,
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
        })
    }

    /// Start the background dispatcher
    ///
    /// Calling `start` on an already-started executor is a no-op.
    pub async fn start(&self) {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            warn!("Dispatcher already running, ignoring start");
            return;
        }

        let shared = self.shared.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        *dispatcher = Some(tokio::spawn(async move {
            dispatch_loop(shared, config, shutdown).await;
        }));

        info!(
            "Queued executor started (max_concurrent: {})",
            self.config.max_concurrent
        );
    }

    /// Initiate graceful shutdown and await the dispatcher's exit
    ///
    /// In-flight workers are not canceled; they drain to completion on
    /// their own tasks. Idempotent.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Dispatcher task failed to join: {}", e);
            }
            info!("Queued executor stopped");
        }
    }

    /// Submit a new run of the named flow
    ///
    /// Persists the run in Pending status and enqueues its id. Returns
    /// the new run id without waiting for dispatch. Fails with
    /// [`CoreError::FlowNotFound`] when the name is not registered, in
    /// which case neither the store nor the queue is touched.
    pub async fn submit(
        &self,
        flow_name: &str,
        input: DataPacket,
        user_id: &str,
    ) -> Result<FlowRunId, CoreError> {
        if !self.shared.registry.contains(flow_name) {
            return Err(CoreError::FlowNotFound(flow_name.to_string()));
        }

        let run = FlowRun::new(flow_name, user_id, input);
        let run_id = self.shared.store.save_run(&run).await?;
        self.shared.queue.push_pending(&run_id).await?;

        debug!("Submitted flow run {} ({})", run_id, flow_name);
        Ok(run_id)
    }

    /// Current status of a run
    ///
    /// Returns Pending for unknown ids: a caller polling immediately
    /// after submit must never observe an error, and the reference
    /// boundary does not distinguish "never submitted" from "just
    /// submitted".
    pub async fn get_status(&self, run_id: &FlowRunId) -> Result<FlowRunStatus, CoreError> {
        let run = self.shared.store.find_run(run_id).await?;
        Ok(run.map(|r| r.status).unwrap_or(FlowRunStatus::Pending))
    }

    /// All elements emitted by a run so far, in emission order
    pub async fn get_elements(&self, run_id: &FlowRunId) -> Result<Vec<FlowElement>, CoreError> {
        self.shared.store.elements_for_run(run_id).await
    }

    /// The run's terminal result, if the flow set one
    pub async fn get_result(&self, run_id: &FlowRunId) -> Result<Option<DataPacket>, CoreError> {
        self.shared.store.find_result(run_id).await
    }

    /// Cancel a currently-executing run
    ///
    /// Signals the run's cancellation handle and persists the Canceled
    /// status. Returns `false` when no worker is executing the run: it
    /// is still pending, already terminal, or unknown. A pending run is
    /// deliberately not removed from the queue; if its status has been
    /// flipped to a terminal value by the time a worker pops it, the
    /// worker's preflight check refuses to execute it.
    pub async fn cancel(&self, run_id: &FlowRunId) -> Result<bool, CoreError> {
        let token = match self.shared.cancellations.get(&run_id.0) {
            Some(entry) => entry.value().clone(),
            None => return Ok(false),
        };

        token.cancel();
        self.shared
            .store
            .update_run_status(run_id, FlowRunStatus::Canceled)
            .await?;

        info!("Canceled flow run {}", run_id);
        Ok(true)
    }
}

/// Background dispatcher loop
///
/// Each tick requeues expired in-progress runs, then pops at most one
/// pending id when concurrency slots are free and spawns a worker for
/// it. After a successful dispatch the loop continues immediately so
/// bursts drain at semaphore speed; otherwise it sleeps the idle
/// interval. Internal errors are logged and followed by a longer
/// backoff; the loop itself never dies.
async fn dispatch_loop(shared: Arc<Shared>, config: ExecutorConfig, shutdown: CancellationToken) {
    debug!("Dispatcher loop started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let pause = match dispatch_tick(&shared).await {
            Ok(true) => continue,
            Ok(false) => config.idle_interval,
            Err(e) => {
                warn!("Dispatcher tick failed: {}", e);
                config.error_backoff
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    debug!("Dispatcher loop exited");
}

/// One dispatcher tick; returns whether a run was dispatched
///
/// The concurrency slot is acquired here, before the pop: popping
/// first would move ids into in-progress only to park their workers on
/// the semaphore, where their heartbeats age toward a spurious
/// requeue.
async fn dispatch_tick(shared: &Arc<Shared>) -> Result<bool, CoreError> {
    for expired in shared.queue.requeue_expired().await? {
        warn!("Requeued stalled flow run {}", expired);
    }

    let permit = match shared.slots.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => return Ok(false),
    };

    match shared.queue.pop_pending().await? {
        Some(run_id) => {
            let shared = shared.clone();
            tokio::spawn(async move {
                run_worker(shared, run_id, permit).await;
            });
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Per-run worker: drives one flow run to a terminal status
///
/// Every outcome is reified into the run record; errors never escape
/// this function. The concurrency permit is held for the whole run and
/// released on drop along every path.
async fn run_worker(shared: Arc<Shared>, run_id: FlowRunId, _permit: OwnedSemaphorePermit) {
    let run = match shared.store.find_run(&run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            warn!("Flow run {} not found in store, dropping", run_id);
            pop_in_progress(&shared, &run_id).await;
            return;
        }
        Err(e) => {
            error!("Failed to load flow run {}: {}", run_id, e);
            fail_run(&shared, &run_id, &e.to_string()).await;
            pop_in_progress(&shared, &run_id).await;
            return;
        }
    };

    // Preflight: only a Pending run may be executed. A requeued run
    // whose original worker is still alive shows Running here, and a
    // canceled-before-dispatch run shows a terminal status. In both
    // cases the in-progress entry is left untouched: another worker may
    // still own it, and a double remove would race.
    if run.status != FlowRunStatus::Pending {
        debug!(
            "Skipping flow run {} in status {}, nothing to execute",
            run_id, run.status
        );
        return;
    }

    let flow = match shared.registry.get(&run.flow_name) {
        Some(flow) => flow,
        None => {
            let message = CoreError::FlowNotFound(run.flow_name.clone()).to_string();
            warn!("Flow run {} failed: {}", run_id, message);
            fail_run(&shared, &run_id, &message).await;
            pop_in_progress(&shared, &run_id).await;
            return;
        }
    };

    let token = CancellationToken::new();
    shared
        .cancellations
        .insert(run_id.0.clone(), token.clone());

    let context = Arc::new(FlowRunContext::new(run_id.clone(), token.clone()));
    let outcome = drive_flow(&shared, &run, flow, context, token).await;

    match outcome {
        Ok(()) => {
            info!("Flow run {} completed", run_id);
            update_status(&shared, &run_id, FlowRunStatus::Completed).await;
        }
        Err(CoreError::Canceled) => {
            info!("Flow run {} canceled", run_id);
            update_status(&shared, &run_id, FlowRunStatus::Canceled).await;
        }
        Err(e) => {
            warn!("Flow run {} failed: {}", run_id, e);
            fail_run(&shared, &run_id, &e.to_string()).await;
        }
    }

    pop_in_progress(&shared, &run_id).await;
    shared.cancellations.remove(&run_id.0);
}

/// Drive the flow's element stream to its end
///
/// Persists each element and refreshes the heartbeat per emission so
/// long-running element production does not look stuck. Every await on
/// the stream races the cancellation token.
async fn drive_flow(
    shared: &Arc<Shared>,
    run: &FlowRun,
    flow: Arc<dyn Flow>,
    context: Arc<FlowRunContext>,
    token: CancellationToken,
) -> Result<(), CoreError> {
    shared.queue.reset_heartbeat(&run.id).await?;
    shared
        .store
        .update_run_status(&run.id, FlowRunStatus::Running)
        .await?;

    debug!("Flow run {} executing flow '{}'", run.id, run.flow_name);

    let mut elements = flow.run(run.input.clone(), context.clone()).await?;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Err(CoreError::Canceled),
            next = elements.next() => match next {
                Some(Ok(content)) => {
                    let element = FlowElement::new(run.id.clone(), content);
                    shared.store.save_element(&element).await?;
                    shared.queue.reset_heartbeat(&run.id).await?;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }

    // The result is persisted before the Completed transition, so any
    // observer seeing Completed is guaranteed to find the result.
    if let Some(result) = context.take_result().await {
        shared.store.save_result(&run.id, result).await?;
    }

    Ok(())
}

/// Best-effort terminal status write; failures are logged, not raised
async fn update_status(shared: &Arc<Shared>, run_id: &FlowRunId, status: FlowRunStatus) {
    if let Err(e) = shared.store.update_run_status(run_id, status).await {
        error!("Failed to record status {} for run {}: {}", status, run_id, e);
    }
}

/// Mark a run Failed with the given message
async fn fail_run(shared: &Arc<Shared>, run_id: &FlowRunId, message: &str) {
    update_status(shared, run_id, FlowRunStatus::Failed).await;
    if let Err(e) = shared.store.update_run_error_message(run_id, message).await {
        error!("Failed to record error for run {}: {}", run_id, e);
    }
}

/// Best-effort in-progress removal
async fn pop_in_progress(shared: &Arc<Shared>, run_id: &FlowRunId) {
    if let Err(e) = shared.queue.pop_in_progress(run_id).await {
        error!("Failed to remove run {} from in-progress: {}", run_id, e);
    }
}
