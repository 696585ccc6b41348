//!
//! Sluice Core - Core runtime for the Sluice flow execution engine
//!
//! This crate defines the domain model, repository traits, flow
//! contract, and queued executor for Sluice: a durable,
//! concurrency-limited engine for long-running flows that stream
//! intermediate elements and an optional terminal result.
//!
//! A flow is a user-registered, named procedure that consumes a typed
//! input and lazily produces a sequence of elements. The engine accepts
//! submissions, persists every run and its elements, schedules runs
//! under a global concurrency cap, requeues stalled runs after a
//! visibility timeout, supports cancellation, and exposes query
//! endpoints for status, streamed elements, and the final result.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Domain layer - run records, elements, statuses, repository traits
pub mod domain;

/// Application services - flow registry and the queued executor
pub mod application;

/// Executor configuration
pub mod config;

/// Error types
pub mod error;

/// Core payload types
pub mod types;

// Re-export key types
pub use application::queued_executor::QueuedExecutor;
pub use application::registry::FlowRegistry;
pub use config::ExecutorConfig;
pub use domain::flow_run::{ElementId, FlowElement, FlowRun, FlowRunId, FlowRunStatus};
pub use domain::repository::{FlowQueue, FlowStore};
pub use error::CoreError;
pub use types::DataPacket;

/// The lazy sequence of elements produced by a running flow
///
/// Each item is one intermediate element, or an error that fails the
/// run. The worker awaits items one at a time, so every emission is a
/// cancellation point.
pub type ElementStream = BoxStream<'static, Result<DataPacket, CoreError>>;

/// Mutable per-run holder handed to a flow by its worker
///
/// Carries the run id, the run's cancellation token, and the result
/// slot. `set_result` may be called at most once semantically; the last
/// write wins if a flow calls it repeatedly. The worker reads the slot
/// only after the element stream ends.
pub struct FlowRunContext {
    run_id: FlowRunId,
    cancellation: CancellationToken,
    result: RwLock<Option<DataPacket>>,
}

impl FlowRunContext {
    /// Create a context for the given run
    pub fn new(run_id: FlowRunId, cancellation: CancellationToken) -> Self {
        Self {
            run_id,
            cancellation,
            result: RwLock::new(None),
        }
    }

    /// The id of the run this context belongs to
    pub fn run_id(&self) -> &FlowRunId {
        &self.run_id
    }

    /// The run's cancellation token
    ///
    /// Flows are expected to be cooperative: await cancellation-aware
    /// operations, or select on this token beside long suspensions.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Record the terminal result; last write wins
    pub async fn set_result(&self, result: DataPacket) {
        *self.result.write().await = Some(result);
    }

    /// Take the recorded result, leaving the slot empty
    ///
    /// Used by the worker after the element stream ends.
    pub async fn take_result(&self) -> Option<DataPacket> {
        self.result.write().await.take()
    }
}

/// A user-supplied named procedure executed by the engine
///
/// The executor works against this erased interface: inputs and
/// elements are opaque [`DataPacket`]s. Strongly-typed flow authors
/// implement [`TypedFlow`] and wrap it in [`Typed`] instead of
/// implementing this trait directly.
#[async_trait]
pub trait Flow: Send + Sync {
    /// Registered name of the flow
    fn name(&self) -> &str;

    /// Descriptive input type name
    fn input_type(&self) -> &str {
        "json"
    }

    /// Descriptive element type name
    fn element_type(&self) -> &str {
        "json"
    }

    /// Descriptive result type name
    fn result_type(&self) -> &str {
        "json"
    }

    /// Start the flow, returning its lazy element stream
    ///
    /// The flow may call [`FlowRunContext::set_result`] at any point
    /// before the stream ends. Must be cooperatively cancellable.
    async fn run(
        &self,
        input: DataPacket,
        context: Arc<FlowRunContext>,
    ) -> Result<ElementStream, CoreError>;
}

/// A strongly-typed flow
///
/// The engine only ever sees [`Flow`]; this trait lets authors work
/// with concrete serde types and convert at the boundary via the
/// [`Typed`] adapter.
#[async_trait]
pub trait TypedFlow: Send + Sync {
    /// Input type, deserialized from the submitted payload
    type Input: DeserializeOwned + Send + 'static;

    /// Element type, serialized into persisted elements
    type Element: Serialize + Send + 'static;

    /// Registered name of the flow
    fn name(&self) -> &str;

    /// Start the flow with a typed input
    async fn run(
        &self,
        input: Self::Input,
        context: Arc<FlowRunContext>,
    ) -> Result<BoxStream<'static, Result<Self::Element, CoreError>>, CoreError>;
}

/// Adapter implementing the erased [`Flow`] interface over a [`TypedFlow`]
///
/// Deserializes the opaque input on entry and serializes each typed
/// element on exit. A submission whose input does not match the typed
/// flow's input shape fails the run with a serialization error.
pub struct Typed<F>(F);

impl<F> Typed<F> {
    /// Wrap a typed flow for registration
    pub fn new(flow: F) -> Self {
        Self(flow)
    }
}

#[async_trait]
impl<F> Flow for Typed<F>
where
    F: TypedFlow,
{
    fn name(&self) -> &str {
        self.0.name()
    }

    fn input_type(&self) -> &str {
        std::any::type_name::<F::Input>()
    }

    fn element_type(&self) -> &str {
        std::any::type_name::<F::Element>()
    }

    async fn run(
        &self,
        input: DataPacket,
        context: Arc<FlowRunContext>,
    ) -> Result<ElementStream, CoreError> {
        let input = input.to::<F::Input>()?;
        let elements = self.0.run(input, context).await?;

        Ok(elements
            .map(|item| item.and_then(|element| DataPacket::from(&element).map_err(Into::into)))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde::Deserialize;
    use serde_json::json;

    #[tokio::test]
    async fn test_context_result_last_write_wins() {
        let context = FlowRunContext::new(FlowRunId::new(), CancellationToken::new());

        context.set_result(DataPacket::from_string("first")).await;
        context.set_result(DataPacket::from_string("second")).await;

        let result = context.take_result().await;
        assert_eq!(result.unwrap().as_str(), Some("second"));
        assert!(context.take_result().await.is_none());
    }

    #[tokio::test]
    async fn test_context_without_result() {
        let context = FlowRunContext::new(FlowRunId::new(), CancellationToken::new());
        assert!(context.take_result().await.is_none());
    }

    #[derive(Deserialize)]
    struct CountInput {
        up_to: u32,
    }

    #[derive(Serialize)]
    struct CountElement {
        n: u32,
    }

    struct CountFlow;

    #[async_trait]
    impl TypedFlow for CountFlow {
        type Input = CountInput;
        type Element = CountElement;

        fn name(&self) -> &str {
            "count"
        }

        async fn run(
            &self,
            input: Self::Input,
            _context: Arc<FlowRunContext>,
        ) -> Result<BoxStream<'static, Result<Self::Element, CoreError>>, CoreError> {
            Ok(stream::iter((1..=input.up_to).map(|n| Ok(CountElement { n }))).boxed())
        }
    }

    #[tokio::test]
    async fn test_typed_adapter_converts_input_and_elements() {
        let flow = Typed::new(CountFlow);
        let context = Arc::new(FlowRunContext::new(
            FlowRunId::new(),
            CancellationToken::new(),
        ));

        let elements: Vec<_> = flow
            .run(DataPacket::new(json!({"up_to": 3})), context)
            .await
            .unwrap()
            .collect()
            .await;

        let values: Vec<_> = elements
            .into_iter()
            .map(|e| e.unwrap().into_value())
            .collect();
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn test_typed_adapter_rejects_mismatched_input() {
        let flow = Typed::new(CountFlow);
        let context = Arc::new(FlowRunContext::new(
            FlowRunId::new(),
            CancellationToken::new(),
        ));

        let result = flow
            .run(DataPacket::new(json!({"wrong": true})), context)
            .await;

        assert!(matches!(result, Err(CoreError::SerializationError(_))));
    }
}
