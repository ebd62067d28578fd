//! Position-tagged wrappers around content operations.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use hubkit_shared::{ConnectivityState, FeatureInfo, HubError, Result};

use crate::builder::ContentBuilder;
use crate::operation::{
    ActionContext, Capabilities, ContentOperation, OperationContext, RescheduleHandle,
};
use crate::queue::{ExecutionEntry, ExecutionMode};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What an operation reported for one invocation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Finish,
    Fail(Arc<HubError>),
    Reschedule,
}

/// Identifies a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvocationTag {
    pub generation: u64,
    pub invocation: u64,
    pub entry: ExecutionEntry,
}

#[derive(Debug)]
pub(crate) struct OutcomeMessage {
    pub tag: InvocationTag,
    pub outcome: Outcome,
}

/// Callback sink for a single invocation. The first report wins.
#[derive(Debug, Clone)]
pub struct OutcomeSink {
    inner: Arc<SinkInner>,
}

#[derive(Debug)]
struct SinkInner {
    resolved: AtomicBool,
    tag: InvocationTag,
    outcomes: mpsc::UnboundedSender<OutcomeMessage>,
}

impl OutcomeSink {
    pub(crate) fn new(tag: InvocationTag, outcomes: mpsc::UnboundedSender<OutcomeMessage>) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                resolved: AtomicBool::new(false),
                tag,
                outcomes,
            }),
        }
    }

    /// The operation completed.
    pub fn finish(&self) {
        self.resolve(Outcome::Finish);
    }

    /// The operation failed. The error is handed to the next operation.
    pub fn fail(&self, error: HubError) {
        self.resolve(Outcome::Fail(Arc::new(error)));
    }

    /// Fail with an error that is already shared, e.g. a forwarded previous error.
    pub fn fail_shared(&self, error: Arc<HubError>) {
        self.resolve(Outcome::Fail(error));
    }

    /// Run this operation again once the scheduler gets another turn.
    pub fn reschedule(&self) {
        self.resolve(Outcome::Reschedule);
    }

    /// Whether an outcome was already reported.
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Position of the invoked operation.
    pub fn index(&self) -> usize {
        self.inner.tag.entry.operation_index
    }

    fn resolve(&self, outcome: Outcome) {
        let tag = self.inner.tag;
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            warn!(
                generation = tag.generation,
                index = tag.entry.operation_index,
                ?outcome,
                "content operation reported more than one outcome; ignoring"
            );
            return;
        }
        if self
            .inner
            .outcomes
            .send(OutcomeMessage { tag, outcome })
            .is_err()
        {
            debug!(
                index = tag.entry.operation_index,
                "loader stopped; outcome dropped"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// OperationWrapper
// ---------------------------------------------------------------------------

/// An operation bound to its position in the chain.
pub(crate) struct OperationWrapper {
    index: usize,
    operation: Arc<dyn ContentOperation>,
    capabilities: Capabilities,
}

impl fmt::Debug for OperationWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationWrapper")
            .field("index", &self.index)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl OperationWrapper {
    fn new(index: usize, operation: Arc<dyn ContentOperation>) -> Self {
        let capabilities = operation.capabilities();
        Self {
            index,
            operation,
            capabilities,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Invoke the operation in `mode`.
    pub fn perform(&self, mode: ExecutionMode, ctx: OperationContext, sink: OutcomeSink) {
        match mode {
            ExecutionMode::Main => self.operation.perform(ctx, sink),
            ExecutionMode::Pagination { page_index } => {
                if self.capabilities.pagination {
                    self.operation.append_content_for_page(page_index, ctx, sink);
                } else {
                    sink.finish();
                }
            }
        }
    }

    pub fn add_initial_content(&self, view_uri: &Url, builder: &mut ContentBuilder) {
        if self.capabilities.initial_content {
            self.operation.add_initial_content(view_uri, builder);
        }
    }

    pub fn notify_action(
        &self,
        action: &ActionContext,
        feature: &FeatureInfo,
        connectivity: ConnectivityState,
        reschedule: RescheduleHandle,
    ) {
        if self.capabilities.observes_actions {
            self.operation
                .on_action(action, feature, connectivity, reschedule);
        }
    }
}

// ---------------------------------------------------------------------------
// OperationChain
// ---------------------------------------------------------------------------

/// The fixed, ordered operations declared for a view.
#[derive(Debug)]
pub struct OperationChain {
    wrappers: Vec<OperationWrapper>,
}

impl OperationChain {
    /// Wrap `operations` at positions `0..N`. An empty chain is an error.
    pub fn new(view_uri: &Url, operations: Vec<Arc<dyn ContentOperation>>) -> Result<Self> {
        if operations.is_empty() {
            return Err(HubError::EmptyChain {
                view_uri: view_uri.to_string(),
            });
        }
        let wrappers = operations
            .into_iter()
            .enumerate()
            .map(|(index, operation)| OperationWrapper::new(index, operation))
            .collect();
        Ok(Self { wrappers })
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Capabilities of the operation at `index`.
    pub fn capabilities(&self, index: usize) -> Option<Capabilities> {
        self.wrappers.get(index).map(OperationWrapper::capabilities)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&OperationWrapper> {
        self.wrappers.get(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &OperationWrapper> {
        self.wrappers.iter()
    }

    /// Positions whose operations append paginated content.
    pub fn pagination_indices(&self) -> Vec<usize> {
        self.wrappers
            .iter()
            .filter(|w| w.capabilities.pagination)
            .map(|w| w.index)
            .collect()
    }
}
