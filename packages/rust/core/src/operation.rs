//! Content operations: the pluggable units that fill a view's builder.
//!
//! An operation is created once per view by a [`ContentOperationFactory`] and
//! reused for every pass of that view's chain. Each invocation must report
//! exactly one outcome on its [`OutcomeSink`], either synchronously from
//! `perform` or later from a spawned task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use hubkit_shared::{ConnectivityState, FeatureInfo, HubError, JsonMap, Result};

use crate::builder::{BuilderHandle, ContentBuilder};
use crate::loader::Command;
use crate::wrapper::OutcomeSink;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Optional behaviours an operation opts into.
///
/// Read once when the operation is wrapped into a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Contributes to the skeleton model built when a loader is created.
    pub initial_content: bool,
    /// Appends content when the next page is requested.
    pub pagination: bool,
    /// Receives action notifications.
    pub observes_actions: bool,
}

impl Capabilities {
    pub fn with_initial_content(mut self) -> Self {
        self.initial_content = true;
        self
    }

    pub fn with_pagination(mut self) -> Self {
        self.pagination = true;
        self
    }

    pub fn observing_actions(mut self) -> Self {
        self.observes_actions = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Everything an operation receives for one invocation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub view_uri: Url,
    pub feature: Arc<FeatureInfo>,
    /// Connectivity resolved at the start of the pass.
    pub connectivity: ConnectivityState,
    /// Builder of the pass in flight.
    pub builder: BuilderHandle,
    /// Error reported by the previous operation, if it failed.
    pub previous_error: Option<Arc<HubError>>,
    /// Handle for re-running the chain from this operation at a later time.
    pub reschedule: RescheduleHandle,
}

/// An action performed in the view, forwarded to observing operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionContext {
    /// Action identifier, e.g. `default:toggle`.
    pub identifier: String,
    pub view_uri: Url,
    /// Identifier of the component the action originated from.
    pub component: Option<String>,
    pub custom_data: JsonMap,
}

impl ActionContext {
    pub fn new(identifier: impl Into<String>, view_uri: Url) -> Self {
        Self {
            identifier: identifier.into(),
            view_uri,
            component: None,
            custom_data: JsonMap::new(),
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Asks the loader to re-run the chain starting at one operation.
///
/// Holding a handle does not keep the loader alive.
#[derive(Debug, Clone)]
pub struct RescheduleHandle {
    commands: mpsc::WeakUnboundedSender<Command>,
    index: usize,
}

impl RescheduleHandle {
    pub(crate) fn new(commands: mpsc::WeakUnboundedSender<Command>, index: usize) -> Self {
        Self { commands, index }
    }

    /// Position of the operation this handle belongs to.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Request a reschedule. Returns `false` if the loader has stopped.
    pub fn request(&self) -> bool {
        let Some(commands) = self.commands.upgrade() else {
            debug!(index = self.index, "loader stopped; reschedule request dropped");
            return false;
        };
        commands
            .send(Command::Reschedule { index: self.index })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// ContentOperation
// ---------------------------------------------------------------------------

/// A unit of work that adds content to a view.
pub trait ContentOperation: Send + Sync {
    /// Mutate `ctx.builder` and report exactly one outcome on `sink`.
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink);

    /// Optional behaviours. Defaults to none.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Add skeleton content shown before the first load completes.
    fn add_initial_content(&self, _view_uri: &Url, _builder: &mut ContentBuilder) {}

    /// Append content for `page_index` (starting at 1).
    fn append_content_for_page(&self, _page_index: usize, _ctx: OperationContext, sink: OutcomeSink) {
        sink.finish();
    }

    /// Observe an action performed in the view.
    fn on_action(
        &self,
        _action: &ActionContext,
        _feature: &FeatureInfo,
        _connectivity: ConnectivityState,
        _reschedule: RescheduleHandle,
    ) {
    }
}

/// An operation backed by a closure.
pub struct FnOperation<F> {
    name: &'static str,
    perform: F,
}

impl<F> FnOperation<F>
where
    F: Fn(OperationContext, OutcomeSink) + Send + Sync,
{
    pub fn new(name: &'static str, perform: F) -> Self {
        Self { name, perform }
    }
}

impl<F> fmt::Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").field("name", &self.name).finish()
    }
}

impl<F> ContentOperation for FnOperation<F>
where
    F: Fn(OperationContext, OutcomeSink) + Send + Sync,
{
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink) {
        (self.perform)(ctx, sink);
    }
}

/// A synchronous operation: `block` mutates the builder and its result
/// becomes the outcome.
pub fn block_operation<B>(
    name: &'static str,
    block: B,
) -> FnOperation<impl Fn(OperationContext, OutcomeSink) + Send + Sync>
where
    B: Fn(&mut ContentBuilder, &OperationContext) -> Result<()> + Send + Sync,
{
    FnOperation::new(name, move |ctx: OperationContext, sink: OutcomeSink| {
        match ctx.builder.update(|builder| block(builder, &ctx)) {
            Ok(()) => sink.finish(),
            Err(error) => sink.fail(error),
        }
    })
}

// ---------------------------------------------------------------------------
// ContentOperationFactory
// ---------------------------------------------------------------------------

/// Creates the operations for a view. Called once per loader.
pub trait ContentOperationFactory: Send + Sync {
    fn create_operations(&self, view_uri: &Url) -> Vec<Arc<dyn ContentOperation>>;
}

impl<F> ContentOperationFactory for F
where
    F: Fn(&Url) -> Vec<Arc<dyn ContentOperation>> + Send + Sync,
{
    fn create_operations(&self, view_uri: &Url) -> Vec<Arc<dyn ContentOperation>> {
        self(view_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_builder() {
        let caps = Capabilities::default().with_pagination().observing_actions();
        assert!(caps.pagination);
        assert!(caps.observes_actions);
        assert!(!caps.initial_content);
        assert_eq!(
            Capabilities::default().with_initial_content(),
            Capabilities {
                initial_content: true,
                ..Capabilities::default()
            }
        );
    }

    #[test]
    fn closures_are_factories() {
        let factory = |_: &Url| -> Vec<Arc<dyn ContentOperation>> {
            vec![Arc::new(block_operation("noop", |_, _| Ok(())))]
        };
        let uri = Url::parse("hub:home").expect("valid url");
        assert_eq!(factory.create_operations(&uri).len(), 1);
    }

    #[test]
    fn reschedule_handle_without_loader() {
        let (tx, rx) = mpsc::unbounded_channel::<Command>();
        let handle = RescheduleHandle::new(tx.downgrade(), 2);
        assert_eq!(handle.index(), 2);
        drop(tx);
        drop(rx);
        assert!(!handle.request());
    }

    #[test]
    fn action_context_builder() {
        let uri = Url::parse("hub:todo").expect("valid url");
        let action = ActionContext::new("default:add", uri).with_component("row-1");
        assert_eq!(action.component.as_deref(), Some("row-1"));
    }
}
