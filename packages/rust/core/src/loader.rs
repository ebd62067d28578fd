//! View model loader: drives a view's operation chain.
//!
//! Each loader runs a single orchestrator task that owns the execution queue,
//! the builder of the pass in flight and the last produced model. Handles
//! talk to it by message; operations report outcomes on per-invocation
//! sinks. A generation counter, bumped on every main load, together with a
//! per-invocation id makes late or duplicate outcomes no-ops.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use url::Url;

use hubkit_shared::{
    ConnectivityState, ContentModel, FeatureInfo, HubError, LoaderConfig, Result,
};

use crate::builder::{BuilderHandle, ContentBuilder};
use crate::factory::InitialModelRegistry;
use crate::operation::{ActionContext, OperationContext, RescheduleHandle};
use crate::queue::ExecutionQueue;
use crate::wrapper::{InvocationTag, OperationChain, Outcome, OutcomeMessage, OutcomeSink};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Receives the terminal outcome of every pass.
pub trait LoadSubscriber: Send + Sync {
    fn on_loaded(&self, model: Arc<ContentModel>);
    fn on_failed(&self, error: Arc<HubError>);
}

/// Resolves the connectivity state. Called once at the start of each pass.
pub trait ConnectivityResolver: Send + Sync {
    fn resolve(&self) -> ConnectivityState;
}

impl<F> ConnectivityResolver for F
where
    F: Fn() -> ConnectivityState + Send + Sync,
{
    fn resolve(&self) -> ConnectivityState {
        self()
    }
}

/// A resolver that always reports the same state.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub ConnectivityState);

impl ConnectivityResolver for StaticConnectivity {
    fn resolve(&self) -> ConnectivityState {
        self.0
    }
}

/// Pass outcome delivered through a channel.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Loaded(Arc<ContentModel>),
    Failed(Arc<HubError>),
}

/// A [`LoadSubscriber`] that forwards outcomes to a channel.
#[derive(Debug)]
pub struct ChannelSubscriber {
    events: mpsc::UnboundedSender<LoadEvent>,
}

impl LoadSubscriber for ChannelSubscriber {
    fn on_loaded(&self, model: Arc<ContentModel>) {
        let _ = self.events.send(LoadEvent::Loaded(model));
    }

    fn on_failed(&self, error: Arc<HubError>) {
        let _ = self.events.send(LoadEvent::Failed(error));
    }
}

/// A channel-backed subscriber and the receiving end of its events.
pub fn channel_subscriber() -> (Arc<ChannelSubscriber>, mpsc::UnboundedReceiver<LoadEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSubscriber { events }), rx)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    RunningMain,
    RunningPagination,
    AwaitingReschedule,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RunningMain => write!(f, "running main pass"),
            Self::RunningPagination => write!(f, "running pagination pass"),
            Self::AwaitingReschedule => write!(f, "awaiting reschedule"),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Load { force: bool },
    NextPage,
    Action(ActionContext),
    Reschedule { index: usize },
    State(oneshot::Sender<PipelineState>),
    CurrentModel(oneshot::Sender<Option<Arc<ContentModel>>>),
}

// ---------------------------------------------------------------------------
// ViewModelLoader
// ---------------------------------------------------------------------------

/// Everything needed to start a loader.
pub struct LoaderSetup {
    pub view_uri: Url,
    pub feature: FeatureInfo,
    pub chain: OperationChain,
    pub connectivity: Arc<dyn ConnectivityResolver>,
    pub subscriber: Arc<dyn LoadSubscriber>,
    pub config: LoaderConfig,
    /// Used instead of building a skeleton model.
    pub initial_model: Option<Arc<ContentModel>>,
    /// Receives every model produced by a main pass.
    pub registry: Option<Arc<InitialModelRegistry>>,
}

impl LoaderSetup {
    /// Setup with default config, an online connectivity state and no registry.
    pub fn new(
        view_uri: Url,
        feature: FeatureInfo,
        chain: OperationChain,
        subscriber: Arc<dyn LoadSubscriber>,
    ) -> Self {
        Self {
            view_uri,
            feature,
            chain,
            connectivity: Arc::new(StaticConnectivity(ConnectivityState::Online)),
            subscriber,
            config: LoaderConfig::default(),
            initial_model: None,
            registry: None,
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityResolver>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }
}

/// Handle to a running loader. Cloning is cheap; the orchestrator stops once
/// every handle is dropped.
#[derive(Debug, Clone)]
pub struct ViewModelLoader {
    view_uri: Url,
    commands: mpsc::UnboundedSender<Command>,
    initial_model: Arc<ContentModel>,
}

impl ViewModelLoader {
    /// Start the orchestrator task. Must be called within a tokio runtime.
    pub fn spawn(setup: LoaderSetup) -> Self {
        let LoaderSetup {
            view_uri,
            feature,
            chain,
            connectivity,
            subscriber,
            config,
            initial_model,
            registry,
        } = setup;

        let mut blank = ContentBuilder::with_config(&feature.identifier, &config);

        let initial_model = initial_model.unwrap_or_else(|| {
            let mut builder = blank.clone();
            if config.initial_content {
                for wrapper in chain.iter() {
                    wrapper.add_initial_content(&view_uri, &mut builder);
                }
            }
            Arc::new(builder.build(Utc::now()))
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (resume_tx, resume_rx) = mpsc::unbounded_channel();

        // Every pass of this loader builds a model with the same identifier.
        blank.view_identifier = initial_model.identifier.clone();
        let snapshots = vec![None; chain.len()];
        let orchestrator = Orchestrator {
            view_uri: view_uri.clone(),
            feature: Arc::new(feature),
            chain,
            connectivity,
            subscriber,
            blank,
            registry,
            commands: command_tx.downgrade(),
            outcomes: outcome_tx,
            resumes: resume_tx,
            state: PipelineState::Idle,
            generation: 0,
            next_invocation: 0,
            next_pass: 0,
            pass: None,
            last_model: None,
            last_timestamp: initial_model.build_timestamp,
            last_connectivity: None,
            page_count: 0,
            snapshots,
            pending_reschedule: None,
        };

        let span = info_span!("view_model_loader", view_uri = %view_uri);
        tokio::spawn(
            orchestrator
                .run(command_rx, outcome_rx, resume_rx)
                .instrument(span),
        );

        Self {
            view_uri,
            commands: command_tx,
            initial_model,
        }
    }

    pub fn view_uri(&self) -> &Url {
        &self.view_uri
    }

    /// Model shown before the first load completes.
    pub fn initial_model(&self) -> Arc<ContentModel> {
        Arc::clone(&self.initial_model)
    }

    /// Start a main load. Ignored while a pass runs unless `force` is set.
    pub fn request_load(&self, force: bool) -> Result<()> {
        self.send(Command::Load { force })
    }

    /// Append the next page of content.
    pub fn request_next_page(&self) -> Result<()> {
        self.send(Command::NextPage)
    }

    /// Forward an action to every operation observing actions.
    pub fn notify_action(&self, action: ActionContext) -> Result<()> {
        self.send(Command::Action(action))
    }

    pub async fn state(&self) -> Result<PipelineState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await.map_err(|_| HubError::LoaderClosed)
    }

    /// The last model produced by a pass, if any.
    pub async fn current_model(&self) -> Result<Option<Arc<ContentModel>>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::CurrentModel(tx))?;
        rx.await.map_err(|_| HubError::LoaderClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| HubError::LoaderClosed)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Main,
    Pagination { page_index: usize },
}

struct Pass {
    id: u64,
    kind: PassKind,
    generation: u64,
    connectivity: ConnectivityState,
    builder: BuilderHandle,
    queue: ExecutionQueue,
    previous_error: Option<Arc<HubError>>,
    /// Invocation id of the operation currently running.
    in_flight: Option<u64>,
    /// Builder state before the running operation was invoked.
    checkpoint: Option<ContentBuilder>,
}

impl Pass {
    fn running_state(&self) -> PipelineState {
        match self.kind {
            PassKind::Main => PipelineState::RunningMain,
            PassKind::Pagination { .. } => PipelineState::RunningPagination,
        }
    }
}

struct Orchestrator {
    view_uri: Url,
    feature: Arc<FeatureInfo>,
    chain: OperationChain,
    connectivity: Arc<dyn ConnectivityResolver>,
    subscriber: Arc<dyn LoadSubscriber>,
    /// Empty builder every main pass starts from.
    blank: ContentBuilder,
    registry: Option<Arc<InitialModelRegistry>>,
    commands: mpsc::WeakUnboundedSender<Command>,
    outcomes: mpsc::UnboundedSender<OutcomeMessage>,
    resumes: mpsc::UnboundedSender<u64>,
    state: PipelineState,
    generation: u64,
    next_invocation: u64,
    next_pass: u64,
    pass: Option<Pass>,
    last_model: Option<Arc<ContentModel>>,
    last_timestamp: DateTime<Utc>,
    last_connectivity: Option<ConnectivityState>,
    page_count: usize,
    /// Builder state recorded before each position ran in the last main pass.
    snapshots: Vec<Option<ContentBuilder>>,
    /// Lowest position asked to re-run while a pass was in flight.
    pending_reschedule: Option<usize>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<OutcomeMessage>,
        mut resumes: mpsc::UnboundedReceiver<u64>,
    ) {
        debug!(operations = self.chain.len(), "loader started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = outcomes.recv() => self.handle_outcome(message),
                Some(pass_id) = resumes.recv() => self.resume(pass_id),
            }
        }
        debug!(state = %self.state, "all loader handles dropped; stopping");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Load { force } => {
                if self.state != PipelineState::Idle && !force {
                    debug!(state = %self.state, "load already in flight; ignoring request");
                    return;
                }
                self.start_main_pass(0);
            }
            Command::NextPage => self.start_pagination_pass(),
            Command::Action(action) => self.notify_action(&action),
            Command::Reschedule { index } => self.reschedule_out_of_band(index),
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
            Command::CurrentModel(reply) => {
                let _ = reply.send(self.last_model.clone());
            }
        }
    }

    fn resolve_connectivity(&mut self) -> ConnectivityState {
        let connectivity = self.connectivity.resolve();
        self.last_connectivity = Some(connectivity);
        connectivity
    }

    fn begin_pass(&mut self, kind: PassKind, builder: ContentBuilder, queue: ExecutionQueue) {
        let connectivity = self.resolve_connectivity();
        self.next_pass += 1;
        let pass = Pass {
            id: self.next_pass,
            kind,
            generation: self.generation,
            connectivity,
            builder: BuilderHandle::new(builder),
            queue,
            previous_error: None,
            in_flight: None,
            checkpoint: None,
        };
        self.state = pass.running_state();
        if let Some(superseded) = self.pass.replace(pass) {
            debug!(
                generation = superseded.generation,
                "superseding pass in flight"
            );
        }
        self.drive();
    }

    #[instrument(skip(self))]
    fn start_main_pass(&mut self, from_index: usize) {
        // Resuming mid-chain needs the builder state recorded before that position.
        let restored = self
            .snapshots
            .get(from_index)
            .cloned()
            .flatten()
            .filter(|_| from_index > 0);
        let (from_index, builder) = match restored {
            Some(builder) => (from_index, builder),
            None => (0, self.blank.clone()),
        };

        self.generation += 1;
        self.snapshots.truncate(from_index);
        self.snapshots.resize(self.chain.len(), None);
        if self.pending_reschedule.is_some_and(|index| index >= from_index) {
            self.pending_reschedule = None;
        }

        info!(generation = self.generation, from_index, "starting main pass");
        let queue = ExecutionQueue::main(from_index..self.chain.len());
        self.begin_pass(PassKind::Main, builder, queue);
    }

    #[instrument(skip_all)]
    fn start_pagination_pass(&mut self) {
        if self.state != PipelineState::Idle {
            debug!(state = %self.state, "pass in flight; ignoring next page request");
            return;
        }
        let Some(last_model) = self.last_model.clone() else {
            debug!("no content loaded yet; ignoring next page request");
            return;
        };
        let indices = self.chain.pagination_indices();
        if indices.is_empty() {
            debug!("no operation supports pagination; ignoring next page request");
            return;
        }

        let page_index = self.page_count + 1;
        info!(generation = self.generation, page = page_index, "starting pagination pass");
        let builder = ContentBuilder::from_model(&last_model, self.blank.default_component().clone());
        let queue = ExecutionQueue::pagination(page_index, indices);
        self.begin_pass(PassKind::Pagination { page_index }, builder, queue);
    }

    fn reschedule_out_of_band(&mut self, index: usize) {
        if index >= self.chain.len() {
            warn!(index, "reschedule requested for unknown position; ignoring");
            return;
        }
        if self.state == PipelineState::Idle {
            debug!(index, "rescheduling chain");
            self.start_main_pass(index);
        } else {
            debug!(index, state = %self.state, "deferring reschedule until idle");
            self.pending_reschedule = Some(
                self.pending_reschedule
                    .map_or(index, |pending| pending.min(index)),
            );
        }
    }

    fn notify_action(&mut self, action: &ActionContext) {
        let connectivity = match self.last_connectivity {
            Some(connectivity) => connectivity,
            None => self.resolve_connectivity(),
        };
        debug!(action = %action.identifier, "forwarding action");
        for wrapper in self.chain.iter() {
            let handle = RescheduleHandle::new(self.commands.clone(), wrapper.index());
            wrapper.notify_action(action, &self.feature, connectivity, handle);
        }
    }

    /// Invoke the next queued operation, or complete the pass.
    fn drive(&mut self) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        let Some(entry) = pass.queue.pop_front() else {
            self.complete_pass();
            return;
        };
        let Some(wrapper) = self.chain.get(entry.operation_index) else {
            warn!(index = entry.operation_index, "queued position outside chain; skipping");
            let _ = self.resumes.send(pass.id);
            return;
        };

        let checkpoint = pass.builder.copy();
        if pass.kind == PassKind::Main {
            if let Some(slot) = self.snapshots.get_mut(entry.operation_index) {
                *slot = Some(checkpoint.clone());
            }
        }
        pass.checkpoint = Some(checkpoint);

        self.next_invocation += 1;
        let invocation = self.next_invocation;
        pass.in_flight = Some(invocation);

        let tag = InvocationTag {
            generation: pass.generation,
            invocation,
            entry,
        };
        let ctx = OperationContext {
            view_uri: self.view_uri.clone(),
            feature: Arc::clone(&self.feature),
            connectivity: pass.connectivity,
            builder: pass.builder.clone(),
            previous_error: pass.previous_error.clone(),
            reschedule: RescheduleHandle::new(self.commands.clone(), entry.operation_index),
        };
        let sink = OutcomeSink::new(tag, self.outcomes.clone());

        debug!(
            generation = tag.generation,
            index = entry.operation_index,
            mode = %entry.mode,
            has_previous_error = ctx.previous_error.is_some(),
            "invoking content operation"
        );
        wrapper.perform(entry.mode, ctx, sink);
    }

    fn handle_outcome(&mut self, message: OutcomeMessage) {
        let OutcomeMessage { tag, outcome } = message;
        let index = tag.entry.operation_index;

        let Some(pass) = self.pass.as_mut() else {
            debug!(generation = tag.generation, index, "no pass in flight; ignoring outcome");
            return;
        };
        if pass.generation != tag.generation || pass.in_flight != Some(tag.invocation) {
            debug!(
                generation = tag.generation,
                active_generation = self.generation,
                index,
                "ignoring stale outcome"
            );
            return;
        }
        pass.in_flight = None;

        match outcome {
            Outcome::Finish => {
                pass.previous_error = None;
                self.drive();
            }
            Outcome::Fail(error) => {
                warn!(generation = tag.generation, index, %error, "content operation failed");
                if pass.queue.is_empty() {
                    self.fail_pass(error);
                } else {
                    pass.previous_error = Some(error);
                    self.drive();
                }
            }
            Outcome::Reschedule => {
                debug!(generation = tag.generation, index, "content operation rescheduled");
                let restored = match pass.checkpoint.take() {
                    Some(checkpoint) => checkpoint,
                    None => pass.builder.copy(),
                };
                pass.builder = BuilderHandle::new(restored);
                pass.queue.insert_sorted(tag.entry);
                let pass_id = pass.id;
                self.state = PipelineState::AwaitingReschedule;
                let _ = self.resumes.send(pass_id);
            }
        }
    }

    fn resume(&mut self, pass_id: u64) {
        let Some(pass) = self.pass.as_ref() else {
            return;
        };
        if pass.id != pass_id {
            debug!(pass_id, "ignoring resume for superseded pass");
            return;
        }
        self.state = pass.running_state();
        self.drive();
    }

    fn complete_pass(&mut self) {
        let Some(pass) = self.pass.take() else {
            return;
        };

        let timestamp = Utc::now().max(self.last_timestamp);
        self.last_timestamp = timestamp;
        let model = Arc::new(pass.builder.read(|builder| builder.build(timestamp)));

        match pass.kind {
            PassKind::Main => {
                self.page_count = 0;
                if let Some(registry) = &self.registry {
                    registry.register(&self.view_uri, Arc::clone(&model));
                }
            }
            PassKind::Pagination { page_index } => self.page_count = page_index,
        }

        info!(
            generation = pass.generation,
            kind = ?pass.kind,
            body = model.body.len(),
            "pass completed"
        );
        self.last_model = Some(Arc::clone(&model));
        self.state = PipelineState::Idle;
        self.subscriber.on_loaded(model);
        self.run_pending_reschedule();
    }

    fn fail_pass(&mut self, error: Arc<HubError>) {
        let generation = self.pass.take().map(|pass| pass.generation);
        warn!(?generation, %error, "pass failed");
        self.state = PipelineState::Idle;
        self.subscriber.on_failed(error);
        self.run_pending_reschedule();
    }

    fn run_pending_reschedule(&mut self) {
        if let Some(index) = self.pending_reschedule.take() {
            debug!(index, "running deferred reschedule");
            self.start_main_pass(index);
        }
    }
}
