//! Content loading pipeline and structural diffing for hubkit views.
//!
//! A view declares an ordered chain of [`ContentOperation`]s. A
//! [`ViewModelLoader`] drives that chain against a shared [`ContentBuilder`],
//! threading errors forward and honouring reschedules, and hands each
//! resulting [`ContentModel`](hubkit_shared::ContentModel) to its subscriber.
//! [`diff`] computes the edits between two models.

pub mod builder;
pub mod diff;
pub mod factory;
pub mod json;
pub mod loader;
pub mod operation;
pub mod queue;
pub mod renderer;
pub mod wrapper;

pub use builder::{BuilderHandle, ComponentBuilder, ContentBuilder};
pub use diff::{Diff, Move, diff, diff_components};
pub use factory::{ContentReloadPolicy, FeatureRegistration, InitialModelRegistry, LoaderFactory};
pub use loader::{
    ChannelSubscriber, ConnectivityResolver, LoadEvent, LoadSubscriber, LoaderSetup,
    PipelineState, StaticConnectivity, ViewModelLoader, channel_subscriber,
};
pub use operation::{
    ActionContext, Capabilities, ContentOperation, ContentOperationFactory, FnOperation,
    OperationContext, RescheduleHandle, block_operation,
};
pub use queue::{ExecutionEntry, ExecutionMode, ExecutionQueue};
pub use renderer::{RenderUpdate, ViewModelRenderer, apply_diff};
pub use wrapper::{OperationChain, Outcome, OutcomeSink};
