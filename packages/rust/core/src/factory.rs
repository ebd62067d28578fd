//! Feature registry and loader construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument};
use url::Url;

use hubkit_shared::{ContentModel, FeatureInfo, HubError, LoaderConfig, Result};

use crate::loader::{ConnectivityResolver, LoadSubscriber, LoaderSetup, ViewModelLoader};
use crate::operation::ContentOperationFactory;
use crate::wrapper::OperationChain;

// ---------------------------------------------------------------------------
// InitialModelRegistry
// ---------------------------------------------------------------------------

/// Last main-pass model per view URI, used as the next loader's initial model.
#[derive(Debug, Default)]
pub struct InitialModelRegistry {
    models: Mutex<HashMap<String, Arc<ContentModel>>>,
}

impl InitialModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, view_uri: &Url, model: Arc<ContentModel>) {
        self.lock().insert(view_uri.to_string(), model);
    }

    pub fn initial_model(&self, view_uri: &Url) -> Option<Arc<ContentModel>> {
        self.lock().get(view_uri.as_str()).cloned()
    }

    pub fn remove(&self, view_uri: &Url) -> Option<Arc<ContentModel>> {
        self.lock().remove(view_uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ContentModel>>> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Decides whether a view that already shows content should load again when
/// it reappears.
pub trait ContentReloadPolicy: Send + Sync {
    fn should_reload(&self, view_uri: &Url, current: &ContentModel) -> bool;
}

impl<F> ContentReloadPolicy for F
where
    F: Fn(&Url, &ContentModel) -> bool + Send + Sync,
{
    fn should_reload(&self, view_uri: &Url, current: &ContentModel) -> bool {
        self(view_uri, current)
    }
}

/// A feature and the operation factories for its views.
pub struct FeatureRegistration {
    pub info: FeatureInfo,
    /// Views equal to or nested under this URI belong to the feature.
    pub root_view_uri: Url,
    /// Asked in order for each view's operations.
    pub factories: Vec<Arc<dyn ContentOperationFactory>>,
    /// Without a policy, content always reloads.
    pub reload_policy: Option<Arc<dyn ContentReloadPolicy>>,
}

impl fmt::Debug for FeatureRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistration")
            .field("info", &self.info)
            .field("root_view_uri", &self.root_view_uri.as_str())
            .field("factories", &self.factories.len())
            .field("reload_policy", &self.reload_policy.is_some())
            .finish()
    }
}

impl FeatureRegistration {
    pub fn new(info: FeatureInfo, root_view_uri: Url) -> Self {
        Self {
            info,
            root_view_uri,
            factories: Vec::new(),
            reload_policy: None,
        }
    }

    pub fn with_reload_policy(mut self, policy: Arc<dyn ContentReloadPolicy>) -> Self {
        self.reload_policy = Some(policy);
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn ContentOperationFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Whether `view_uri` is the root URI or nested beneath it.
    pub fn handles(&self, view_uri: &Url) -> bool {
        let root = self.root_view_uri.as_str();
        match view_uri.as_str().strip_prefix(root) {
            Some("") => true,
            Some(rest) => rest.starts_with('/') || rest.starts_with(':'),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// LoaderFactory
// ---------------------------------------------------------------------------

/// Creates view model loaders for registered features.
pub struct LoaderFactory {
    config: LoaderConfig,
    connectivity: Arc<dyn ConnectivityResolver>,
    features: Vec<FeatureRegistration>,
    registry: Arc<InitialModelRegistry>,
}

impl LoaderFactory {
    pub fn new(config: LoaderConfig, connectivity: Arc<dyn ConnectivityResolver>) -> Self {
        Self {
            config,
            connectivity,
            features: Vec::new(),
            registry: Arc::new(InitialModelRegistry::new()),
        }
    }

    /// Register a feature. Identifiers and root URIs must be unique.
    pub fn register_feature(&mut self, registration: FeatureRegistration) -> Result<()> {
        if let Some(existing) = self.features.iter().find(|f| {
            f.info.identifier == registration.info.identifier
                || f.root_view_uri == registration.root_view_uri
        }) {
            return Err(HubError::config(format!(
                "feature '{}' conflicts with registered feature '{}' ({})",
                registration.info.identifier, existing.info.identifier, existing.root_view_uri
            )));
        }
        info!(
            feature = %registration.info.identifier,
            root = %registration.root_view_uri,
            factories = registration.factories.len(),
            "registered feature"
        );
        self.features.push(registration);
        Ok(())
    }

    /// Remove a feature. Returns whether it was registered.
    pub fn unregister_feature(&mut self, identifier: &str) -> bool {
        let before = self.features.len();
        self.features.retain(|f| f.info.identifier != identifier);
        self.features.len() != before
    }

    pub fn can_create_loader(&self, view_uri: &Url) -> bool {
        self.feature_for(view_uri).is_some()
    }

    /// Whether `view_uri`, currently showing `current`, should be loaded again.
    /// Views without a registered feature or policy always reload.
    pub fn should_reload(&self, view_uri: &Url, current: &ContentModel) -> bool {
        let reload = self
            .feature_for(view_uri)
            .and_then(|feature| feature.reload_policy.as_ref())
            .is_none_or(|policy| policy.should_reload(view_uri, current));
        debug!(view_uri = %view_uri, reload, "consulted reload policy");
        reload
    }

    pub fn registry(&self) -> &Arc<InitialModelRegistry> {
        &self.registry
    }

    /// Build the chain for `view_uri` and spawn its loader.
    #[instrument(skip_all, fields(view_uri = %view_uri))]
    pub fn create_loader(
        &self,
        view_uri: &Url,
        subscriber: Arc<dyn LoadSubscriber>,
    ) -> Result<ViewModelLoader> {
        let feature = self
            .feature_for(view_uri)
            .ok_or_else(|| HubError::UnknownView {
                view_uri: view_uri.to_string(),
            })?;

        let operations = feature
            .factories
            .iter()
            .flat_map(|factory| factory.create_operations(view_uri))
            .collect();
        let chain = OperationChain::new(view_uri, operations)?;

        let (registry, initial_model) = if self.config.register_initial_models {
            (
                Some(Arc::clone(&self.registry)),
                self.registry.initial_model(view_uri),
            )
        } else {
            (None, None)
        };
        debug!(
            feature = %feature.info.identifier,
            operations = chain.len(),
            cached_initial_model = initial_model.is_some(),
            "creating loader"
        );

        let setup = LoaderSetup {
            initial_model,
            registry,
            ..LoaderSetup::new(view_uri.clone(), feature.info.clone(), chain, subscriber)
                .with_connectivity(Arc::clone(&self.connectivity))
                .with_config(self.config.clone())
        };
        Ok(ViewModelLoader::spawn(setup))
    }

    /// The most specific feature handling `view_uri`.
    fn feature_for(&self, view_uri: &Url) -> Option<&FeatureRegistration> {
        self.features
            .iter()
            .filter(|f| f.handles(view_uri))
            .max_by_key(|f| f.root_view_uri.as_str().len())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::loader::{LoadEvent, StaticConnectivity, channel_subscriber};
    use crate::operation::{Capabilities, ContentOperation, OperationContext, block_operation};
    use crate::builder::ContentBuilder;
    use crate::wrapper::OutcomeSink;
    use hubkit_shared::ConnectivityState;

    fn uri(value: &str) -> Url {
        Url::parse(value).expect("valid url")
    }

    fn factory() -> LoaderFactory {
        LoaderFactory::new(
            LoaderConfig::default(),
            Arc::new(StaticConnectivity(ConnectivityState::Online)),
        )
    }

    fn rows_factory() -> Arc<dyn ContentOperationFactory> {
        Arc::new(|_: &Url| -> Vec<Arc<dyn ContentOperation>> {
            vec![Arc::new(block_operation("rows", |builder, _| {
                builder.body("row-1").title = Some("Row".into());
                Ok(())
            }))]
        })
    }

    struct Skeleton;

    impl ContentOperation for Skeleton {
        fn perform(&self, _ctx: OperationContext, sink: OutcomeSink) {
            sink.finish();
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default().with_initial_content()
        }

        fn add_initial_content(&self, _view_uri: &Url, builder: &mut ContentBuilder) {
            builder.body("placeholder");
        }
    }

    #[test]
    fn feature_matching() {
        let feature = FeatureRegistration::new(FeatureInfo::new("music", "Music"), uri("hub:music"));
        assert!(feature.handles(&uri("hub:music")));
        assert!(feature.handles(&uri("hub:music:album:1")));
        assert!(feature.handles(&uri("hub:music/top")));
        assert!(!feature.handles(&uri("hub:musicvideos")));
        assert!(!feature.handles(&uri("hub:home")));
    }

    #[test]
    fn duplicate_features_are_rejected() {
        let mut factory = factory();
        factory
            .register_feature(FeatureRegistration::new(FeatureInfo::new("home", "Home"), uri("hub:home")))
            .expect("first registration");
        let err = factory
            .register_feature(FeatureRegistration::new(FeatureInfo::new("home", "Other"), uri("hub:other")))
            .unwrap_err();
        assert!(matches!(err, HubError::Config { .. }));

        assert!(factory.unregister_feature("home"));
        assert!(!factory.can_create_loader(&uri("hub:home")));
    }

    #[test]
    fn reload_policy_is_consulted_per_feature() {
        let mut factory = factory();
        factory
            .register_feature(
                FeatureRegistration::new(FeatureInfo::new("home", "Home"), uri("hub:home"))
                    .with_reload_policy(Arc::new(|_: &Url, current: &ContentModel| {
                        current.body.is_empty()
                    })),
            )
            .expect("register");
        factory
            .register_feature(FeatureRegistration::new(FeatureInfo::new("radio", "Radio"), uri("hub:radio")))
            .expect("register");

        let empty = ContentBuilder::new("home", Default::default()).build(chrono::Utc::now());
        let mut filled = ContentBuilder::new("home", Default::default());
        filled.body("row");
        let filled = filled.build(chrono::Utc::now());

        assert!(factory.should_reload(&uri("hub:home"), &empty));
        assert!(!factory.should_reload(&uri("hub:home:album"), &filled));
        assert!(factory.should_reload(&uri("hub:radio"), &filled));
        assert!(factory.should_reload(&uri("hub:nowhere"), &filled));
    }

    #[tokio::test]
    async fn unknown_view_and_empty_chain() {
        let mut factory = factory();
        let (subscriber, _events) = channel_subscriber();

        let err = factory
            .create_loader(&uri("hub:nowhere"), subscriber.clone())
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownView { .. }));

        factory
            .register_feature(FeatureRegistration::new(FeatureInfo::new("empty", "Empty"), uri("hub:empty")))
            .expect("register");
        let err = factory
            .create_loader(&uri("hub:empty"), subscriber)
            .unwrap_err();
        assert!(matches!(err, HubError::EmptyChain { .. }));
    }

    #[tokio::test]
    async fn loaded_models_seed_the_next_loader() {
        let mut factory = factory();
        factory
            .register_feature(
                FeatureRegistration::new(FeatureInfo::new("home", "Home"), uri("hub:home"))
                    .with_factory(Arc::new(|_: &Url| -> Vec<Arc<dyn ContentOperation>> {
                        vec![Arc::new(Skeleton)]
                    }))
                    .with_factory(rows_factory()),
            )
            .expect("register");

        let (subscriber, mut events) = channel_subscriber();
        let loader = factory
            .create_loader(&uri("hub:home"), subscriber.clone())
            .expect("loader");
        assert_eq!(loader.initial_model().body_identifiers(), vec!["placeholder"]);

        loader.request_load(false).expect("running");
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("load completes")
            .expect("event");
        let LoadEvent::Loaded(model) = event else {
            panic!("expected a loaded model");
        };
        assert_eq!(model.body_identifiers(), vec!["row-1"]);
        assert_eq!(model.feature_identifier, "home");
        assert_eq!(factory.registry().len(), 1);

        let second = factory
            .create_loader(&uri("hub:home"), subscriber)
            .expect("loader");
        assert_eq!(second.initial_model().body_identifiers(), vec!["row-1"]);
    }

    #[tokio::test]
    async fn registry_is_skipped_when_disabled() {
        let config = LoaderConfig {
            register_initial_models: false,
            ..LoaderConfig::default()
        };
        let mut factory =
            LoaderFactory::new(config, Arc::new(StaticConnectivity(ConnectivityState::Offline)));
        factory
            .register_feature(
                FeatureRegistration::new(FeatureInfo::new("home", "Home"), uri("hub:home"))
                    .with_factory(rows_factory()),
            )
            .expect("register");

        let (subscriber, mut events) = channel_subscriber();
        let loader = factory
            .create_loader(&uri("hub:home"), subscriber)
            .expect("loader");
        loader.request_load(false).expect("running");
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("load completes");
        assert!(factory.registry().is_empty());
    }
}
