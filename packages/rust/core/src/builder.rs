//! Mutable, identifier-keyed content accumulators.
//!
//! A [`ContentBuilder`] is handed to each content operation in turn during a
//! pass. Operations get-or-create item builders by identifier, set scalar
//! fields, and may remove what earlier operations added. Snapshotting with
//! [`ContentBuilder::build`] copies everything into an immutable
//! [`ContentModel`].

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use hubkit_shared::{ComponentIdentifier, ComponentModel, ContentModel, JsonMap, LoaderConfig};

// ---------------------------------------------------------------------------
// ComponentBuilder
// ---------------------------------------------------------------------------

/// Builder for a single header, body or overlay item.
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    model_identifier: String,
    /// Component that will render the item.
    pub component: ComponentIdentifier,
    pub content_identifier: Option<String>,
    /// Requested position in the parent list; clamped to the list length.
    pub preferred_index: Option<usize>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub accessory_title: Option<String>,
    pub description_text: Option<String>,
    pub target_uri: Option<Url>,
    pub custom_data: JsonMap,
    pub logging_data: JsonMap,
    pub date: Option<DateTime<Utc>>,
    children: Vec<ComponentBuilder>,
}

impl ComponentBuilder {
    pub(crate) fn new(model_identifier: impl Into<String>, component: ComponentIdentifier) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            component,
            content_identifier: None,
            preferred_index: None,
            title: None,
            subtitle: None,
            accessory_title: None,
            description_text: None,
            target_uri: None,
            custom_data: JsonMap::new(),
            logging_data: JsonMap::new(),
            date: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn from_model(model: &ComponentModel) -> Self {
        Self {
            model_identifier: model.identifier.clone(),
            component: model.component.clone(),
            content_identifier: model.content_identifier.clone(),
            preferred_index: None,
            title: model.title.clone(),
            subtitle: model.subtitle.clone(),
            accessory_title: model.accessory_title.clone(),
            description_text: model.description_text.clone(),
            target_uri: model.target_uri.clone(),
            custom_data: model.custom_data.clone(),
            logging_data: model.logging_data.clone(),
            date: model.date,
            children: model.children.iter().map(Self::from_model).collect(),
        }
    }

    /// Identifier of the model this builder produces.
    pub fn model_identifier(&self) -> &str {
        &self.model_identifier
    }

    /// Replace the component name, keeping the namespace.
    pub fn set_component_name(&mut self, name: impl Into<String>) {
        self.component.name = name.into();
    }

    /// Get or create the child builder with `identifier`.
    pub fn child(&mut self, identifier: &str) -> &mut ComponentBuilder {
        let defaults = self.component.clone();
        get_or_create(&mut self.children, identifier, defaults)
    }

    pub fn has_child(&self, identifier: &str) -> bool {
        self.children
            .iter()
            .any(|c| c.model_identifier == identifier)
    }

    /// Remove a child builder. Returns whether one was removed.
    pub fn remove_child(&mut self, identifier: &str) -> bool {
        remove(&mut self.children, identifier)
    }

    pub fn child_identifiers(&self) -> Vec<&str> {
        identifiers(&self.children)
    }

    fn build(&self, index: usize) -> ComponentModel {
        ComponentModel {
            identifier: self.model_identifier.clone(),
            index,
            component: self.component.clone(),
            content_identifier: self.content_identifier.clone(),
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            accessory_title: self.accessory_title.clone(),
            description_text: self.description_text.clone(),
            target_uri: self.target_uri.clone(),
            custom_data: self.custom_data.clone(),
            logging_data: self.logging_data.clone(),
            date: self.date,
            children: build_ordered(&self.children),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentBuilder
// ---------------------------------------------------------------------------

/// Accumulator for a view's content during a single pass.
#[derive(Debug, Clone)]
pub struct ContentBuilder {
    /// Identifier of the produced model. Defaults to a fresh UUID.
    pub view_identifier: String,
    pub feature_identifier: String,
    /// Navigation bar title.
    pub title: Option<String>,
    pub extension_uri: Option<Url>,
    pub custom_data: JsonMap,
    header: Option<ComponentBuilder>,
    body: Vec<ComponentBuilder>,
    overlays: Vec<ComponentBuilder>,
    default_component: ComponentIdentifier,
}

impl ContentBuilder {
    /// An empty builder whose new items default to `default_component`.
    pub fn new(feature_identifier: impl Into<String>, default_component: ComponentIdentifier) -> Self {
        Self {
            view_identifier: Uuid::now_v7().to_string(),
            feature_identifier: feature_identifier.into(),
            title: None,
            extension_uri: None,
            custom_data: JsonMap::new(),
            header: None,
            body: Vec::new(),
            overlays: Vec::new(),
            default_component,
        }
    }

    /// An empty builder using the component defaults from `config`.
    pub fn with_config(feature_identifier: impl Into<String>, config: &LoaderConfig) -> Self {
        Self::new(
            feature_identifier,
            ComponentIdentifier::new(&config.default_namespace, &config.fallback_name),
        )
    }

    /// A mutable copy of an existing snapshot.
    pub fn from_model(model: &ContentModel, default_component: ComponentIdentifier) -> Self {
        Self {
            view_identifier: model.identifier.clone(),
            feature_identifier: model.feature_identifier.clone(),
            title: model.title.clone(),
            extension_uri: model.extension_uri.clone(),
            custom_data: model.custom_data.clone(),
            header: model.header.as_ref().map(ComponentBuilder::from_model),
            body: model.body.iter().map(ComponentBuilder::from_model).collect(),
            overlays: model.overlays.iter().map(ComponentBuilder::from_model).collect(),
            default_component,
        }
    }

    /// Whether the builder holds no items and no title.
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
            && self.body.is_empty()
            && self.overlays.is_empty()
            && self.title.is_none()
    }

    /// Component used for newly created item builders.
    pub fn default_component(&self) -> &ComponentIdentifier {
        &self.default_component
    }

    // --- Header -----------------------------------------------------------

    /// Get or create the header builder.
    pub fn header(&mut self) -> &mut ComponentBuilder {
        let component = self.default_component.clone();
        self.header
            .get_or_insert_with(|| ComponentBuilder::new("header", component))
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    pub fn remove_header(&mut self) {
        self.header = None;
    }

    // --- Body ---------------------------------------------------------------

    /// Get or create the body item builder with `identifier`.
    pub fn body(&mut self, identifier: &str) -> &mut ComponentBuilder {
        let component = self.default_component.clone();
        get_or_create(&mut self.body, identifier, component)
    }

    pub fn has_body(&self, identifier: &str) -> bool {
        self.body.iter().any(|c| c.model_identifier == identifier)
    }

    /// Read-only access to an existing body builder.
    pub fn body_builder(&self, identifier: &str) -> Option<&ComponentBuilder> {
        self.body.iter().find(|c| c.model_identifier == identifier)
    }

    /// Remove a body builder. Returns whether one was removed.
    pub fn remove_body(&mut self, identifier: &str) -> bool {
        remove(&mut self.body, identifier)
    }

    /// Body identifiers in insertion order.
    pub fn body_identifiers(&self) -> Vec<&str> {
        identifiers(&self.body)
    }

    // --- Overlays -----------------------------------------------------------

    /// Get or create the overlay builder with `identifier`.
    pub fn overlay(&mut self, identifier: &str) -> &mut ComponentBuilder {
        let component = self.default_component.clone();
        get_or_create(&mut self.overlays, identifier, component)
    }

    pub fn has_overlay(&self, identifier: &str) -> bool {
        self.overlays
            .iter()
            .any(|c| c.model_identifier == identifier)
    }

    pub fn remove_overlay(&mut self, identifier: &str) -> bool {
        remove(&mut self.overlays, identifier)
    }

    pub fn overlay_identifiers(&self) -> Vec<&str> {
        identifiers(&self.overlays)
    }

    /// Drop the header, every body item and every overlay.
    pub fn remove_all_components(&mut self) {
        self.header = None;
        self.body.clear();
        self.overlays.clear();
    }

    // --- Snapshot -----------------------------------------------------------

    /// Copy the current state into an immutable model stamped with `timestamp`.
    pub fn build(&self, timestamp: DateTime<Utc>) -> ContentModel {
        ContentModel {
            identifier: self.view_identifier.clone(),
            feature_identifier: self.feature_identifier.clone(),
            title: self.title.clone(),
            header: self.header.as_ref().map(|h| h.build(0)),
            body: build_ordered(&self.body),
            overlays: build_ordered(&self.overlays),
            extension_uri: self.extension_uri.clone(),
            custom_data: self.custom_data.clone(),
            build_timestamp: timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// BuilderHandle
// ---------------------------------------------------------------------------

/// Shared handle to the builder of the pass currently in flight.
///
/// Each pass gets its own handle, so an operation that answers after its pass
/// was superseded only ever mutates an orphaned builder.
#[derive(Debug, Clone)]
pub struct BuilderHandle(Arc<Mutex<ContentBuilder>>);

impl BuilderHandle {
    pub fn new(builder: ContentBuilder) -> Self {
        Self(Arc::new(Mutex::new(builder)))
    }

    /// Mutate the builder.
    pub fn update<R>(&self, f: impl FnOnce(&mut ContentBuilder) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Read the builder.
    pub fn read<R>(&self, f: impl FnOnce(&ContentBuilder) -> R) -> R {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Deep copy of the current builder state.
    pub fn copy(&self) -> ContentBuilder {
        self.read(ContentBuilder::clone)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn get_or_create<'a>(
    builders: &'a mut Vec<ComponentBuilder>,
    identifier: &str,
    component: ComponentIdentifier,
) -> &'a mut ComponentBuilder {
    let position = match builders
        .iter()
        .position(|c| c.model_identifier == identifier)
    {
        Some(position) => position,
        None => {
            builders.push(ComponentBuilder::new(identifier, component));
            builders.len() - 1
        }
    };
    &mut builders[position]
}

fn remove(builders: &mut Vec<ComponentBuilder>, identifier: &str) -> bool {
    let before = builders.len();
    builders.retain(|c| c.model_identifier != identifier);
    builders.len() != before
}

fn identifiers(builders: &[ComponentBuilder]) -> Vec<&str> {
    builders
        .iter()
        .map(|c| c.model_identifier.as_str())
        .collect()
}

/// Insertion order first, then builders with a preferred index are placed at
/// that index (clamped), in insertion order.
fn build_ordered(builders: &[ComponentBuilder]) -> Vec<ComponentModel> {
    let mut ordered: Vec<&ComponentBuilder> = builders
        .iter()
        .filter(|b| b.preferred_index.is_none())
        .collect();

    for builder in builders {
        if let Some(preferred) = builder.preferred_index {
            let index = preferred.min(ordered.len());
            ordered.insert(index, builder);
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, builder)| builder.build(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ContentBuilder {
        ContentBuilder::new("feature", ComponentIdentifier::new("default", "row"))
    }

    #[test]
    fn new_builder_is_empty() {
        let mut b = builder();
        assert!(b.is_empty());
        b.title = Some("Home".into());
        assert!(!b.is_empty());
    }

    #[test]
    fn config_sets_default_component() {
        let config = LoaderConfig {
            default_namespace: "music".into(),
            fallback_name: "track".into(),
            ..LoaderConfig::default()
        };
        let mut b = ContentBuilder::with_config("feature", &config);
        assert!(b.is_empty());
        assert_eq!(b.body("a").component, ComponentIdentifier::new("music", "track"));
        assert_eq!(b.default_component(), &ComponentIdentifier::new("music", "track"));
    }

    #[test]
    fn body_accessor_is_get_or_create() {
        let mut b = builder();
        b.body("a").title = Some("first".into());
        b.body("b");
        b.body("a").subtitle = Some("again".into());

        assert_eq!(b.body_identifiers(), vec!["a", "b"]);
        let a = b.body_builder("a").expect("a exists");
        assert_eq!(a.title.as_deref(), Some("first"));
        assert_eq!(a.subtitle.as_deref(), Some("again"));
        assert_eq!(a.component, ComponentIdentifier::new("default", "row"));
    }

    #[test]
    fn removal_by_identifier() {
        let mut b = builder();
        b.body("a");
        b.body("b");
        b.overlay("spinner");
        b.header().title = Some("Header".into());

        assert!(b.remove_body("a"));
        assert!(!b.remove_body("a"));
        assert!(b.remove_overlay("spinner"));
        assert_eq!(b.body_identifiers(), vec!["b"]);

        b.remove_all_components();
        assert!(!b.has_header());
        assert!(b.body_identifiers().is_empty());
    }

    #[test]
    fn preferred_index_reorders_snapshot() {
        let mut b = builder();
        b.body("a");
        b.body("b");
        b.body("top").preferred_index = Some(0);
        b.body("far").preferred_index = Some(99);
        b.body("c");

        let model = b.build(Utc::now());
        let ids = model.body_identifiers();
        assert_eq!(ids, vec!["top", "a", "b", "c", "far"]);
        let indices: Vec<usize> = model.body.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn children_are_built_recursively() {
        let mut b = builder();
        let carousel = b.body("carousel");
        carousel.set_component_name("carousel");
        carousel.child("slide-1").title = Some("One".into());
        carousel.child("slide-2");

        let model = b.build(Utc::now());
        let carousel = &model.body[0];
        assert_eq!(carousel.component.name, "carousel");
        assert_eq!(carousel.children.len(), 2);
        assert_eq!(carousel.children[1].index, 1);
        // Children inherit the parent's component by default.
        assert_eq!(carousel.children[0].component.name, "carousel");
    }

    #[test]
    fn snapshot_does_not_alias_builder() {
        let mut b = builder();
        b.body("a").title = Some("before".into());
        let model = b.build(Utc::now());

        b.body("a").title = Some("after".into());
        assert_eq!(model.body[0].title.as_deref(), Some("before"));
    }

    #[test]
    fn from_model_restores_state() {
        let mut b = builder();
        b.title = Some("Title".into());
        b.header().title = Some("Header".into());
        b.body("a").title = Some("A".into());
        b.body("b").child("b-1");
        b.custom_data
            .insert("key".into(), serde_json::Value::from(1));
        let model = b.build(Utc::now());

        let restored = ContentBuilder::from_model(&model, ComponentIdentifier::default());
        let rebuilt = restored.build(model.build_timestamp);
        assert_eq!(rebuilt, model);
    }

    #[test]
    fn handle_update_and_copy() {
        let handle = BuilderHandle::new(builder());
        handle.update(|b| {
            b.body("a");
        });
        let copy = handle.copy();
        handle.update(|b| {
            b.body("b");
        });

        assert_eq!(copy.body_identifiers(), vec!["a"]);
        assert_eq!(handle.read(|b| b.body_identifiers().len()), 2);
    }
}
