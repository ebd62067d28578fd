//! Core content model types for hubkit views.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HubError;

/// Free-form JSON object used for custom, logging and metadata payloads.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// ConnectivityState
// ---------------------------------------------------------------------------

/// Connectivity state resolved once at the start of every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureInfo
// ---------------------------------------------------------------------------

/// Identity of the feature a view belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    /// Stable feature identifier.
    pub identifier: String,
    /// Human-readable title.
    pub title: String,
}

impl FeatureInfo {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentIdentifier
// ---------------------------------------------------------------------------

/// A `namespace:name` pair naming the component that renders an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentIdentifier {
    pub namespace: String,
    pub name: String,
}

impl ComponentIdentifier {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace:name`, or a bare `name` within `default_namespace`.
    pub fn parse_with_default(
        value: &str,
        default_namespace: &str,
    ) -> std::result::Result<Self, HubError> {
        match value.split_once(':') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            Some(_) => Err(HubError::validation(format!(
                "invalid component identifier '{value}'"
            ))),
            None if !value.is_empty() => Ok(Self::new(default_namespace, value)),
            None => Err(HubError::validation("empty component identifier")),
        }
    }
}

impl Default for ComponentIdentifier {
    fn default() -> Self {
        Self::new("default", "row")
    }
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for ComponentIdentifier {
    type Err = HubError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_with_default(s, "default")
    }
}

impl TryFrom<String> for ComponentIdentifier {
    type Error = HubError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentIdentifier> for String {
    fn from(value: ComponentIdentifier) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// IndexPath
// ---------------------------------------------------------------------------

/// Position within a model's body: a root index plus an optional child index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexPath {
    pub root: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<usize>,
}

impl IndexPath {
    pub fn root(root: usize) -> Self {
        Self { root, child: None }
    }

    pub fn child(root: usize, child: usize) -> Self {
        Self {
            root,
            child: Some(child),
        }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.child {
            Some(child) => write!(f, "{}.{}", self.root, child),
            None => write!(f, "{}", self.root),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentModel
// ---------------------------------------------------------------------------

/// An immutable item of a content model (header, body row or overlay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentModel {
    /// Stable identifier used for diffing.
    pub identifier: String,
    /// Position within the parent list. Transient, ignored by content equality.
    #[serde(default)]
    pub index: usize,
    /// Component that renders this item.
    #[serde(default)]
    pub component: ComponentIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessory_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_data: JsonMap,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub logging_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// Nested child items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ComponentModel>,
}

impl ComponentModel {
    /// A bare model with only an identifier, rendered by the default component.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            index: 0,
            component: ComponentIdentifier::default(),
            content_identifier: None,
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

    /// Semantic equality: every field except the transient `index`, recursively.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.component == other.component
            && self.content_identifier == other.content_identifier
            && self.title == other.title
            && self.subtitle == other.subtitle
            && self.accessory_title == other.accessory_title
            && self.description_text == other.description_text
            && self.target_uri == other.target_uri
            && self.custom_data == other.custom_data
            && self.logging_data == other.logging_data
            && self.date == other.date
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.content_eq(b))
    }
}

// ---------------------------------------------------------------------------
// ContentModel
// ---------------------------------------------------------------------------

/// Immutable snapshot of a view's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModel {
    /// View identifier.
    pub identifier: String,
    #[serde(default)]
    pub feature_identifier: String,
    /// Navigation bar title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<ComponentModel>,
    #[serde(default)]
    pub body: Vec<ComponentModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<ComponentModel>,
    /// URI to load more content from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_data: JsonMap,
    /// When the snapshot was taken.
    #[serde(default)]
    pub build_timestamp: DateTime<Utc>,
}

impl ContentModel {
    /// An empty model, as produced before any content was loaded.
    pub fn empty(identifier: impl Into<String>, feature_identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            feature_identifier: feature_identifier.into(),
            title: None,
            header: None,
            body: Vec::new(),
            overlays: Vec::new(),
            extension_uri: None,
            custom_data: JsonMap::new(),
            build_timestamp: Utc::now(),
        }
    }

    /// Body identifiers in order.
    pub fn body_identifiers(&self) -> Vec<&str> {
        self.body.iter().map(|c| c.identifier.as_str()).collect()
    }

    /// Look up a body item (or one of its children) by path.
    pub fn component_at(&self, path: IndexPath) -> Option<&ComponentModel> {
        let root = self.body.get(path.root)?;
        match path.child {
            Some(child) => root.children.get(child),
            None => Some(root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_identifier_parsing() {
        let id: ComponentIdentifier = "music:album".parse().expect("parse");
        assert_eq!(id.namespace, "music");
        assert_eq!(id.name, "album");
        assert_eq!(id.to_string(), "music:album");

        let bare = ComponentIdentifier::parse_with_default("card", "spotify").expect("parse");
        assert_eq!(bare, ComponentIdentifier::new("spotify", "card"));

        assert!("music:".parse::<ComponentIdentifier>().is_err());
        assert!("".parse::<ComponentIdentifier>().is_err());
    }

    #[test]
    fn content_eq_ignores_index() {
        let mut a = ComponentModel::new("row-1");
        a.title = Some("Title".into());
        let mut b = a.clone();
        b.index = 7;
        assert!(a.content_eq(&b));
        assert_ne!(a, b);

        b.subtitle = Some("changed".into());
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn content_eq_compares_children() {
        let mut a = ComponentModel::new("carousel");
        a.children.push(ComponentModel::new("child-1"));
        let mut b = a.clone();
        assert!(a.content_eq(&b));

        b.children[0].title = Some("new".into());
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn index_path_display() {
        assert_eq!(IndexPath::root(3).to_string(), "3");
        assert_eq!(IndexPath::child(3, 1).to_string(), "3.1");
        assert!(IndexPath::root(1) < IndexPath::root(2));
    }

    #[test]
    fn content_model_deserializes_with_defaults() {
        let json = r#"{
            "identifier": "home",
            "body": [
                {"identifier": "a", "component": "music:album", "title": "A"},
                {"identifier": "b", "children": [{"identifier": "b-1"}]}
            ]
        }"#;
        let model: ContentModel = serde_json::from_str(json).expect("deserialize");
        assert_eq!(model.body_identifiers(), vec!["a", "b"]);
        assert_eq!(model.body[0].component, ComponentIdentifier::new("music", "album"));
        assert_eq!(model.body[1].component, ComponentIdentifier::default());
        assert_eq!(
            model
                .component_at(IndexPath::child(1, 0))
                .map(|c| c.identifier.as_str()),
            Some("b-1")
        );
        assert!(model.component_at(IndexPath::root(5)).is_none());
    }

    #[test]
    fn connectivity_serialization() {
        let json = serde_json::to_string(&ConnectivityState::Offline).expect("serialize");
        assert_eq!(json, r#""offline""#);
    }
}
