//! JSON content ingestion for [`ContentBuilder`].
//!
//! Content arrives in a fixed schema:
//!
//! ```json
//! {
//!   "id": "view-id",
//!   "title": "Navigation title",
//!   "header": { "component": "header", "text": { "title": "Hello" } },
//!   "body": [
//!     {
//!       "id": "row-1",
//!       "component": "music:album",
//!       "text": { "title": "..", "subtitle": "..", "accessory": "..", "description": ".." },
//!       "target": { "uri": "spotify:album:1" },
//!       "custom": {}, "logging": {}, "metadata": {},
//!       "date": "2024-01-01T00:00:00Z",
//!       "preferredIndex": 0,
//!       "children": []
//!     }
//!   ],
//!   "overlays": [],
//!   "extension": "https://example.com/more",
//!   "custom": {}
//! }
//! ```
//!
//! Items are merged into existing builders by `id`. Items without an `id`
//! get a generated one. `metadata` is merged into the item's custom data.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use hubkit_shared::{ComponentIdentifier, HubError, JsonMap, Result};

use crate::builder::{ComponentBuilder, ContentBuilder};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ViewJson {
    id: Option<String>,
    title: Option<String>,
    header: Option<ComponentJson>,
    body: Vec<ComponentJson>,
    overlays: Vec<ComponentJson>,
    extension: Option<String>,
    custom: JsonMap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComponentJson {
    id: Option<String>,
    component: Option<String>,
    text: TextJson,
    target: Option<TargetJson>,
    metadata: JsonMap,
    logging: JsonMap,
    custom: JsonMap,
    date: Option<DateTime<Utc>>,
    children: Vec<ComponentJson>,
    preferred_index: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextJson {
    title: Option<String>,
    subtitle: Option<String>,
    accessory: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TargetJson {
    uri: Option<String>,
}

impl ContentBuilder {
    /// Merge JSON content into the builder.
    ///
    /// The builder is left untouched when the data is malformed.
    pub fn add_json_data(&mut self, data: &[u8]) -> Result<()> {
        let view: ViewJson = serde_json::from_slice(data)?;

        let mut staged = self.clone();
        staged.apply_view(view)?;
        *self = staged;
        Ok(())
    }

    fn apply_view(&mut self, view: ViewJson) -> Result<()> {
        if let Some(id) = view.id {
            self.view_identifier = id;
        }
        if let Some(title) = view.title {
            self.title = Some(title);
        }
        if let Some(extension) = view.extension {
            self.extension_uri = Some(parse_uri(&extension)?);
        }
        self.custom_data.extend(view.custom);

        let namespace = self.default_component().namespace.clone();

        if let Some(header) = view.header {
            apply_component(self.header(), header, &namespace)?;
        }

        let body_count = view.body.len();
        for item in view.body {
            let id = item.id.clone().unwrap_or_else(generated_id);
            apply_component(self.body(&id), item, &namespace)?;
        }

        for item in view.overlays {
            let id = item.id.clone().unwrap_or_else(generated_id);
            apply_component(self.overlay(&id), item, &namespace)?;
        }

        debug!(body = body_count, "merged JSON content");
        Ok(())
    }
}

fn apply_component(
    builder: &mut ComponentBuilder,
    item: ComponentJson,
    default_namespace: &str,
) -> Result<()> {
    if let Some(component) = item.component {
        builder.component = ComponentIdentifier::parse_with_default(&component, default_namespace)?;
    }
    if let Some(title) = item.text.title {
        builder.title = Some(title);
    }
    if let Some(subtitle) = item.text.subtitle {
        builder.subtitle = Some(subtitle);
    }
    if let Some(accessory) = item.text.accessory {
        builder.accessory_title = Some(accessory);
    }
    if let Some(description) = item.text.description {
        builder.description_text = Some(description);
    }
    if let Some(uri) = item.target.and_then(|t| t.uri) {
        builder.target_uri = Some(parse_uri(&uri)?);
    }
    if item.date.is_some() {
        builder.date = item.date;
    }
    if item.preferred_index.is_some() {
        builder.preferred_index = item.preferred_index;
    }
    builder.custom_data.extend(item.metadata);
    builder.custom_data.extend(item.custom);
    builder.logging_data.extend(item.logging);

    for child in item.children {
        let id = child.id.clone().unwrap_or_else(generated_id);
        apply_component(builder.child(&id), child, default_namespace)?;
    }
    Ok(())
}

fn parse_uri(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| HubError::validation(format!("invalid URI '{value}': {e}")))
}

fn generated_id() -> String {
    Uuid::now_v7().to_string()
}
