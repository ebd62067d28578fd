//! Declarative view scripts for `hubkit load`.
//!
//! A script names a view and the operations of its chain:
//!
//! ```toml
//! view_uri = "hub:demo"
//! feature = "demo"
//! title = "Demo"
//!
//! [[operations]]
//! kind = "json"
//! path = "header.json"
//!
//! [[operations]]
//! kind = "rows"
//! prefix = "track"
//! page_size = 5
//! delay_ms = 50
//!
//! [[operations]]
//! kind = "fail"
//! message = "backend unavailable"
//! offline_only = true
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use hubkit_core::{
    Capabilities, ContentBuilder, ContentOperation, OperationContext, OutcomeSink,
};
use hubkit_shared::{ConnectivityState, FeatureInfo, HubError, Result};

// ---------------------------------------------------------------------------
// Script schema
// ---------------------------------------------------------------------------

/// A view and its operation chain.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ViewScript {
    pub view_uri: Url,
    #[serde(default = "default_feature")]
    pub feature: String,
    pub title: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

/// Upper bound for `page_size` in `rows` operations.
pub(crate) const MAX_PAGE_SIZE: usize = 10_000;

fn default_feature() -> String {
    "script".into()
}

/// Operation kinds understood by the script runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OperationKind {
    /// Merge JSON content (inline `data` or a file at `path`).
    Json,
    /// Generate `page_size` rows, and another batch for every page.
    Rows,
    /// Report `message` as an error.
    Fail,
    /// Reschedule on the first invocation, finish afterwards.
    RescheduleOnce,
}

/// One `[[operations]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OperationSpec {
    pub kind: OperationKind,
    /// Report the outcome from a background task after this delay.
    #[serde(default)]
    pub delay_ms: u64,
    pub data: Option<String>,
    pub path: Option<PathBuf>,
    pub prefix: Option<String>,
    pub page_size: Option<usize>,
    pub message: Option<String>,
    /// For `fail`: only fail while offline.
    #[serde(default)]
    pub offline_only: bool,
}

impl ViewScript {
    /// Read and parse a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;
        Self::parse(&content)
            .map_err(|e| HubError::config(format!("invalid view script {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn feature_info(&self) -> FeatureInfo {
        let title = self.title.clone().unwrap_or_else(|| self.feature.clone());
        FeatureInfo::new(&self.feature, title)
    }

    /// Instantiate the chain. Relative `path`s resolve against `base_dir`.
    pub fn build_operations(&self, base_dir: &Path) -> Result<Vec<Arc<dyn ContentOperation>>> {
        self.operations
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.build(index, base_dir))
            .collect()
    }
}

impl OperationSpec {
    fn build(&self, index: usize, base_dir: &Path) -> Result<Arc<dyn ContentOperation>> {
        let delay = Duration::from_millis(self.delay_ms);
        let operation: Arc<dyn ContentOperation> = match self.kind {
            OperationKind::Json => {
                let data = match (&self.data, &self.path) {
                    (Some(data), None) => data.clone().into_bytes(),
                    (None, Some(path)) => {
                        let path = base_dir.join(path);
                        std::fs::read(&path).map_err(|e| HubError::io(&path, e))?
                    }
                    _ => {
                        return Err(HubError::validation(format!(
                            "operation {index}: json needs exactly one of `data` or `path`"
                        )));
                    }
                };
                Arc::new(JsonOperation { data, delay })
            }
            OperationKind::Rows => {
                let page_size = self.page_size.unwrap_or(10);
                if page_size == 0 || page_size > MAX_PAGE_SIZE {
                    return Err(HubError::validation(format!(
                        "operation {index}: page_size must be between 1 and {MAX_PAGE_SIZE}"
                    )));
                }
                Arc::new(RowsOperation {
                    prefix: self.prefix.clone().unwrap_or_else(|| "row".into()),
                    page_size,
                    delay,
                })
            }
            OperationKind::Fail => Arc::new(FailOperation {
                message: self
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("operation {index} failed")),
                offline_only: self.offline_only,
                delay,
            }),
            OperationKind::RescheduleOnce => Arc::new(RescheduleOnceOperation {
                rescheduled: AtomicBool::new(false),
                delay,
            }),
        };
        debug!(index, kind = ?self.kind, "built script operation");
        Ok(operation)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Run `work` now, or on a background task after `delay`.
fn deliver(delay: Duration, work: impl FnOnce() + Send + 'static) {
    if delay.is_zero() {
        work();
    } else {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work();
        });
    }
}

struct JsonOperation {
    data: Vec<u8>,
    delay: Duration,
}

impl ContentOperation for JsonOperation {
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink) {
        let data = self.data.clone();
        deliver(self.delay, move || {
            match ctx.builder.update(|builder| builder.add_json_data(&data)) {
                Ok(()) => sink.finish(),
                Err(error) => sink.fail(error),
            }
        });
    }
}

struct RowsOperation {
    prefix: String,
    page_size: usize,
    delay: Duration,
}

impl RowsOperation {
    fn add_rows(&self, builder: &mut ContentBuilder, page_index: usize) -> Result<()> {
        let start = page_index
            .checked_mul(self.page_size)
            .ok_or_else(|| HubError::validation(format!("page {page_index} is out of range")))?;
        for n in start..start.saturating_add(self.page_size) {
            let row = builder.body(&format!("{}-{n}", self.prefix));
            row.title = Some(format!("{} {}", self.prefix, n + 1));
            row.subtitle = Some(format!("page {page_index}"));
        }
        Ok(())
    }

    fn run(&self, page_index: usize, ctx: OperationContext, sink: OutcomeSink) {
        let result = ctx.builder.update(|builder| self.add_rows(builder, page_index));
        deliver(self.delay, move || match result {
            Ok(()) => sink.finish(),
            Err(error) => sink.fail(error),
        });
    }
}

impl ContentOperation for RowsOperation {
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink) {
        self.run(0, ctx, sink);
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
            .with_pagination()
            .with_initial_content()
    }

    fn add_initial_content(&self, _view_uri: &Url, builder: &mut ContentBuilder) {
        let placeholder = builder.body(&format!("{}-placeholder", self.prefix));
        placeholder.title = Some("Loading…".into());
    }

    fn append_content_for_page(&self, page_index: usize, ctx: OperationContext, sink: OutcomeSink) {
        self.run(page_index, ctx, sink);
    }
}

struct FailOperation {
    message: String,
    offline_only: bool,
    delay: Duration,
}

impl ContentOperation for FailOperation {
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink) {
        if self.offline_only && ctx.connectivity == ConnectivityState::Online {
            sink.finish();
            return;
        }
        let error = HubError::operation(&self.message);
        deliver(self.delay, move || sink.fail(error));
    }
}

struct RescheduleOnceOperation {
    rescheduled: AtomicBool,
    delay: Duration,
}

impl ContentOperation for RescheduleOnceOperation {
    fn perform(&self, ctx: OperationContext, sink: OutcomeSink) {
        if self.rescheduled.swap(true, Ordering::AcqRel) {
            // Forward an incoming error unchanged.
            match ctx.previous_error {
                Some(error) => sink.fail_shared(error),
                None => sink.finish(),
            }
        } else {
            deliver(self.delay, move || sink.reschedule());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hubkit_core::{LoadEvent, LoaderSetup, OperationChain, ViewModelLoader, channel_subscriber};

    const SCRIPT: &str = r#"
view_uri = "hub:demo"
feature = "demo"
title = "Demo"

[[operations]]
kind = "json"
data = '{"title": "Demo view", "body": [{"id": "intro", "text": {"title": "Hello"}}]}'

[[operations]]
kind = "reschedule_once"

[[operations]]
kind = "rows"
prefix = "track"
page_size = 2
delay_ms = 5
"#;

    #[test]
    fn parses_script() {
        let script = ViewScript::parse(SCRIPT).expect("valid script");
        assert_eq!(script.view_uri.as_str(), "hub:demo");
        assert_eq!(script.feature_info(), FeatureInfo::new("demo", "Demo"));
        assert_eq!(script.operations.len(), 3);
        assert_eq!(script.operations[2].kind, OperationKind::Rows);
        assert_eq!(script.operations[2].delay_ms, 5);
    }

    #[test]
    fn rejects_unknown_kinds_and_fields() {
        assert!(ViewScript::parse("view_uri = \"hub:x\"\n[[operations]]\nkind = \"nope\"\n").is_err());
        assert!(ViewScript::parse("view_uri = \"hub:x\"\nextra = 1\n").is_err());
    }

    #[test]
    fn json_operation_needs_one_source() {
        let script = ViewScript::parse("view_uri = \"hub:x\"\n[[operations]]\nkind = \"json\"\n")
            .expect("valid script");
        let err = script.build_operations(Path::new(".")).err().expect("missing source");
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn rows_page_size_is_bounded() {
        for page_size in [0, MAX_PAGE_SIZE + 1, i64::MAX as usize] {
            let script = ViewScript::parse(&format!(
                "view_uri = \"hub:x\"\n[[operations]]\nkind = \"rows\"\npage_size = {page_size}\n"
            ))
            .expect("valid script");
            let err = script.build_operations(Path::new(".")).err().expect("rejected");
            assert!(err.to_string().contains("page_size"), "{err}");
        }
    }

    #[test]
    fn rows_reject_out_of_range_pages() {
        let rows = RowsOperation {
            prefix: "row".into(),
            page_size: MAX_PAGE_SIZE,
            delay: Duration::ZERO,
        };
        let mut builder = ContentBuilder::new("rows", Default::default());
        assert!(rows.add_rows(&mut builder, usize::MAX).is_err());
        assert!(builder.is_empty());

        rows.add_rows(&mut builder, 1).expect("in range");
        assert_eq!(builder.body_identifiers().first(), Some(&"row-10000"));
    }

    #[tokio::test]
    async fn script_chain_loads_and_paginates() {
        let script = ViewScript::parse(SCRIPT).expect("valid script");
        let operations = script.build_operations(Path::new(".")).expect("operations");
        let chain = OperationChain::new(&script.view_uri, operations).expect("chain");
        let (subscriber, mut events) = channel_subscriber();
        let loader = ViewModelLoader::spawn(LoaderSetup::new(
            script.view_uri.clone(),
            script.feature_info(),
            chain,
            subscriber,
        ));
        assert_eq!(loader.initial_model().body_identifiers(), vec!["track-placeholder"]);

        loader.request_load(false).expect("running");
        let Some(LoadEvent::Loaded(model)) = events.recv().await else {
            panic!("expected a model");
        };
        assert_eq!(model.title.as_deref(), Some("Demo view"));
        assert_eq!(model.body_identifiers(), vec!["intro", "track-0", "track-1"]);

        loader.request_next_page().expect("running");
        let Some(LoadEvent::Loaded(page)) = events.recv().await else {
            panic!("expected a page");
        };
        assert_eq!(page.body_identifiers(), vec!["intro", "track-0", "track-1", "track-2", "track-3"]);
    }

    #[tokio::test]
    async fn offline_only_failure_follows_connectivity() {
        let script = ViewScript::parse(
            "view_uri = \"hub:x\"\n[[operations]]\nkind = \"fail\"\nmessage = \"no network\"\noffline_only = true\n",
        )
        .expect("valid script");

        for (connectivity, should_fail) in [
            (ConnectivityState::Online, false),
            (ConnectivityState::Offline, true),
        ] {
            let operations = script.build_operations(Path::new(".")).expect("operations");
            let chain = OperationChain::new(&script.view_uri, operations).expect("chain");
            let (subscriber, mut events) = channel_subscriber();
            let setup = LoaderSetup::new(script.view_uri.clone(), script.feature_info(), chain, subscriber)
                .with_connectivity(Arc::new(move || connectivity));
            let loader = ViewModelLoader::spawn(setup);

            loader.request_load(false).expect("running");
            let event = events.recv().await.expect("event");
            assert_eq!(matches!(event, LoadEvent::Failed(_)), should_fail);
        }
    }
}
