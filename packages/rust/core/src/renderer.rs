//! Turning successive snapshots into render updates.

use std::sync::Arc;

use hubkit_shared::{ComponentModel, ContentModel, HubError, IndexPath, Result};

use crate::diff::{Diff, diff};

/// How a view should update for a newly loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUpdate {
    /// Nothing was rendered before; reload everything.
    Reload,
    /// Apply the edits as a batch.
    Batch(Diff),
}

/// Tracks the last rendered model of a view.
#[derive(Debug, Default)]
pub struct ViewModelRenderer {
    last: Option<Arc<ContentModel>>,
}

impl ViewModelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `model` as rendered and return the update that gets there.
    pub fn render(&mut self, model: Arc<ContentModel>) -> RenderUpdate {
        let update = match &self.last {
            Some(previous) => RenderUpdate::Batch(diff(previous, &model)),
            None => RenderUpdate::Reload,
        };
        self.last = Some(model);
        update
    }

    pub fn last_rendered(&self) -> Option<&Arc<ContentModel>> {
        self.last.as_ref()
    }
}

/// Apply `diff` to `from` with batch-update semantics, taking new content
/// from `to`.
///
/// Deletions and move sources are removed in descending order, then
/// insertions and move targets are inserted in ascending order, then reloads
/// are replaced in place.
pub fn apply_diff(
    from: &[ComponentModel],
    to: &[ComponentModel],
    diff: &Diff,
) -> Result<Vec<ComponentModel>> {
    let mut removals: Vec<usize> = diff
        .deleted
        .iter()
        .chain(diff.moved.iter().map(|m| &m.from))
        .map(|p| p.root)
        .collect();
    removals.sort_unstable();
    removals.dedup();

    let mut insertions: Vec<usize> = diff
        .inserted
        .iter()
        .chain(diff.moved.iter().map(|m| &m.to))
        .map(|p| p.root)
        .collect();
    insertions.sort_unstable();
    insertions.dedup();

    let mut body = from.to_vec();
    for &index in removals.iter().rev() {
        if index >= body.len() {
            return Err(out_of_range("deletion", index));
        }
        body.remove(index);
    }

    for &index in &insertions {
        let item = to.get(index).ok_or_else(|| out_of_range("insertion", index))?;
        if index > body.len() {
            return Err(out_of_range("insertion", index));
        }
        body.insert(index, item.clone());
    }

    for path in &diff.reloaded {
        let item = to
            .get(path.root)
            .ok_or_else(|| out_of_range("reload", path.root))?;
        let slot = body
            .get_mut(path.root)
            .ok_or_else(|| out_of_range("reload", path.root))?;
        *slot = item.clone();
    }

    for (index, item) in body.iter_mut().enumerate() {
        item.index = index;
    }
    Ok(body)
}

fn out_of_range(kind: &str, index: usize) -> HubError {
    HubError::validation(format!(
        "{kind} at {} is out of range",
        IndexPath::root(index)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_components;

    fn rows(ids: &[String]) -> Vec<ComponentModel> {
        ids.iter().map(ComponentModel::new).collect()
    }

    /// Small deterministic generator so failures are reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }

        fn sequence(&mut self) -> Vec<String> {
            let len = self.next(8);
            (0..len).map(|_| format!("id-{}", self.next(5))).collect()
        }
    }

    #[test]
    fn applying_diff_reconstructs_target_order() {
        let mut rng = Lcg(42);
        for _ in 0..300 {
            let from = rows(&rng.sequence());
            let mut to = rows(&rng.sequence());
            if let Some(first) = to.first_mut() {
                first.title = Some("changed".into());
            }

            let edits = diff_components(&from, &to);
            let applied = apply_diff(&from, &to, &edits).expect("diff applies");

            let applied_ids: Vec<&str> = applied.iter().map(|c| c.identifier.as_str()).collect();
            let expected_ids: Vec<&str> = to.iter().map(|c| c.identifier.as_str()).collect();
            assert_eq!(applied_ids, expected_ids, "from {from:?}");
            assert!(applied.iter().zip(&to).all(|(a, b)| a.content_eq(b)));
        }
    }

    #[test]
    fn out_of_range_diff_is_rejected() {
        let from = rows(&["a".to_string()]);
        let edits = Diff {
            deleted: vec![IndexPath::root(4)],
            ..Diff::default()
        };
        assert!(apply_diff(&from, &from, &edits).is_err());
    }

    #[test]
    fn first_render_reloads_then_batches() {
        let mut renderer = ViewModelRenderer::new();
        let mut model = ContentModel::empty("view", "feature");
        model.body = rows(&["a".to_string()]);
        let first = Arc::new(model.clone());

        assert_eq!(renderer.render(first.clone()), RenderUpdate::Reload);

        model.body.push(ComponentModel::new("b"));
        match renderer.render(Arc::new(model)) {
            RenderUpdate::Batch(diff) => assert_eq!(diff.inserted, vec![IndexPath::root(1)]),
            RenderUpdate::Reload => panic!("expected a batch update"),
        }
        assert_eq!(
            renderer.last_rendered().map(|m| m.body.len()),
            Some(2)
        );
    }
}
