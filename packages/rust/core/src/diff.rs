//! Structural diff between two content model snapshots.
//!
//! Body items are matched by identifier using a longest common subsequence.
//! Items on the LCS stay in place (and are reloaded if their content changed),
//! identifiers present on both sides but off the LCS become moves, and the
//! rest are plain insertions and deletions.

use serde::{Deserialize, Serialize};

use hubkit_shared::{ComponentModel, ContentModel, IndexPath};

/// A body item that changed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: IndexPath,
    pub to: IndexPath,
    /// The item also needs a reload at its new position.
    pub content_changed: bool,
}

/// Edit list turning one snapshot's body into another's.
///
/// `deleted` and move sources refer to positions in the old body; `inserted`,
/// `reloaded` and move targets refer to positions in the new body. Every list
/// is sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub inserted: Vec<IndexPath>,
    pub deleted: Vec<IndexPath>,
    pub reloaded: Vec<IndexPath>,
    pub moved: Vec<Move>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.deleted.is_empty()
            && self.reloaded.is_empty()
            && self.moved.is_empty()
    }

    /// Total number of edits.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.deleted.len() + self.reloaded.len() + self.moved.len()
    }
}

/// Diff the bodies of two snapshots.
pub fn diff(from: &ContentModel, to: &ContentModel) -> Diff {
    diff_components(&from.body, &to.body)
}

/// Diff two ordered component lists.
pub fn diff_components(from: &[ComponentModel], to: &[ComponentModel]) -> Diff {
    let from_ids: Vec<&str> = from.iter().map(|c| c.identifier.as_str()).collect();
    let to_ids: Vec<&str> = to.iter().map(|c| c.identifier.as_str()).collect();

    let pairs = longest_common_subsequence(&from_ids, &to_ids);

    let mut from_matched = vec![false; from.len()];
    let mut to_matched = vec![false; to.len()];
    let mut result = Diff::default();

    for &(i, j) in &pairs {
        from_matched[i] = true;
        to_matched[j] = true;
        if !from[i].content_eq(&to[j]) {
            result.reloaded.push(IndexPath::root(j));
        }
    }

    // Identifiers on both sides but off the LCS, paired left to right.
    for j in 0..to.len() {
        if to_matched[j] {
            continue;
        }
        let source = (0..from.len()).find(|&i| !from_matched[i] && from_ids[i] == to_ids[j]);
        if let Some(i) = source {
            from_matched[i] = true;
            to_matched[j] = true;
            result.moved.push(Move {
                from: IndexPath::root(i),
                to: IndexPath::root(j),
                content_changed: !from[i].content_eq(&to[j]),
            });
        }
    }

    result.deleted = unmatched(&from_matched);
    result.inserted = unmatched(&to_matched);
    result.moved.sort_by_key(|m| (m.from, m.to));
    result
}

fn unmatched(matched: &[bool]) -> Vec<IndexPath> {
    matched
        .iter()
        .enumerate()
        .filter(|&(_, &m)| !m)
        .map(|(i, _)| IndexPath::root(i))
        .collect()
}

/// Index pairs of a longest common subsequence, ascending.
///
/// Ties prefer advancing through `a`, so duplicates match their earliest
/// counterpart in `b`.
fn longest_common_subsequence(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0usize; (n + 1) * width];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}
