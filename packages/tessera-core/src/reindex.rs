//! Position reindexing for ordered siblings.
//!
//! Lists within a board and cards within a list are kept dense: after every
//! insert, move or removal the positions are rewritten to `0..n-1` in
//! sequence order. Local optimistic operations and remote events both go
//! through these functions, so ties are broken identically on either path.

use crate::types::{Card, List};

/// An entity that occupies a slot in an ordered container.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
}

impl Positioned for List {
    fn id(&self) -> &str {
        &self.id
    }
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

impl Positioned for Card {
    fn id(&self) -> &str {
        &self.id
    }
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

/// Result of a relocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reindexed<T> {
    /// The container the entity ended up in, reindexed.
    pub target: Vec<T>,
    /// The remainder of the source container for cross-container moves.
    pub source: Option<Vec<T>>,
}

/// Assign contiguous positions in slice order.
pub fn reindex<T: Positioned>(items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_position(i as i64);
    }
}

/// Stable sort by current position; equal positions keep their relative order.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
}

/// Clamp a requested index into `[0, len]`.
pub fn clamp_index(index: i64, len: usize) -> usize {
    if index <= 0 {
        0
    } else {
        (index as u64).min(len as u64) as usize
    }
}

/// Insert `item` at `index` (clamped) and reindex.
pub fn insert_at<T: Positioned>(mut items: Vec<T>, item: T, index: i64) -> Vec<T> {
    let at = clamp_index(index, items.len());
    items.insert(at, item);
    reindex(&mut items);
    items
}

/// Remove the entity with `id` and reindex what remains.
pub fn remove<T: Positioned>(mut items: Vec<T>, id: &str) -> (Vec<T>, Option<T>) {
    let removed = items
        .iter()
        .position(|item| item.id() == id)
        .map(|at| items.remove(at));
    reindex(&mut items);
    (items, removed)
}

/// Move `id` out of `source` to `index` of `target`.
///
/// With `target == None` the move happens within `source` and the reindexed
/// sequence is returned as `target`. Returns `None` when `id` is not in
/// `source`. The index is interpreted against the target without the moved
/// entity, so moving the first of three items to index 2 puts it last.
pub fn relocate<T: Positioned>(
    source: Vec<T>,
    target: Option<Vec<T>>,
    id: &str,
    index: i64,
) -> Option<Reindexed<T>> {
    let (remaining, moved) = remove(source, id);
    let moved = moved?;
    match target {
        None => Some(Reindexed {
            target: insert_at(remaining, moved, index),
            source: None,
        }),
        Some(target) => Some(Reindexed {
            target: insert_at(target, moved, index),
            source: Some(remaining),
        }),
    }
}

/// Whether positions already equal `0..n-1` in order.
pub fn is_contiguous<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(i, item)| item.position() == i as i64)
}
