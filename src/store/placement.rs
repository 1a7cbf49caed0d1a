//! Dense ranking for positioned items.
//!
//! Lists rank among the lists of a board and tasks rank among the tasks of a
//! list. Both keep positions exactly `0..n` after every edit, so placement is
//! written once against [`Ranked`] and reused for both.

use wire::{List, Task};

pub(crate) trait Ranked {
    fn id(&self) -> &str;
    fn position(&self) -> usize;
    fn set_position(&mut self, position: usize);
}

impl Ranked for List {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

impl Ranked for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Indices of the group members, ordered by current position. Ties keep
/// storage order.
fn ordered_group<T: Ranked>(items: &[T], in_group: impl Fn(&T) -> bool) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..items.len()).filter(|&i| in_group(&items[i])).collect();
    indices.sort_by_key(|&i| (items[i].position(), i));
    indices
}

/// Rewrite the group's positions to `0..n`, preserving relative order.
pub(crate) fn renumber<T: Ranked>(items: &mut [T], in_group: impl Fn(&T) -> bool) {
    for (rank, index) in ordered_group(items, in_group).into_iter().enumerate() {
        items[index].set_position(rank);
    }
}

/// Insert `item` into its group at `item.position()`, clamped to the group's
/// length, and renumber the group around it.
///
/// `item` must already be absent from `items`.
pub(crate) fn place<T: Ranked>(items: &mut Vec<T>, mut item: T, in_group: impl Fn(&T) -> bool) {
    let group = ordered_group(items, in_group);
    let slot = item.position().min(group.len());
    for (rank, index) in group.into_iter().enumerate() {
        items[index].set_position(if rank < slot { rank } else { rank + 1 });
    }
    item.set_position(slot);
    items.push(item);
}

/// Remove and return the item with `id`.
pub(crate) fn take_by_id<T: Ranked>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let index = items.iter().position(|item| item.id() == id)?;
    Some(items.remove(index))
}

#[cfg(test)]
#[path = "placement_test.rs"]
mod tests;
