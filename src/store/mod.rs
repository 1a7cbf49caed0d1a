//! Board state store.
//!
//! DESIGN
//! ======
//! One board is resident at a time. Every change, whether an optimistic
//! local edit, a REST correction, or a realtime event from another client,
//! is an [`Action`] fed through the single transition function [`apply`].
//! The store holds the state in a `tokio::sync::watch` channel and only ever
//! replaces it inside `send_modify`, so each transition is atomic and
//! observers see every committed state.
//!
//! Invariants held after every transition:
//! - list positions are dense (`0..n`) within the board
//! - task positions are dense within each list
//! - every task references a list of the resident board
//!
//! Transitions that need a snapshot are no-ops without one. Nothing here
//! panics on unknown IDs; stale or out-of-order input is dropped and logged.

mod placement;

use std::mem;

use tokio::sync::watch;
use tracing::{debug, warn};
use wire::{Board, BoardEvent, BoardSnapshot, List, Task};

use placement::{place, renumber, take_by_id};

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardState {
    pub snapshot: Option<BoardSnapshot>,
    pub loading: bool,
    /// Last externally supplied failure message.
    pub error: Option<String>,
}

impl BoardState {
    /// ID of the resident board, if any.
    #[must_use]
    pub fn board_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.board.id.as_str())
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Replace the resident board. Clears loading and error.
    SetSnapshot(BoardSnapshot),
    SetLoading(bool),
    /// Record (or clear) a failure message. Clears loading.
    SetError(Option<String>),
    /// Drop the resident board entirely.
    Reset,
    /// Replace board metadata when the IDs match.
    UpdateBoard(Board),
    AddList(List),
    UpdateList(List),
    /// Remove a list and every task in it.
    RemoveList { list_id: String },
    AddTask(Task),
    UpdateTask(Task),
    RemoveTask { task_id: String },
    MoveTask { task_id: String, target_list_id: String, target_position: usize },
    AddMembers(Vec<String>),
    RemoveMember { user_id: String },
}

impl From<BoardEvent> for Action {
    fn from(event: BoardEvent) -> Self {
        match event {
            BoardEvent::ListCreated(list) => Self::AddList(list),
            BoardEvent::ListUpdated(list) => Self::UpdateList(list),
            BoardEvent::ListDeleted { list_id } => Self::RemoveList { list_id },
            BoardEvent::TaskCreated(task) => Self::AddTask(task),
            BoardEvent::TaskUpdated(task) => Self::UpdateTask(task),
            BoardEvent::TaskDeleted { task_id } => Self::RemoveTask { task_id },
            BoardEvent::BoardUpdated(board) => Self::UpdateBoard(board),
            BoardEvent::MemberAdded { user_id } => Self::AddMembers(vec![user_id]),
            BoardEvent::MemberRemoved { user_id } => Self::RemoveMember { user_id },
        }
    }
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// The transition function. Pure apart from diagnostics.
#[must_use]
pub fn apply(mut state: BoardState, action: Action) -> BoardState {
    match action {
        Action::SetSnapshot(snapshot) => {
            state.snapshot = Some(normalize(snapshot));
            state.loading = false;
            state.error = None;
        }
        Action::SetLoading(loading) => state.loading = loading,
        Action::SetError(error) => {
            state.error = error;
            state.loading = false;
        }
        Action::Reset => state = BoardState::default(),
        action => match state.snapshot.as_mut() {
            Some(snapshot) => edit(snapshot, action),
            None => debug!(?action, "store: no resident board, action dropped"),
        },
    }
    state
}

fn edit(snapshot: &mut BoardSnapshot, action: Action) {
    match action {
        Action::UpdateBoard(board) => {
            if board.id == snapshot.board.id {
                snapshot.board = board;
            }
        }
        Action::AddList(list) => upsert_list(snapshot, list, true),
        Action::UpdateList(list) => upsert_list(snapshot, list, false),
        Action::RemoveList { list_id } => {
            if take_by_id(&mut snapshot.lists, &list_id).is_some() {
                snapshot.tasks.retain(|task| task.list_id != list_id);
                renumber(&mut snapshot.lists, |_| true);
            }
        }
        Action::AddTask(task) => upsert_task(snapshot, task, true),
        Action::UpdateTask(task) => upsert_task(snapshot, task, false),
        Action::RemoveTask { task_id } => {
            if let Some(removed) = take_by_id(&mut snapshot.tasks, &task_id) {
                renumber(&mut snapshot.tasks, |t| t.list_id == removed.list_id);
            }
        }
        Action::MoveTask { task_id, target_list_id, target_position } => {
            move_task(snapshot, &task_id, &target_list_id, target_position);
        }
        Action::AddMembers(user_ids) => snapshot.board.members.extend(user_ids),
        Action::RemoveMember { user_id } => {
            snapshot.board.members.remove(&user_id);
        }
        Action::SetSnapshot(_) | Action::SetLoading(_) | Action::SetError(_) | Action::Reset => {}
    }
}

/// Dense positions, no orphans.
fn normalize(mut snapshot: BoardSnapshot) -> BoardSnapshot {
    let before = snapshot.tasks.len();
    let lists = &snapshot.lists;
    snapshot.tasks.retain(|task| lists.iter().any(|list| list.id == task.list_id));
    if snapshot.tasks.len() != before {
        warn!(board_id = %snapshot.board.id, dropped = before - snapshot.tasks.len(), "store: orphan tasks dropped");
    }

    renumber(&mut snapshot.lists, |_| true);
    let list_ids: Vec<String> = snapshot.lists.iter().map(|list| list.id.clone()).collect();
    for list_id in list_ids {
        renumber(&mut snapshot.tasks, |task| task.list_id == list_id);
    }
    snapshot
}

/// Add-or-replace a list, re-placing it at its position. `insert` controls
/// whether an unknown ID is added (create) or ignored (update).
fn upsert_list(snapshot: &mut BoardSnapshot, list: List, insert: bool) {
    if list.board_id != snapshot.board.id {
        warn!(list_id = %list.id, board_id = %list.board_id, "store: list for another board ignored");
        return;
    }
    let existed = take_by_id(&mut snapshot.lists, &list.id).is_some();
    if !existed && !insert {
        debug!(list_id = %list.id, "store: update for unknown list ignored");
        return;
    }
    place(&mut snapshot.lists, list, |_| true);
}

/// Add-or-replace a task, re-placing it within its list. When the task
/// changed lists, the list it left is renumbered too.
fn upsert_task(snapshot: &mut BoardSnapshot, task: Task, insert: bool) {
    if snapshot.list(&task.list_id).is_none() {
        warn!(task_id = %task.id, list_id = %task.list_id, "store: task for unknown list ignored");
        return;
    }
    let previous = take_by_id(&mut snapshot.tasks, &task.id);
    if previous.is_none() && !insert {
        debug!(task_id = %task.id, "store: update for unknown task ignored");
        return;
    }
    let target = task.list_id.clone();
    place(&mut snapshot.tasks, task, |t| t.list_id == target);
    if let Some(previous) = previous {
        if previous.list_id != target {
            renumber(&mut snapshot.tasks, |t| t.list_id == previous.list_id);
        }
    }
}

/// Move a task to `target_position` within `target_list_id`.
///
/// 1. Missing task or target list: no-op.
/// 2. Pull the task out and rewrite its list.
/// 3. Insert it among the target list's remaining tasks at the clamped rank.
/// 4. Renumber the target list, and the source list when it differs.
fn move_task(snapshot: &mut BoardSnapshot, task_id: &str, target_list_id: &str, target_position: usize) {
    if snapshot.list(target_list_id).is_none() {
        debug!(%task_id, %target_list_id, "store: move into unknown list ignored");
        return;
    }
    let Some(mut task) = take_by_id(&mut snapshot.tasks, task_id) else {
        debug!(%task_id, "store: move of unknown task ignored");
        return;
    };
    let source = mem::replace(&mut task.list_id, target_list_id.to_owned());
    task.position = target_position;
    place(&mut snapshot.tasks, task, |t| t.list_id == target_list_id);
    if source != target_list_id {
        renumber(&mut snapshot.tasks, |t| t.list_id == source);
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Shared handle to the board state.
#[derive(Debug)]
pub struct Store {
    tx: watch::Sender<BoardState>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BoardState::default());
        Self { tx }
    }

    /// Apply one action atomically.
    pub fn dispatch(&self, action: Action) {
        self.tx.send_modify(|state| {
            let current = mem::take(state);
            *state = apply(current, action);
        });
    }

    /// Apply `action` only if `board_id` is still the resident board.
    /// Returns whether it was applied.
    pub fn dispatch_for(&self, board_id: &str, action: Action) -> bool {
        self.tx.send_if_modified(|state| {
            if state.board_id() != Some(board_id) {
                debug!(%board_id, "store: action for non-resident board dropped");
                return false;
            }
            let current = mem::take(state);
            *state = apply(current, action);
            true
        })
    }

    /// Change notifications. The receiver always sees the latest state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.tx.subscribe()
    }

    /// Read the current state without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&BoardState) -> T) -> T {
        f(&self.tx.borrow())
    }

    #[must_use]
    pub fn state(&self) -> BoardState {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<BoardSnapshot> {
        self.read(|state| state.snapshot.clone())
    }

    #[must_use]
    pub fn board_id(&self) -> Option<String> {
        self.read(|state| state.board_id().map(ToOwned::to_owned))
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.read(|state| state.loading)
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.read(|state| state.error.clone())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
