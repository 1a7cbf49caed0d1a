use super::*;

use std::collections::BTreeSet;

// =============================================================================
// FIXTURES
// =============================================================================

fn board(id: &str) -> Board {
    Board { id: id.into(), title: format!("Board {id}"), members: BTreeSet::from(["u1".to_owned()]), ..Default::default() }
}

fn list(id: &str, board_id: &str, position: usize) -> List {
    List { id: id.into(), title: id.into(), board_id: board_id.into(), position, ..Default::default() }
}

fn task(id: &str, list_id: &str, position: usize) -> Task {
    Task { id: id.into(), title: id.into(), list_id: list_id.into(), position, ..Default::default() }
}

/// Board `b1` with `L1: a b t1 c` and `L2: x y`.
fn loaded() -> BoardState {
    let snapshot = BoardSnapshot {
        board: board("b1"),
        lists: vec![list("L1", "b1", 0), list("L2", "b1", 1)],
        tasks: vec![
            task("a", "L1", 0),
            task("b", "L1", 1),
            task("t1", "L1", 2),
            task("c", "L1", 3),
            task("x", "L2", 0),
            task("y", "L2", 1),
        ],
    };
    apply(BoardState::default(), Action::SetSnapshot(snapshot))
}

fn snapshot(state: &BoardState) -> &BoardSnapshot {
    state.snapshot.as_ref().expect("board should be resident")
}

fn ids_in(state: &BoardState, list_id: &str) -> Vec<String> {
    snapshot(state).tasks_for_list(list_id).iter().map(|t| t.id.clone()).collect()
}

fn assert_dense(state: &BoardState) {
    let snap = snapshot(state);
    let mut list_positions: Vec<usize> = snap.lists.iter().map(|l| l.position).collect();
    list_positions.sort_unstable();
    assert_eq!(list_positions, (0..snap.lists.len()).collect::<Vec<_>>(), "list positions not dense");
    for list in &snap.lists {
        let mut positions: Vec<usize> = snap.tasks.iter().filter(|t| t.list_id == list.id).map(|t| t.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..positions.len()).collect::<Vec<_>>(), "task positions in {} not dense", list.id);
    }
}

fn move_action(task_id: &str, target_list_id: &str, target_position: usize) -> Action {
    Action::MoveTask { task_id: task_id.into(), target_list_id: target_list_id.into(), target_position }
}

// =============================================================================
// SNAPSHOT / FLAGS
// =============================================================================

#[test]
fn set_snapshot_clears_loading_and_error() {
    let state = BoardState { snapshot: None, loading: true, error: Some("boom".into()) };
    let state = apply(state, Action::SetSnapshot(BoardSnapshot { board: board("b1"), ..Default::default() }));
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(state.board_id(), Some("b1"));
}

#[test]
fn set_snapshot_normalizes_positions_and_drops_orphans() {
    let raw = BoardSnapshot {
        board: board("b1"),
        lists: vec![list("L2", "b1", 7), list("L1", "b1", 3)],
        tasks: vec![task("a", "L1", 4), task("b", "L1", 9), task("ghost", "gone", 0)],
    };
    let state = apply(BoardState::default(), Action::SetSnapshot(raw));

    let snap = snapshot(&state);
    assert_eq!(snap.sorted_lists().iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["L1", "L2"]);
    assert!(snap.task("ghost").is_none());
    assert_eq!(ids_in(&state, "L1"), vec!["a", "b"]);
    assert_dense(&state);
}

#[test]
fn set_error_clears_loading() {
    let state = apply(BoardState::default(), Action::SetLoading(true));
    assert!(state.loading);
    let state = apply(state, Action::SetError(Some("Failed".into())));
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some("Failed"));
}

#[test]
fn reset_discards_everything() {
    let state = apply(loaded(), Action::Reset);
    assert_eq!(state, BoardState::default());
}

// =============================================================================
// NO SNAPSHOT
// =============================================================================

#[test]
fn edits_without_snapshot_are_noops() {
    let actions = vec![
        Action::AddList(list("L1", "b1", 0)),
        Action::UpdateList(list("L1", "b1", 0)),
        Action::RemoveList { list_id: "L1".into() },
        Action::AddTask(task("t", "L1", 0)),
        Action::UpdateTask(task("t", "L1", 0)),
        Action::RemoveTask { task_id: "t".into() },
        move_action("t", "L1", 0),
        Action::UpdateBoard(board("b1")),
        Action::AddMembers(vec!["u2".into()]),
        Action::RemoveMember { user_id: "u1".into() },
    ];
    let initial = BoardState { snapshot: None, loading: true, error: Some("kept".into()) };
    for action in actions {
        assert_eq!(apply(initial.clone(), action), initial);
    }
}

// =============================================================================
// LISTS
// =============================================================================

#[test]
fn remove_list_cascades_to_its_tasks_only() {
    let snap = BoardSnapshot {
        board: board("b1"),
        lists: vec![list("L1", "b1", 0), list("L2", "b1", 1)],
        tasks: vec![task("a", "L1", 0), task("b", "L1", 1), task("x", "L2", 0)],
    };
    let state = apply(BoardState::default(), Action::SetSnapshot(snap));
    let state = apply(state, Action::RemoveList { list_id: "L1".into() });

    let snap = snapshot(&state);
    assert_eq!(snap.lists.len(), 1);
    assert_eq!(snap.lists[0].id, "L2");
    assert_eq!(snap.lists[0].position, 0);
    assert_eq!(snap.tasks.len(), 1);
    assert_eq!(snap.tasks[0].id, "x");
}

#[test]
fn add_list_twice_keeps_one_and_updates_title() {
    let state = apply(loaded(), Action::AddList(list("L3", "b1", 2)));
    let mut renamed = list("L3", "b1", 2);
    renamed.title = "Done".into();
    let state = apply(state, Action::AddList(renamed));

    let snap = snapshot(&state);
    assert_eq!(snap.lists.iter().filter(|l| l.id == "L3").count(), 1);
    assert_eq!(snap.list("L3").map(|l| l.title.as_str()), Some("Done"));
    assert_dense(&state);
}

#[test]
fn update_list_position_reorders_lists() {
    let state = apply(loaded(), Action::AddList(list("L3", "b1", 2)));
    let state = apply(state, Action::UpdateList(list("L3", "b1", 0)));
    let order: Vec<&str> = snapshot(&state).sorted_lists().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(order, vec!["L3", "L1", "L2"]);
    assert_dense(&state);
}

#[test]
fn update_unknown_list_is_ignored() {
    let before = loaded();
    assert_eq!(apply(before.clone(), Action::UpdateList(list("nope", "b1", 0))), before);
}

#[test]
fn list_for_another_board_is_ignored() {
    let before = loaded();
    assert_eq!(apply(before.clone(), Action::AddList(list("L9", "other", 0))), before);
}

// =============================================================================
// TASKS
// =============================================================================

#[test]
fn add_task_twice_leaves_one_copy() {
    let state = apply(loaded(), Action::AddTask(task("n", "L2", 2)));
    let state = apply(state, Action::AddTask(task("n", "L2", 2)));
    assert_eq!(snapshot(&state).tasks.iter().filter(|t| t.id == "n").count(), 1);
    assert_dense(&state);
}

#[test]
fn optimistic_add_then_created_event_converges() {
    let snap = BoardSnapshot { board: board("b1"), lists: vec![list("L1", "b1", 0)], tasks: vec![] };
    let state = apply(BoardState::default(), Action::SetSnapshot(snap));
    let mut local = task("x", "L1", 0);
    local.title = "Draft".into();
    let state = apply(state, Action::AddTask(local));

    let mut echoed = task("x", "L1", 0);
    echoed.title = "Draft (server)".into();
    let state = apply(state, Action::from(BoardEvent::TaskCreated(echoed)));

    let snap = snapshot(&state);
    assert_eq!(snap.tasks.len(), 1);
    assert_eq!(snap.tasks[0].title, "Draft (server)");
}

#[test]
fn add_task_for_unknown_list_is_ignored() {
    let before = loaded();
    assert_eq!(apply(before.clone(), Action::AddTask(task("n", "missing", 0))), before);
}

#[test]
fn update_task_changes_fields_in_place() {
    let mut edited = task("b", "L1", 1);
    edited.labels.insert("urgent".into());
    let state = apply(loaded(), Action::UpdateTask(edited));
    let snap = snapshot(&state);
    assert!(snap.task("b").is_some_and(|t| t.labels.contains("urgent")));
    assert_eq!(ids_in(&state, "L1"), vec!["a", "b", "t1", "c"]);
}

#[test]
fn update_task_across_lists_renumbers_both() {
    let state = apply(loaded(), Action::UpdateTask(task("a", "L2", 1)));
    assert_eq!(ids_in(&state, "L1"), vec!["b", "t1", "c"]);
    assert_eq!(ids_in(&state, "L2"), vec!["x", "a", "y"]);
    assert_dense(&state);
}

#[test]
fn update_unknown_task_is_ignored() {
    let before = loaded();
    assert_eq!(apply(before.clone(), Action::UpdateTask(task("ghost", "L1", 0))), before);
}

#[test]
fn remove_task_renumbers_its_list() {
    let state = apply(loaded(), Action::RemoveTask { task_id: "b".into() });
    assert_eq!(ids_in(&state, "L1"), vec!["a", "t1", "c"]);
    assert_dense(&state);
}

// =============================================================================
// MOVE
// =============================================================================

#[test]
fn cross_list_move_renumbers_source_and_target() {
    let state = apply(loaded(), move_action("t1", "L2", 0));

    let snap = snapshot(&state);
    let moved = snap.task("t1").expect("moved task present");
    assert_eq!(moved.list_id, "L2");
    assert_eq!(moved.position, 0);
    assert_eq!(snap.task("x").map(|t| t.position), Some(1));
    assert_eq!(snap.task("y").map(|t| t.position), Some(2));
    assert_eq!(ids_in(&state, "L1"), vec!["a", "b", "c"]);
    assert_dense(&state);
}

#[test]
fn same_list_move_reorders() {
    let state = apply(loaded(), move_action("a", "L1", 2));
    assert_eq!(ids_in(&state, "L1"), vec!["b", "t1", "a", "c"]);
    assert_dense(&state);
}

#[test]
fn move_clamps_target_position() {
    let state = apply(loaded(), move_action("a", "L2", 99));
    assert_eq!(ids_in(&state, "L2"), vec!["x", "y", "a"]);
    assert_dense(&state);
}

#[test]
fn move_of_unknown_task_or_into_unknown_list_is_noop() {
    let before = loaded();
    assert_eq!(apply(before.clone(), move_action("ghost", "L2", 0)), before);
    assert_eq!(apply(before.clone(), move_action("a", "ghost-list", 0)), before);
}

#[test]
fn positions_stay_dense_across_move_sequences() {
    let lists = ["L1", "L2", "L3"];
    let tasks = ["a", "b", "t1", "c", "x", "y", "n"];
    let mut state = apply(loaded(), Action::AddList(list("L3", "b1", 2)));
    state = apply(state, Action::AddTask(task("n", "L3", 0)));

    // Small LCG keeps the sequence deterministic.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = |bound: usize| {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        usize::try_from(seed >> 33).unwrap_or(0) % bound
    };

    for _ in 0..500 {
        let task_id = tasks[next(tasks.len())];
        let list_id = lists[next(lists.len())];
        let position = next(9);
        state = apply(state, move_action(task_id, list_id, position));
        assert_dense(&state);
        assert_eq!(snapshot(&state).tasks.len(), tasks.len());
    }
}

// =============================================================================
// BOARD / MEMBERS
// =============================================================================

#[test]
fn update_board_only_applies_to_resident_board() {
    let mut renamed = board("b1");
    renamed.title = "Renamed".into();
    let state = apply(loaded(), Action::UpdateBoard(renamed));
    assert_eq!(snapshot(&state).board.title, "Renamed");

    let before = loaded();
    assert_eq!(apply(before.clone(), Action::UpdateBoard(board("b2"))), before);
}

#[test]
fn member_events_edit_membership_set() {
    let state = apply(loaded(), Action::from(BoardEvent::MemberAdded { user_id: "u2".into() }));
    let state = apply(state, Action::AddMembers(vec!["u2".into(), "u3".into()]));
    assert_eq!(snapshot(&state).board.members.len(), 3);

    let state = apply(state, Action::from(BoardEvent::MemberRemoved { user_id: "u1".into() }));
    let members: Vec<&str> = snapshot(&state).board.members.iter().map(String::as_str).collect();
    assert_eq!(members, vec!["u2", "u3"]);
}

// =============================================================================
// STORE HANDLE
// =============================================================================

#[tokio::test]
async fn store_notifies_subscribers_on_dispatch() {
    let store = Store::new();
    let mut rx = store.subscribe();

    store.dispatch(Action::SetLoading(true));

    tokio::time::timeout(std::time::Duration::from_millis(200), rx.changed())
        .await
        .expect("change notification timed out")
        .expect("store dropped");
    assert!(rx.borrow().loading);
    assert!(store.is_loading());
}

#[test]
fn dispatch_for_checks_resident_board() {
    let store = Store::new();
    assert!(!store.dispatch_for("b1", Action::RemoveTask { task_id: "a".into() }));

    store.dispatch(Action::SetSnapshot(snapshot(&loaded()).clone()));
    assert!(!store.dispatch_for("b2", Action::RemoveTask { task_id: "a".into() }));
    assert!(store.snapshot().is_some_and(|s| s.task("a").is_some()));

    assert!(store.dispatch_for("b1", Action::RemoveTask { task_id: "a".into() }));
    assert!(store.snapshot().is_some_and(|s| s.task("a").is_none()));
    assert_eq!(store.board_id().as_deref(), Some("b1"));
}
