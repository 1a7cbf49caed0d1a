use super::*;

fn task(id: &str, list_id: &str, position: usize, title: &str) -> Task {
    Task {
        id: id.to_owned(),
        title: title.to_owned(),
        list_id: list_id.to_owned(),
        position,
        ..Task::default()
    }
}

fn snapshot() -> BoardSnapshot {
    BoardSnapshot {
        board: Board { id: "b1".into(), title: "Roadmap".into(), ..Board::default() },
        lists: vec![
            List { id: "L2".into(), title: "Done".into(), board_id: "b1".into(), position: 1, ..List::default() },
            List { id: "L1".into(), title: "Todo".into(), board_id: "b1".into(), position: 0, ..List::default() },
        ],
        tasks: vec![
            task("t2", "L1", 1, "Write docs"),
            task("t1", "L1", 0, "Fix login"),
            task("t3", "L2", 0, "Ship"),
        ],
    }
}

#[test]
fn task_deserializes_backend_field_names() {
    let json = serde_json::json!({
        "_id": "t1",
        "title": "Fix login",
        "description": "500 on submit",
        "listId": "L1",
        "createdBy": "u1",
        "assignedTo": ["u2", "u2"],
        "labels": ["bug"],
        "dueDate": "2026-01-01T00:00:00.000Z",
        "position": 3,
        "createdAt": "2025-12-01T00:00:00.000Z",
        "updatedAt": "2025-12-02T00:00:00.000Z"
    });
    let task: Task = serde_json::from_value(json).expect("task should decode");
    assert_eq!(task.id, "t1");
    assert_eq!(task.list_id, "L1");
    assert_eq!(task.position, 3);
    assert_eq!(task.assigned_to.len(), 1);
    assert!(task.labels.contains("bug"));
    assert_eq!(task.due_date.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    assert_eq!(task.created_by.as_deref(), Some("u1"));
}

#[test]
fn task_missing_optional_fields_uses_defaults() {
    let json = serde_json::json!({ "_id": "t1", "title": "x", "listId": "L1" });
    let task: Task = serde_json::from_value(json).expect("task should decode");
    assert_eq!(task.position, 0);
    assert!(task.description.is_none());
    assert!(task.labels.is_empty());
    assert!(task.assigned_to.is_empty());
}

#[test]
fn task_serializes_with_id_underscore_and_camel_case() {
    let value = serde_json::to_value(task("t9", "L4", 2, "x")).expect("serialize");
    assert_eq!(value["_id"], "t9");
    assert_eq!(value["listId"], "L4");
    assert!(value.get("dueDate").is_none());
}

#[test]
fn board_members_deduplicate() {
    let json = serde_json::json!({
        "_id": "b1", "title": "T", "description": "", "createdBy": "u1",
        "members": ["u1", "u2", "u1"]
    });
    let board: Board = serde_json::from_value(json).expect("board should decode");
    assert_eq!(board.members.len(), 2);
}

#[test]
fn sorted_lists_orders_by_position() {
    let snap = snapshot();
    let ids: Vec<&str> = snap.sorted_lists().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["L1", "L2"]);
}

#[test]
fn tasks_for_list_orders_by_position() {
    let snap = snapshot();
    let ids: Vec<&str> = snap.tasks_for_list("L1").iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
    assert_eq!(snap.task_count("L1"), 2);
    assert_eq!(snap.task_count("missing"), 0);
}

#[test]
fn search_tasks_matches_title_and_description_case_insensitively() {
    let mut snap = snapshot();
    snap.tasks[0].description = Some("Mention the LOGIN flow".into());
    let hits: Vec<&str> = snap.search_tasks("L1", "login").iter().map(|t| t.id.as_str()).collect();
    assert_eq!(hits, vec!["t1", "t2"]);

    let hits: Vec<&str> = snap.search_tasks("L1", "docs").iter().map(|t| t.id.as_str()).collect();
    assert_eq!(hits, vec!["t2"]);
}

#[test]
fn search_tasks_with_blank_query_returns_whole_list() {
    let snap = snapshot();
    assert_eq!(snap.search_tasks("L1", "  ").len(), 2);
}

#[test]
fn lookup_helpers_find_by_id() {
    let snap = snapshot();
    assert_eq!(snap.list("L2").map(|l| l.title.as_str()), Some("Done"));
    assert_eq!(snap.task("t3").map(|t| t.title.as_str()), Some("Ship"));
    assert!(snap.task("nope").is_none());
}
