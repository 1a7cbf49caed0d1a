//! Board, list, task, and user resources as the REST backend returns them.
//!
//! DESIGN
//! ======
//! Identifiers are opaque strings serialized as `_id`. Membership, labels,
//! and assignees are sets (`BTreeSet`) so duplicate delivery never produces
//! duplicate entries and iteration order stays deterministic.

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A board and its membership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// User who created the board.
    #[serde(default)]
    pub created_by: String,
    /// Member user IDs. Order is irrelevant.
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A column on a board.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub board_id: String,
    /// Zero-based rank among the lists of the same board.
    #[serde(default)]
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A card inside a list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub list_id: String,
    /// Zero-based rank among the tasks of the same list.
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Assigned user IDs.
    #[serde(default)]
    pub assigned_to: BTreeSet<String>,
    /// Due timestamp as sent by the backend (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A user account, as returned by `/users/{id}` and `/users/me`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Full board aggregate returned by `GET /boards/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board: Board,
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl BoardSnapshot {
    #[must_use]
    pub fn list(&self, list_id: &str) -> Option<&List> {
        self.lists.iter().find(|list| list.id == list_id)
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    /// Lists ordered by position.
    #[must_use]
    pub fn sorted_lists(&self) -> Vec<&List> {
        let mut lists: Vec<&List> = self.lists.iter().collect();
        lists.sort_by_key(|list| list.position);
        lists
    }

    /// Tasks of one list ordered by position.
    #[must_use]
    pub fn tasks_for_list(&self, list_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|task| task.list_id == list_id).collect();
        tasks.sort_by_key(|task| task.position);
        tasks
    }

    #[must_use]
    pub fn task_count(&self, list_id: &str) -> usize {
        self.tasks.iter().filter(|task| task.list_id == list_id).count()
    }

    /// Tasks of one list whose title or description contains `query`
    /// (case-insensitive), ordered by position. An empty query matches all.
    #[must_use]
    pub fn search_tasks(&self, list_id: &str, query: &str) -> Vec<&Task> {
        let needle = query.trim().to_lowercase();
        self.tasks_for_list(list_id)
            .into_iter()
            .filter(|task| {
                needle.is_empty()
                    || task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect()
    }
}
