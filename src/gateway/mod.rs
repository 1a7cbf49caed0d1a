//! Remote mutation gateway.
//!
//! DESIGN
//! ======
//! One typed method per REST operation. Implementations return decoded
//! resources or a classified [`ApiError`] and never leak transport errors.
//! The controller depends on the [`BoardApi`] trait only, so tests drive it
//! with in-memory fakes while production uses [`HttpGateway`].
//!
//! Route layout (relative to the API base URL):
//!
//! | operation            | route                              |
//! |----------------------|------------------------------------|
//! | boards               | `GET/POST /boards`                 |
//! | board snapshot       | `GET /boards/{id}`                 |
//! | board edit/delete    | `PUT/DELETE /boards/{id}`          |
//! | create list          | `POST /boards/{id}/lists`          |
//! | list edit/delete     | `PUT/DELETE /lists/{id}`           |
//! | create task          | `POST /lists/{id}/tasks`           |
//! | task edit/delete     | `PUT/DELETE /tasks/{id}`           |
//! | reposition task      | `PUT /tasks/{id}/move`             |
//! | membership           | `POST/DELETE /boards/{id}/users/{userId}` |
//! | users                | `GET /users/{id}`, `GET /users/me` |

mod error;
mod http;

pub use error::ApiError;
pub use http::HttpGateway;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;
use wire::{Board, BoardSnapshot, List, Task, User};

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBoardRequest {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBoardRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateBoardRequest {
    /// Apply the present fields to a local copy.
    pub fn apply_to(&self, board: &mut Board) {
        if let Some(title) = &self.title {
            board.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            board.description.clone_from(description);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateListRequest {
    pub title: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateListRequest {
    pub title: String,
}

impl UpdateListRequest {
    pub fn apply_to(&self, list: &mut List) {
        list.title.clone_from(&self.title);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial task edit. Absent fields are left untouched on the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl UpdateTaskRequest {
    /// Apply the present fields to a local copy, for optimistic display.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(labels) = &self.labels {
            task.labels.clone_from(labels);
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = Some(due_date.clone());
        }
    }
}

/// Body of `PUT /tasks/{id}/move`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub list_id: String,
    pub position: usize,
}

// =============================================================================
// TRAIT
// =============================================================================

/// Typed REST surface used by the sync controller.
#[async_trait::async_trait]
pub trait BoardApi: Send + Sync {
    async fn list_boards(&self) -> Result<Vec<Board>, ApiError>;
    async fn create_board(&self, request: &CreateBoardRequest) -> Result<Board, ApiError>;
    async fn update_board(&self, board_id: &str, request: &UpdateBoardRequest) -> Result<Board, ApiError>;
    async fn delete_board(&self, board_id: &str) -> Result<(), ApiError>;

    /// Board plus all of its lists and tasks.
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, ApiError>;

    async fn create_list(&self, board_id: &str, request: &CreateListRequest) -> Result<List, ApiError>;
    async fn update_list(&self, list_id: &str, request: &UpdateListRequest) -> Result<List, ApiError>;
    async fn delete_list(&self, list_id: &str) -> Result<(), ApiError>;

    async fn create_task(&self, list_id: &str, request: &CreateTaskRequest) -> Result<Task, ApiError>;
    async fn update_task(&self, task_id: &str, request: &UpdateTaskRequest) -> Result<Task, ApiError>;
    async fn delete_task(&self, task_id: &str) -> Result<(), ApiError>;
    /// Persist a task's new list and rank. Returns the task as stored.
    async fn move_task(&self, task_id: &str, request: &MoveTaskRequest) -> Result<Task, ApiError>;

    async fn invite_member(&self, board_id: &str, user_id: &str) -> Result<(), ApiError>;
    async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), ApiError>;

    async fn get_user(&self, user_id: &str) -> Result<User, ApiError>;
    /// The user the bearer token belongs to.
    async fn current_user(&self) -> Result<User, ApiError>;

    /// Resolve member IDs one at a time. Lookups that fail are logged and
    /// skipped so one missing account does not hide the rest.
    async fn board_members(&self, member_ids: &[String]) -> Vec<User> {
        let mut members = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            match self.get_user(user_id).await {
                Ok(user) => members.push(user),
                Err(e) => warn!(%user_id, error = %e, "gateway: member lookup failed"),
            }
        }
        members
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
