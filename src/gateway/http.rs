//! `reqwest`-backed [`BoardApi`].
//!
//! ERROR HANDLING
//! ==============
//! Every call goes through [`HttpGateway::dispatch`], which classifies
//! non-2xx responses and notifies the auth provider on 401 before the error
//! reaches the caller. Bodies that fail to decode become `Unknown`.
//!
//! IDs are opaque. Each one is appended as a single percent-encoded path
//! segment, so `/` or `?` inside an ID never changes the route.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use wire::{Board, BoardSnapshot, List, Task, User};

use super::{
    ApiError, BoardApi, CreateBoardRequest, CreateListRequest, CreateTaskRequest, MoveTaskRequest,
    UpdateBoardRequest, UpdateListRequest, UpdateTaskRequest,
};
use crate::auth::AuthProvider;
use crate::config::HttpTimeouts;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl HttpGateway {
    /// Build a gateway rooted at `base_url` (e.g. `http://localhost:3001/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unknown`] if `base_url` is not a hierarchical URL
    /// or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::Unknown { status: None, message: format!("invalid base url: {base_url}") })?;
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ApiError::Unknown { status: None, message: format!("http client build failed: {e}") })?;
        Ok(Self { http, base_url, auth })
    }

    /// Base URL with `segments` appended, each percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects URLs that cannot carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.http.request(method, self.url(segments));
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| {
            let err = ApiError::from_transport(&e);
            warn!(error = %e, code = err.code(), "gateway: request failed");
            err
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_owned();
        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status.as_u16(), &body);
        warn!(%url, status = status.as_u16(), code = err.code(), "gateway: request rejected");
        if matches!(err, ApiError::Unauthorized) {
            self.auth.on_unauthorized();
        }
        Err(err)
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.dispatch(builder).await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ApiError::from_transport(&e))?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(status, body = %text, "gateway: undecodable body");
            ApiError::Unknown { status: Some(status), message: format!("undecodable response: {e}") }
        })
    }

    async fn execute_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.dispatch(builder).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        self.execute(self.request(Method::GET, segments)).await
    }

    async fn send_json<B, T>(&self, method: Method, segments: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.execute(self.request(method, segments).json(body)).await
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

#[async_trait::async_trait]
impl BoardApi for HttpGateway {
    async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        self.get(&["boards"]).await
    }

    async fn create_board(&self, request: &CreateBoardRequest) -> Result<Board, ApiError> {
        self.send_json(Method::POST, &["boards"], request).await
    }

    async fn update_board(&self, board_id: &str, request: &UpdateBoardRequest) -> Result<Board, ApiError> {
        self.send_json(Method::PUT, &["boards", board_id], request).await
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::DELETE, &["boards", board_id])).await
    }

    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, ApiError> {
        self.get(&["boards", board_id]).await
    }

    async fn create_list(&self, board_id: &str, request: &CreateListRequest) -> Result<List, ApiError> {
        self.send_json(Method::POST, &["boards", board_id, "lists"], request).await
    }

    async fn update_list(&self, list_id: &str, request: &UpdateListRequest) -> Result<List, ApiError> {
        self.send_json(Method::PUT, &["lists", list_id], request).await
    }

    async fn delete_list(&self, list_id: &str) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::DELETE, &["lists", list_id])).await
    }

    async fn create_task(&self, list_id: &str, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        self.send_json(Method::POST, &["lists", list_id, "tasks"], request).await
    }

    async fn update_task(&self, task_id: &str, request: &UpdateTaskRequest) -> Result<Task, ApiError> {
        self.send_json(Method::PUT, &["tasks", task_id], request).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::DELETE, &["tasks", task_id])).await
    }

    async fn move_task(&self, task_id: &str, request: &MoveTaskRequest) -> Result<Task, ApiError> {
        self.send_json(Method::PUT, &["tasks", task_id, "move"], request).await
    }

    async fn invite_member(&self, board_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::POST, &["boards", board_id, "users", user_id])).await
    }

    async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::DELETE, &["boards", board_id, "users", user_id])).await
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get(&["users", user_id]).await
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.get(&["users", "me"]).await
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
