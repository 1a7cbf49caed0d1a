//! Per-session board synchronization.
//!
//! DESIGN
//! ======
//! A session is one board load, identified by `(board_id, generation)`.
//! Every async result (fetch, mutation response, realtime signal, poll) is
//! applied only if its session is still current, and that check happens
//! under the session lock together with the store dispatch, so a board
//! switch can never interleave between "is this still mine?" and "apply".
//!
//! Lifecycle:
//!
//! ```text
//!   Idle ──load──> Loading ──ok──> Ready
//!                     │              │
//!                     └──err──> Failed
//!   Ready/Failed ──load/retry──> Loading   (old channel torn down first)
//!   any ──unmount──> Idle                  (unconditional teardown)
//! ```
//!
//! Mutations:
//! - creates wait for the server and add the returned resource
//! - updates, deletes, moves, and member removal apply optimistically and
//!   then take the server's copy as a correction
//! - any failure refetches the board, replaces the snapshot, and records the
//!   failure message
//!
//! When the realtime channel cannot be joined, its subscription fails later,
//! or a refetch fails, the session falls back to polling the snapshot. Polling
//! stops only after a fetch has landed and the channel is live again. A rejoin
//! after a dropped connection refetches, since events sent while the link was
//! down are gone.
//!
//! A 401 that leaves the auth provider signed out closes the realtime link.
//! [`SyncController::auth_changed`] lets the embedder report login and logout.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wire::{Board, BoardSnapshot, List, Task};

use super::SyncError;
use crate::auth::AuthProvider;
use crate::config::SyncConfig;
use crate::gateway::{
    ApiError, BoardApi, CreateListRequest, CreateTaskRequest, HttpGateway, MoveTaskRequest, UpdateBoardRequest,
    UpdateListRequest, UpdateTaskRequest,
};
use crate::realtime::{ChannelManager, ChannelMessage, ChannelSignal, PusherTransport, RealtimeError};
use crate::store::{Action, BoardState, Store};

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
}

struct Session {
    phase: Phase,
    board_id: Option<String>,
    generation: u64,
    listener: Option<JoinHandle<()>>,
    subscription: Option<Uuid>,
    fallback: Option<JoinHandle<()>>,
}

/// Identity of the session a request was issued for.
#[derive(Debug, Clone)]
struct Ticket {
    board_id: String,
    generation: u64,
}

enum Attach {
    Live,
    Superseded,
    Unavailable,
}

struct Inner {
    store: Arc<Store>,
    api: Arc<dyn BoardApi>,
    channels: Arc<ChannelManager>,
    auth: Arc<dyn AuthProvider>,
    poll_interval: Duration,
    session: Mutex<Session>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        api: Arc<dyn BoardApi>,
        channels: Arc<ChannelManager>,
        auth: Arc<dyn AuthProvider>,
        poll_interval: Duration,
    ) -> Self {
        let session =
            Session { phase: Phase::Idle, board_id: None, generation: 0, listener: None, subscription: None, fallback: None };
        Self {
            inner: Arc::new(Inner { store, api, channels, auth, poll_interval, session: Mutex::new(session) }),
        }
    }

    /// Wire up the production stack: HTTP gateway, Pusher transport, and a
    /// fresh store.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, SyncError> {
        let api = HttpGateway::new(&config.api_url, config.timeouts, Arc::clone(&auth))?;
        let transport = PusherTransport::new(config.realtime.clone(), config.timeouts)?;
        let channels = ChannelManager::new(Arc::new(transport));
        Ok(Self::new(Arc::new(Store::new()), Arc::new(api), Arc::new(channels), auth, config.poll_interval))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Change notifications for rendering.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<BoardState> {
        self.inner.store.subscribe()
    }

    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.inner.channels
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    #[must_use]
    pub fn board_id(&self) -> Option<String> {
        self.inner.lock().board_id.clone()
    }

    // -------------------------------------------------------------------------
    // lifecycle
    // -------------------------------------------------------------------------

    /// Load `board_id`, replacing whatever session was active.
    ///
    /// # Errors
    ///
    /// [`SyncError::Api`] when the fetch fails (also recorded in the store),
    /// or [`SyncError::Superseded`] when another load or an unmount happened
    /// before the fetch resolved.
    pub async fn load_board(&self, board_id: &str) -> Result<(), SyncError> {
        let (ticket, switching) = {
            let mut session = self.inner.lock();
            self.inner.teardown(&mut session);
            let switching = session.board_id.as_deref() != Some(board_id);
            session.generation += 1;
            session.phase = Phase::Loading;
            session.board_id = Some(board_id.to_owned());
            if switching {
                self.inner.store.dispatch(Action::Reset);
            }
            self.inner.store.dispatch(Action::SetLoading(true));
            (Ticket { board_id: board_id.to_owned(), generation: session.generation }, switching)
        };
        info!(%board_id, generation = ticket.generation, switching, "sync: loading board");

        let fetched = self.inner.api.fetch_board(board_id).await;
        let committed = self.inner.with_session(&ticket, |session| match &fetched {
            Ok(snapshot) => {
                session.phase = Phase::Ready;
                self.inner.store.dispatch(Action::SetSnapshot(snapshot.clone()));
            }
            Err(e) => {
                session.phase = Phase::Failed;
                self.inner.store.dispatch(Action::SetError(Some(e.user_message())));
            }
        });
        if committed.is_none() {
            debug!(%board_id, generation = ticket.generation, "sync: stale fetch discarded");
            return Err(SyncError::Superseded(board_id.to_owned()));
        }

        if let Err(e) = fetched {
            warn!(%board_id, error = %e, code = e.code(), "sync: board load failed");
            self.inner.observe(&e);
            return Err(e.into());
        }

        match self.inner.attach(&ticket).await {
            Attach::Live | Attach::Superseded => {}
            Attach::Unavailable => self.inner.start_fallback(&ticket),
        }
        Ok(())
    }

    /// Reload the current board from scratch.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_board`], plus [`SyncError::NoBoard`].
    pub async fn retry(&self) -> Result<(), SyncError> {
        let board_id = self.board_id().ok_or(SyncError::NoBoard)?;
        self.load_board(&board_id).await
    }

    /// Refetch the current board and replace the snapshot, keeping the
    /// realtime subscription.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoBoard`], a fetch failure, or [`SyncError::Superseded`].
    pub async fn resync(&self) -> Result<(), SyncError> {
        let ticket = self.inner.ticket()?;
        match self.inner.refresh(&ticket).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SyncError::Superseded(ticket.board_id)),
            Err(e) => {
                self.inner.observe(&e);
                Err(e.into())
            }
        }
    }

    /// Re-evaluate realtime after the auth provider changed.
    ///
    /// Signed out: the listener is dropped and the link closed. Signed in with
    /// a loaded board: the channel is joined again and the board refetched.
    pub async fn auth_changed(&self) {
        if !self.inner.signed_in() {
            self.inner.drop_realtime();
            return;
        }
        let Ok(ticket) = self.inner.ticket() else {
            return;
        };
        if self.phase() != Phase::Ready {
            return;
        }
        info!(board_id = %ticket.board_id, "sync: signed in, rejoining");
        match self.inner.attach(&ticket).await {
            Attach::Superseded => {}
            Attach::Unavailable => self.inner.start_fallback(&ticket),
            Attach::Live => {
                if let Err(e) = self.inner.refresh(&ticket).await {
                    warn!(board_id = %ticket.board_id, error = %e, code = e.code(), "sync: refetch after sign-in failed");
                    if !self.inner.observe(&e) {
                        self.inner.start_fallback(&ticket);
                    }
                }
            }
        }
    }

    /// End the session: drop listeners, leave the channel, clear the store.
    pub fn unmount(&self) {
        let mut session = self.inner.lock();
        self.inner.teardown(&mut session);
        if let Some(board_id) = session.board_id.take() {
            info!(%board_id, "sync: unmounted");
        }
        session.generation += 1;
        session.phase = Phase::Idle;
        self.inner.store.dispatch(Action::Reset);
    }

    // -------------------------------------------------------------------------
    // lists
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// [`SyncError::NoBoard`] or the gateway failure (after the board is
    /// refetched and the message recorded).
    pub async fn create_list(&self, title: &str) -> Result<List, SyncError> {
        let ticket = self.inner.ticket()?;
        let request = CreateListRequest { title: title.to_owned() };
        let result = self.inner.api.create_list(&ticket.board_id, &request).await;
        self.inner.settle(&ticket, "create_list", result, |list| Some(Action::AddList(list.clone()))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn update_list(&self, list_id: &str, request: UpdateListRequest) -> Result<List, SyncError> {
        let ticket = self.inner.ticket()?;
        if let Some(mut list) = self.inner.resident(|snap| snap.list(list_id).cloned()) {
            request.apply_to(&mut list);
            self.inner.apply(&ticket, Action::UpdateList(list));
        }
        let result = self.inner.api.update_list(list_id, &request).await;
        self.inner.settle(&ticket, "update_list", result, |list| Some(Action::UpdateList(list.clone()))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn delete_list(&self, list_id: &str) -> Result<(), SyncError> {
        let ticket = self.inner.ticket()?;
        self.inner.apply(&ticket, Action::RemoveList { list_id: list_id.to_owned() });
        let result = self.inner.api.delete_list(list_id).await;
        self.inner.settle(&ticket, "delete_list", result, |_| None).await
    }

    // -------------------------------------------------------------------------
    // tasks
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn create_task(&self, list_id: &str, request: CreateTaskRequest) -> Result<Task, SyncError> {
        let ticket = self.inner.ticket()?;
        let result = self.inner.api.create_task(list_id, &request).await;
        self.inner.settle(&ticket, "create_task", result, |task| Some(Action::AddTask(task.clone()))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn update_task(&self, task_id: &str, request: UpdateTaskRequest) -> Result<Task, SyncError> {
        let ticket = self.inner.ticket()?;
        if let Some(mut task) = self.inner.resident(|snap| snap.task(task_id).cloned()) {
            request.apply_to(&mut task);
            self.inner.apply(&ticket, Action::UpdateTask(task));
        }
        let result = self.inner.api.update_task(task_id, &request).await;
        self.inner.settle(&ticket, "update_task", result, |task| Some(Action::UpdateTask(task.clone()))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn delete_task(&self, task_id: &str) -> Result<(), SyncError> {
        let ticket = self.inner.ticket()?;
        self.inner.apply(&ticket, Action::RemoveTask { task_id: task_id.to_owned() });
        let result = self.inner.api.delete_task(task_id).await;
        self.inner.settle(&ticket, "delete_task", result, |_| None).await
    }

    /// Move a task to `target_position` in `target_list_id`, locally first.
    ///
    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn move_task(&self, task_id: &str, target_list_id: &str, target_position: usize) -> Result<Task, SyncError> {
        let ticket = self.inner.ticket()?;
        self.inner.apply(
            &ticket,
            Action::MoveTask {
                task_id: task_id.to_owned(),
                target_list_id: target_list_id.to_owned(),
                target_position,
            },
        );
        let request = MoveTaskRequest { list_id: target_list_id.to_owned(), position: target_position };
        let result = self.inner.api.move_task(task_id, &request).await;
        self.inner.settle(&ticket, "move_task", result, |task| Some(Action::UpdateTask(task.clone()))).await
    }

    // -------------------------------------------------------------------------
    // board and membership
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn update_board(&self, request: UpdateBoardRequest) -> Result<Board, SyncError> {
        let ticket = self.inner.ticket()?;
        if let Some(mut board) = self.inner.resident(|snap| Some(snap.board.clone())) {
            request.apply_to(&mut board);
            self.inner.apply(&ticket, Action::UpdateBoard(board));
        }
        let result = self.inner.api.update_board(&ticket.board_id, &request).await;
        self.inner.settle(&ticket, "update_board", result, |board| Some(Action::UpdateBoard(board.clone()))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn invite_member(&self, user_id: &str) -> Result<(), SyncError> {
        let ticket = self.inner.ticket()?;
        let result = self.inner.api.invite_member(&ticket.board_id, user_id).await;
        self.inner.settle(&ticket, "invite_member", result, |_| Some(Action::AddMembers(vec![user_id.to_owned()]))).await
    }

    /// # Errors
    ///
    /// See [`Self::create_list`].
    pub async fn remove_member(&self, user_id: &str) -> Result<(), SyncError> {
        let ticket = self.inner.ticket()?;
        self.inner.apply(&ticket, Action::RemoveMember { user_id: user_id.to_owned() });
        let result = self.inner.api.remove_member(&ticket.board_id, user_id).await;
        self.inner.settle(&ticket, "remove_member", result, |_| None).await
    }
}

// =============================================================================
// INTERNALS
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticket(&self) -> Result<Ticket, SyncError> {
        let session = self.lock();
        let board_id = session.board_id.clone().ok_or(SyncError::NoBoard)?;
        Ok(Ticket { board_id, generation: session.generation })
    }

    /// Run `f` under the session lock if `ticket` is still current.
    fn with_session<T>(&self, ticket: &Ticket, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut session = self.lock();
        if session.generation != ticket.generation || session.board_id.as_deref() != Some(ticket.board_id.as_str()) {
            return None;
        }
        Some(f(&mut session))
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.with_session(ticket, |_| ()).is_some()
    }

    /// Dispatch for the ticket's session and board only.
    fn apply(&self, ticket: &Ticket, action: Action) -> bool {
        self.with_session(ticket, |_| self.store.dispatch_for(&ticket.board_id, action))
            .unwrap_or(false)
    }

    fn resident<T>(&self, f: impl FnOnce(&BoardSnapshot) -> Option<T>) -> Option<T> {
        self.store.read(|state| state.snapshot.as_ref().and_then(f))
    }

    fn teardown(&self, session: &mut Session) {
        if let Some(listener) = session.listener.take() {
            listener.abort();
        }
        session.subscription = None;
        if let Some(fallback) = session.fallback.take() {
            fallback.abort();
        }
        if let Some(board_id) = &session.board_id {
            self.channels.unbind_all(board_id);
            self.channels.unsubscribe(board_id);
        }
    }

    fn signed_in(&self) -> bool {
        self.auth.token().is_some() && self.auth.current_user().is_some()
    }

    /// React to a 401 that signed the user out. Returns whether realtime was
    /// dropped.
    fn observe(&self, error: &ApiError) -> bool {
        if !matches!(error, ApiError::Unauthorized) || self.signed_in() {
            return false;
        }
        self.drop_realtime();
        true
    }

    /// Stop listening and polling, leave the channel, and close the link.
    /// The session itself stays loaded.
    fn drop_realtime(&self) {
        let board_id = {
            let mut session = self.lock();
            self.teardown(&mut session);
            session.board_id.clone()
        };
        self.channels.disconnect();
        info!(board_id = board_id.as_deref().unwrap_or("-"), "sync: signed out, realtime closed");
    }

    /// Refetch the ticket's board and replace the snapshot. `Ok(false)` when
    /// the session moved on before the response arrived.
    async fn refresh(&self, ticket: &Ticket) -> Result<bool, ApiError> {
        let snapshot = self.api.fetch_board(&ticket.board_id).await?;
        Ok(self.with_session(ticket, |_| self.store.dispatch(Action::SetSnapshot(snapshot))).is_some())
    }

    /// Apply a mutation's server result, or revert by refetch on failure.
    async fn settle<T: Send>(
        self: &Arc<Self>,
        ticket: &Ticket,
        operation: &'static str,
        result: Result<T, ApiError>,
        correction: impl FnOnce(&T) -> Option<Action> + Send,
    ) -> Result<T, SyncError> {
        match result {
            Ok(value) => {
                if let Some(action) = correction(&value) {
                    self.apply(ticket, action);
                }
                Ok(value)
            }
            Err(e) => {
                warn!(board_id = %ticket.board_id, operation, error = %e, code = e.code(), "sync: mutation failed, refetching");
                self.observe(&e);
                self.revert(ticket, &e).await;
                Err(e.into())
            }
        }
    }

    /// Replace optimistic state with server truth. If the refetch fails too,
    /// polling takes over so the optimistic edit cannot stick.
    async fn revert(self: &Arc<Self>, ticket: &Ticket, cause: &ApiError) {
        if let Err(e) = self.refresh(ticket).await {
            warn!(board_id = %ticket.board_id, error = %e, code = e.code(), "sync: refetch after failed mutation failed");
            if !self.observe(&e) {
                self.start_fallback(ticket);
            }
        }
        self.with_session(ticket, |_| self.store.dispatch(Action::SetError(Some(cause.user_message()))));
    }

    /// Connect (if needed), subscribe, and bind a listener for the session.
    /// A listener already running on the current subscription is kept.
    async fn attach(self: &Arc<Self>, ticket: &Ticket) -> Attach {
        self.channels.connect(self.auth.as_ref()).await;

        let inner = Arc::clone(self);
        let bound = self.with_session(ticket, |session| {
            let handle = self.channels.subscribe(&ticket.board_id)?;
            let listening = session.listener.as_ref().is_some_and(|task| !task.is_finished());
            if listening && session.subscription == Some(handle.id) {
                return Ok(handle);
            }
            let (sink, rx) = mpsc::unbounded_channel();
            self.channels.bind(&handle, sink)?;
            if let Some(previous) = session.listener.take() {
                previous.abort();
            }
            session.subscription = Some(handle.id);
            session.listener = Some(tokio::spawn(listen(inner, ticket.clone(), handle.id, rx)));
            Ok::<_, RealtimeError>(handle)
        });

        match bound {
            None => Attach::Superseded,
            Some(Ok(handle)) => {
                debug!(board_id = %ticket.board_id, subscription = %handle.id, "sync: listener bound");
                Attach::Live
            }
            Some(Err(e)) => {
                warn!(board_id = %ticket.board_id, error = %e, code = e.code(), "sync: realtime unavailable");
                Attach::Unavailable
            }
        }
    }

    fn start_fallback(self: &Arc<Self>, ticket: &Ticket) {
        let inner = Arc::clone(self);
        self.with_session(ticket, |session| {
            if session.fallback.as_ref().is_some_and(|task| !task.is_finished()) {
                return;
            }
            info!(board_id = %ticket.board_id, interval_ms = self.poll_interval.as_millis(), "sync: polling until realtime recovers");
            session.fallback = Some(tokio::spawn(poll(inner, ticket.clone())));
        });
    }
}

/// Apply one subscription's signals to the store.
async fn listen(inner: Arc<Inner>, ticket: Ticket, subscription: Uuid, mut rx: mpsc::UnboundedReceiver<ChannelMessage>) {
    let mut joined_before = false;
    while let Some(message) = rx.recv().await {
        if message.subscription != subscription || message.board_id != ticket.board_id {
            debug!(board_id = %message.board_id, "sync: message for another subscription dropped");
            continue;
        }
        match message.signal {
            ChannelSignal::Joined if !joined_before => {
                joined_before = true;
                debug!(board_id = %ticket.board_id, "sync: realtime joined");
            }
            ChannelSignal::Joined => {
                info!(board_id = %ticket.board_id, "sync: realtime rejoined, refetching");
                if let Err(e) = inner.refresh(&ticket).await {
                    warn!(board_id = %ticket.board_id, error = %e, code = e.code(), "sync: refetch after rejoin failed");
                    if !inner.observe(&e) {
                        inner.start_fallback(&ticket);
                    }
                }
            }
            ChannelSignal::Event(event) => {
                let name = event.name();
                if !inner.apply(&ticket, Action::from(event)) {
                    debug!(board_id = %ticket.board_id, event = name, "sync: event for inactive session dropped");
                }
            }
            ChannelSignal::Failed(reason) => {
                warn!(board_id = %ticket.board_id, %reason, "sync: realtime subscription lost");
                inner.start_fallback(&ticket);
                return;
            }
        }
    }
}

/// Refetch on an interval and retry the subscription until a fetch has
/// landed and the channel is live.
async fn poll(inner: Arc<Inner>, ticket: Ticket) {
    let mut ticker = tokio::time::interval(inner.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !inner.is_current(&ticket) {
            return;
        }

        let refreshed = match inner.refresh(&ticket).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(board_id = %ticket.board_id, error = %e, code = e.code(), "sync: poll failed");
                if inner.observe(&e) {
                    return;
                }
                false
            }
        };

        match inner.attach(&ticket).await {
            Attach::Superseded => return,
            Attach::Unavailable => continue,
            Attach::Live if !refreshed => continue,
            Attach::Live => {}
        }

        // Release the slot only while the subscription still stands. A failure
        // clears it before notifying, so a lost race keeps this loop going.
        let stopped = inner.with_session(&ticket, |session| {
            let live = inner.channels.current_subscription().is_some_and(|h| h.board_id == ticket.board_id);
            if live {
                session.fallback = None;
            }
            live
        });
        match stopped {
            None => return,
            Some(true) => {
                info!(board_id = %ticket.board_id, "sync: realtime restored, polling stopped");
                return;
            }
            Some(false) => {}
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
