//! Client-side board synchronization core for the TaskFlow task board.
//!
//! ARCHITECTURE
//! ============
//! ```text
//!   gateway (REST) ──responses──┐
//!                               ├──> store (watch) ──> rendering
//!   realtime (channel) ─events──┘
//!            ^                ^
//!            └──── sync ──────┘   one board session at a time
//! ```
//!
//! - [`store`]: reducer-based cache of the loaded board.
//! - [`gateway`]: typed REST calls with one failure taxonomy.
//! - [`realtime`]: single-subscription channel manager over a Pusher socket.
//! - [`sync`]: the controller that ties them together per board session.
//!
//! Everything is constructed by the embedder. [`SyncController::from_config`]
//! wires the production stack from [`SyncConfig::from_env`]. The crate logs
//! through `tracing` and never installs a subscriber.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod realtime;
pub mod store;
pub mod sync;

pub use auth::{AuthProvider, InMemoryAuth};
pub use config::SyncConfig;
pub use gateway::{ApiError, BoardApi, HttpGateway};
pub use realtime::{ChannelManager, PusherTransport, RealtimeError};
pub use store::{Action, BoardState, Store};
pub use sync::{Phase, SyncController, SyncError};
pub use wire::{Board, BoardEvent, BoardSnapshot, List, Task, User};
