//! swaprail — asynchronous swap-order execution engine.
//!
//! The core of this crate is the order execution pipeline: durable order
//! state ([`order`]), a retryable job queue ([`queue`]), a bounded worker
//! pool ([`worker`]) that drives each leased job through the
//! [`orchestrator`] state machine, parallel quote aggregation across DEX
//! adapters ([`venue`]), and push notification fan-out to connected
//! clients ([`notify`]). Lifecycle transitions are mirrored onto an
//! append-only [`events`] bus.
//!
//! The HTTP/WebSocket surface lives in [`api`]; [`config`] and
//! [`logging`] are the composition root's ambient services.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod order;
pub mod queue;
pub mod venue;
pub mod worker;

pub use error::AppError;
