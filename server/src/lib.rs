//! # Arena State Server Library
//!
//! Authoritative server for the multiplayer tank arena. It owns the single
//! source of truth for every participant's position, health, and loadout,
//! resolves combat and resource pickups, and republishes state-change events
//! to all other connected clients.
//!
//! ## Architecture
//!
//! The server is a single-threaded event dispatcher wrapped in async
//! plumbing. Each WebSocket connection gets a reader task and a writer task;
//! readers decode JSON frames into [`network::ServerEvent`]s and push them
//! into one queue. A single `tokio::select!` loop consumes that queue
//! alongside the resource spawn timers, fully processing one event (state
//! mutation plus outbound broadcasts) before taking the next. The world
//! store and session registry are owned exclusively by that loop, so no
//! locks guard them and no two handlers ever interleave.
//!
//! ## Module Organization
//!
//! - [`registry`] — live session tracking; owns each connection's outbound
//!   channel and enforces idempotent removal on disconnect.
//! - [`world`] — the authoritative state store: players, health boxes, and
//!   power-ups, with handshake/movement/respawn rules and pickup
//!   resolution.
//! - [`combat`] — damage application, death detection, and kill tallies,
//!   always using the shooter's stored archetype damage.
//! - [`network`] — WebSocket transport, the dispatch loop, the broadcast
//!   relay, and the timed resource spawner.
//!
//! ## Failure Policy
//!
//! Nothing past startup is fatal: malformed messages are dropped, unknown
//! ids are no-ops, and sends to dead sessions are skipped. The only
//! unrecoverable error is the listening socket failing to bind.

pub mod combat;
pub mod network;
pub mod registry;
pub mod world;
