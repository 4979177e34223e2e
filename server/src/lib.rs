//! # Tower Clash Server Library
//!
//! This library provides the authoritative server for a turn-based,
//! two-player tower combat game played over TCP. Clients only send commands;
//! every rule is enforced here and the resulting state is pushed back to both
//! players of a match.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game Sessions
//! Each match is owned by a [`engine::GameSession`], which resolves troop
//! deployments, skips, bonus turns, mana, EXP and level-ups. A rejected
//! command never changes the match.
//!
//! ### Session Coordination
//! The [`network::Server`] accepts connections, authenticates players, pairs
//! them through a single waiting slot and sequences the notifications of each
//! match: game start, state snapshots, turn notifications and game over.
//!
//! ### Persistence
//! Player progression (level and EXP) and credentials live behind the
//! [`store::ProfileStore`] and [`store::CredentialStore`] traits. Storage
//! failures are logged and never interrupt a running match.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Every connection runs in its own tokio task that reads length-prefixed
//! JSON frames and dispatches them one at a time. A second task per
//! connection drains an outbound queue, so no lock is ever held across a
//! socket write.
//!
//! ### Locking
//! The client table, the waiting slot and the session table share one lock
//! ([`client_manager::ClientManager`]). Each match has its own lock held for
//! the whole read-modify-respond sequence of a command, so the two players of
//! a match are strictly serialized while different matches proceed in
//! parallel.
//!
//! ### One Way Out
//! King destroyed, disconnect and clock expiry all end a match through
//! [`engine::GameSession::end_match`], which settles EXP and persists both
//! profiles exactly once.
//!
//! ## Module Organization
//!
//! - `combat`: damage resolution and critical hits
//! - `entity`: level-scaled tower and troop instances
//! - `catalog`: troop and tower specs loaded from JSON
//! - `player`, `game`: per-player and per-match state
//! - `engine`: the rules of a match
//! - `rules`: tunable numbers with defaults
//! - `store`: profile and credential persistence
//! - `client_manager`: clients, matchmaking slot and live matches
//! - `network`: the TCP coordinator
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::catalog::SpecCatalog;
//! use server::network::{Server, ServerConfig};
//! use server::rules::GameRules;
//! use server::store::JsonStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonStore::open(Path::new("data"))?);
//!     let config = ServerConfig {
//!         catalog: Arc::new(SpecCatalog::load(Path::new("configs"))?),
//!         rules: Arc::new(GameRules::default()),
//!         profiles: store.clone(),
//!         credentials: store,
//!         seed: None,
//!     };
//!
//!     let server = Server::bind("127.0.0.1:8080", config).await?;
//!     server.run().await
//! }
//! ```

pub mod catalog;
pub mod client_manager;
pub mod combat;
pub mod engine;
pub mod entity;
pub mod game;
pub mod network;
pub mod player;
pub mod rules;
pub mod store;
