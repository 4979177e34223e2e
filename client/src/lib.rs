//! # Tower Clash Client Library
//!
//! A line-oriented terminal client for the tower clash server. It connects
//! over TCP, speaks the length-prefixed JSON protocol from the `shared`
//! crate and renders the match as text.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed commands (`login`, `register`, `deploy`, `skip`, ...) into
//! [`input::UserCommand`] values.
//!
//! ### Session Module (`session`)
//! Holds the client's own view of its connection and match. It is owned by
//! the connection's dispatch loop and updated only from there, one server
//! message at a time.
//!
//! ### Network Module (`network`)
//! Owns the socket. A receiver task decodes frames while the main loop
//! multiplexes them with stdin.
//!
//! ### Rendering Module (`rendering`)
//! Turns snapshots into text: towers with HP bars, the player's hand, whose
//! turn it is and the final result.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080").await?;
//!     client.run().await
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;
pub mod session;
