//! Registry of authenticated clients, the matchmaking slot and live matches
//!
//! This module holds every piece of state shared between connections:
//! - The client table, keyed by username, with each client's outbound queue
//! - The single waiting-player slot used for matchmaking
//! - The table of live matches and which match each client belongs to
//!
//! The registry itself is plain data. The coordinator wraps it in one lock and
//! every method here is a single atomic step under that lock, so matchmaking
//! and cleanup never observe a half-updated table.

use crate::engine::GameSession;
use log::{debug, info};
use shared::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub type SessionId = u64;

/// Queue feeding a connection's writer task.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// One match's engine, locked for the whole read-modify-respond sequence of
/// a command.
pub type SharedGame = Arc<Mutex<GameSession>>;

/// An authenticated client
#[derive(Debug)]
pub struct Client {
    pub username: String,
    /// Outbound message queue for this client's connection
    pub outbox: Outbox,
    /// Match this client is playing in, if any
    pub session: Option<SessionId>,
}

impl Client {
    pub fn new(username: &str, outbox: Outbox) -> Self {
        Self {
            username: username.to_string(),
            outbox,
            session: None,
        }
    }

    pub fn in_game(&self) -> bool {
        self.session.is_some()
    }
}

/// A live match and its two participants
#[derive(Clone)]
pub struct ActiveMatch {
    pub id: SessionId,
    /// Participants in turn order: the first moves first
    pub players: [String; 2],
    pub game: SharedGame,
}

impl ActiveMatch {
    pub fn opponent_of(&self, username: &str) -> Option<&str> {
        match &self.players {
            [a, b] if a == username => Some(b.as_str()),
            [a, b] if b == username => Some(a.as_str()),
            _ => None,
        }
    }
}

/// Outcome of putting a client into matchmaking
#[derive(Debug, PartialEq, Eq)]
pub enum Matchmaking {
    /// The client now occupies the waiting slot
    Waiting,
    /// The client was already waiting
    AlreadyWaiting,
    /// A waiting opponent was found and removed from the slot
    Matched { opponent: String },
}

pub struct ClientManager {
    /// Authenticated clients indexed by username
    clients: HashMap<String, Client>,
    /// Username of the player waiting for an opponent
    waiting: Option<String>,
    /// Live matches indexed by session id
    sessions: HashMap<SessionId, ActiveMatch>,
    /// Next id handed to a new match
    next_session_id: SessionId,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            waiting: None,
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Registers an authenticated client.
    ///
    /// Returns false if that username already has a live connection.
    pub fn add_client(&mut self, username: &str, outbox: Outbox) -> bool {
        if self.clients.contains_key(username) {
            return false;
        }
        self.clients
            .insert(username.to_string(), Client::new(username, outbox));
        info!("Client {} logged in", username);
        true
    }

    /// Removes a client, vacating the waiting slot if they held it.
    ///
    /// The client's match, if any, is left in place so the caller can settle
    /// it as a forfeit.
    pub fn remove_client(&mut self, username: &str) -> Option<Client> {
        let client = self.clients.remove(username)?;
        if self.waiting.as_deref() == Some(username) {
            self.waiting = None;
            debug!("{} left the waiting slot", username);
        }
        info!("Client {} removed", username);
        Some(client)
    }

    pub fn get_client(&self, username: &str) -> Option<&Client> {
        self.clients.get(username)
    }

    pub fn outbox(&self, username: &str) -> Option<Outbox> {
        self.clients.get(username).map(|c| c.outbox.clone())
    }

    /// Puts a lobby client into matchmaking.
    ///
    /// A waiting opponent whose connection is gone is discarded rather than
    /// matched.
    pub fn enqueue(&mut self, username: &str) -> Matchmaking {
        match self.waiting.take() {
            Some(waiting) if waiting == username => {
                self.waiting = Some(waiting);
                Matchmaking::AlreadyWaiting
            }
            Some(waiting) if self.clients.contains_key(&waiting) => {
                info!("Matched {} with {}", waiting, username);
                Matchmaking::Matched { opponent: waiting }
            }
            _ => {
                self.waiting = Some(username.to_string());
                info!("{} is waiting for a match", username);
                Matchmaking::Waiting
            }
        }
    }

    pub fn waiting_player(&self) -> Option<&str> {
        self.waiting.as_deref()
    }

    /// Records a new match and marks both participants as in game.
    ///
    /// Returns `None`, changing nothing, if either participant has gone.
    pub fn insert_session(
        &mut self,
        players: [String; 2],
        game: GameSession,
    ) -> Option<ActiveMatch> {
        if let Some(gone) = players.iter().find(|p| !self.clients.contains_key(p.as_str())) {
            debug!("Not starting a match for {}: no longer connected", gone);
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        for username in &players {
            if let Some(client) = self.clients.get_mut(username) {
                client.session = Some(id);
            }
        }

        let active = ActiveMatch {
            id,
            players,
            game: Arc::new(Mutex::new(game)),
        };
        info!(
            "Session {} created: {} vs {}",
            id, active.players[0], active.players[1]
        );
        self.sessions.insert(id, active.clone());
        Some(active)
    }

    pub fn session(&self, id: SessionId) -> Option<ActiveMatch> {
        self.sessions.get(&id).cloned()
    }

    /// The match `username` is currently playing in.
    pub fn session_of(&self, username: &str) -> Option<ActiveMatch> {
        let id = self.clients.get(username)?.session?;
        self.session(id)
    }

    /// Removes a match and returns its participants to the lobby.
    ///
    /// Returns `None` if it was already removed, so only one caller performs
    /// the cleanup that follows.
    pub fn remove_session(&mut self, id: SessionId) -> Option<ActiveMatch> {
        let active = self.sessions.remove(&id)?;
        for username in &active.players {
            if let Some(client) = self.clients.get_mut(username) {
                if client.session == Some(id) {
                    client.session = None;
                }
            }
        }
        info!("Session {} removed", id);
        Some(active)
    }

    /// Number of authenticated clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
