//! Server network layer: TCP connections, authentication, matchmaking and
//! per-match notification sequencing

use crate::catalog::SpecCatalog;
use crate::client_manager::{ActiveMatch, ClientManager, Matchmaking, Outbox, SessionId};
use crate::engine::{ActionReport, GameError, GameSession, MatchEnd, Settlement};
use crate::rules::GameRules;
use crate::store::{is_valid_username, CredentialStore, ProfileStore, StoreError};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    read_message, write_message, ActionResult, AuthResponse, Credentials, DeployTroop,
    GameMode, GameOver, GameStart, Message, ProtocolError, TurnNotification,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub const WAITING_MESSAGE: &str = "Waiting for another player to join...";

/// Everything the coordinator needs besides a socket.
pub struct ServerConfig {
    pub catalog: Arc<SpecCatalog>,
    pub rules: Arc<GameRules>,
    pub profiles: Arc<dyn ProfileStore>,
    pub credentials: Arc<dyn CredentialStore>,
    /// Fixed seed for every match's random source; entropy when `None`
    pub seed: Option<u64>,
}

/// Main server: accepts connections and hands each one to the coordinator
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            coordinator: Arc::new(Coordinator::new(config)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Each connection gets its own task.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        coordinator.serve(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Per-connection state, owned by that connection's task
struct Connection {
    addr: SocketAddr,
    username: Option<String>,
    outbox: Outbox,
}

impl Connection {
    fn send(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            debug!("Writer for {} is gone, dropping message", self.addr);
        }
    }

    fn send_error(&self, text: &str) {
        self.send(Message::error(text));
    }
}

enum Command {
    Deploy(DeployTroop),
    Skip,
}

impl Command {
    fn describe(&self) -> String {
        match self {
            Command::Deploy(cmd) => format!("Deploy {} to {}", cmd.troop_name, cmd.target_tower_id),
            Command::Skip => "Skip Turn".to_string(),
        }
    }
}

/// Outbound queues of a match's participants, captured once per command.
struct Recipients(Vec<(String, Outbox)>);

impl Recipients {
    fn send(&self, username: &str, message: Message) {
        for (name, outbox) in &self.0 {
            if name == username && outbox.send(message.clone()).is_err() {
                debug!("{} is no longer connected", name);
            }
        }
    }

    fn broadcast(&self, message: Message) {
        for (name, outbox) in &self.0 {
            if outbox.send(message.clone()).is_err() {
                debug!("{} is no longer connected", name);
            }
        }
    }
}

/// Shared state of the server, reachable from every connection task.
///
/// Lock order: a match's game lock may be taken before the registry lock,
/// never the other way round.
struct Coordinator {
    clients: Mutex<ClientManager>,
    catalog: Arc<SpecCatalog>,
    rules: Arc<GameRules>,
    profiles: Arc<dyn ProfileStore>,
    credentials: Arc<dyn CredentialStore>,
    rng: Mutex<StdRng>,
}

impl Coordinator {
    fn new(config: ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            clients: Mutex::new(ClientManager::new()),
            catalog: config.catalog,
            rules: config.rules,
            profiles: config.profiles,
            credentials: config.credentials,
            rng: Mutex::new(rng),
        }
    }

    /// Reads framed messages until the peer goes away or sends garbage.
    async fn serve(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let (mut reader, writer) = stream.into_split();
        let (outbox, rx) = mpsc::unbounded_channel();
        let writer_task = spawn_network_sender(writer, rx, addr);

        let mut conn = Connection {
            addr,
            username: None,
            outbox,
        };

        loop {
            match read_message(&mut reader).await {
                Ok(message) => self.handle_message(&mut conn, message).await,
                Err(ProtocolError::ConnectionClosed) => break,
                Err(e @ ProtocolError::Json(_)) => {
                    warn!("Malformed message from {}: {}", addr, e);
                    conn.send_error(&format!("Malformed message: {}", e));
                    break;
                }
                Err(e) => {
                    warn!("Protocol error from {}: {}", addr, e);
                    break;
                }
            }
        }

        self.disconnect(&conn).await;
        drop(conn);
        // Let queued messages drain before the socket closes.
        if let Err(e) = writer_task.await {
            error!("Writer task for {} failed: {}", addr, e);
        }
        info!("Connection from {} closed", addr);
    }

    async fn handle_message(self: &Arc<Self>, conn: &mut Connection, message: Message) {
        match message {
            Message::LoginRequest(credentials) => self.handle_login(conn, credentials).await,
            Message::RegisterRequest(credentials) => self.handle_register(conn, credentials),
            Message::DeployTroopCommand(cmd) => self.handle_command(conn, Command::Deploy(cmd)).await,
            Message::SkipTurnCommand(_) => self.handle_command(conn, Command::Skip).await,
            other => {
                warn!("Unexpected message {} from {}", other.kind(), conn.addr);
                conn.send_error(&format!("Unexpected message type {}", other.kind()));
            }
        }
    }

    fn handle_register(&self, conn: &Connection, credentials: Credentials) {
        if !is_valid_username(&credentials.username) {
            conn.send_error("Invalid username");
            return;
        }
        if credentials.password.is_empty() {
            conn.send_error("Invalid password");
            return;
        }

        let response = match self
            .credentials
            .register(&credentials.username, &credentials.password)
        {
            Ok(()) => {
                info!("New user registered: {}", credentials.username);
                AuthResponse {
                    success: true,
                    message: format!("Successfully registered as {}", credentials.username),
                    player_id: None,
                }
            }
            Err(StoreError::DuplicateUser(_)) => AuthResponse {
                success: false,
                message: "Username already taken".to_string(),
                player_id: None,
            },
            Err(e) => {
                error!("Failed to register {}: {}", credentials.username, e);
                conn.send_error("Failed to register user");
                return;
            }
        };
        conn.send(Message::RegisterResponse(response));
    }

    async fn handle_login(self: &Arc<Self>, conn: &mut Connection, credentials: Credentials) {
        if let Some(current) = &conn.username {
            conn.send_error(&format!("Already logged in as {}", current));
            return;
        }
        let username = credentials.username;
        if !is_valid_username(&username) {
            conn.send_error("Invalid username");
            return;
        }

        match self.credentials.password_for(&username) {
            Ok(None) => {
                conn.send_error("User does not exist");
                return;
            }
            Ok(Some(stored)) if stored != credentials.password => {
                info!("Rejected login for {} from {}", username, conn.addr);
                conn.send_error("Invalid password");
                return;
            }
            Ok(Some(_)) => {}
            Err(e) => {
                error!("Failed to load credentials for {}: {}", username, e);
                conn.send_error("Login failed");
                return;
            }
        }

        let added = self
            .clients
            .lock()
            .await
            .add_client(&username, conn.outbox.clone());
        if !added {
            conn.send_error("User already logged in");
            return;
        }

        conn.username = Some(username.clone());
        conn.send(Message::LoginResponse(AuthResponse {
            success: true,
            message: format!("Successfully logged in as {}", username),
            player_id: Some(username.clone()),
        }));

        self.matchmake(&username).await;
    }

    async fn matchmake(self: &Arc<Self>, username: &str) {
        let (active, recipients) = loop {
            let opponent = {
                let mut clients = self.clients.lock().await;
                match clients.enqueue(username) {
                    Matchmaking::Matched { opponent } => opponent,
                    Matchmaking::Waiting => {
                        if let Some(outbox) = clients.outbox(username) {
                            let _ = outbox.send(Message::error(WAITING_MESSAGE));
                        }
                        return;
                    }
                    Matchmaking::AlreadyWaiting => return,
                }
            };

            // Profiles may be read from disk, so the registry stays unlocked
            // while the session is built. The player who waited moves first.
            let game = GameSession::new(
                &opponent,
                username,
                Arc::clone(&self.catalog),
                Arc::clone(&self.rules),
                Arc::clone(&self.profiles),
                self.session_rng().await,
            );

            let mut clients = self.clients.lock().await;
            match clients.insert_session([opponent.clone(), username.to_string()], game) {
                Some(active) => {
                    let recipients = recipients_of(&clients, &active);
                    break (active, recipients);
                }
                None => info!(
                    "{} left before the match with {} started, requeueing {}",
                    opponent, username, username
                ),
            }
        };

        {
            let game = active.game.lock().await;
            for (me, opponent) in [(0, 1), (1, 0)] {
                let me = &active.players[me];
                if let Some(info) = game.player_state(me) {
                    recipients.send(
                        me,
                        Message::GameStartNotification(GameStart {
                            opponent_username: active.players[opponent].clone(),
                            your_player_info: info,
                            game_mode: GameMode::Enhanced,
                        }),
                    );
                }
            }
            recipients.broadcast(Message::GameStateUpdate(game.state_update()));
            notify_turn(&recipients, &game);
            debug!("Session {} opening state:\n{}", active.id, game.describe());
        }

        self.spawn_match_clock(active.id);
    }

    async fn handle_command(self: &Arc<Self>, conn: &Connection, command: Command) {
        let Some(username) = conn.username.as_deref() else {
            conn.send_error("Please log in first");
            return;
        };

        if let Command::Deploy(cmd) = &command {
            if cmd.troop_name.is_empty() {
                conn.send_error("Invalid troop name");
                return;
            }
        }

        let (active, recipients) = {
            let clients = self.clients.lock().await;
            match clients.session_of(username) {
                Some(active) => {
                    let recipients = recipients_of(&clients, &active);
                    (active, recipients)
                }
                None => {
                    conn.send_error("You are not in a game");
                    return;
                }
            }
        };

        let game_over = {
            let mut game = active.game.lock().await;
            let result: Result<ActionReport, GameError> = match &command {
                Command::Deploy(cmd) => {
                    game.deploy_troop(username, &cmd.troop_name, &cmd.target_tower_id)
                }
                Command::Skip => game.skip_turn(username),
            };

            let (success, message) = match &result {
                Ok(report) => (true, report.message.clone()),
                Err(e) => (false, e.to_string()),
            };
            info!(
                "Session {}: {} -> {} ({})",
                active.id,
                username,
                command.describe(),
                if success { "ok" } else { "rejected" }
            );
            conn.send(Message::ActionResult(ActionResult {
                success,
                action: command.describe(),
                message,
            }));

            // Rejected commands change nothing, so nothing is broadcast.
            if !success {
                return;
            }

            recipients.broadcast(Message::GameStateUpdate(game.state_update()));
            debug!("Session {} state:\n{}", active.id, game.describe());
            if let Some(settlement) = game.settlement() {
                recipients.broadcast(game_over_message(settlement));
                true
            } else {
                notify_turn(&recipients, &game);
                false
            }
        };

        if game_over {
            self.finish_match(active.id).await;
        }
    }

    /// Drops the client and forfeits their match, if they were in one.
    async fn disconnect(&self, conn: &Connection) {
        let Some(username) = conn.username.as_deref() else {
            return;
        };

        let (active, recipients) = {
            let mut clients = self.clients.lock().await;
            let client = clients.remove_client(username);
            let active = client.and_then(|c| c.session).and_then(|id| clients.session(id));
            match active {
                Some(active) => {
                    let recipients = recipients_of(&clients, &active);
                    (active, recipients)
                }
                None => return,
            }
        };

        info!("{} disconnected from session {}", username, active.id);
        {
            let mut game = active.game.lock().await;
            let end = MatchEnd::Forfeit {
                leaver: username.to_string(),
            };
            if let Some(settlement) = game.end_match(end) {
                if let Some(opponent) = active.opponent_of(username) {
                    recipients.send(opponent, game_over_message(&settlement));
                }
            }
        }
        self.finish_match(active.id).await;
    }

    /// Ends a match whose clock ran out, unless it already ended.
    async fn expire_match(&self, id: SessionId) {
        let (active, recipients) = {
            let clients = self.clients.lock().await;
            match clients.session(id) {
                Some(active) => {
                    let recipients = recipients_of(&clients, &active);
                    (active, recipients)
                }
                None => return,
            }
        };

        {
            let mut game = active.game.lock().await;
            let Some(settlement) = game.end_match(MatchEnd::TimeExpired) else {
                return;
            };
            info!("Session {} ran out of time", id);
            recipients.broadcast(Message::GameStateUpdate(game.state_update()));
            recipients.broadcast(game_over_message(&settlement));
        }
        self.finish_match(id).await;
    }

    fn spawn_match_clock(self: &Arc<Self>, id: SessionId) {
        let limit = self.rules.match_duration_secs;
        if limit == 0 {
            return;
        }
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(limit)).await;
            coordinator.expire_match(id).await;
        });
    }

    async fn finish_match(&self, id: SessionId) {
        if self.clients.lock().await.remove_session(id).is_some() {
            debug!("Session {} cleaned up", id);
        }
    }

    /// A fresh generator for one match, drawn from the process-wide one.
    async fn session_rng(&self) -> StdRng {
        let seed = self.rng.lock().await.gen::<u64>();
        StdRng::seed_from_u64(seed)
    }
}

fn recipients_of(clients: &ClientManager, active: &ActiveMatch) -> Recipients {
    Recipients(
        active
            .players
            .iter()
            .filter_map(|name| clients.outbox(name).map(|outbox| (name.clone(), outbox)))
            .collect(),
    )
}

fn notify_turn(recipients: &Recipients, game: &GameSession) {
    let current = game.state().current_turn().to_string();
    recipients.send(
        &current,
        Message::TurnNotification(TurnNotification {
            current_turn_username: current.clone(),
        }),
    );
}

fn game_over_message(settlement: &Settlement) -> Message {
    Message::GameOverNotification(GameOver {
        winner_username: settlement.winner.as_wire().to_string(),
        reason: settlement.reason.clone(),
    })
}

/// Spawns the task that owns the write half and drains the outbound queue.
///
/// It ends once every sender is dropped or the socket fails.
fn spawn_network_sender(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Message>,
    addr: SocketAddr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                error!("Failed to send {} to {}: {}", message.kind(), addr, e);
                break;
            }
        }
    })
}
