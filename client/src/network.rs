use crate::input::{parse_command, UserCommand, HELP};
use crate::session::ClientSession;
use log::{error, info, warn};
use shared::{read_message, write_message, Message, ProtocolError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Client {
    reader: Option<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    session: ClientSession,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        info!("Connected to {}", server_addr);
        let (reader, writer) = stream.into_split();

        Ok(Client {
            reader: Some(reader),
            writer,
            session: ClientSession::new(),
        })
    }

    async fn send(&mut self, message: &Message) -> Result<(), ProtocolError> {
        write_message(&mut self.writer, message).await
    }

    /// Handles one line of user input. Returns false when the user quits.
    async fn handle_line(&mut self, line: &str) -> Result<bool, ProtocolError> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(crate::input::InputError::Empty) => return Ok(true),
            Err(e) => {
                println!("{}", e);
                return Ok(true);
            }
        };

        match &command {
            UserCommand::Quit => return Ok(false),
            UserCommand::Help => println!("{}", HELP),
            UserCommand::State => match self.session.render() {
                Some(board) => print!("{}", board),
                None => println!("No match in progress."),
            },
            _ => {}
        }

        match self.session.command_message(&command) {
            Ok(Some(message)) => self.send(&message).await?,
            Ok(None) => {}
            Err(reason) => println!("{}", reason),
        }
        Ok(true)
    }

    fn handle_message(&mut self, message: Message) {
        for line in self.session.apply(message) {
            if line.ends_with('\n') {
                print!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }

    /// Reads commands from stdin and messages from the server until either
    /// side closes.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let reader = self.reader.take().ok_or("client is already running")?;
        let mut incoming = spawn_network_receiver(reader);

        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                result = incoming.recv() => {
                    match result {
                        Some(Ok(message)) => self.handle_message(message),
                        Some(Err(ProtocolError::ConnectionClosed)) | None => {
                            warn!("Server closed the connection");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Error receiving message: {}", e);
                            return Err(e.into());
                        }
                    }
                },
            }
        }

        info!("Disconnecting");
        Ok(())
    }
}

/// Spawns the task that owns the read half and forwards decoded messages.
///
/// Frames are read to completion inside the task, so the select loop above
/// never drops a half-read frame. The first error is forwarded and ends it.
fn spawn_network_receiver<R>(mut reader: R) -> mpsc::UnboundedReceiver<Result<Message, ProtocolError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let result = read_message(&mut reader).await;
            let failed = result.is_err();
            if tx.send(result).is_err() || failed {
                break;
            }
        }
    });
    rx
}
