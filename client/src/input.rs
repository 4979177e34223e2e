//! Parsing of typed terminal commands

use thiserror::Error;

/// A command typed by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Login { username: String, password: String },
    Register { username: String, password: String },
    /// `troop` and `target` are as typed; the session resolves shorthands.
    Deploy { troop: String, target: String },
    Skip,
    State,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  register <username> <password>   create an account
  login <username> <password>      log in and join matchmaking
  deploy <troop> [target]          deploy a troop by name or hand number;
                                   target is g1, g2, king or a full tower id
  skip                             skip your turn for bonus mana
  state                            show the current match
  help                             show this help
  quit                             leave";

/// Parses one line of input. Keywords are case-insensitive.
pub fn parse_command(line: &str) -> Result<UserCommand, InputError> {
    let mut words = line.split_whitespace();
    let keyword = words.next().ok_or(InputError::Empty)?.to_lowercase();
    let args: Vec<&str> = words.collect();

    match keyword.as_str() {
        "login" | "l" => {
            let (username, password) =
                credentials(&args).ok_or(InputError::Usage("login <username> <password>"))?;
            Ok(UserCommand::Login { username, password })
        }
        "register" | "r" => {
            let (username, password) =
                credentials(&args).ok_or(InputError::Usage("register <username> <password>"))?;
            Ok(UserCommand::Register { username, password })
        }
        "deploy" | "d" => match args.as_slice() {
            [troop] => Ok(UserCommand::Deploy {
                troop: troop.to_string(),
                target: String::new(),
            }),
            [troop, target] => Ok(UserCommand::Deploy {
                troop: troop.to_string(),
                target: target.to_string(),
            }),
            _ => Err(InputError::Usage("deploy <troop> [target]")),
        },
        "skip" | "s" => Ok(UserCommand::Skip),
        "state" | "st" => Ok(UserCommand::State),
        "help" | "h" | "?" => Ok(UserCommand::Help),
        "quit" | "q" | "exit" => Ok(UserCommand::Quit),
        _ => Err(InputError::Unknown(keyword)),
    }
}

fn credentials(args: &[&str]) -> Option<(String, String)> {
    match args {
        [username, password] => Some((username.to_string(), password.to_string())),
        _ => None,
    }
}
