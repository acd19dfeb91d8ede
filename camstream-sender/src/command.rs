//! Line commands accepted on stdin.
//!
//! ```text
//! connect [host[:port]]   open the link (defaults from config)
//! disconnect              close the link
//! capture                 send the next frame as a still
//! stream on|off           toggle video streaming
//! status                  print phase, flags and counters
//! help                    list commands
//! quit                    disconnect and exit
//! ```

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        host: Option<String>,
        port: Option<u16>,
    },
    Disconnect,
    Capture,
    Stream(bool),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
commands:
  connect [host[:port]]  open the link
  disconnect             close the link
  capture                send the next frame as a still
  stream on|off          toggle video streaming
  status                 show connection state and counters
  quit                   disconnect and exit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Empty);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(CommandError::Usage("one argument at most"));
        }

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("connect", None) => Ok(Command::Connect {
                host: None,
                port: None,
            }),
            ("connect", Some(target)) => parse_target(target),
            ("disconnect", None) => Ok(Command::Disconnect),
            ("capture", None) => Ok(Command::Capture),
            ("stream", Some("on")) => Ok(Command::Stream(true)),
            ("stream", Some("off")) => Ok(Command::Stream(false)),
            ("stream", _) => Err(CommandError::Usage("stream on|off")),
            ("status", None) => Ok(Command::Status),
            ("help" | "?", None) => Ok(Command::Help),
            ("quit" | "exit", None) => Ok(Command::Quit),
            ("disconnect" | "capture" | "status" | "help" | "?" | "quit" | "exit", Some(_)) => {
                Err(CommandError::Usage("this command takes no argument"))
            }
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_target(target: &str) -> Result<Command, CommandError> {
    const USAGE: &str = "connect [host[:port]]";
    match target.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| CommandError::Usage(USAGE))?;
            Ok(Command::Connect {
                host: (!host.is_empty()).then(|| host.to_string()),
                port: Some(port),
            })
        }
        None => Ok(Command::Connect {
            host: Some(target.to_string()),
            port: None,
        }),
    }
}
