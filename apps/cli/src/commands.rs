//! Text commands typed at the prompt.

use client_core::Intent;
use shared::{domain::ItemId, protocol::Credentials};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}', type 'help' for the list of commands")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("there is no item {row}; the list has {len}")]
    NoSuchRow { row: usize, len: usize },
}

pub const HELP: &str = "\
commands:
  login <email> <password>    sign in
  signup <email> <password>   create an account
  add <name>                  add an item
  toggle <n>                  mark item n done or not done
  rm <n>                      remove item n
  rename <n> <name>           rename item n
  reload                      fetch the list again
  logout                      sign out
  help                        show this text
  quit                        leave";

/// Parses one input line. `rows` are the ids of the listed items in display
/// order; row numbers typed by the user are 1-based. Blank lines yield
/// `Ok(None)`.
pub fn parse_command(line: &str, rows: &[ItemId]) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "login" | "signin" => {
            Command::Intent(Intent::SignIn(credentials(rest, "login <email> <password>")?))
        }
        "signup" | "register" => {
            Command::Intent(Intent::SignUp(credentials(rest, "signup <email> <password>")?))
        }
        "add" => Command::Intent(Intent::Add(rest.to_string())),
        "toggle" | "done" => Command::Intent(Intent::Toggle(row(rest, rows, "toggle <n>")?)),
        "rm" | "remove" | "delete" => Command::Intent(Intent::Remove(row(rest, rows, "rm <n>")?)),
        "rename" => {
            let usage = "rename <n> <name>";
            let (number, name) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Command::Intent(Intent::Rename {
                item_id: row(number, rows, usage)?,
                name: name.trim().to_string(),
            })
        }
        "reload" | "refresh" => Command::Intent(Intent::Reload),
        "logout" | "signout" => Command::Intent(Intent::SignOut),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return Err(ParseError::Unknown(verb.to_string())),
    };
    Ok(Some(command))
}

fn credentials(rest: &str, usage: &'static str) -> Result<Credentials, ParseError> {
    match rest.split_once(char::is_whitespace) {
        Some((email, password)) if !password.trim().is_empty() => {
            Ok(Credentials::new(email, password.trim()))
        }
        _ => Err(ParseError::Usage(usage)),
    }
}

fn row(raw: &str, rows: &[ItemId], usage: &'static str) -> Result<ItemId, ParseError> {
    let number: usize = raw.trim().parse().map_err(|_| ParseError::Usage(usage))?;
    number
        .checked_sub(1)
        .and_then(|index| rows.get(index))
        .copied()
        .ok_or(ParseError::NoSuchRow {
            row: number,
            len: rows.len(),
        })
}
