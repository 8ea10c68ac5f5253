//! Interactive commands read from stdin
//!
//! One command per line. Cards are referenced either by their full event
//! key or by their 1-based position in the `list` output.

use std::str::FromStr;
use thiserror::Error;

/// One user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Expand(String),
    Collapse(String),
    Toggle(String),
    /// Enter label edit mode
    Edit(String),
    /// Commit a label; empty text restores the timestamp label
    Label(String, String),
    /// Leave label edit mode without saving
    Cancel(String),
    Remove(String),
    /// Download the artifact images of a done card
    Fetch(String),
    List,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{0} needs a card (key or list position)")]
    MissingCard(&'static str),
}

/// Usage text printed by `help`
pub const USAGE: &str = "\
commands:
  list                 show all cards
  expand|collapse|toggle <card>
  edit <card>          start editing a label
  label <card> [text]  set a label (no text restores the timestamp)
  cancel <card>        stop editing without saving
  remove <card>        remove an event
  fetch <card>         download plots of a done event
  quit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        if verb.is_empty() {
            return Err(CommandError::Empty);
        }

        let verb = verb.to_ascii_lowercase();
        let (card, text) = match rest.split_once(char::is_whitespace) {
            Some((card, text)) => (card.to_string(), text.trim().to_string()),
            None => (rest.to_string(), String::new()),
        };

        let need_card = |name: &'static str| {
            if card.is_empty() {
                Err(CommandError::MissingCard(name))
            } else {
                Ok(card.clone())
            }
        };

        match verb.as_str() {
            "list" | "ls" => Ok(Command::List),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "expand" => need_card("expand").map(Command::Expand),
            "collapse" => need_card("collapse").map(Command::Collapse),
            "toggle" => need_card("toggle").map(Command::Toggle),
            "edit" => need_card("edit").map(Command::Edit),
            "label" => need_card("label").map(|card| Command::Label(card, text.clone())),
            "cancel" => need_card("cancel").map(Command::Cancel),
            "remove" | "rm" => need_card("remove").map(Command::Remove),
            "fetch" => need_card("fetch").map(Command::Fetch),
            _ => Err(CommandError::Unknown(verb)),
        }
    }
}
