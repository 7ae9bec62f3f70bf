use std::path::PathBuf;

use anyhow::{anyhow, bail};
use tracing::debug;

use crate::session::Command;
use crate::task::TaskId;
use crate::view::ListView;

pub const HELP: &str = "\
Commands (any unambiguous prefix works):
  add <text>        add a task
  add! <text>       add an important task (blank: toggle priority for the next add)
  priority          toggle priority for the next add
  <n> | done <n>    toggle completion of task n
  star <n>          toggle importance of task n
  edit <n>          edit the text of task n (next line is the new text, blank keeps it)
  due <n>           set or clear the deadline of task n
  delete <n>        delete task n
  clear             delete every task
  fold              fold or unfold the completed group
  settings | close  show or hide the settings panel
  export            write a backup file
  import <file>     load tasks from a backup file
  list              redraw the list
  help              show this help
  quit              leave";

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "add!", "priority", "done", "star", "edit", "due", "delete", "rm", "clear",
        "fold", "settings", "close", "export", "import", "list", "help", "quit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Maps one input line to a session command. Task numbers are resolved
/// against the view the user is looking at.
pub fn parse_line(line: &str, view: &ListView) -> anyhow::Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Refresh);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    if head.parse::<usize>().is_ok() && rest.is_empty() {
        return Ok(Command::ToggleComplete(resolve(head, view)?));
    }

    let known = known_command_names();
    let command = expand_command_abbrev(head, &known)
        .ok_or_else(|| anyhow!("unknown command: {head} (try 'help')"))?;
    debug!(token = %head, expanded = %command, "resolved command token");

    let parsed = match command {
        "add" => Command::Add(rest.to_string()),
        "add!" => Command::AddImportant(rest.to_string()),
        "priority" => Command::TogglePriority,
        "done" => Command::ToggleComplete(resolve(rest, view)?),
        "star" => Command::ToggleImportant(resolve(rest, view)?),
        "edit" => Command::BeginEdit(resolve(rest, view)?),
        "due" => Command::SetDeadline(resolve(rest, view)?),
        "delete" | "rm" => Command::Delete(resolve(rest, view)?),
        "clear" => Command::ClearAll,
        "fold" => Command::ToggleFold,
        "settings" => Command::OpenSettings,
        "close" => Command::CloseSettings,
        "export" => Command::Export,
        "import" => {
            if rest.is_empty() {
                bail!("import needs a file path");
            }
            Command::Import(PathBuf::from(rest))
        }
        "list" => Command::Refresh,
        "help" => Command::Help,
        "quit" => Command::Quit,
        other => bail!("unknown command: {other}"),
    };
    Ok(parsed)
}

fn resolve(token: &str, view: &ListView) -> anyhow::Result<TaskId> {
    if token.is_empty() {
        bail!("which task? give its number");
    }
    let position: usize = token
        .parse()
        .map_err(|_| anyhow!("not a task number: {token}"))?;
    view.id_at(position)
        .ok_or_else(|| anyhow!("no task number {position} on screen"))
}
