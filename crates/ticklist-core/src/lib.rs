pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod deadline;
pub mod error;
pub mod render;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod terminal;
pub mod transfer;
pub mod view;

use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::render::Renderer;
use crate::session::{
  Command,
  Outcome,
  Prompter,
  Session
};
use crate::storage::FileStore;
use crate::store::TaskStore;
use crate::terminal::{
  Event,
  TerminalPrompter
};
use crate::view::ListView;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting ticklist"
  );

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;

  let data_dir =
    cfg.data_dir(cli.data.as_deref());

  let storage = FileStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open storage at {}",
      data_dir.display()
    )
  })?;
  let store = TaskStore::open(storage)
    .context(
      "failed to load task list"
    )?;

  let renderer = Renderer::new(&cfg);

  let (tx, rx) = mpsc::channel();
  terminal::spawn_input(tx.clone());
  terminal::spawn_ticker(
    tx,
    cfg.refresh_interval
  );

  let mut session = Session::new(
    store,
    TerminalPrompter::new(rx),
    cfg.export_location.clone()
  );

  event_loop(
    &mut session,
    &renderer,
    &data_dir
  )?;

  info!("done");
  Ok(())
}

fn event_loop(
  session: &mut Session<
    FileStore,
    TerminalPrompter
  >,
  renderer: &Renderer,
  data_dir: &Path
) -> anyhow::Result<()> {
  println!(
    "Type 'help' for commands."
  );
  let mut view =
    draw(session, renderer, data_dir)?;

  loop {
    let event =
      session.prompter().next_event();

    let command = match event {
      | Event::Eof => Command::Quit,
      | Event::Tick => Command::Refresh,
      | Event::Line(line) => {
        if session.editing().is_some() {
          Command::CommitEdit(line)
        } else {
          match commands::parse_line(
            &line, &view
          ) {
            | Ok(command) => command,
            | Err(err) => {
              session
                .prompter_mut()
                .notify(&format!(
                  "{err:#}"
                ));
              continue;
            }
          }
        }
      }
    };
    let wants_help =
      command == Command::Help;

    match session
      .handle(command, Local::now())
    {
      | Outcome::Quit => break,
      | Outcome::Render => {
        view = draw(
          session, renderer, data_dir
        )?;
      }
      | Outcome::Skipped => {
        debug!("refresh skipped");
      }
      | Outcome::Unchanged => {
        if wants_help {
          println!("{}", commands::HELP);
        }
      }
    }
  }

  Ok(())
}

/// Re-derives the whole view and prints it. Returns the view so task
/// numbers typed next resolve against what was shown.
fn draw<S, P>(
  session: &Session<S, P>,
  renderer: &Renderer,
  data_dir: &Path
) -> anyhow::Result<ListView>
where
  S: storage::KeyValueStore,
  P: Prompter
{
  let view = session.view(Local::now());
  println!();
  renderer
    .print_view(&view, session.editing())?;

  if session.settings_open() {
    renderer.print_settings(
      data_dir,
      session.export_dir()
    )?;
  }
  if session.important_next() {
    println!(
      "(next task will be marked \
       important)"
    );
  }
  if let Some(id) = session.editing()
    && let Some(task) =
      session.store().get(id)
  {
    println!(
      "Editing \"{}\": type the new \
       text, or leave blank to keep \
       it.",
      task.text
    );
  }

  Ok(view)
}
