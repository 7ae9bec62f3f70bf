//! Line-oriented frontend plumbing. Stdin and the refresh timer run on
//! helper threads that only send events; the session owner consumes them
//! one at a time.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::session::Prompter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Line(String),
    Tick,
    Eof,
}

pub fn spawn_input(tx: Sender<Event>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(Event::Line(line)).is_err() {
                return;
            }
        }
        debug!("stdin closed");
        let _ = tx.send(Event::Eof);
    })
}

pub fn spawn_ticker(tx: Sender<Event>, interval: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            thread::sleep(interval);
            trace!("tick");
            if tx.send(Event::Tick).is_err() {
                return;
            }
        }
    })
}

/// Answers questions from the shared event stream. Ticks that arrive
/// while a question is open are dropped.
pub struct TerminalPrompter {
    events: Receiver<Event>,
}

impl TerminalPrompter {
    pub fn new(events: Receiver<Event>) -> Self {
        Self { events }
    }

    /// Blocks for the next event; a closed channel reads as end of input.
    pub fn next_event(&self) -> Event {
        self.events.recv().unwrap_or(Event::Eof)
    }

    fn next_line(&self) -> Option<String> {
        loop {
            match self.next_event() {
                Event::Line(line) => return Some(line),
                Event::Tick => continue,
                Event::Eof => return None,
            }
        }
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, message: &str) -> Option<String> {
        print!("{message}\n? ");
        let _ = io::stdout().flush();
        self.next_line()
    }

    fn confirm(&mut self, message: &str) -> bool {
        self.ask(&format!("{message} [y/N]"))
            .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }

    fn notify(&mut self, message: &str) {
        println!("! {message}");
    }
}
