/// file: src/ui.rs
/// description: terminal presentation of feed updates and connection health
use crate::{
    config::DisplayConfig,
    connection::ConnectionState,
    events::{FeedUpdate, UpdateReceiver},
    formatter::{Colors, RecordFormatter},
};
use std::str::FromStr;
use tracing::debug;

/// Operator commands typed on stdin while the feed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Clear,
    Health,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "c" | "clear" => Ok(Self::Clear),
            "h" | "health" => Ok(Self::Health),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command '{other}' (try clear, health, quit)")),
        }
    }
}

pub struct UIController {
    update_receiver: UpdateReceiver,
    formatter: RecordFormatter,
    colored: bool,
    quiet_mode: bool,
    header_printed: bool,
    max_events: Option<u64>,
}

impl UIController {
    pub fn new(update_receiver: UpdateReceiver, display: &DisplayConfig) -> Self {
        Self {
            update_receiver,
            formatter: RecordFormatter::new(
                display.format.clone(),
                display.colored,
                display.quiet,
            ),
            colored: display.colored,
            quiet_mode: display.quiet,
            header_printed: false,
            max_events: display.max_events,
        }
    }

    /// Prints updates until the channel closes or the event limit is hit.
    pub async fn run(&mut self) {
        self.print_startup_banner();
        while let Some(update) = self.update_receiver.recv().await {
            if !self.handle_update(update) {
                break;
            }
        }
    }

    pub fn handle_update(&mut self, update: FeedUpdate) -> bool {
        match update {
            FeedUpdate::StateChanged(ConnectionState::Connected) => {
                self.print_connection_status("CONNECTED", "Receiving live updates");
            }
            FeedUpdate::StateChanged(ConnectionState::Disconnected) => {
                self.print_connection_status(
                    "DISCONNECTED",
                    "Connection lost, events may be missed until it returns",
                );
            }
            FeedUpdate::Recorded(record) => {
                if !self.header_printed {
                    self.formatter.print_header();
                    self.header_printed = true;
                }
                self.formatter.print_record(&record);

                if let Some(max_events) = self.max_events
                    && self.formatter.event_count() >= max_events
                {
                    self.print_connection_status(
                        "STOPPING",
                        &format!("Reached configured max events ({max_events})"),
                    );
                    return false;
                }
            }
            FeedUpdate::Cleared { removed } => {
                debug!(removed, "Feed cleared");
                self.print_connection_status("CLEARED", &format!("{removed} records removed"));
            }
        }

        true
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.colored { code } else { "" }
    }

    fn print_startup_banner(&self) {
        if self.quiet_mode {
            return;
        }

        let frame = format!("{}{}", self.paint(Colors::BOLD), self.paint(Colors::BRIGHT_CYAN));
        let reset = self.paint(Colors::RESET);

        println!();
        println!(
            "{}╔══════════════════════════════════════════════════════════════╗{}",
            frame, reset
        );
        println!(
            "{}║                 DISASTER RESPONSE LIVE FEED                  ║{}",
            frame, reset
        );
        println!(
            "{}╠══════════════════════════════════════════════════════════════╣{}",
            frame, reset
        );
        println!(
            "{}║{} Version: {}{:<8}{} │ Status: {}CONNECTING{}                       {}║{}",
            frame,
            reset,
            self.paint(Colors::BRIGHT_GREEN),
            env!("CARGO_PKG_VERSION"),
            reset,
            self.paint(Colors::BRIGHT_MAGENTA),
            reset,
            frame,
            reset
        );
        println!(
            "{}╚══════════════════════════════════════════════════════════════╝{}",
            frame, reset
        );
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.quiet_mode && status != "DISCONNECTED" {
            return;
        }

        let (color, symbol) = match status {
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "CLEARED" => (Colors::BRIGHT_BLUE, "~"),
            "STOPPING" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::WHITE, "-"),
        };

        println!(
            "{}{}[{}]{} {} {}{}{}",
            self.paint(Colors::BOLD),
            self.paint(color),
            status,
            self.paint(Colors::RESET),
            symbol,
            self.paint(Colors::WHITE),
            message,
            self.paint(Colors::RESET)
        );
    }

    pub fn print_error(&self, error_type: &str, message: &str) {
        println!(
            "{}{}[{}]{} ! {}{}{}",
            self.paint(Colors::BOLD),
            self.paint(Colors::BRIGHT_RED),
            error_type,
            self.paint(Colors::RESET),
            self.paint(Colors::RED),
            message,
            self.paint(Colors::RESET)
        );
    }
}
