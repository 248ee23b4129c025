use crate::types::{Channel, EventRecord};
use serde_json::Value;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";

    pub const RED: &'static str = "\x1b[31m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    // Bright colors
    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

const SUMMARY_WIDTH: usize = 44;

pub struct RecordFormatter {
    format: OutputFormat,
    colored: bool,
    quiet: bool,
    event_count: u64,
}

impl RecordFormatter {
    pub fn new(format: OutputFormat, colored: bool, quiet: bool) -> Self {
        Self {
            format,
            colored,
            quiet,
            event_count: 0,
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn print_header(&self) {
        if self.quiet || self.format != OutputFormat::Table {
            return;
        }

        let (gray, reset) = self.frame_colors();
        println!(
            "{}┌─────────┬──────────────────────┬──────────────────────────────────────────────┬──────────┐{}",
            gray, reset
        );
        println!(
            "{}│{} {:<7} {}│{} {:<20} {}│{} {:<44} {}│{} {:<8} {}│{}",
            gray,
            reset,
            "COUNT",
            gray,
            reset,
            "CHANNEL",
            gray,
            reset,
            "PAYLOAD",
            gray,
            reset,
            "TIME",
            gray,
            reset
        );
        println!(
            "{}├─────────┼──────────────────────┼──────────────────────────────────────────────┼──────────┤{}",
            gray, reset
        );
    }

    pub fn print_record(&mut self, record: &EventRecord) {
        self.event_count += 1;
        println!("{}", self.render(record));
    }

    /// Renders one line for `record` using the current count.
    pub fn render(&self, record: &EventRecord) -> String {
        match self.format {
            OutputFormat::Table => self.render_table_row(record),
            OutputFormat::Json => self.render_json_row(record),
            OutputFormat::Minimal => self.render_minimal_row(record),
        }
    }

    fn frame_colors(&self) -> (&'static str, &'static str) {
        if self.colored {
            (Colors::GRAY, Colors::RESET)
        } else {
            ("", "")
        }
    }

    fn channel_color(&self, channel: Channel) -> &'static str {
        if !self.colored {
            return "";
        }
        match channel {
            Channel::DisasterUpdate => Colors::BRIGHT_RED,
            Channel::ResourceUpdate => Colors::BRIGHT_GREEN,
            Channel::ReportUpdate => Colors::BRIGHT_YELLOW,
            Channel::SocialMediaUpdated => Colors::BRIGHT_BLUE,
        }
    }

    fn render_table_row(&self, record: &EventRecord) -> String {
        let (gray, reset) = self.frame_colors();
        let color = self.channel_color(record.channel());

        format!(
            "{}│{} {:<7} {}│{} {}{:<20}{} {}│{} {:<44} {}│{} {:<8} {}│{}",
            gray,
            reset,
            self.event_count,
            gray,
            reset,
            color,
            record.channel().as_str(),
            reset,
            gray,
            reset,
            summarize(record.payload(), SUMMARY_WIDTH),
            gray,
            reset,
            record.received_local().format("%H:%M:%S"),
            gray,
            reset
        )
    }

    fn render_json_row(&self, record: &EventRecord) -> String {
        let json_obj = serde_json::json!({
            "count": self.event_count,
            "id": record.id,
            "channel": record.channel(),
            "entity": record.channel().entity(),
            "payload": record.payload(),
            "received_at": record.received_at,
        });

        serde_json::to_string(&json_obj).unwrap_or_default()
    }

    fn render_minimal_row(&self, record: &EventRecord) -> String {
        let color = self.channel_color(record.channel());
        let reset = if self.colored { Colors::RESET } else { "" };

        format!(
            "{} {}{}{} {}",
            record.received_local().format("%H:%M:%S"),
            color,
            record.channel(),
            reset,
            summarize(record.payload(), SUMMARY_WIDTH)
        )
    }
}

/// Short one-line description of an opaque payload. Prefers an `id` field
/// (and a `title`/`name` beside it) over raw JSON.
pub fn summarize(payload: &Value, width: usize) -> String {
    let text = match payload {
        Value::Object(map) => match map.get("id") {
            Some(id) => {
                let label = ["title", "name", "type"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                match label {
                    Some(label) => format!("#{} {}", plain(id), label),
                    None => format!("#{}", plain(id)),
                }
            }
            None => payload.to_string(),
        },
        Value::Null => "-".to_string(),
        other => plain(other),
    };
    truncate(&text, width)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
