use crate::connection::ConnectionState;
use crate::engine::PresentationSink;
use crate::filter::{self, FilteredView, Highlighter};
use crate::types::{ClientStats, LogEntry, LogLevel, Timestamp};
use chrono::{DateTime, Local, NaiveDateTime};
use owo_colors::OwoColorize;
use std::io::Write;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Renders a timestamp as `HH:MM:SS.mmm`, falling back to the raw value.
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    match timestamp {
        Timestamp::Epoch(millis) => DateTime::from_timestamp_millis(*millis as i64)
            .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| timestamp.to_string()),
        Timestamp::Text(text) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string();
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| text.clone())
        }
    }
}

/// Terminal presentation of the filtered log view.
pub struct ConsoleSink {
    rows: usize,
    ansi: bool,
    state: ConnectionState,
    scope: Option<String>,
    clients: Vec<String>,
    stats: Option<ClientStats>,
}

impl ConsoleSink {
    pub fn new(rows: usize, ansi: bool) -> Self {
        Self {
            rows,
            ansi,
            state: ConnectionState::Connecting,
            scope: None,
            clients: Vec::new(),
            stats: None,
        }
    }

    pub fn frame(&self, view: &FilteredView<'_>) -> String {
        let mut out = String::new();
        if self.ansi {
            out.push_str(CLEAR_SCREEN);
        }

        out.push_str(&self.status_line(view));
        out.push('\n');

        if view.total == 0 {
            out.push_str("no logs yet\n");
            return out;
        }

        let highlighter = Highlighter::new(&view.criteria.keyword);
        for entry in view.entries.iter().take(self.rows) {
            out.push_str(&self.format_entry(entry, highlighter.as_ref()));
            out.push('\n');
        }
        if view.visible() > self.rows {
            out.push_str(&format!("... {} more\n", view.visible() - self.rows));
        }

        out
    }

    fn status_line(&self, view: &FilteredView<'_>) -> String {
        let mut line = format!(
            "[{}] shown: {}/{}",
            self.state,
            view.visible(),
            view.total
        );
        line.push_str(&format!(
            " | client: {}",
            self.scope.as_deref().unwrap_or("all clients")
        ));
        if !self.clients.is_empty() {
            line.push_str(&format!(" | clients: {}", self.clients.join(", ")));
        }
        if let Some(stats) = &self.stats {
            line.push_str(&format!(" | {}", stats));
        }
        line
    }

    fn format_entry(&self, entry: &LogEntry, highlighter: Option<&Highlighter>) -> String {
        let level = format!("{:<8}", entry.level());
        let level = if self.ansi {
            paint_level(entry.level(), &level)
        } else {
            level
        };

        format!(
            "{} {} [{}] {}",
            format_timestamp(&entry.record.timestamp),
            level,
            entry.location(),
            self.paint_message(entry.message(), highlighter)
        )
    }

    fn paint_message(&self, message: &str, highlighter: Option<&Highlighter>) -> String {
        if !self.ansi {
            return message.to_string();
        }

        let mut out = String::with_capacity(message.len());
        let mut cursor = 0;
        if let Some(highlighter) = highlighter {
            for (start, end) in highlighter.spans(message) {
                out.push_str(&paint_numbers(&message[cursor..start]));
                out.push_str(&(&message[start..end]).black().on_yellow().to_string());
                cursor = end;
            }
        }
        out.push_str(&paint_numbers(&message[cursor..]));
        out
    }
}

fn paint_numbers(text: &str) -> String {
    filter::highlight_numbers(text, |number| number.cyan().to_string())
}

fn paint_level(level: LogLevel, text: &str) -> String {
    match level {
        LogLevel::Debug => text.dimmed().to_string(),
        LogLevel::Info => text.green().to_string(),
        LogLevel::Warning => text.yellow().to_string(),
        LogLevel::Error => text.red().to_string(),
        LogLevel::Critical => text.red().bold().to_string(),
    }
}

impl PresentationSink for ConsoleSink {
    fn render(&mut self, view: &FilteredView<'_>) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(self.frame(view).as_bytes());
        let _ = stdout.flush();
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        self.state = state;
        println!("-- connection {}", state);
    }

    fn roster_changed(&mut self, clients: &[String]) {
        self.clients = clients.to_vec();
        println!("-- clients: {}", clients.join(", "));
    }

    fn scope_changed(&mut self, scope: Option<&str>) {
        self.scope = scope.map(str::to_string);
    }

    fn stats_changed(&mut self, stats: Option<&ClientStats>) {
        self.stats = stats.copied();
        if let Some(stats) = stats {
            println!("-- stats: {}", stats);
        }
    }
}
