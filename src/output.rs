use std::io::{self, Write};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::events::{EventSink, SearchEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// One compact JSON object per line.
    #[default]
    Lines,
    Pretty,
}

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    at: String,
    #[serde(flatten)]
    event: &'a SearchEvent,
}

/// Prints every published event to stdout with a timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutput {
    mode: OutputMode,
}

impl JsonOutput {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn print_event(&self, event: &SearchEvent) -> io::Result<()> {
        let record = EventRecord {
            at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        self.print_json(&record)
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let json = match self.mode {
            OutputMode::Lines => serde_json::to_string(value),
            OutputMode::Pretty => serde_json::to_string_pretty(value),
        }
        .map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()
    }
}

impl EventSink for JsonOutput {
    fn publish(&self, event: SearchEvent) {
        if let Err(err) = self.print_event(&event) {
            warn!(event = event.name(), error = %err, "failed to write event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_flattens_event_next_to_timestamp() {
        let event = SearchEvent::NetworkFailed {
            error: "boom".to_string(),
        };
        let record = EventRecord {
            at: "2026-01-01T00:00:00.000Z".to_string(),
            event: &event,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["at"], "2026-01-01T00:00:00.000Z");
        assert_eq!(json["type"], "networkFailed");
        assert_eq!(json["error"], "boom");
    }
}
