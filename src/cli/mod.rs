//! CLI command implementations

pub mod context;
pub mod list;
pub mod refinery;
pub mod reject;
pub mod retry;
pub mod status;
pub mod style;
pub mod submit;

use anstream::println;
use chrono::{DateTime, Utc};
use mq_refinery::error::{Error, Result};
use serde::Serialize;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an error as `{"error": {"kind", "message"}}`
pub fn print_json_error(error: &Error) {
    let body = serde_json::json!({
        "error": {
            "kind": error.kind(),
            "message": error.to_string(),
        }
    });
    println!("{body:#}");
}

/// Compact age: `45s`, `12m`, `3h`, `2d`
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

/// Relative time for the status timeline
pub fn format_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if then > now {
        return "(in the future)".to_string();
    }
    format!("({} ago)", format_age(then, now))
}

/// Cut `s` to `max` characters, ending in `...` when shortened
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
