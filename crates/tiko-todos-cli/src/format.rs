//! Formatting helpers for terminal output.

use chrono::{DateTime, Utc};
use tiko_todos_core::Todo;

/// Longest description shown on a list line
const MAX_DESCRIPTION_WIDTH: usize = 60;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// One list line: `  12 [x] Buy milk`
pub fn format_todo_line(todo: &Todo) -> String {
    format!(
        "{:>4} {} {}",
        todo.id,
        todo.status_marker(),
        truncate_string(&todo.description, MAX_DESCRIPTION_WIDTH)
    )
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
