//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::{style, StyledObject};
use serde::Serialize;

/// Command result printable for people or as JSON.
pub trait CommandOutput: Serialize {
    /// Terminal rendering.
    fn to_human(&self) -> String;
    /// JSON rendering, printed with `--json`.
    fn to_json(&self) -> serde_json::Value;
}

/// Print a command result to stdout.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..."
/// if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Borderless table with upper-cased headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Spec and run statuses, colored for the terminal.
pub fn colorize_status(status: &str) -> StyledObject<&str> {
    match status.to_lowercase().as_str() {
        "passed" | "succeeded" | "success" => style(status).green().bold(),
        "failed" | "failure" | "timed-out" => style(status).red().bold(),
        "aborted" | "excluded" => style(status).dim(),
        "relaunch" | "running" => style(status).yellow(),
        _ => style(status),
    }
}
