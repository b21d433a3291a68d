//! JSON rendering for command results.

use serde_json::Value;

use crate::error::CliError;

/// Print a command's result to stdout as JSON.
pub fn render(value: &Value, pretty: bool) -> Result<(), CliError> {
    let body = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{body}");
    Ok(())
}
