//! Dark mode preference.

use anyhow::Result;
use ims_console::Console;
use serde_json::json;

use super::{print_json, Output};

fn print_dark_mode(enabled: bool, out: Output) -> Result<()> {
    match out {
        Output::Json => print_json(&json!({ "darkMode": enabled })),
        Output::Table => {
            println!("Dark mode: {}", if enabled { "on" } else { "off" });
            Ok(())
        }
    }
}

pub fn show_dark_mode(console: &Console, out: Output) -> Result<()> {
    print_dark_mode(console.dark_mode().is_enabled(), out)
}

pub fn toggle_dark_mode(console: &Console, out: Output) -> Result<()> {
    print_dark_mode(console.dark_mode().toggle(), out)
}
