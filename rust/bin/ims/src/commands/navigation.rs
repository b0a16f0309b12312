//! Route checks and the sidebar menu.

use anyhow::Result;
use ims_console::state::DocumentTitle;
use ims_console::{Console, Navigation};
use serde_json::json;

use super::{print_json, Output};

pub fn navigate(console: &Console, path: &str, out: Output) -> Result<()> {
    let outcome = console.navigate(path);
    let title = console
        .hub()
        .get::<DocumentTitle>(DocumentTitle::PATH)
        .map(|t| t.0);

    match out {
        Output::Json => {
            let body = match &outcome {
                Navigation::Allowed { route, path } => {
                    json!({ "outcome": "allowed", "route": route, "path": path, "title": title })
                }
                Navigation::Redirected { from, to, path } => {
                    json!({ "outcome": "redirected", "from": from, "to": to, "path": path, "title": title })
                }
                Navigation::NotFound { path } => json!({ "outcome": "not-found", "path": path }),
            };
            print_json(&body)?;
        }
        Output::Table => match &outcome {
            Navigation::Allowed { route, path } => {
                println!("Allowed:    {} ({})", path, route);
                println!("Title:      {}", title.as_deref().unwrap_or("-"));
            }
            Navigation::Redirected { from, to, path } => {
                println!("Redirected: {} -> {} ({})", from, to, path);
                println!("Title:      {}", title.as_deref().unwrap_or("-"));
            }
            Navigation::NotFound { path } => anyhow::bail!("No route matches {}.", path),
        },
    }
    Ok(())
}

pub fn menu(console: &Console, out: Output) -> Result<()> {
    let entries = console.menu();
    match out {
        Output::Json => {
            let items: Vec<_> = entries
                .iter()
                .map(|e| json!({ "label": e.label, "route": e.route, "path": e.path }))
                .collect();
            print_json(&items)?;
        }
        Output::Table => {
            if entries.is_empty() {
                println!("No menu entries. Run `ims login` first.");
            }
            for e in &entries {
                println!("{:<28} {}", e.label, e.path);
            }
        }
    }
    Ok(())
}
