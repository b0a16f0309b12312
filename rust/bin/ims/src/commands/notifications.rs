//! Notification inbox commands.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Local;
use ims_console::state::NotificationSnapshot;
use ims_console::{Console, Notification, Severity};
use serde_json::json;

use super::{print_json, Output};

fn require_session(console: &Console) -> Result<()> {
    if !console.session().is_authenticated() {
        anyhow::bail!("Not logged in. Run `ims login`.");
    }
    Ok(())
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "success",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn print_row(n: &Notification) {
    let when = n
        .created_at
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<26} {} {:<8} {:<16} {}: {}",
        n.id,
        if n.is_read { " " } else { "*" },
        severity_label(n.severity),
        when,
        n.title,
        n.message,
    );
}

pub async fn list(console: &Console, limit: usize, out: Output) -> Result<()> {
    require_session(console)?;
    let service = console.notifications();
    service.fetch_notifications(limit).await?;

    let notifications = service.notifications();
    match out {
        Output::Json => print_json(&json!({
            "notifications": notifications,
            "unreadCount": service.unread_count(),
        }))?,
        Output::Table => {
            if notifications.is_empty() {
                println!("No notifications.");
            }
            for n in &notifications {
                print_row(n);
            }
            println!("{} unread.", service.unread_count());
        }
    }
    Ok(())
}

pub async fn read(console: &Console, id: &str) -> Result<()> {
    require_session(console)?;
    let service = console.notifications();
    // Only notifications in the local list can be marked, so load it first.
    service.fetch_notifications(console.config().notifications.page_size).await?;
    if !service.notifications().iter().any(|n| n.id == id) {
        anyhow::bail!("Notification {} not found among the latest notifications.", id);
    }
    service.mark_as_read(id).await?;
    println!("Notification {} marked read.", id);
    Ok(())
}

pub async fn read_all(console: &Console) -> Result<()> {
    require_session(console)?;
    console.notifications().mark_all_as_read().await?;
    println!("All notifications marked read.");
    Ok(())
}

pub async fn delete(console: &Console, id: &str) -> Result<()> {
    require_session(console)?;
    console.notifications().delete_notification(id).await?;
    println!("Notification {} deleted.", id);
    Ok(())
}

pub async fn delete_read(console: &Console) -> Result<()> {
    require_session(console)?;
    console.notifications().delete_all_read().await?;
    println!("Read notifications deleted.");
    Ok(())
}

/// Connect the push channel and print notifications as they arrive.
pub async fn watch(console: &Console, out: Output) -> Result<()> {
    require_session(console)?;
    let service = console.notifications();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<NotificationSnapshot>();
    let subscription = console.hub().subscribe(NotificationSnapshot::PATH, move |_, value| {
        if let Some(snapshot) = value.downcast_ref::<NotificationSnapshot>() {
            let _ = tx.send(snapshot.clone());
        }
    });

    if !service.initialize().await {
        console.hub().unsubscribe(subscription);
        anyhow::bail!("Could not start notifications. Check the push URL and your session.");
    }

    // Everything loaded by initialize counts as already seen.
    let mut seen: HashSet<String> = service.notifications().into_iter().map(|n| n.id).collect();
    if out == Output::Table {
        println!("Watching notifications ({} unread). Ctrl-C to stop.", service.unread_count());
    }

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                for n in snapshot.notifications.iter().rev() {
                    if !seen.insert(n.id.clone()) {
                        continue;
                    }
                    match out {
                        Output::Json => println!("{}", serde_json::to_string(n)?),
                        Output::Table => print_row(n),
                    }
                }
                if !console.session().is_authenticated() {
                    eprintln!("Session ended.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    console.hub().unsubscribe(subscription);
    service.reset();
    Ok(())
}
