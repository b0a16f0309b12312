//! Login / logout / whoami commands.

use anyhow::Result;
use ims_console::{Console, Credentials, Session};
use serde_json::json;

use super::{print_json, Output};

pub async fn login(console: &Console, email: String, password: String, out: Output) -> Result<()> {
    let user = match console.sign_in(&Credentials { email, password }).await {
        Ok(user) => user,
        Err(e) if e.is_unauthorized() => anyhow::bail!("Login failed: invalid email or password."),
        Err(e) => anyhow::bail!("Login failed: {}", e),
    };

    match out {
        Output::Json => print_json(&user)?,
        Output::Table => {
            println!("Logged in as {}.", user.full_name());
            let session = console.session().snapshot();
            if let Some(role) = session.role_name() {
                println!("Role:        {}", role);
            }
            println!("Permissions: {}", session.permissions.len());
        }
    }
    Ok(())
}

pub fn logout(console: &Console) {
    let was_signed_in = console.session().is_authenticated();
    console.sign_out();
    if was_signed_in {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
}

pub fn whoami(console: &Console, out: Output) -> Result<()> {
    let session = console.session().snapshot();
    if !session.is_authenticated() {
        anyhow::bail!("Not logged in. Run `ims login`.");
    }
    print_session(&session, out)
}

/// Revalidate the stored session against the API.
pub async fn refresh(console: &Console, out: Output) -> Result<()> {
    if !console.session().is_authenticated() {
        anyhow::bail!("Not logged in. Run `ims login`.");
    }
    if console.bootstrap().await.is_none() {
        if console.session().is_authenticated() {
            anyhow::bail!("Could not reach the API; the stored session was kept.");
        }
        anyhow::bail!("Session is no longer valid. Run `ims login`.");
    }
    print_session(&console.session().snapshot(), out)
}

fn print_session(session: &Session, out: Output) -> Result<()> {
    match out {
        Output::Json => print_json(&json!({
            "user": session.user,
            "permissions": session.permissions,
        })),
        Output::Table => {
            println!("User:        {}", session.display_name());
            println!("ID:          {}", session.user_id().unwrap_or("-"));
            println!("Role:        {}", session.role_name().unwrap_or("-"));
            if session.permissions.is_empty() {
                println!("Permissions: -");
            } else {
                let perms: Vec<&str> = session.permissions.iter().map(String::as_str).collect();
                println!("Permissions: {}", perms.join(", "));
            }
            Ok(())
        }
    }
}
