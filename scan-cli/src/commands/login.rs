//! Log in and out.

use anyhow::{Context, Result};
use didi_scan_client::{login, ClientError, ScanQueue, Transport};

use super::App;

/// Run the login command.
pub async fn run<T: Transport + 'static>(
    app: &App<T>,
    username: &str,
    password: Option<&str>,
) -> Result<()> {
    let password = match password {
        Some(p) => p.to_string(),
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let session = match login(&app.client, username, &password).await {
        Ok(session) => session,
        Err(ClientError::NotController { role }) => {
            anyhow::bail!("Account '{}' has role '{}'; only controllers can scan.", username, role)
        }
        Err(e) if e.is_unreachable() => {
            return Err(anyhow::Error::new(e).context("Cannot reach the ticket server"))
        }
        Err(e) => return Err(e.into()),
    };
    app.sessions.save(&session).await?;

    println!("Logged in as {}", session.controller_id);

    let pending = app.queue.count().await?;
    if pending > 0 {
        println!();
        println!("{} scan(s) waiting to sync. Run 'didi-scan sync'.", pending);
    }

    Ok(())
}

/// Run the logout command.
pub async fn logout<T: Transport + 'static>(app: &App<T>) -> Result<()> {
    if app.sessions.clear().await? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }

    let pending = app.queue.count().await?;
    if pending > 0 {
        println!("{} scan(s) stay queued until the next login.", pending);
    }
    Ok(())
}
