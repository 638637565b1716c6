//! `paconn`: sign in to Microsoft Entra ID and hand out bearer tokens for
//! Power Platform connector commands.

#![deny(unsafe_code)]

mod cli;
mod console;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paconn_auth::{
    AppIdentity, Authenticator, CacheStore, EntraClient, LoginOutcome, MessageSink, UserAccount,
};
use paconn_settings::{Settings, load_settings};

use crate::cli::{Cli, Command};
use crate::console::ConsoleInteraction;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::default_level(cli.verbose, cli.debug));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let dir = paconn_settings::config_dir()?;
    tracing::debug!(dir = %dir.display(), "using configuration directory");
    let store = Arc::new(CacheStore::new(dir));
    let console = Arc::new(ConsoleInteraction);
    let auth = Authenticator::new(
        Arc::clone(&store),
        Arc::new(EntraClient::default()),
        Arc::clone(&console) as Arc<dyn MessageSink>,
        console,
    );

    let outcome = runtime.block_on(run(&auth, &cli.command));
    // Persist whatever changed, even when the command failed part way.
    settle(outcome, store.finalize())
}

/// Combine the command result with cache finalization; the command's own
/// error wins and a finalization failure alongside it is only logged.
fn settle(outcome: Result<()>, finalized: paconn_auth::Result<()>) -> Result<()> {
    match (outcome, finalized) {
        (Err(e), Err(save)) => {
            tracing::error!(error = %save, "failed to save the token cache");
            Err(e)
        }
        (outcome, Ok(())) => outcome,
        (Ok(()), Err(save)) => Err(save).context("failed to save the token cache"),
    }
}

async fn run(auth: &Authenticator, command: &Command) -> Result<()> {
    match command {
        Command::Login(args) => {
            let settings = load_settings(args.settings.as_deref(), args.layer())?;
            let outcome = auth.login(&settings, args.force).await?;
            println!("{}", describe_login(&outcome));
        }
        Command::Logout => {
            auth.logout()?;
            println!("Logged out.");
        }
        Command::Accounts => {
            let (users, apps) = auth.cached_identities(&Settings::default())?;
            println!("{}", describe_identities(&users, &apps));
        }
        Command::Token(args) => {
            let settings = load_settings(args.settings.as_deref(), args.layer())?;
            let token = auth.credentials(&settings).await?;
            println!("{}", token.authorization_header());
            println!(
                "Expires on: {}",
                token
                    .expires_on
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

fn describe_login(outcome: &LoginOutcome) -> String {
    match outcome {
        LoginOutcome::User {
            already_authenticated,
            accounts,
        } => {
            let mut out = if *already_authenticated {
                "Already logged in.".to_string()
            } else {
                "Login successful.".to_string()
            };
            for account in accounts {
                out.push_str(&format!("\n  user {}", account.username));
            }
            out
        }
        LoginOutcome::Application { client_id } => {
            format!("Login successful.\n  app {client_id}")
        }
    }
}

fn describe_identities(users: &[UserAccount], apps: &[AppIdentity]) -> String {
    if users.is_empty() && apps.is_empty() {
        return "No accounts are logged in. Run `paconn login` first.".to_string();
    }
    users
        .iter()
        .map(|u| format!("user {}", u.username))
        .chain(apps.iter().map(|a| format!("app {}", a.client_id)))
        .collect::<Vec<_>>()
        .join("\n")
}
