//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use paconn_settings::SettingsLayer;

/// Power Platform connector CLI.
#[derive(Parser, Debug)]
#[command(name = "paconn", version, about = "Power Platform connector CLI")]
pub struct Cli {
    /// Show informational logs.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Show debug logs.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in as a user (device code or browser) or as an application (client secret).
    Login(LoginArgs),
    /// Forget all cached credentials.
    Logout,
    /// List the logged in users and applications.
    Accounts,
    /// Print a bearer token for the active identity.
    Token(TokenArgs),
}

/// `paconn login` options.
#[derive(Args, Debug, Default)]
pub struct LoginArgs {
    /// ID of the application registered in Entra ID.
    #[arg(long, short = 'i', visible_alias = "clid")]
    pub client_id: Option<String>,

    /// Client secret of the application; selects application login.
    #[arg(long, env = "PACONN_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Tenant the application is registered in.
    #[arg(long, short = 't')]
    pub tenant: Option<String>,

    /// Authority URL for login.
    #[arg(long, short = 'a', visible_alias = "authority_url")]
    pub authority_url: Option<String>,

    /// Resource URL; converted to a `/.default` scope. `--scopes` wins.
    #[arg(long, short = 'r')]
    pub resource: Option<String>,

    /// Space-delimited scopes.
    #[arg(long, short = 'c')]
    pub scopes: Option<String>,

    /// Username of the account to log in to.
    #[arg(long, short = 'n')]
    pub username: Option<String>,

    /// Sign in through the browser instead of the device code flow.
    #[arg(long)]
    pub interactive: bool,

    /// Do not use the platform account broker.
    #[arg(long, short = 'b')]
    pub disable_broker_on_windows: bool,

    /// Settings file (`settings.json`).
    #[arg(long, short = 's')]
    pub settings: Option<PathBuf>,

    /// Log in again even when a valid login exists.
    #[arg(long, short = 'f')]
    pub force: bool,
}

impl LoginArgs {
    /// Command-line settings layer.
    pub fn layer(&self) -> SettingsLayer {
        SettingsLayer {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            tenant: self.tenant.clone(),
            authority_url: self.authority_url.clone(),
            resource: self.resource.clone(),
            scopes: self.scopes.clone(),
            username: self.username.clone(),
            account: None,
            interactive_login: self.interactive.then_some(true),
            disable_broker_on_windows: self.disable_broker_on_windows.then_some(true),
        }
    }
}

/// `paconn token` options.
#[derive(Args, Debug, Default)]
pub struct TokenArgs {
    /// Logged in username or application client id to use.
    #[arg(long, short = 'n')]
    pub account: Option<String>,

    /// Settings file (`settings.json`).
    #[arg(long, short = 's')]
    pub settings: Option<PathBuf>,
}

impl TokenArgs {
    /// Command-line settings layer.
    pub fn layer(&self) -> SettingsLayer {
        SettingsLayer {
            account: self.account.clone(),
            ..Default::default()
        }
    }
}
