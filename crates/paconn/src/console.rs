//! Terminal implementations of the authentication collaborators.

use std::io::{self, BufRead, Write};

use paconn_auth::{AppIdentity, AuthError, IdentityPrompt, MessageSink, UserAccount};

/// Attempts before an unanswerable selection is given up.
const MAX_ATTEMPTS: usize = 3;

/// Shows messages on stdout and asks questions on stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleInteraction;

impl MessageSink for ConsoleInteraction {
    fn show(&self, message: &str) {
        println!("{message}");
    }
}

impl IdentityPrompt for ConsoleInteraction {
    fn choose_identity(
        &self,
        users: &[UserAccount],
        apps: &[AppIdentity],
    ) -> paconn_auth::Result<String> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        choose_from(&mut stdin.lock(), &mut stdout.lock(), users, apps)
    }
}

/// Numbered menu over `users` then `apps`; returns the chosen name.
pub fn choose_from(
    input: &mut impl BufRead,
    output: &mut impl Write,
    users: &[UserAccount],
    apps: &[AppIdentity],
) -> paconn_auth::Result<String> {
    let choices: Vec<(&str, &str)> = users
        .iter()
        .map(|u| ("user", u.username.as_str()))
        .chain(apps.iter().map(|a| ("app", a.client_id.as_str())))
        .collect();
    let io_err = |e: io::Error| AuthError::Prompt(e.to_string());

    writeln!(output, "Multiple identities are logged in:").map_err(io_err)?;
    for (i, (kind, name)) in choices.iter().enumerate() {
        writeln!(output, "  {}. {kind} {name}", i + 1).map_err(io_err)?;
    }

    for _ in 0..MAX_ATTEMPTS {
        write!(output, "Select the identity to use [1-{}]: ", choices.len()).map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            return Err(AuthError::Prompt("no selection made".into()));
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return Ok(choices[n - 1].1.to_string()),
            _ => writeln!(output, "Please enter a number between 1 and {}.", choices.len())
                .map_err(io_err)?,
        }
    }
    Err(AuthError::Prompt("no valid selection made".into()))
}
