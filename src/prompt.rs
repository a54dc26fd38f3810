//! Sources of replacement credentials
//!
//! When a run needs a new account it asks a [`CredentialPrompt`]. Accounts
//! from the configuration are handed out in order by [`AccountRotation`];
//! [`ConsolePrompt`] asks the operator on a line-oriented reader.

use crate::api::Credentials;
use crate::config::AccountEntry;
use crate::state::Checkpoint;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

#[async_trait]
pub trait CredentialPrompt: Send {
    /// Asks for the next account to use
    ///
    /// `context` is where the run will pick up again. Returns None when the
    /// request is cancelled or nothing is left to offer.
    async fn request_credentials(&mut self, context: Option<&Checkpoint>) -> Option<Credentials>;
}

/// Configured accounts, each offered once
#[derive(Debug, Default)]
pub struct AccountRotation {
    queue: VecDeque<Credentials>,
}

impl AccountRotation {
    pub fn from_accounts(accounts: &[AccountEntry]) -> Self {
        let queue = accounts
            .iter()
            .map(|account| Credentials {
                identifier: account.username.clone(),
                secondary_identifier: account.email.clone(),
                secret: account.password.clone(),
            })
            .collect();
        Self { queue }
    }

    /// Takes the next account
    pub fn next_account(&mut self) -> Option<Credentials> {
        self.queue.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

#[async_trait]
impl CredentialPrompt for AccountRotation {
    async fn request_credentials(&mut self, _context: Option<&Checkpoint>) -> Option<Credentials> {
        self.next_account()
    }
}

/// Reads credentials (and console commands) line by line
pub struct ConsolePrompt<R> {
    lines: Lines<R>,
}

impl<R> ConsolePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next trimmed input line; None at end of input
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line.map(|l| l.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Console input failed");
                None
            }
        }
    }

    async fn ask(&mut self, label: &str) -> Option<String> {
        println!("{}: ", label);
        self.next_line().await
    }
}

#[async_trait]
impl<R> CredentialPrompt for ConsolePrompt<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn request_credentials(&mut self, context: Option<&Checkpoint>) -> Option<Credentials> {
        if let Some(checkpoint) = context {
            println!("Run paused {}", checkpoint);
        }
        println!("New account needed (empty username cancels)");

        let identifier = self.ask("Username").await.filter(|u| !u.is_empty())?;
        let secondary = self.ask("Email (optional)").await?;
        let secret = self.ask("Password").await?;

        Some(Credentials {
            identifier,
            secondary_identifier: Some(secondary).filter(|s| !s.is_empty()),
            secret: Some(secret).filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(username: &str, password: Option<&str>) -> AccountEntry {
        AccountEntry {
            username: username.to_string(),
            email: None,
            password: password.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_rotation_in_order() {
        let mut rotation =
            AccountRotation::from_accounts(&[entry("alice", Some("a")), entry("bob", None)]);
        assert_eq!(rotation.remaining(), 2);

        let first = rotation.request_credentials(None).await.unwrap();
        assert_eq!(first.identifier, "alice");
        assert!(first.can_login());

        let second = rotation.request_credentials(None).await.unwrap();
        assert_eq!(second.identifier, "bob");
        assert!(!second.can_login());

        assert!(rotation.request_credentials(None).await.is_none());
    }

    #[tokio::test]
    async fn test_console_prompt_reads_credentials() {
        let input: &[u8] = b"carol\n\ns3cret\n";
        let mut console = ConsolePrompt::new(input);

        let creds = console.request_credentials(None).await.unwrap();
        assert_eq!(creds.identifier, "carol");
        assert_eq!(creds.secondary_identifier, None);
        assert_eq!(creds.secret.as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn test_console_prompt_cancel() {
        let input: &[u8] = b"\n";
        let mut console = ConsolePrompt::new(input);
        assert!(console.request_credentials(None).await.is_none());

        let empty: &[u8] = b"";
        let mut console = ConsolePrompt::new(empty);
        assert!(console.request_credentials(None).await.is_none());
    }

    #[tokio::test]
    async fn test_console_lines_trimmed() {
        let input: &[u8] = b"  pause \nstop\n";
        let mut console = ConsolePrompt::new(input);
        assert_eq!(console.next_line().await.as_deref(), Some("pause"));
        assert_eq!(console.next_line().await.as_deref(), Some("stop"));
        assert_eq!(console.next_line().await, None);
    }
}
