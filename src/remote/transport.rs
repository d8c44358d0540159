// dtbackuptool/src/remote/transport.rs
use async_trait::async_trait;
use std::time::Duration;

use crate::errors::Result;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// stderr if the command wrote any, stdout otherwise. Some tools
    /// (rac, rclone) report errors on stdout.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Raw connection to a host able to execute shell commands.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    /// Must be safe to call on a transport that is already closed.
    async fn close(&mut self) -> Result<()>;
}

/// Narrow seam used by the inventory reader, the dump executor and the cloud
/// uploader. Commands issued through one runner never overlap.
#[async_trait]
pub trait CommandRunner: Send {
    /// Runs with the runner's default time limit.
    async fn run(&mut self, command: &str) -> Result<CommandOutput>;

    async fn run_for(&mut self, command: &str, limit: Duration) -> Result<CommandOutput>;
}

const SHELL_SPECIAL: &[char] = &[
    '"', '\'', '\\', '$', '`', ';', '&', '|', '<', '>', '(', ')', '*', '?', '#', '~', '{', '}', '[', ']',
];

/// Quotes a single command-line argument if the shell would otherwise split
/// or interpret it. Plain arguments are returned unchanged.
pub fn quote_arg(arg: &str) -> String {
    let needs_quoting = arg.is_empty()
        || arg.chars().any(|c| c.is_whitespace() || SHELL_SPECIAL.contains(&c));
    if needs_quoting {
        quote_path(arg)
    } else {
        arg.to_string()
    }
}

/// Always wraps in double quotes, escaping what stays special inside them.
pub fn quote_path(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
