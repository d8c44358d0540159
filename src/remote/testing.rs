// In-memory transport used by the unit tests in place of a real SSH host.
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::errors::{BackupError, Result};
use crate::remote::transport::{CommandOutput, Transport};

enum Behaviour {
    Reply(CommandOutput),
    Stall,
    WaitFor(Arc<Notify>, CommandOutput),
}

#[derive(Default)]
struct LogInner {
    commands: Vec<String>,
    connects: usize,
}

/// Shared view of what a [`ScriptedTransport`] was asked to do.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<LogInner>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }
}

/// Answers commands from a list of `(substring, behaviour)` rules. The most
/// recently added matching rule wins; unmatched commands succeed silently.
pub struct ScriptedTransport {
    rules: Vec<(String, Behaviour)>,
    log: CommandLog,
    connected: bool,
    refuse: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            rules: Vec::new(),
            log: CommandLog::default(),
            connected: false,
            refuse: false,
        }
    }

    /// A host running the given platform version with home `/home/usr1cv8`.
    pub fn with_platform(version: &str) -> Self {
        Self::new()
            .respond("ps aux", 0, &agent_listing(version))
            .respond("echo $HOME", 0, "/home/usr1cv8\n")
    }

    pub fn respond(self, pattern: &str, exit_status: u32, stdout: &str) -> Self {
        self.respond_full(pattern, exit_status, stdout, "")
    }

    pub fn respond_full(mut self, pattern: &str, exit_status: u32, stdout: &str, stderr: &str) -> Self {
        let output = CommandOutput {
            exit_status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };
        self.rules.push((pattern.to_string(), Behaviour::Reply(output)));
        self
    }

    pub fn stall_on(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Behaviour::Stall));
        self
    }

    /// Holds the command until `gate` is notified, then succeeds with `stdout`.
    pub fn wait_on(mut self, pattern: &str, gate: Arc<Notify>, stdout: &str) -> Self {
        let output = CommandOutput {
            exit_status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        };
        self.rules.push((pattern.to_string(), Behaviour::WaitFor(gate, output)));
        self
    }

    /// Records into `log` instead of a private one, so several transports
    /// built by one factory can be inspected together.
    pub fn sharing_log(mut self, log: CommandLog) -> Self {
        self.log = log;
        self
    }

    pub fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.refuse {
            return Err(BackupError::Connection("connection refused".to_string()));
        }
        self.connected = true;
        self.log.0.lock().unwrap().connects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.connected {
            return Err(BackupError::Connection("not connected".to_string()));
        }
        self.log.0.lock().unwrap().commands.push(command.to_string());

        let behaviour = self
            .rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, behaviour)| behaviour);

        match behaviour {
            None => Ok(CommandOutput::default()),
            Some(Behaviour::Reply(output)) => Ok(output.clone()),
            Some(Behaviour::Stall) => std::future::pending().await,
            Some(Behaviour::WaitFor(gate, output)) => {
                let output = output.clone();
                gate.notified().await;
                Ok(output)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

/// One line of `ps aux` output for a running agent of `version`.
pub fn agent_listing(version: &str) -> String {
    format!(
        "usr1cv8   1021  0.3  1.2 1532420 99604 ?  Ssl  Jan10  42:17 /opt/1cv8/x86_64/{}/ragent -daemon -port 1540 -regport 1541 -range 1560:1591\n",
        version
    )
}
