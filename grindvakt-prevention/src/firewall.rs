//! ## grindvakt-prevention::firewall
//! **iptables/ip6tables-based blocking**
//!
//! - Drop rules are inserted at the head of the chain so they win over
//!   broader accept rules already present.
//! - Each command runs to completion; success is decided by exit status
//!   alone. Failures come back as `EnforcementError` and are never fatal.
//! - A repeated `block` adds an identical redundant rule; `unblock` deletes
//!   one matching rule per call.

use std::fmt;
use std::net::IpAddr;
use std::process::Command;

use grindvakt_core::Direction;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Firewall command `{command}` failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not an IP address: {0:?}")]
    InvalidTarget(String),
}

/// Applies and removes blocks for a target. Implementations must tolerate
/// concurrent calls.
pub trait Enforcer: Send + Sync {
    fn block(&self, target: &str, direction: Direction) -> Result<(), EnforcementError>;

    fn unblock(&self, target: &str, direction: Direction) -> Result<(), EnforcementError>;
}

/// Insert or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Delete,
}

impl Action {
    fn flag(self) -> &'static str {
        match self {
            Action::Insert => "-I",
            Action::Delete => "-D",
        }
    }
}

/// A fully-formed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for FirewallCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes a command and waits for it unconditionally.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &FirewallCommand) -> std::io::Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &FirewallCommand) -> std::io::Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Command names and chains used to build firewall invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallSettings {
    pub ipv4_command: String,
    pub ipv6_command: String,
    /// Prefix every command with `sudo_command`.
    pub use_sudo: bool,
    pub sudo_command: String,
    pub inbound_chain: String,
    pub outbound_chain: String,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            ipv4_command: "iptables".into(),
            ipv6_command: "ip6tables".into(),
            use_sudo: true,
            sudo_command: "sudo".into(),
            inbound_chain: "INPUT".into(),
            outbound_chain: "OUTPUT".into(),
        }
    }
}

/// Executor backed by iptables/ip6tables.
pub struct Firewall<R = SystemRunner> {
    settings: FirewallSettings,
    runner: R,
}

impl Firewall<SystemRunner> {
    pub fn new(settings: FirewallSettings) -> Self {
        Self::with_runner(settings, SystemRunner)
    }
}

impl<R: CommandRunner> Firewall<R> {
    pub fn with_runner(settings: FirewallSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &FirewallSettings {
        &self.settings
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Command lines for `action` on `target` in `direction`, in execution order.
    pub fn plan(
        &self,
        action: Action,
        target: &str,
        direction: Direction,
    ) -> Result<Vec<FirewallCommand>, EnforcementError> {
        if target.parse::<IpAddr>().is_err() {
            return Err(EnforcementError::InvalidTarget(target.to_string()));
        }
        // A colon can only appear in the IPv6 literal form.
        let tool = if target.contains(':') {
            &self.settings.ipv6_command
        } else {
            &self.settings.ipv4_command
        };

        Ok(direction
            .observed_pairs()
            .iter()
            .map(|observed| {
                let (chain, flag) = match observed {
                    Direction::Incoming => (&self.settings.inbound_chain, "-s"),
                    _ => (&self.settings.outbound_chain, "-d"),
                };
                self.command(tool, [action.flag(), chain, flag, target, "-j", "DROP"])
            })
            .collect())
    }

    fn command<'a>(&self, tool: &str, args: impl IntoIterator<Item = &'a str>) -> FirewallCommand {
        let args = args.into_iter().map(str::to_string);
        if self.settings.use_sudo {
            FirewallCommand {
                program: self.settings.sudo_command.clone(),
                args: std::iter::once(tool.to_string()).chain(args).collect(),
            }
        } else {
            FirewallCommand {
                program: tool.to_string(),
                args: args.collect(),
            }
        }
    }

    /// Runs every planned command even when an earlier one fails, and
    /// reports the first failure.
    fn apply(&self, action: Action, target: &str, direction: Direction) -> Result<(), EnforcementError> {
        let mut first_error = None;
        for command in self.plan(action, target, direction)? {
            if let Err(e) = self.execute(&command) {
                error!("{e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn execute(&self, command: &FirewallCommand) -> Result<(), EnforcementError> {
        debug!("Running firewall command: {command}");
        let output = self
            .runner
            .run(command)
            .map_err(|source| EnforcementError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if output.success() {
            info!("Firewall command executed successfully: {command}");
            Ok(())
        } else {
            Err(EnforcementError::CommandFailed {
                command: command.to_string(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

impl<R: CommandRunner> Enforcer for Firewall<R> {
    fn block(&self, target: &str, direction: Direction) -> Result<(), EnforcementError> {
        info!("Blocking {direction} traffic for {target}");
        self.apply(Action::Insert, target, direction)
    }

    fn unblock(&self, target: &str, direction: Direction) -> Result<(), EnforcementError> {
        info!("Unblocking {direction} traffic for {target}");
        self.apply(Action::Delete, target, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    /// Records every command and answers with a canned exit code.
    struct ScriptedRunner {
        calls: Mutex<Vec<String>>,
        code: Option<i32>,
    }

    impl ScriptedRunner {
        fn exiting(code: Option<i32>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                code,
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &FirewallCommand) -> std::io::Result<CommandOutput> {
            self.calls.lock().push(command.to_string());
            Ok(CommandOutput {
                code: self.code,
                stderr: "iptables: Permission denied (you must be root).".into(),
            })
        }
    }

    struct BrokenRunner;

    impl CommandRunner for BrokenRunner {
        fn run(&self, _command: &FirewallCommand) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn firewall(code: Option<i32>) -> Firewall<ScriptedRunner> {
        Firewall::with_runner(FirewallSettings::default(), ScriptedRunner::exiting(code))
    }

    #[test]
    fn incoming_block_targets_input_chain_as_source() {
        let fw = firewall(Some(0));
        fw.block("203.0.113.5", Direction::Incoming).unwrap();
        assert_eq!(
            *fw.runner().calls.lock(),
            vec!["sudo iptables -I INPUT -s 203.0.113.5 -j DROP"]
        );
    }

    #[test]
    fn outgoing_unblock_targets_output_chain_as_destination() {
        let fw = firewall(Some(0));
        fw.unblock("203.0.113.5", Direction::Outgoing).unwrap();
        assert_eq!(
            *fw.runner().calls.lock(),
            vec!["sudo iptables -D OUTPUT -d 203.0.113.5 -j DROP"]
        );
    }

    #[test]
    fn both_directions_issue_two_commands() {
        let fw = firewall(Some(0));
        fw.block("198.51.100.7", Direction::Both).unwrap();
        assert_eq!(
            *fw.runner().calls.lock(),
            vec![
                "sudo iptables -I INPUT -s 198.51.100.7 -j DROP",
                "sudo iptables -I OUTPUT -d 198.51.100.7 -j DROP",
            ]
        );
    }

    #[test]
    fn ipv6_targets_use_ip6tables() {
        let settings = FirewallSettings {
            use_sudo: false,
            ..FirewallSettings::default()
        };
        let fw = Firewall::with_runner(settings, ScriptedRunner::exiting(Some(0)));
        fw.block("2001:db8::1", Direction::Incoming).unwrap();
        assert_eq!(
            *fw.runner().calls.lock(),
            vec!["ip6tables -I INPUT -s 2001:db8::1 -j DROP"]
        );
    }

    #[traced_test]
    #[test]
    fn non_zero_exit_is_reported_with_stderr() {
        let fw = firewall(Some(4));
        let err = fw.block("203.0.113.5", Direction::Both).unwrap_err();
        match err {
            EnforcementError::CommandFailed {
                command,
                code,
                stderr,
            } => {
                assert_eq!(command, "sudo iptables -I INPUT -s 203.0.113.5 -j DROP");
                assert_eq!(code, Some(4));
                assert!(stderr.contains("Permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The second direction is still attempted.
        assert_eq!(fw.runner().calls.lock().len(), 2);
        assert!(logs_contain("failed with exit code"));
    }

    #[test]
    fn launch_failure_is_not_fatal() {
        let fw = Firewall::with_runner(FirewallSettings::default(), BrokenRunner);
        assert!(matches!(
            fw.block("203.0.113.5", Direction::Incoming),
            Err(EnforcementError::Spawn { .. })
        ));
    }

    #[test]
    fn rejects_non_ip_targets() {
        let fw = firewall(Some(0));
        assert!(matches!(
            fw.block("-F", Direction::Incoming),
            Err(EnforcementError::InvalidTarget(_))
        ));
        assert!(fw.runner().calls.lock().is_empty());
    }

    #[test]
    fn custom_chains_are_honoured() {
        let settings = FirewallSettings {
            inbound_chain: "GRINDVAKT_IN".into(),
            outbound_chain: "GRINDVAKT_OUT".into(),
            ..FirewallSettings::default()
        };
        let fw = Firewall::with_runner(settings, ScriptedRunner::exiting(Some(0)));
        let plan = fw.plan(Action::Delete, "192.0.2.1", Direction::Both).unwrap();
        assert_eq!(plan[0].args[1..3], ["-D".to_string(), "GRINDVAKT_IN".to_string()]);
        assert_eq!(plan[1].args[2], "GRINDVAKT_OUT");
    }
}
