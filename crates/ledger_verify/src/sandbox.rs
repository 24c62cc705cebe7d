use std::collections::BTreeMap;
use std::process::Command;

/// Isolation policy for replay subprocesses, injected as configuration.
/// The engine invokes under whatever constraints the deployment's threat
/// model requires; it does not implement the sandbox itself. A `wrapper`
/// argv prefix (e.g. `bwrap`/`systemd-run`/`firejail` plus flags) is
/// prepended to the full replay command line.
#[derive(Debug, Clone, Default)]
pub struct SandboxSpec {
    /// Argv prefix wrapped around the runner + transform invocation.
    pub wrapper: Vec<String>,
    /// Drop the inherited environment before applying `env`.
    pub clear_env: bool,
    /// Environment variables set for the subprocess.
    pub env: BTreeMap<String, String>,
}

impl SandboxSpec {
    /// Build the sandboxed command for a replay argv. The first element of
    /// the effective argv becomes the program; everything else is arguments.
    pub(crate) fn command(&self, argv: &[String]) -> Command {
        let mut full: Vec<&String> = self.wrapper.iter().collect();
        full.extend(argv.iter());
        debug_assert!(!full.is_empty());

        let mut cmd = Command::new(full[0]);
        cmd.args(&full[1..]);
        if self.clear_env {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}
