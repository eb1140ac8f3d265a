// ABOUTME: Builds the command line for a worker process
// ABOUTME: claude in print mode with stream-json framing on both stdin and stdout

use crate::config::WorkerConfig;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// How to launch a worker. Built once from [`WorkerConfig`] and reused for every spawn.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    binary: String,
    extra_args: Vec<String>,
    system_prompt_flag: String,
    skip_permissions: bool,
    env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            system_prompt_flag: config.system_prompt_flag.clone(),
            skip_permissions: config.skip_permissions,
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for one worker, in order.
    pub fn args(&self, system_prompt: &str) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(
            [
                "--print",
                "--input-format",
                "stream-json",
                "--output-format",
                "stream-json",
                "--verbose",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push(self.system_prompt_flag.clone());
        args.push(system_prompt.to_string());
        args
    }

    /// A ready-to-spawn command with all three streams piped.
    pub fn build(&self, system_prompt: &str, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(system_prompt))
            .current_dir(working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new(&WorkerConfig::default())
    }
}
