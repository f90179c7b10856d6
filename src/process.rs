use std::process::Command as ProcessCommand;
use std::sync::Arc;

pub type ProcessRunner = Arc<dyn Fn(&str, &[String]) -> ProcessExecutionResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ProcessExecutionResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExecutionResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn default_process_runner(executable: &str, arguments: &[String]) -> ProcessExecutionResult {
    match ProcessCommand::new(executable).args(arguments).output() {
        Ok(output) => ProcessExecutionResult {
            status: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Err(err) => ProcessExecutionResult {
            status: 1,
            stdout: String::new(),
            stderr: err.to_string(),
        },
    }
}

pub fn interactive_process_runner(executable: &str, arguments: &[String]) -> ProcessExecutionResult {
    match ProcessCommand::new(executable).args(arguments).status() {
        Ok(status) => ProcessExecutionResult {
            status: status.code().unwrap_or(1),
            stdout: String::new(),
            stderr: String::new(),
        },
        Err(err) => ProcessExecutionResult {
            status: 127,
            stdout: String::new(),
            stderr: err.to_string(),
        },
    }
}
