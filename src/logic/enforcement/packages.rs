//! Command App Lifecycle
//!
//! App inventory and removal through platform commands run via the system
//! shell. The list command prints one app per line as `name<TAB>location`
//! (location optional). The uninstall template receives `{name}` and
//! `{location}`, shell-quoted.

use std::io::ErrorKind;
use std::process::{Command, Output};

use super::software::{AppLifecycle, InstalledApp};
use crate::logic::error::EnforcementError;

pub struct CommandAppLifecycle {
    list_command: String,
    uninstall_template: String,
}

impl CommandAppLifecycle {
    pub fn new(list_command: impl Into<String>, uninstall_template: impl Into<String>) -> Self {
        Self {
            list_command: list_command.into(),
            uninstall_template: uninstall_template.into(),
        }
    }

    fn uninstall_command(&self, app: &InstalledApp) -> String {
        self.uninstall_template
            .replace("{name}", &shell_quote(&app.name))
            .replace("{location}", &shell_quote(app.location.as_deref().unwrap_or("")))
    }
}

impl AppLifecycle for CommandAppLifecycle {
    fn list_installed(&self) -> Result<Vec<InstalledApp>, EnforcementError> {
        let output = run_shell(&self.list_command)?;
        Ok(parse_inventory(&String::from_utf8_lossy(&output.stdout)))
    }

    fn uninstall(&self, app: &InstalledApp) -> Result<(), EnforcementError> {
        let command = self.uninstall_command(app);
        log::debug!("Uninstalling {}: {}", app.name, command);
        run_shell(&command).map(|_| ())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse `name<TAB>location` lines
pub fn parse_inventory(stdout: &str) -> Vec<InstalledApp> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let name = cols.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let location = cols.next().map(str::trim).filter(|l| !l.is_empty());
            Some(InstalledApp {
                name: name.to_string(),
                location: location.map(str::to_string),
            })
        })
        .collect()
}

fn run_shell(command: &str) -> Result<Output, EnforcementError> {
    #[cfg(target_os = "windows")]
    let result = Command::new("cmd").args(["/C", command]).output();
    #[cfg(not(target_os = "windows"))]
    let result = Command::new("sh").args(["-c", command]).output();

    let output = match result {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(EnforcementError::Unavailable(format!("shell not available: {}", e)))
        }
        Err(e) => return Err(EnforcementError::from_io(e)),
    };

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let exit_code = output.status.code().unwrap_or(-1);
    let program = command.split_whitespace().next().unwrap_or("").to_string();

    // 126/127: not executable / not found
    if exit_code == 126 || exit_code == 127 {
        return Err(EnforcementError::Unavailable(format!("{}: {}", program, stderr)));
    }
    if stderr.to_lowercase().contains("permission denied") || stderr.contains("are you root") {
        return Err(EnforcementError::PermissionDenied(stderr));
    }

    Err(EnforcementError::CommandFailed {
        command: program,
        exit_code,
        stderr,
    })
}

#[cfg(not(target_os = "windows"))]
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(target_os = "windows")]
fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', ""))
}

// ============================================================================
// TESTS
// ============================================================================
