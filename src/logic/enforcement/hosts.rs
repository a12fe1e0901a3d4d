//! Hosts File Filter
//!
//! Blocks domains by sinking them in a marker-delimited section of the hosts
//! file. One line per blocked pattern, keyed by a trailing comment:
//!
//! ```text
//! # BEGIN compliance-agent
//! 0.0.0.0 x.com www.x.com # x.com
//! # END compliance-agent
//! ```
//!
//! Lines outside the managed section are never touched.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::website::{base_domain, DomainFilter};
use crate::constants::HOSTS_SINK_ADDRESS;
use crate::logic::error::EnforcementError;
use crate::logic::storage::write_atomic;

// ============================================================================
// CONSTANTS
// ============================================================================

const SECTION_BEGIN: &str = "# BEGIN compliance-agent";
const SECTION_END: &str = "# END compliance-agent";

// ============================================================================
// FILTER
// ============================================================================

pub struct HostsFileFilter {
    path: PathBuf,
    // Serializes read-modify-write of the file within this process
    lock: Mutex<()>,
}

/// Hosts file split around the managed section
struct HostsLayout {
    before: Vec<String>,
    managed: Vec<(String, String)>,
    after: Vec<String>,
}

impl HostsFileFilter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Patterns currently blocked in the managed section
    pub fn blocked_patterns(&self) -> Result<Vec<String>, EnforcementError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.managed.into_iter().map(|(key, _)| key).collect())
    }

    fn read(&self) -> Result<HostsLayout, EnforcementError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(EnforcementError::from_io(e)),
        };
        Ok(parse_layout(&content))
    }

    fn write(&self, layout: &HostsLayout) -> Result<(), EnforcementError> {
        write_atomic(&self.path, render_layout(layout).as_bytes()).map_err(EnforcementError::from_io)
    }
}

impl DomainFilter for HostsFileFilter {
    fn name(&self) -> &'static str {
        "hosts-file"
    }

    fn is_blocked(&self, domain: &str) -> Result<bool, EnforcementError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.managed.iter().any(|(key, _)| key == domain))
    }

    fn block_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        let _guard = self.lock.lock();
        let mut layout = self.read()?;

        if layout.managed.iter().any(|(key, _)| key == domain) {
            return Ok(());
        }

        layout.managed.push((domain.to_string(), entry_line(domain)));
        layout.managed.sort_by(|a, b| a.0.cmp(&b.0));
        self.write(&layout)
    }

    fn unblock_domain(&self, domain: &str) -> Result<(), EnforcementError> {
        let _guard = self.lock.lock();
        let mut layout = self.read()?;

        let before = layout.managed.len();
        layout.managed.retain(|(key, _)| key != domain);
        if layout.managed.len() == before {
            return Ok(());
        }

        self.write(&layout)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Host names sunk for a pattern: the base domain and its `www.` variant
fn host_names(pattern: &str) -> Vec<String> {
    let base = base_domain(pattern);
    let mut names = vec![base.to_string()];
    if !base.starts_with("www.") {
        names.push(format!("www.{}", base));
    }
    names
}

fn entry_line(pattern: &str) -> String {
    format!("{} {} # {}", HOSTS_SINK_ADDRESS, host_names(pattern).join(" "), pattern)
}

fn parse_layout(content: &str) -> HostsLayout {
    let mut layout = HostsLayout {
        before: Vec::new(),
        managed: Vec::new(),
        after: Vec::new(),
    };

    // 0 = before section, 1 = inside, 2 = after
    let mut state = 0;
    for line in content.lines() {
        match state {
            0 if line.trim() == SECTION_BEGIN => state = 1,
            0 => layout.before.push(line.to_string()),
            1 if line.trim() == SECTION_END => state = 2,
            1 => {
                if let Some((_, key)) = line.rsplit_once('#') {
                    let key = key.trim();
                    if !key.is_empty() {
                        layout.managed.push((key.to_string(), line.trim().to_string()));
                    }
                }
            }
            _ => layout.after.push(line.to_string()),
        }
    }

    layout
}

fn render_layout(layout: &HostsLayout) -> String {
    let mut lines: Vec<&str> = layout.before.iter().map(String::as_str).collect();

    if !layout.managed.is_empty() {
        lines.push(SECTION_BEGIN);
        lines.extend(layout.managed.iter().map(|(_, line)| line.as_str()));
        lines.push(SECTION_END);
    }

    lines.extend(layout.after.iter().map(String::as_str));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

// ============================================================================
// TESTS
// ============================================================================
