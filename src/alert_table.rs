//! AlertTable - which assets currently hold an ACTIVE outage alert
//!
//! The table is the gate that keeps alert emission well-ordered: an asset is
//! inserted when ACTIVE is first published and removed when RESOLVED goes
//! out, so a RESOLVED can never precede its ACTIVE within one process run.
//!
//! The table survives restarts through a small operator-inspectable text
//! file in the hierarchical layout already deployed in the field:
//!
//! ```text
//! root
//!     alerts
//!         0 = "UPS-42"
//!         1 = "EPDU-17"
//! ```
//!
//! Indexes are meaningless on load; values may contain spaces.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;

/// Set of asset identifiers with a currently ACTIVE outage alert.
#[derive(Debug, Default)]
pub struct AlertTable {
    active: HashSet<String>,
}

impl AlertTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn mark_active(&mut self, name: &str) {
        self.active.insert(name.to_string());
    }

    pub fn mark_resolved(&mut self, name: &str) {
        self.active.remove(name);
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Write the table to `path` in the hierarchical text layout.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::from("root\n    alerts\n");
        for (i, name) in self.active.iter().enumerate() {
            out.push_str(&format!("        {i} = \"{name}\"\n"));
        }

        fs::write(path, out).with_context(|| format!("cannot write {}", path.display()))?;
        debug!("saved state to {}", path.display());
        Ok(())
    }

    /// Read a table back from `path`.
    ///
    /// Fails when the file is unreadable or carries no `alerts` section; the
    /// caller logs and proceeds with an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;

        let mut lines = content.lines();
        let mut alerts_indent = None;

        for line in lines.by_ref() {
            if line.trim() == "alerts" {
                alerts_indent = Some(indent_of(line));
                break;
            }
        }

        let Some(section_indent) = alerts_indent else {
            bail!("no 'alerts' section in {}", path.display());
        };

        let mut table = Self::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            // the section ends where indentation falls back
            if indent_of(line) <= section_indent {
                break;
            }

            let Some((_, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            if !value.is_empty() {
                table.active.insert(value.to_string());
            }
        }

        debug!("loaded {} active alerts from {}", table.len(), path.display());
        Ok(table)
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}
