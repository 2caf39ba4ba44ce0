// Snapshot file writer for external monitoring
//!
//! Writes the current registry to a file for consumption by external tools
//! like status bar widgets. One key per line; connections are tab separated.

use crate::registry::RegistrySnapshot;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Render a snapshot in the on-disk format
pub fn render(snapshot: &RegistrySnapshot, timestamp: u64) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "ANY_ACTIVE={}", snapshot.any_active());
    let _ = writeln!(content, "GENERATION={}", snapshot.generation());
    for conn in snapshot.connections() {
        let _ = writeln!(
            content,
            "CONNECTION={}\t{}\t{}",
            sanitize(&conn.name),
            sanitize(&conn.hardware_port),
            conn.status
        );
    }
    let _ = writeln!(content, "TIMESTAMP={}", timestamp);
    content
}

/// Tabs and newlines would break the line format
fn sanitize(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

/// Write current snapshot to `path`
pub fn write_snapshot(path: &Path, snapshot: &RegistrySnapshot) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create state directory")?;
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, render(snapshot, timestamp)).context("Failed to write state file")?;
    fs::rename(&tmp_path, path).context("Failed to replace state file")?;

    Ok(())
}

/// Remove state file on shutdown
pub fn cleanup(path: &Path) {
    let _ = fs::remove_file(path);
}
