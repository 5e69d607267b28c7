//! Backup export to file or stdout

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use storyvault_core::{Backup, BackupExporter, ProjectDirectory, ProjectId, RevisionStore};

pub async fn build_backup(
    store: Arc<dyn RevisionStore>,
    projects: &dyn ProjectDirectory,
    project: ProjectId,
) -> Result<Backup> {
    let record = projects
        .fetch(project)
        .await?
        .with_context(|| format!("Project {} does not exist", project))?;
    Ok(BackupExporter::new(store).export_history(&record).await?)
}

/// Write `backup` as pretty JSON; `-` means stdout.
pub fn write_backup(backup: &Backup, output: &str) -> Result<()> {
    let json = backup.to_json_pretty()?;
    if output == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
    } else {
        std::fs::write(Path::new(output), json)
            .with_context(|| format!("Failed to write backup to {}", output))?;
    }
    Ok(())
}
