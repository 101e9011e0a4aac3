use anyhow::Result;
use gitsync_term::Output;
use libgitsync::{Checkpoint, SyncSession};

use super::Invocation;
use crate::ui::render_report;

/// Run the `gitsync sync` command logic.
pub fn sync(
    invocation: &Invocation,
    output: &dyn Output,
    checkpoint: &dyn Checkpoint,
) -> Result<()> {
    let report = SyncSession::new(&invocation.exec, &invocation.config, checkpoint)
        .run(&invocation.repo_dir)?;
    render_report(output, &report)?;
    report.into_result()?;
    Ok(())
}
