use anyhow::Result;
use gitsync_term::Output;
use libgitsync::{Checkpoint, PushSession};

use super::Invocation;
use crate::ui::render_report;

/// Run the `gitsync push` command logic.
pub fn push(
    invocation: &Invocation,
    output: &dyn Output,
    checkpoint: &dyn Checkpoint,
    message: Option<&str>,
) -> Result<()> {
    let report = PushSession::new(&invocation.exec, &invocation.config, checkpoint)
        .run(&invocation.repo_dir, message)?;
    render_report(output, &report)?;
    report.into_result()?;
    Ok(())
}
