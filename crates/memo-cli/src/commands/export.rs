use std::path::{Path, PathBuf};

use chrono::Utc;
use memo_core::export::suggested_export_file_name;

use crate::cli::ExportFormat;
use crate::commands::common::{open_engine, Context};
use crate::error::CliError;

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    context: &Context,
) -> Result<(), CliError> {
    let engine = open_engine(context, false).await?;
    let rendered = engine.export(format.into()).await?;

    if let Some(path) = output_path {
        let path = export_target(path, format, Utc::now().timestamp_millis());
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// Existing directories get a timestamped `notes_export_*` file inside them.
pub fn export_target(path: &Path, format: ExportFormat, now_ms: i64) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_export_file_name(format.into(), now_ms))
    } else {
        path.to_path_buf()
    }
}
