use std::path::Path;

use crate::commands::common::{finish, open_engine, Context};
use crate::error::CliError;

pub async fn run_import(path: &Path, context: &Context) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(path)?;

    let engine = open_engine(context, true).await?;
    let report = engine.import_json(&payload).await?;
    finish(&engine).await?;

    println!(
        "Imported {} new and {} updated notes from {}",
        report.added,
        report.updated,
        path.display()
    );
    Ok(())
}
