use crate::commands::common::{open_engine, print_notes, Context};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, context: &Context) -> Result<(), CliError> {
    let engine = open_engine(context, false).await?;
    let mut notes = engine.notes().await;
    notes.truncate(limit);
    print_notes(&notes, as_json)
}
