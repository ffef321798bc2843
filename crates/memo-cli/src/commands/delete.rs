use crate::commands::common::{
    finish, normalize_note_identifier, open_engine, resolve_note, Context,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = open_engine(context, true).await?;
    let note = resolve_note(&engine, &normalized_id).await?;

    engine.delete_note(&note.id).await;
    finish(&engine).await?;
    println!("{}", note.id);
    Ok(())
}
