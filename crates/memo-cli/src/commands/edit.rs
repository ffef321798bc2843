use crate::commands::common::{
    capture_editor_input_with_initial, finish, normalize_note_identifier, note_to_editor_text,
    open_engine, parse_editor_text, resolve_note, Context,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<&str>,
    body: Option<&str>,
    context: &Context,
) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = open_engine(context, true).await?;
    let note = resolve_note(&engine, &normalized_id).await?;

    let (new_title, new_body) = if title.is_none() && body.is_none() {
        let Some(edited) = capture_editor_input_with_initial(&note_to_editor_text(&note))? else {
            return Err(CliError::EmptyEditedContent);
        };
        parse_editor_text(&edited).ok_or(CliError::EmptyEditedContent)?
    } else {
        (
            title.map_or_else(|| note.title.clone(), |title| title.trim().to_string()),
            body.map_or_else(|| note.body.clone(), ToString::to_string),
        )
    };

    if new_title == note.title && new_body == note.body {
        finish(&engine).await?;
        println!("{}", note.id);
        return Ok(());
    }

    let updated = engine
        .update_note(&note.id, &new_title, &new_body)
        .await
        .ok_or_else(|| CliError::NoteNotFound(note.id.to_string()))?;
    finish(&engine).await?;
    println!("{}", updated.id);
    Ok(())
}
