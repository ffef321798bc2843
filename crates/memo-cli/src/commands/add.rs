use crate::commands::common::{
    finish, normalize_content, normalize_title, open_engine, read_piped_stdin, Context,
};
use crate::error::CliError;

pub async fn run_add(title: &str, body: Option<&str>, context: &Context) -> Result<(), CliError> {
    let title = normalize_title(title)?;
    let body = match body {
        Some(body) => normalize_content(body).unwrap_or_default(),
        None => read_piped_stdin()?.unwrap_or_default(),
    };

    let engine = open_engine(context, true).await?;
    let note = engine.create_note_with(&title, &body).await;
    finish(&engine).await?;

    println!("{}", note.id);
    Ok(())
}
