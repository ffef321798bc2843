use crate::commands::common::{finish, open_engine, Context};
use crate::error::CliError;

pub async fn run_sync(context: &Context) -> Result<(), CliError> {
    if context.remote_session()?.is_none() {
        return Err(CliError::NotSignedIn);
    }

    let engine = open_engine(context, true).await?;
    engine.flush().await?;
    let status = engine.status();
    let pending = engine.pending_deletes().await.len();
    finish(&engine).await?;

    println!("Sync {} ({pending} deletions pending)", status.label());
    Ok(())
}
