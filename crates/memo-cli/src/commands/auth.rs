use std::path::PathBuf;

use memo_core::Identity;

use crate::commands::common::{finish, format_sync_timestamp, open_engine, Context};
use crate::error::CliError;

pub async fn run_login(
    identity: &str,
    remote_dir: Option<PathBuf>,
    context: &mut Context,
) -> Result<(), CliError> {
    let identity = Identity::parse(identity)?;
    if let Some(remote_dir) = remote_dir {
        context.config.remote_dir = Some(remote_dir);
    }
    let Some(remote_dir) = context.config.remote_dir.clone() else {
        return Err(CliError::Config(
            "No remote store configured. Pass --remote-dir <DIR>.".to_string(),
        ));
    };

    context.config.identity = Some(identity.to_string());
    context.save_config()?;

    let engine = open_engine(context, true).await?;
    finish(&engine).await?;
    println!(
        "Signed in as {identity} (remote: {}, {} notes)",
        remote_dir.display(),
        engine.notes().await.len()
    );
    Ok(())
}

pub fn run_logout(context: &mut Context) -> Result<(), CliError> {
    let Some(identity) = context.config.identity.take() else {
        println!("Not signed in.");
        return Ok(());
    };
    context.save_config()?;
    println!("Signed out {identity}; local notes are kept");
    Ok(())
}

pub async fn run_status(context: &Context) -> Result<(), CliError> {
    let engine = open_engine(context, false).await?;
    let snapshot = engine.snapshot().await;

    match context.remote_session()? {
        Some((identity, remote_dir)) => {
            println!("Signed in as {identity} (remote: {})", remote_dir.display());
        }
        None => println!("Not signed in; notes stay on this device"),
    }
    println!("Data dir: {}", context.data_dir.display());
    println!("Notes: {}", snapshot.len());
    println!("Tombstones: {}", snapshot.tombstones.len());
    if let Some(latest) = snapshot.display_order().first() {
        println!("Last edit: {}", format_sync_timestamp(latest.updated_at));
    }
    Ok(())
}
