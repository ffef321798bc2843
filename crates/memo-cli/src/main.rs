//! Memo CLI - Command-line interface for offline-first notes
//!
//! Every command works against the local records; when an identity is signed
//! in, mutating commands also reconcile with the shared remote store.

mod cli;
mod commands;
mod config;
mod error;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth::{run_login, run_logout, run_status};
use crate::commands::common::Context;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("memo=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let mut context = Context::resolve(cli.config, cli.data_dir)?;

    match cli.command {
        Some(Commands::Add { title, body }) => {
            run_add(&title, body.as_deref(), &context).await?;
        }
        Some(Commands::Edit { id, title, body }) => {
            run_edit(&id, title.as_deref(), body.as_deref(), &context).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &context).await?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &context).await?,
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &context).await?;
        }
        Some(Commands::Export { format, output }) => {
            run_export(format, output.as_deref(), &context).await?;
        }
        Some(Commands::Import { path }) => run_import(&path, &context).await?,
        Some(Commands::Login {
            identity,
            remote_dir,
        }) => run_login(&identity, remote_dir, &mut context).await?,
        Some(Commands::Logout) => run_logout(&mut context)?,
        Some(Commands::Status) => run_status(&context).await?,
        Some(Commands::Sync) => run_sync(&context).await?,
        Some(Commands::Completions { .. }) => {}
        None => {
            // Quick capture mode: memo "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note.join(" "), None, &context).await?;
            }
        }
    }

    Ok(())
}
