use crate::commands::common::{normalize_search_query, open_engine, print_notes, Context};
use crate::error::CliError;

pub async fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    context: &Context,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let engine = open_engine(context, false).await?;
    let mut notes = engine.search(&normalized_query).await;
    notes.truncate(limit);
    print_notes(&notes, as_json)
}
