//! Command handlers.
//!
//! Each handler drives a [`DbSearchBackend`] built from the configuration
//! file and writes human-readable output to `out`.

use std::io::Write;
use std::path::Path;

use dbsearch::{DbSearchBackend, IndexItem, Keys, ResultSet, SearchBackend, SearchQuery};

use crate::cli::Command;
use crate::config::CliConfig;
use crate::config_handlers::handle_config_command;
use crate::error::{Error, Result};

/// Search ID reported to autocomplete from the command line.
const CLI_SEARCH_ID: &str = "cli";

/// Runs one command.
pub async fn run(config_path: &Path, command: Command, out: &mut dyn Write) -> Result<()> {
    if let Command::Config { action } = command {
        return handle_config_command(config_path, action, out);
    }
    let config = CliConfig::load(config_path)?;
    let service = DbSearchBackend::from_config(config.backend.clone()).await?;
    execute(&service, &config, command, out).await
}

/// Runs a non-config command against a service.
pub async fn execute(
    service: &DbSearchBackend,
    config: &CliConfig,
    command: Command,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Add { index } => {
            for index in config.selected(index.as_deref())? {
                service.add_index(index).await?;
                emit(out, format_args!("Added index '{}'", index.id))?;
            }
        }
        Command::Update { index } => {
            for index in config.selected(index.as_deref())? {
                let needs_reindex = service.update_index(index).await?;
                if needs_reindex {
                    emit(out, format_args!("Updated index '{}'; reindexing required", index.id))?;
                } else {
                    emit(out, format_args!("Updated index '{}'", index.id))?;
                }
            }
        }
        Command::Remove { index } => {
            service.remove_index(config.index(&index)?).await?;
            emit(out, format_args!("Removed index '{index}'"))?;
        }
        Command::DropServer { server_id } => {
            service.pre_delete(&server_id).await?;
            emit(out, format_args!("Removed all indexes of server '{server_id}'"))?;
        }
        Command::Index { index, file } => {
            let index = config.index(&index)?;
            let items = read_items(&file)?;
            let stored = service.index_items(index, &items).await?;
            emit(
                out,
                format_args!(
                    "Indexed {}/{} item(s) into '{}'",
                    stored.len(),
                    items.len(),
                    index.id
                ),
            )?;
            if stored.len() < items.len() {
                let failed: Vec<&str> = items
                    .iter()
                    .map(|item| item.id.as_str())
                    .filter(|id| !stored.iter().any(|s| s == id))
                    .collect();
                log::warn!("Items not indexed: {failed:?}");
            }
        }
        Command::Delete { index, ids } => {
            service.delete_items(config.index(&index)?, &ids).await?;
            emit(out, format_args!("Deleted {} item(s) from '{index}'", ids.len()))?;
        }
        Command::Clear { index, datasource } => {
            service
                .delete_all_index_items(config.index(&index)?, datasource.as_deref())
                .await?;
            emit(out, format_args!("Cleared index '{index}'"))?;
        }
        Command::Search {
            index,
            keys,
            query,
            limit,
            offset,
            json,
        } => {
            let mut search = match &query {
                Some(path) => read_json::<SearchQuery>(path)?,
                None => SearchQuery::new(),
            };
            if let Some(keys) = keys.as_deref() {
                search.keys = Keys::parse(keys);
            }
            search.offset = offset;
            if limit.is_some() {
                search.limit = limit;
            }
            let results = service.search(config.index(&index)?, &search).await?;
            if json {
                emit(out, format_args!("{}", serde_json::to_string_pretty(&results)?))?;
            } else {
                print_results(out, &results)?;
            }
        }
        Command::Autocomplete {
            index,
            input,
            limit,
        } => {
            let (complete, incomplete) = split_input(&input);
            let query = SearchQuery {
                keys: Keys::parse(complete),
                limit,
                ..SearchQuery::default()
            };
            let suggestions = service
                .autocomplete_suggestions(
                    config.index(&index)?,
                    &query,
                    CLI_SEARCH_ID,
                    incomplete,
                    &input,
                )
                .await?;
            for suggestion in suggestions {
                emit(
                    out,
                    format_args!("{}\t{}", suggestion.text(), suggestion.result_count),
                )?;
            }
        }
        Command::Config { .. } => {
            return Err(Error::config("config commands do not use the backend"));
        }
    }
    Ok(())
}

/// Splits typed input into completed keywords and the word being typed.
///
/// Input ending in whitespace has no incomplete word.
pub fn split_input(input: &str) -> (&str, &str) {
    if input.ends_with(char::is_whitespace) {
        return (input, "");
    }
    match input.rfind(char::is_whitespace) {
        Some(pos) => input.split_at(pos + 1),
        None => ("", input),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
    Ok(serde_json::from_str(&content)?)
}

fn read_items(path: &Path) -> Result<Vec<IndexItem>> {
    read_json(path)
}

fn print_results(out: &mut dyn Write, results: &ResultSet) -> Result<()> {
    emit(
        out,
        format_args!("{} result(s), showing {}", results.count, results.items.len()),
    )?;
    for item in &results.items {
        emit(out, format_args!("{:>10.3}  {}", item.score, item.id))?;
    }
    for (field, values) in &results.facets {
        emit(out, format_args!("facet {field}:"))?;
        for value in values {
            emit(out, format_args!("  {} ({})", value.filter, value.count))?;
        }
    }
    if !results.ignored_keywords.is_empty() {
        emit(
            out,
            format_args!("ignored keywords: {}", results.ignored_keywords.join(", ")),
        )?;
    }
    for warning in &results.warnings {
        emit(out, format_args!("warning: {warning}"))?;
    }
    Ok(())
}

fn emit(out: &mut dyn Write, line: std::fmt::Arguments<'_>) -> Result<()> {
    writeln!(out, "{line}").map_err(|e| Error::io(e, "stdout"))
}
