//! `rhz map` and `rhz connect`.
//!
//! Both read one document (chunks plus extracted anchors) from a JSON
//! file. `map` stops after metadata transfer and prints the enriched
//! chunks; `connect` runs detection and persists the results.

use std::path::Path;

use anyhow::{Context, Result};

use rhizome_core::models::Chunk;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::pipeline::{DocumentInput, Pipeline};
use crate::sqlite_store::SqliteStore;

pub fn load_document(path: &Path) -> Result<DocumentInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse document: {}", path.display()))
}

/// Load previously enriched chunks from other documents.
///
/// Accepts either a bare JSON array of chunks or a document file.
pub fn load_library(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read library: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse library: {}", path.display()))?;
    let chunks = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        serde_json::from_value::<DocumentInput>(value)?.chunks
    };
    Ok(chunks)
}

pub async fn run_map(config: &Config, document: &Path, json: bool) -> Result<()> {
    let input = load_document(document)?;
    let pipeline = Pipeline::from_config(config)?;
    let mapped = pipeline
        .map_document(&input)
        .await
        .with_context(|| format!("Mapping failed for document {}", input.document_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&mapped)?);
        return Ok(());
    }

    println!("map {}", mapped.document_id);
    println!(
        "  anchors: {} (exact {}, fuzzy {}, embedding {}, assisted {}, interpolated {})",
        mapped.mapping.anchors,
        mapped.mapping.exact,
        mapped.mapping.fuzzy,
        mapped.mapping.embedding,
        mapped.mapping.assisted,
        mapped.mapping.interpolated
    );
    println!(
        "  chunks: {} (coverage {:.1}%, high {}, medium {}, low {})",
        mapped.transfer.chunks,
        mapped.transfer.coverage_percent(),
        mapped.transfer.high,
        mapped.transfer.medium,
        mapped.transfer.low
    );
    Ok(())
}

pub async fn run_connect(
    config: &Config,
    document: &Path,
    library: Option<&Path>,
    json: bool,
) -> Result<()> {
    let input = load_document(document)?;
    let library = match library {
        Some(path) => load_library(path)?,
        None => Vec::new(),
    };
    let pipeline = Pipeline::from_config(config)?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let outcome = pipeline
        .process_document(&input, &library, &store)
        .await
        .with_context(|| format!("Connection run failed for document {}", input.document_id));
    store.pool().close().await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print!("{}", outcome.report.render());
    }
    Ok(())
}
