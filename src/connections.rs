//! Connection lookup by source chunk.
//!
//! Backs `rhz connections <chunk_id>`: lists persisted connections for one
//! chunk in rank order, either as a table or as JSON.

use anyhow::Result;

use rhizome_core::models::{Connection, Explanation};
use rhizome_core::store::ConnectionStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_connections(config: &Config, chunk_id: &str, limit: usize, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let connections = store.connections_for(chunk_id, limit).await?;
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&connections)?);
        return Ok(());
    }

    if connections.is_empty() {
        println!("No connections for {}.", chunk_id);
        return Ok(());
    }

    println!("Connections for {}:", chunk_id);
    println!();
    for (i, c) in connections.iter().enumerate() {
        println!("{}", render_row(i + 1, c));
    }
    Ok(())
}

fn render_row(rank: usize, c: &Connection) -> String {
    format!(
        "{:>3}. {:<36} {:<24} score={:.3} raw={:.3}\n     {}",
        rank,
        c.target_chunk_id,
        c.relation_type.as_str(),
        c.weighted_score,
        c.raw_strength,
        describe(&c.metadata)
    )
}

/// One-line explanation of why the connection exists.
fn describe(explanation: &Explanation) -> String {
    match explanation {
        Explanation::SemanticSimilarity { similarity } => {
            format!("cosine similarity {:.3}", similarity)
        }
        Explanation::ThematicBridge {
            shared_themes,
            source_domain,
            target_domain,
            ..
        } => format!(
            "themes [{}] bridge {} -> {}",
            shared_themes.join(", "),
            source_domain.as_deref().unwrap_or("?"),
            target_domain.as_deref().unwrap_or("?")
        ),
        Explanation::StructuralIsomorphism { shared_patterns, .. } => {
            format!("patterns [{}]", shared_patterns.join(", "))
        }
        Explanation::Contradiction {
            shared_concepts,
            opposing_tones,
            ..
        } => {
            let tones: Vec<String> = opposing_tones
                .iter()
                .map(|(a, b)| format!("{a}/{b}"))
                .collect();
            format!(
                "concepts [{}] with opposing tones [{}]",
                shared_concepts.join(", "),
                tones.join(", ")
            )
        }
    }
}
