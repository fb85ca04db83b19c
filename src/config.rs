use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rhizome_core::engine::{EnginesConfig, ENGINE_NAMES};
use rhizome_core::mapper::MapperConfig;
use rhizome_core::transfer::TransferConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub mapper: MapperSection,
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapperSection {
    #[serde(default = "default_fuzzy_high")]
    pub fuzzy_high_threshold: f64,
    #[serde(default = "default_fuzzy_medium")]
    pub fuzzy_medium_threshold: f64,
    #[serde(default = "default_short_anchor_chars")]
    pub short_anchor_chars: usize,
    #[serde(default = "default_fuzzy_search_radius")]
    pub fuzzy_search_radius: usize,
    #[serde(default = "default_embedding_threshold")]
    pub embedding_threshold: f64,
    #[serde(default = "default_embedding_high")]
    pub embedding_high_threshold: f64,
    #[serde(default = "default_embedding_window_radius")]
    pub embedding_window_radius: usize,
    /// Use the embedding layer when a provider is configured.
    #[serde(default = "default_true")]
    pub embedding_layer: bool,
    #[serde(default = "default_assisted_context_chars")]
    pub assisted_context_chars: usize,
}

impl Default for MapperSection {
    fn default() -> Self {
        Self {
            fuzzy_high_threshold: default_fuzzy_high(),
            fuzzy_medium_threshold: default_fuzzy_medium(),
            short_anchor_chars: default_short_anchor_chars(),
            fuzzy_search_radius: default_fuzzy_search_radius(),
            embedding_threshold: default_embedding_threshold(),
            embedding_high_threshold: default_embedding_high(),
            embedding_window_radius: default_embedding_window_radius(),
            embedding_layer: true,
            assisted_context_chars: default_assisted_context_chars(),
        }
    }
}

impl MapperSection {
    pub fn mapper_config(&self) -> MapperConfig {
        MapperConfig {
            fuzzy_high_threshold: self.fuzzy_high_threshold,
            fuzzy_medium_threshold: self.fuzzy_medium_threshold,
            short_anchor_chars: self.short_anchor_chars,
            fuzzy_search_radius: self.fuzzy_search_radius,
            embedding_threshold: self.embedding_threshold,
            embedding_high_threshold: self.embedding_high_threshold,
            embedding_window_radius: self.embedding_window_radius,
            assisted_context_chars: self.assisted_context_chars,
        }
    }
}

// Mapper defaults live on `MapperConfig`; these read them from there.
fn default_fuzzy_high() -> f64 {
    MapperConfig::default().fuzzy_high_threshold
}
fn default_fuzzy_medium() -> f64 {
    MapperConfig::default().fuzzy_medium_threshold
}
fn default_short_anchor_chars() -> usize {
    MapperConfig::default().short_anchor_chars
}
fn default_fuzzy_search_radius() -> usize {
    MapperConfig::default().fuzzy_search_radius
}
fn default_embedding_threshold() -> f64 {
    MapperConfig::default().embedding_threshold
}
fn default_embedding_high() -> f64 {
    MapperConfig::default().embedding_high_threshold
}
fn default_embedding_window_radius() -> usize {
    MapperConfig::default().embedding_window_radius
}
fn default_assisted_context_chars() -> usize {
    MapperConfig::default().assisted_context_chars
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransferSection {
    #[serde(default = "default_coverage_warning")]
    pub coverage_warning_threshold: f64,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            coverage_warning_threshold: default_coverage_warning(),
        }
    }
}

impl TransferSection {
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            coverage_warning_threshold: self.coverage_warning_threshold,
        }
    }
}

fn default_coverage_warning() -> f64 {
    0.7
}

/// Hard ceiling on concurrent engine calls for one chunk.
pub const MAX_ENGINE_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    /// Engines to run. Order is the tie-break order for equal scores.
    #[serde(default = "default_enabled_engines")]
    pub enabled_engines: Vec<String>,
    /// Engine name → weight. Unlisted engines weigh 1.0.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_per_engine_limit")]
    pub per_engine_limit: usize,
    #[serde(default = "default_per_chunk_limit")]
    pub per_chunk_limit: usize,
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,
    /// Chunks processed concurrently within one document.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Engines invoked concurrently for one chunk.
    #[serde(default = "default_max_engine_concurrency")]
    pub max_engine_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled_engines: default_enabled_engines(),
            weights: BTreeMap::new(),
            per_engine_limit: default_per_engine_limit(),
            per_chunk_limit: default_per_chunk_limit(),
            engine_timeout_ms: default_engine_timeout_ms(),
            run_deadline_secs: default_run_deadline_secs(),
            max_concurrency: default_max_concurrency(),
            max_engine_concurrency: default_max_engine_concurrency(),
        }
    }
}

fn default_enabled_engines() -> Vec<String> {
    ENGINE_NAMES.iter().map(|n| n.to_string()).collect()
}
fn default_per_engine_limit() -> usize {
    10
}
fn default_per_chunk_limit() -> usize {
    50
}
fn default_engine_timeout_ms() -> u64 {
    30_000
}
fn default_run_deadline_secs() -> u64 {
    600
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_engine_concurrency() -> usize {
    MAX_ENGINE_CONCURRENCY
}

/// Largest batch a single insert may carry.
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_persist_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub retry_failed_batch: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_persist_batch_size(),
            retry_failed_batch: true,
        }
    }
}

fn default_persist_batch_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Text locator for the mapper's assisted layer.
#[derive(Debug, Deserialize, Clone)]
pub struct LocatorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_locator_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            max_retries: default_max_retries(),
            timeout_secs: default_locator_timeout_secs(),
            url: None,
        }
    }
}

fn default_locator_timeout_secs() -> u64 {
    60
}

impl LocatorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    // Mapper and engine thresholds
    config.mapper.mapper_config().validate()?;
    config.engines.validate()?;

    if !(0.0..=1.0).contains(&config.transfer.coverage_warning_threshold) {
        anyhow::bail!("transfer.coverage_warning_threshold must be in [0.0, 1.0]");
    }

    // Orchestrator
    let orch = &config.orchestrator;
    if orch.enabled_engines.is_empty() {
        anyhow::bail!("orchestrator.enabled_engines must name at least one engine");
    }
    for name in orch.enabled_engines.iter().chain(orch.weights.keys()) {
        if !ENGINE_NAMES.contains(&name.as_str()) {
            anyhow::bail!(
                "Unknown engine: '{}'. Must be one of: {}",
                name,
                ENGINE_NAMES.join(", ")
            );
        }
    }
    for (name, weight) in &orch.weights {
        if !weight.is_finite() || *weight < 0.0 {
            anyhow::bail!("orchestrator.weights.{} must be a finite, non-negative number", name);
        }
    }
    if orch.per_engine_limit < 1 {
        anyhow::bail!("orchestrator.per_engine_limit must be >= 1");
    }
    if orch.per_chunk_limit < 1 {
        anyhow::bail!("orchestrator.per_chunk_limit must be >= 1");
    }
    if orch.engine_timeout_ms == 0 {
        anyhow::bail!("orchestrator.engine_timeout_ms must be > 0");
    }
    if orch.run_deadline_secs == 0 {
        anyhow::bail!("orchestrator.run_deadline_secs must be > 0");
    }
    if orch.max_concurrency < 1 {
        anyhow::bail!("orchestrator.max_concurrency must be >= 1");
    }
    if !(1..=MAX_ENGINE_CONCURRENCY).contains(&orch.max_engine_concurrency) {
        anyhow::bail!(
            "orchestrator.max_engine_concurrency must be in [1, {}]",
            MAX_ENGINE_CONCURRENCY
        );
    }

    // Persistence
    if !(1..=MAX_BATCH_SIZE).contains(&config.persistence.batch_size) {
        anyhow::bail!("persistence.batch_size must be in [1, {}]", MAX_BATCH_SIZE);
    }

    // Embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Locator
    match config.locator.provider.as_str() {
        "disabled" => {}
        "ollama" => {
            if config.locator.model.is_none() {
                anyhow::bail!("locator.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown locator provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    Ok(())
}
