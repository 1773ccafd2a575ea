use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LeavenError;

/// Secrets and endpoints, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Places search
    pub places_api_key: String,
    pub places_base_url: Option<String>,

    // Postgres
    pub database_url: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Pipeline strategy file and run-log directory
    pub pipeline_config: Option<PathBuf>,
    pub data_dir: PathBuf,
}

impl Config {
    /// Config for the scout binary. `PLACES_API_KEY` is required; without
    /// `DATABASE_URL` the scout keeps records in memory.
    pub fn scout_from_env() -> Result<Self, LeavenError> {
        Self::from_lookup(|k| env::var(k).ok(), true, false)
    }

    /// Config for the read API. Needs a database, no upstream key.
    pub fn api_from_env() -> Result<Self, LeavenError> {
        Self::from_lookup(|k| env::var(k).ok(), false, true)
    }

    fn from_lookup(
        get: impl Fn(&str) -> Option<String>,
        require_places: bool,
        require_database: bool,
    ) -> Result<Self, LeavenError> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                LeavenError::Config(format!("{key} environment variable is required"))
            })
        };

        let places_api_key = if require_places {
            required("PLACES_API_KEY")?
        } else {
            get("PLACES_API_KEY").unwrap_or_default()
        };
        let database_url = if require_database {
            Some(required("DATABASE_URL")?)
        } else {
            get("DATABASE_URL")
        };
        let web_port = match get("WEB_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| LeavenError::Config(format!("WEB_PORT must be a number, got {p}")))?,
            None => 3000,
        };

        Ok(Self {
            places_api_key,
            places_base_url: get("PLACES_BASE_URL"),
            database_url,
            web_host: get("WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port,
            pipeline_config: get("PIPELINE_CONFIG").map(PathBuf::from),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        let database = if self.database_url.is_some() {
            "postgres"
        } else {
            "in-memory"
        };
        info!(
            places_api_key = %redact(&self.places_api_key),
            places_base_url = self.places_base_url.as_deref().unwrap_or("(default)"),
            database,
            web_addr = %format!("{}:{}", self.web_host, self.web_port),
            pipeline_config = ?self.pipeline_config,
            data_dir = %self.data_dir.display(),
            "Configuration loaded"
        );
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

// --- Pipeline strategy ---

/// A search query pattern. Placeholders: `{product}`, `{category}`, `{city}`, `{state}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub pattern: String,
    pub limit: u32,
}

impl QueryTemplate {
    pub fn new(pattern: impl Into<String>, limit: u32) -> Self {
        Self {
            pattern: pattern.into(),
            limit,
        }
    }

    pub fn render(&self, product: &str, category: &str, city: &str, state: &str) -> String {
        self.pattern
            .replace("{product}", product)
            .replace("{category}", category)
            .replace("{city}", city)
            .replace("{state}", state)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Local relevance filter applied to raw search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub inclusion_keywords: Vec<String>,
    pub exclusion_keywords: Vec<String>,
    /// Counts as inclusion when it appears together with "restaurant".
    pub category_term: String,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            inclusion_keywords: strings(&[
                "pizzeria",
                "pizza place",
                "sourdough",
                "neapolitan",
                "wood fired",
                "wood-fired",
            ]),
            exclusion_keywords: strings(&[
                "domino's",
                "dominos",
                "pizza hut",
                "papa john",
                "little caesars",
                "grocery",
                "supermarket",
                "walmart",
                "costco",
                "doordash",
                "uber eats",
                "ubereats",
                "grubhub",
                "postmates",
                "gas station",
            ]),
            category_term: "pizza".to_string(),
        }
    }
}

/// Minimum gap between submissions to one upstream endpoint. The actual gap
/// is drawn uniformly from `[min_ms, max_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            min_ms: 2_000,
            max_ms: 8_000,
        }
    }
}

/// Bounded linear backoff for job polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub step_delay_ms: u64,
    pub cap_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 8_000,
            step_delay_ms: 1_000,
            cap_delay_ms: 12_000,
        }
    }
}

/// Per-run discovery strategy. Loaded from `PIPELINE_CONFIG` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub product: String,
    pub category: String,
    pub language: String,
    pub region: String,
    pub query_templates: Vec<QueryTemplate>,
    pub keywords: Vec<String>,
    pub relevance: RelevanceConfig,
    pub spacing: SpacingConfig,
    pub poll: PollConfig,
    pub fetch_timeout_secs: u64,
    pub social_lookup: bool,
    pub persist_all: bool,
    pub concurrency: usize,
}

pub const MAX_CONCURRENCY: usize = 3;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            product: "sourdough".to_string(),
            category: "pizza".to_string(),
            language: "en".to_string(),
            region: "US".to_string(),
            query_templates: vec![
                QueryTemplate::new("{product} {category} {city} {state}", 40),
                QueryTemplate::new("{category} restaurants {city} {state}", 60),
                QueryTemplate::new("artisan {category} {city} {state}", 20),
                QueryTemplate::new("wood fired {category} {city} {state}", 20),
            ],
            keywords: strings(&[
                "sourdough",
                "naturally leavened",
                "wild yeast",
                "naturally fermented",
            ]),
            relevance: RelevanceConfig::default(),
            spacing: SpacingConfig::default(),
            poll: PollConfig::default(),
            fetch_timeout_secs: 10,
            social_lookup: true,
            persist_all: false,
            concurrency: 1,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, LeavenError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), templates = config.query_templates.len(), "Loaded pipeline config");
        Ok(config)
    }

    /// Reject unusable settings and clamp concurrency into `1..=MAX_CONCURRENCY`.
    pub fn validate(&mut self) -> Result<(), LeavenError> {
        if self.query_templates.is_empty() {
            return Err(LeavenError::Validation(
                "at least one query template is required".into(),
            ));
        }
        if let Some(t) = self.query_templates.iter().find(|t| t.limit == 0) {
            return Err(LeavenError::Validation(format!(
                "query template '{}' has a zero limit",
                t.pattern
            )));
        }
        self.keywords.retain(|k| !k.trim().is_empty());
        if self.keywords.is_empty() {
            return Err(LeavenError::Validation(
                "keyword vocabulary must not be empty".into(),
            ));
        }
        if self.spacing.min_ms > self.spacing.max_ms {
            return Err(LeavenError::Validation(format!(
                "spacing.min_ms ({}) exceeds spacing.max_ms ({})",
                self.spacing.min_ms, self.spacing.max_ms
            )));
        }
        if self.poll.max_attempts == 0 {
            return Err(LeavenError::Validation(
                "poll.max_attempts must be at least 1".into(),
            ));
        }
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
