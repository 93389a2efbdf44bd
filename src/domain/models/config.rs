use serde::{Deserialize, Serialize};

/// Main configuration structure for testweaver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// AI generation engine settings
    #[serde(default)]
    pub ai: AiConfig,

    /// Gap analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Batch scheduling settings
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Incremental run settings
    #[serde(default)]
    pub incremental: IncrementalConfig,

    /// Per-model token pricing table
    #[serde(default = "default_pricing")]
    pub pricing: Vec<ModelRate>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            analysis: AnalysisConfig::default(),
            batching: BatchingConfig::default(),
            incremental: IncrementalConfig::default(),
            pricing: default_pricing(),
            logging: LoggingConfig::default(),
        }
    }
}

/// External generation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AiConfig {
    /// Primary model name passed to the engine
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for the single retry after a failed attempt
    #[serde(default = "default_fallback_model")]
    pub fallback_model: Option<String>,

    /// Engine executable (looked up on PATH)
    #[serde(default = "default_engine_command")]
    pub engine_command: String,

    /// Per-task timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum simultaneously running engine processes
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Optional per-batch cost ceiling in USD
    #[serde(default)]
    pub cost_limit: Option<f64>,

    /// Test framework hint forwarded in prompts (e.g. pytest, jest)
    #[serde(default)]
    pub framework: Option<String>,
}

fn default_model() -> String {
    "sonnet".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_fallback_model() -> Option<String> {
    Some("haiku".to_string())
}

fn default_engine_command() -> String {
    "claude".to_string()
}

const fn default_timeout_secs() -> u64 {
    900
}

const fn default_max_concurrent() -> usize {
    3
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_model: default_fallback_model(),
            engine_command: default_engine_command(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            cost_limit: None,
            framework: None,
        }
    }
}

/// Gap analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// Minimum complexity score for a file to count as a gap
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,

    /// Minimum complexity score for a gap to be sent to the AI engine
    #[serde(default = "default_complexity_threshold")]
    pub min_complexity_for_ai: f64,

    /// Source file extensions considered by the project scanner
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Weights used to compute complexity scores
    #[serde(default)]
    pub weights: ComplexityWeights,
}

const fn default_complexity_threshold() -> f64 {
    3.0
}

fn default_extensions() -> Vec<String> {
    ["py", "js", "jsx", "ts", "tsx", "rs", "go", "java", "rb"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
            min_complexity_for_ai: default_complexity_threshold(),
            extensions: default_extensions(),
            weights: ComplexityWeights::default(),
        }
    }
}

/// Coefficients of the complexity score.
///
/// `score = 1 + branches * branch + functions * function + lines / lines_per_point`,
/// minus `tested_discount` when the file already has tests, clamped to `[1, max_score]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplexityWeights {
    pub branch: f64,
    pub function: f64,
    pub lines_per_point: f64,
    pub tested_discount: f64,
    pub max_score: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            branch: 0.5,
            function: 0.25,
            lines_per_point: 50.0,
            tested_discount: 1.0,
            max_score: 10.0,
        }
    }
}

/// Batch scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchingConfig {
    /// Tasks per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batching is only worthwhile when gaps >= batch_size * this ratio
    #[serde(default = "default_benefit_ratio")]
    pub benefit_ratio: f64,

    /// State directory, relative to the project root
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

const fn default_batch_size() -> usize {
    10
}

const fn default_benefit_ratio() -> f64 {
    1.5
}

fn default_state_dir() -> String {
    ".testweaver".to_string()
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            benefit_ratio: default_benefit_ratio(),
            state_dir: default_state_dir(),
        }
    }
}

/// Incremental run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalConfig {
    /// Above this share of changed tracked files a full run is recommended
    #[serde(default = "default_max_change_ratio")]
    pub max_change_ratio: f64,
}

const fn default_max_change_ratio() -> f64 {
    0.3
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            max_change_ratio: default_max_change_ratio(),
        }
    }
}

/// Token pricing for one model, in USD per million tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelRate {
    /// Model name or alias, matched as a substring of the requested model
    pub model: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelRate {
    pub fn new(model: &str, input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            model: model.to_string(),
            input_per_million,
            output_per_million,
        }
    }
}

fn default_pricing() -> Vec<ModelRate> {
    vec![
        ModelRate::new("opus", 15.0, 75.0),
        ModelRate::new("sonnet", 3.0, 15.0),
        ModelRate::new("haiku", 0.80, 4.0),
    ]
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
