use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use klee_core::config::{env_flag, env_opt, env_parse};
use klee_core::ProgramPoint;

use crate::error::SearchError;
use crate::exclusion::FilterMode;
use crate::weight::WeightKind;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration of a searcher chain.
///
/// Parsed from `searcher.toml`. A fixed set of keys can be overridden from
/// `KLEE_SEARCH_*` environment variables; other keys come from the file only.
/// Every decorator section is off unless enabled; an empty file yields a
/// plain FIFO searcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearcherConfig {
    /// Seed for every randomized component of the chain.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub base: BaseConfig,

    #[serde(default)]
    pub interleave: InterleaveConfig,

    #[serde(default)]
    pub epoch: EpochConfig,

    #[serde(default)]
    pub xchk: ToggleConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub demotion: DemotionConfig,

    #[serde(default)]
    pub second_chance: SecondChanceConfig,

    #[serde(default)]
    pub batching: BatchingConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub deepening: ToggleConfig,

    #[serde(default)]
    pub string_prune: ToggleConfig,
}

fn default_seed() -> u64 {
    0x5eed
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            base: BaseConfig::default(),
            interleave: InterleaveConfig::default(),
            epoch: EpochConfig::default(),
            xchk: ToggleConfig::default(),
            filter: FilterConfig::default(),
            demotion: DemotionConfig::default(),
            second_chance: SecondChanceConfig::default(),
            batching: BatchingConfig::default(),
            merge: MergeConfig::default(),
            deepening: ToggleConfig::default(),
            string_prune: ToggleConfig::default(),
        }
    }
}

// ── Section configs ─────────────────────────────────────────────────

/// Strategies that schedule states directly, without an inner searcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseStrategy {
    #[default]
    Fifo,
    Lifo,
    Random,
    RoundRobin,
    Phased,
    Weighted,
    Priority,
    Rescan,
}

impl BaseStrategy {
    /// Whether the strategy ranks states through the configured weighers.
    pub fn uses_weighers(self) -> bool {
        matches!(self, BaseStrategy::Priority | BaseStrategy::Rescan)
    }
}

impl FromStr for BaseStrategy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fifo" => BaseStrategy::Fifo,
            "lifo" => BaseStrategy::Lifo,
            "random" => BaseStrategy::Random,
            "round_robin" => BaseStrategy::RoundRobin,
            "phased" => BaseStrategy::Phased,
            "weighted" => BaseStrategy::Weighted,
            "priority" => BaseStrategy::Priority,
            "rescan" => BaseStrategy::Rescan,
            other => {
                return Err(SearchError::Config(format!(
                    "unknown strategy '{other}'"
                )))
            }
        })
    }
}

impl fmt::Display for BaseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseStrategy::Fifo => "fifo",
            BaseStrategy::Lifo => "lifo",
            BaseStrategy::Random => "random",
            BaseStrategy::RoundRobin => "round_robin",
            BaseStrategy::Phased => "phased",
            BaseStrategy::Weighted => "weighted",
            BaseStrategy::Priority => "priority",
            BaseStrategy::Rescan => "rescan",
        };
        f.write_str(name)
    }
}

/// Weigher catalogue entries for the priority strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeigherKind {
    Coverage,
    BucketByFunction,
    Trace,
    /// `base.weight` scaled by `base.metric_scale`.
    Metric,
}

/// Base strategy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub strategy: BaseStrategy,

    /// Metric for `weighted` sampling and `metric` weighers.
    #[serde(default = "default_weight")]
    pub weight: WeightKind,

    /// Summed into one priority for `priority` and `rescan`.
    #[serde(default = "default_weighers")]
    pub weighers: Vec<WeigherKind>,

    #[serde(default = "default_trace_depth")]
    pub trace_depth: usize,

    #[serde(default = "default_metric_scale")]
    pub metric_scale: f64,

    /// Priority corrections allowed per `select` in the bucketed engine.
    #[serde(default = "default_kick_rate")]
    pub kick_rate: u32,

    /// Strategy inside each priority bucket.
    #[serde(default)]
    pub bucket: BaseStrategy,
}

fn default_weight() -> WeightKind {
    WeightKind::Depth
}

fn default_weighers() -> Vec<WeigherKind> {
    vec![WeigherKind::Coverage]
}

fn default_trace_depth() -> usize {
    3
}

fn default_metric_scale() -> f64 {
    1000.0
}

fn default_kick_rate() -> u32 {
    8
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            strategy: BaseStrategy::default(),
            weight: default_weight(),
            weighers: default_weighers(),
            trace_depth: default_trace_depth(),
            metric_scale: default_metric_scale(),
            kick_rate: default_kick_rate(),
            bucket: BaseStrategy::default(),
        }
    }
}

/// Sections that are just an on/off switch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Interleaving of the base strategy with extra strategies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterleaveConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Strategies taking turns after the base one.
    #[serde(default)]
    pub strategies: Vec<BaseStrategy>,

    /// Lottery instead of plain rotation.
    #[serde(default)]
    pub tickets: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Strategy of the global pool.
    #[serde(default = "default_epoch_pool")]
    pub pool: BaseStrategy,

    /// Epoch population above which members get concretized.
    #[serde(default = "default_watermark")]
    pub watermark: usize,
}

fn default_epoch_pool() -> BaseStrategy {
    BaseStrategy::Random
}

fn default_watermark() -> usize {
    crate::pool::DEFAULT_WATERMARK
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool: default_epoch_pool(),
            watermark: default_watermark(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: FilterMode,

    #[serde(default)]
    pub functions: Vec<String>,

    /// Whitespace-separated function names, added to `functions`.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemotionConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,
}

fn default_max_repeats() -> u32 {
    10
}

impl Default for DemotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_repeats: default_max_repeats(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondChanceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Quanta per select while total instructions grow.
    #[serde(default = "default_boost")]
    pub boost: u32,

    /// Quanta per select while covered instructions grow.
    #[serde(default = "default_boost_cov")]
    pub boost_cov: u32,
}

fn default_boost() -> u32 {
    1
}

fn default_boost_cov() -> u32 {
    2
}

impl Default for SecondChanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            boost: default_boost(),
            boost_cov: default_boost_cov(),
        }
    }
}

/// Batching budgets; zero disables a budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_batch_time_ms")]
    pub time_ms: u64,

    #[serde(default = "default_batch_instructions")]
    pub instructions: u64,

    #[serde(default)]
    pub queries: u64,

    #[serde(default)]
    pub adaptive: bool,
}

fn default_batch_time_ms() -> u64 {
    5000
}

fn default_batch_instructions() -> u64 {
    10_000
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_ms: default_batch_time_ms(),
            instructions: default_batch_instructions(),
            queries: 0,
            adaptive: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub use_merge: bool,

    #[serde(default)]
    pub use_bump_merge: bool,

    #[serde(default)]
    pub merge_points: Vec<u64>,
}

impl MergeConfig {
    pub fn points(&self) -> impl Iterator<Item = ProgramPoint> + '_ {
        self.merge_points.iter().map(|p| ProgramPoint(*p))
    }
}

// ── Loading & Validation ────────────────────────────────────────────

impl SearcherConfig {
    /// Parse from a TOML string, apply env overrides, and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, SearchError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Overridable keys: `KLEE_SEARCH_SEED`, `_BASE_STRATEGY`, `_BASE_KICK_RATE`,
    /// `_XCHK_ENABLED`, `_EPOCH_ENABLED`, `_FILTER_FILE`, `_DEMOTION_MAX_REPEATS`,
    /// `_BATCHING_ENABLED`, `_BATCHING_TIME_MS`, `_BATCHING_INSTRUCTIONS` and
    /// `_DEEPENING_ENABLED`. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("KLEE_SEARCH_SEED") {
            self.seed = v;
        }
        if let Some(v) = env_parse("KLEE_SEARCH_BASE_STRATEGY") {
            self.base.strategy = v;
        }
        if let Some(v) = env_parse("KLEE_SEARCH_BASE_KICK_RATE") {
            self.base.kick_rate = v;
        }
        if let Some(v) = env_flag("KLEE_SEARCH_XCHK_ENABLED") {
            self.xchk.enabled = v;
        }
        if let Some(v) = env_flag("KLEE_SEARCH_EPOCH_ENABLED") {
            self.epoch.enabled = v;
        }
        if let Some(v) = env_opt("KLEE_SEARCH_FILTER_FILE") {
            self.filter.enabled = true;
            self.filter.file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse("KLEE_SEARCH_DEMOTION_MAX_REPEATS") {
            self.demotion.max_repeats = v;
        }
        if let Some(v) = env_flag("KLEE_SEARCH_BATCHING_ENABLED") {
            self.batching.enabled = v;
        }
        if let Some(v) = env_parse("KLEE_SEARCH_BATCHING_TIME_MS") {
            self.batching.time_ms = v;
        }
        if let Some(v) = env_parse("KLEE_SEARCH_BATCHING_INSTRUCTIONS") {
            self.batching.instructions = v;
        }
        if let Some(v) = env_flag("KLEE_SEARCH_DEEPENING_ENABLED") {
            self.deepening.enabled = v;
        }
    }

    /// Reject option combinations no chain can honor.
    pub fn validate(&self) -> Result<(), SearchError> {
        self.validate_base()?;
        self.validate_interleave()?;
        self.validate_filter()?;
        self.validate_batching()?;
        self.validate_merge()?;
        Ok(())
    }

    fn validate_base(&self) -> Result<(), SearchError> {
        let base = &self.base;
        if base.strategy.uses_weighers() && base.weighers.is_empty() {
            return Err(SearchError::Config(format!(
                "strategy '{}' needs at least one weigher",
                base.strategy
            )));
        }
        if base.bucket.uses_weighers() {
            return Err(SearchError::Config(format!(
                "bucket strategy '{}' must not be priority-driven",
                base.bucket
            )));
        }
        if !base.metric_scale.is_finite() || base.metric_scale <= 0.0 {
            return Err(SearchError::Config(format!(
                "metric_scale must be positive, got {}",
                base.metric_scale
            )));
        }
        Ok(())
    }

    fn validate_interleave(&self) -> Result<(), SearchError> {
        if self.interleave.enabled && self.interleave.strategies.is_empty() {
            return Err(SearchError::Config(
                "interleaving enabled without extra strategies".into(),
            ));
        }
        let weighted = self.interleave.strategies.iter().any(|s| s.uses_weighers());
        if self.interleave.enabled && weighted && self.base.weighers.is_empty() {
            return Err(SearchError::Config(
                "interleaved priority strategy needs at least one weigher".into(),
            ));
        }
        Ok(())
    }

    fn validate_filter(&self) -> Result<(), SearchError> {
        let filter = &self.filter;
        if filter.enabled && filter.functions.is_empty() && filter.file.is_none() {
            return Err(SearchError::Config(
                "filter enabled without functions or a filter file".into(),
            ));
        }
        Ok(())
    }

    fn validate_batching(&self) -> Result<(), SearchError> {
        let b = &self.batching;
        if b.enabled && b.time_ms == 0 && b.instructions == 0 && b.queries == 0 {
            return Err(SearchError::Conflict(
                "batching enabled with every budget set to zero".into(),
            ));
        }
        Ok(())
    }

    fn validate_merge(&self) -> Result<(), SearchError> {
        let m = &self.merge;
        if m.use_merge && m.use_bump_merge {
            return Err(SearchError::Conflict(
                "use_merge and use_bump_merge are mutually exclusive".into(),
            ));
        }
        if (m.use_merge || m.use_bump_merge) && m.merge_points.is_empty() {
            return Err(SearchError::Conflict(
                "merging enabled without merge points".into(),
            ));
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
