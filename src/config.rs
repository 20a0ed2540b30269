//! Process configuration: branch weights, arbiter thresholds, the boost
//! registry, Branch-B's threshold table, per-branch timeout budgets, and
//! the vector-store/catalogue locations. A single immutable value,
//! swapped atomically on reload (see [`SharedConfig`]).

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Handle to the live configuration. Readers call `load()` and get a
/// cheap `Arc` clone of the current snapshot; a writer calls `reload()`
/// to atomically swap in a freshly parsed snapshot. In-flight requests
/// keep working against the snapshot they started with.
pub type SharedConfig = Arc<ArcSwap<FirewallConfig>>;

pub fn shared(config: FirewallConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

/// Re-read configuration from the environment and, if it validates,
/// atomically swap it in. On failure the previous snapshot is retained
/// and the error is returned for the caller to log.
pub fn reload(shared: &SharedConfig) -> Result<(), ConfigError> {
    let next = FirewallConfig::from_env()?;
    next.validate()?;
    shared.store(Arc::new(next));
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FirewallConfig {
    pub branch_weights: BranchWeights,
    pub arbiter_thresholds: ArbiterThresholds,
    pub boosts: BoostConfig,
    pub semantic_thresholds: SemanticThresholds,
    pub branch_timeouts: BranchTimeouts,
    pub pattern_catalogue_path: PathBuf,
    pub vector_store: VectorStoreConfig,
    pub embeddings: EmbeddingsConfig,
    pub safety_nlp: SafetyNlpConfig,
    pub pii: PiiConfig,
    pub event_store: EventStoreConfig,
}

impl FirewallConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            branch_weights: BranchWeights::from_env()?,
            arbiter_thresholds: ArbiterThresholds::from_env()?,
            boosts: BoostConfig::from_env()?,
            semantic_thresholds: SemanticThresholds::from_env()?,
            branch_timeouts: BranchTimeouts::from_env()?,
            pattern_catalogue_path: parse_optional_env(
                "PATTERN_CATALOGUE_PATH",
                default_catalogue_path(),
            )?,
            vector_store: VectorStoreConfig::from_env()?,
            embeddings: EmbeddingsConfig::from_env()?,
            safety_nlp: SafetyNlpConfig::from_env()?,
            pii: PiiConfig::from_env()?,
            event_store: EventStoreConfig::from_env()?,
        })
    }

    /// ConfigInvalid checks per spec §7: weights don't sum to 1, threshold
    /// inversions, unknown boost conditions, malformed egress endpoints.
    /// Fatal on boot, rejected on hot-reload.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.branch_weights.validate()?;
        self.semantic_thresholds.validate()?;
        self.boosts.validate()?;
        validate_url("VECTOR_STORE_ENDPOINT", &self.vector_store.endpoint)?;
        validate_url("EMBEDDINGS_ENDPOINT", &self.embeddings.endpoint)?;
        validate_url("SAFETY_NLP_ENDPOINT", &self.safety_nlp.endpoint)?;
        validate_url("PII_NLP_ENDPOINT", &self.pii.nlp_endpoint)?;
        validate_url("EVENT_STORE_ENDPOINT", &self.event_store.endpoint())?;
        Ok(())
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            branch_weights: BranchWeights::default(),
            arbiter_thresholds: ArbiterThresholds::default(),
            boosts: BoostConfig::default(),
            semantic_thresholds: SemanticThresholds::default(),
            branch_timeouts: BranchTimeouts::default(),
            pattern_catalogue_path: default_catalogue_path(),
            vector_store: VectorStoreConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            safety_nlp: SafetyNlpConfig::default(),
            pii: PiiConfig::default(),
            event_store: EventStoreConfig::default(),
        }
    }
}

fn default_catalogue_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptwarden")
        .join("patterns.json")
}

/// Branch weights for the arbiter's weighted fusion. Must sum to 1.0,
/// each non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchWeights {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for BranchWeights {
    fn default() -> Self {
        Self {
            a: 0.30,
            b: 0.35,
            c: 0.35,
        }
    }
}

impl BranchWeights {
    fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        Ok(Self {
            a: parse_optional_env("BRANCH_WEIGHT_A", default.a)?,
            b: parse_optional_env("BRANCH_WEIGHT_B", default.b)?,
            c: parse_optional_env("BRANCH_WEIGHT_C", default.c)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.a < 0.0 || self.b < 0.0 || self.c < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "branch_weights".to_string(),
                message: "weights must be non-negative".to_string(),
            });
        }
        let sum = self.a + self.b + self.c;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsDoNotSumToOne { sum });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterThresholds {
    pub block_score: u8,
    pub confidence_min: f64,
}

impl Default for ArbiterThresholds {
    fn default() -> Self {
        Self {
            block_score: 50,
            confidence_min: 0.0,
        }
    }
}

impl ArbiterThresholds {
    fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        Ok(Self {
            block_score: parse_optional_env("ARBITER_BLOCK_SCORE", default.block_score)?,
            confidence_min: parse_optional_env(
                "ARBITER_CONFIDENCE_MIN",
                default.confidence_min,
            )?,
        })
    }
}

/// The named priority boosts from spec §4.5, each individually toggleable
/// and tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostConfig {
    pub conservative_override_enabled: bool,
    pub conservative_override_branch_min: u8,
    pub conservative_override_floor: u8,

    pub high_similarity_boost_enabled: bool,
    pub high_similarity_boost_amount: u8,

    pub llm_guard_veto_enabled: bool,
    pub llm_guard_veto_floor: u8,

    pub pattern_hit_high_enabled: bool,
    pub pattern_hit_high_amount: u8,

    pub unanimous_low_enabled: bool,
    pub unanimous_low_branch_max: u8,
    pub unanimous_low_clamp: u8,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            conservative_override_enabled: true,
            conservative_override_branch_min: 70,
            conservative_override_floor: 70,
            high_similarity_boost_enabled: true,
            high_similarity_boost_amount: 15,
            llm_guard_veto_enabled: true,
            llm_guard_veto_floor: 90,
            pattern_hit_high_enabled: true,
            pattern_hit_high_amount: 20,
            unanimous_low_enabled: true,
            unanimous_low_branch_max: 30,
            unanimous_low_clamp: 30,
        }
    }
}

impl BoostConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            conservative_override_enabled: parse_optional_env(
                "BOOST_CONSERVATIVE_OVERRIDE_ENABLED",
                d.conservative_override_enabled,
            )?,
            conservative_override_branch_min: parse_optional_env(
                "BOOST_CONSERVATIVE_OVERRIDE_BRANCH_MIN",
                d.conservative_override_branch_min,
            )?,
            conservative_override_floor: parse_optional_env(
                "BOOST_CONSERVATIVE_OVERRIDE_FLOOR",
                d.conservative_override_floor,
            )?,
            high_similarity_boost_enabled: parse_optional_env(
                "BOOST_HIGH_SIMILARITY_ENABLED",
                d.high_similarity_boost_enabled,
            )?,
            high_similarity_boost_amount: parse_optional_env(
                "BOOST_HIGH_SIMILARITY_AMOUNT",
                d.high_similarity_boost_amount,
            )?,
            llm_guard_veto_enabled: parse_optional_env(
                "BOOST_LLM_GUARD_VETO_ENABLED",
                d.llm_guard_veto_enabled,
            )?,
            llm_guard_veto_floor: parse_optional_env(
                "BOOST_LLM_GUARD_VETO_FLOOR",
                d.llm_guard_veto_floor,
            )?,
            pattern_hit_high_enabled: parse_optional_env(
                "BOOST_PATTERN_HIT_HIGH_ENABLED",
                d.pattern_hit_high_enabled,
            )?,
            pattern_hit_high_amount: parse_optional_env(
                "BOOST_PATTERN_HIT_HIGH_AMOUNT",
                d.pattern_hit_high_amount,
            )?,
            unanimous_low_enabled: parse_optional_env(
                "BOOST_UNANIMOUS_LOW_ENABLED",
                d.unanimous_low_enabled,
            )?,
            unanimous_low_branch_max: parse_optional_env(
                "BOOST_UNANIMOUS_LOW_BRANCH_MAX",
                d.unanimous_low_branch_max,
            )?,
            unanimous_low_clamp: parse_optional_env(
                "BOOST_UNANIMOUS_LOW_CLAMP",
                d.unanimous_low_clamp,
            )?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.unanimous_low_clamp > self.llm_guard_veto_floor {
            return Err(ConfigError::ThresholdInversion {
                table: "boosts".to_string(),
                detail: "unanimous_low_clamp must not exceed llm_guard_veto_floor".to_string(),
            });
        }
        Ok(())
    }
}

/// Branch B's twelve-rule classification ladder thresholds (spec §4.3,
/// v2.3 generation — see DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticThresholds {
    pub tau_s1_security_ed: f64,
    pub tau_s1_instruction: f64,
    pub tau_s1_other: f64,
    pub s1_attack_max_limit: f64,

    pub s2_safe_max_min: f64,
    pub s2_delta_max: f64,

    pub s3_delta_max: f64,
    pub s3_attack_max_limit: f64,

    pub s4_safe_max_min: f64,
    pub s4_delta_max: f64,
    pub s4_attack_max_limit: f64,

    pub a1_attack_max_min: f64,
    pub a1_safe_override_safe_max_min: f64,
    pub a1_safe_override_delta_max: f64,

    pub a2_attack_max_min: f64,

    pub a3_attack_max_min: f64,
    pub a3_delta_min: f64,

    pub a4a_attack_max_min: f64,
    pub a4a_delta_min: f64,

    pub a4b_attack_max_min: f64,
    pub a4b_delta_min: f64,

    pub a5_attack_max_min: f64,
    pub a5_delta_min: f64,

    pub a6_attack_max_min: f64,
    pub a6_delta_min: f64,

    pub b1_safe_max_max: f64,
    pub b1_attack_max_min: f64,

    pub b2_attack_max_min: f64,
    pub b2_attack_max_max: f64,
    pub b2_delta_min: f64,

    pub high_similarity_threshold: f64,
    pub adjusted_delta_bonus: f64,
}

impl Default for SemanticThresholds {
    fn default() -> Self {
        Self {
            tau_s1_security_ed: 0.04,
            tau_s1_instruction: 0.05,
            tau_s1_other: 0.02,
            s1_attack_max_limit: 0.85,

            s2_safe_max_min: 0.92,
            s2_delta_max: -0.07,

            s3_delta_max: -0.05,
            s3_attack_max_limit: 0.82,

            s4_safe_max_min: 0.88,
            s4_delta_max: -0.01,
            s4_attack_max_limit: 0.85,

            a1_attack_max_min: 0.88,
            a1_safe_override_safe_max_min: 0.92,
            a1_safe_override_delta_max: -0.02,

            a2_attack_max_min: 0.865,

            a3_attack_max_min: 0.85,
            a3_delta_min: -0.022,

            a4a_attack_max_min: 0.85,
            a4a_delta_min: -0.02,

            a4b_attack_max_min: 0.82,
            a4b_delta_min: -0.02,

            a5_attack_max_min: 0.82,
            a5_delta_min: 0.02,

            a6_attack_max_min: 0.78,
            a6_delta_min: 0.08,

            b1_safe_max_max: 0.92,
            b1_attack_max_min: 0.82,

            b2_attack_max_min: 0.78,
            b2_attack_max_max: 0.85,
            b2_delta_min: -0.03,

            high_similarity_threshold: 0.85,
            adjusted_delta_bonus: 0.05,
        }
    }
}

impl SemanticThresholds {
    fn from_env() -> Result<Self, ConfigError> {
        // All twelve rules are tunable via env var, but the common case is
        // the default ladder; only the handful of operators who hot-patch
        // a misfiring rule touch these.
        let d = Self::default();
        Ok(Self {
            tau_s1_security_ed: parse_optional_env("SEM_TAU_S1_SECURITY_ED", d.tau_s1_security_ed)?,
            tau_s1_instruction: parse_optional_env("SEM_TAU_S1_INSTRUCTION", d.tau_s1_instruction)?,
            tau_s1_other: parse_optional_env("SEM_TAU_S1_OTHER", d.tau_s1_other)?,
            s1_attack_max_limit: parse_optional_env("SEM_S1_ATTACK_MAX_LIMIT", d.s1_attack_max_limit)?,
            s2_safe_max_min: parse_optional_env("SEM_S2_SAFE_MAX_MIN", d.s2_safe_max_min)?,
            s2_delta_max: parse_optional_env("SEM_S2_DELTA_MAX", d.s2_delta_max)?,
            s3_delta_max: parse_optional_env("SEM_S3_DELTA_MAX", d.s3_delta_max)?,
            s3_attack_max_limit: parse_optional_env("SEM_S3_ATTACK_MAX_LIMIT", d.s3_attack_max_limit)?,
            s4_safe_max_min: parse_optional_env("SEM_S4_SAFE_MAX_MIN", d.s4_safe_max_min)?,
            s4_delta_max: parse_optional_env("SEM_S4_DELTA_MAX", d.s4_delta_max)?,
            s4_attack_max_limit: parse_optional_env("SEM_S4_ATTACK_MAX_LIMIT", d.s4_attack_max_limit)?,
            a1_attack_max_min: parse_optional_env("SEM_A1_ATTACK_MAX_MIN", d.a1_attack_max_min)?,
            a1_safe_override_safe_max_min: parse_optional_env(
                "SEM_A1_SAFE_OVERRIDE_SAFE_MAX_MIN",
                d.a1_safe_override_safe_max_min,
            )?,
            a1_safe_override_delta_max: parse_optional_env(
                "SEM_A1_SAFE_OVERRIDE_DELTA_MAX",
                d.a1_safe_override_delta_max,
            )?,
            a2_attack_max_min: parse_optional_env("SEM_A2_ATTACK_MAX_MIN", d.a2_attack_max_min)?,
            a3_attack_max_min: parse_optional_env("SEM_A3_ATTACK_MAX_MIN", d.a3_attack_max_min)?,
            a3_delta_min: parse_optional_env("SEM_A3_DELTA_MIN", d.a3_delta_min)?,
            a4a_attack_max_min: parse_optional_env("SEM_A4A_ATTACK_MAX_MIN", d.a4a_attack_max_min)?,
            a4a_delta_min: parse_optional_env("SEM_A4A_DELTA_MIN", d.a4a_delta_min)?,
            a4b_attack_max_min: parse_optional_env("SEM_A4B_ATTACK_MAX_MIN", d.a4b_attack_max_min)?,
            a4b_delta_min: parse_optional_env("SEM_A4B_DELTA_MIN", d.a4b_delta_min)?,
            a5_attack_max_min: parse_optional_env("SEM_A5_ATTACK_MAX_MIN", d.a5_attack_max_min)?,
            a5_delta_min: parse_optional_env("SEM_A5_DELTA_MIN", d.a5_delta_min)?,
            a6_attack_max_min: parse_optional_env("SEM_A6_ATTACK_MAX_MIN", d.a6_attack_max_min)?,
            a6_delta_min: parse_optional_env("SEM_A6_DELTA_MIN", d.a6_delta_min)?,
            b1_safe_max_max: parse_optional_env("SEM_B1_SAFE_MAX_MAX", d.b1_safe_max_max)?,
            b1_attack_max_min: parse_optional_env("SEM_B1_ATTACK_MAX_MIN", d.b1_attack_max_min)?,
            b2_attack_max_min: parse_optional_env("SEM_B2_ATTACK_MAX_MIN", d.b2_attack_max_min)?,
            b2_attack_max_max: parse_optional_env("SEM_B2_ATTACK_MAX_MAX", d.b2_attack_max_max)?,
            b2_delta_min: parse_optional_env("SEM_B2_DELTA_MIN", d.b2_delta_min)?,
            high_similarity_threshold: parse_optional_env(
                "SEM_HIGH_SIMILARITY_THRESHOLD",
                d.high_similarity_threshold,
            )?,
            adjusted_delta_bonus: parse_optional_env("SEM_ADJUSTED_DELTA_BONUS", d.adjusted_delta_bonus)?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.b2_attack_max_min > self.b2_attack_max_max {
            return Err(ConfigError::ThresholdInversion {
                table: "semantic_thresholds".to_string(),
                detail: "b2_attack_max_min must not exceed b2_attack_max_max".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-branch timeout budgets (spec §5 defaults: A 10ms, B 25ms, C 40ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchTimeouts {
    pub branch_a_ms: u64,
    pub branch_b_ms: u64,
    pub branch_c_ms: u64,
    /// Overall per-request wall-clock budget (default 100ms).
    pub overall_budget_ms: u64,
    /// Extra slack the orchestrator waits past `max(budgets)` for the join.
    pub join_slack_ms: u64,
}

impl Default for BranchTimeouts {
    fn default() -> Self {
        Self {
            branch_a_ms: 10,
            branch_b_ms: 25,
            branch_c_ms: 40,
            overall_budget_ms: 100,
            join_slack_ms: 5,
        }
    }
}

impl BranchTimeouts {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            branch_a_ms: parse_optional_env("TIMEOUT_BRANCH_A_MS", d.branch_a_ms)?,
            branch_b_ms: parse_optional_env("TIMEOUT_BRANCH_B_MS", d.branch_b_ms)?,
            branch_c_ms: parse_optional_env("TIMEOUT_BRANCH_C_MS", d.branch_c_ms)?,
            overall_budget_ms: parse_optional_env("TIMEOUT_OVERALL_BUDGET_MS", d.overall_budget_ms)?,
            join_slack_ms: parse_optional_env("TIMEOUT_JOIN_SLACK_MS", d.join_slack_ms)?,
        })
    }
}

/// Vector-store (Branch B dependency) connection details.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub attack_table: String,
    pub safe_table: String,
    pub top_k: usize,
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8081/query".to_string(),
            user: None,
            password: None,
            attack_table: "attack_patterns".to_string(),
            safe_table: "safe_patterns".to_string(),
            top_k: 5,
            timeout_ms: 20,
        }
    }
}

impl VectorStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            endpoint: optional_env("VECTOR_STORE_ENDPOINT")?.unwrap_or(d.endpoint),
            user: optional_env("VECTOR_STORE_USER")?,
            password: optional_env("VECTOR_STORE_PASSWORD")?.map(SecretString::from),
            attack_table: optional_env("VECTOR_STORE_ATTACK_TABLE")?.unwrap_or(d.attack_table),
            safe_table: optional_env("VECTOR_STORE_SAFE_TABLE")?.unwrap_or(d.safe_table),
            top_k: parse_optional_env("VECTOR_STORE_TOP_K", d.top_k)?,
            timeout_ms: parse_optional_env("VECTOR_STORE_TIMEOUT_MS", d.timeout_ms)?,
        })
    }
}

/// Embedding provider (Branch B encoder) configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    pub max_tokens: usize,
    pub api_key: Option<SecretString>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8082/embed".to_string(),
            model: "multilingual-e5-small".to_string(),
            dimension: 384,
            max_tokens: 512,
            api_key: None,
        }
    }
}

impl EmbeddingsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            endpoint: optional_env("EMBEDDINGS_ENDPOINT")?.unwrap_or(d.endpoint),
            model: optional_env("EMBEDDINGS_MODEL")?.unwrap_or(d.model),
            dimension: parse_optional_env("EMBEDDINGS_DIMENSION", d.dimension)?,
            max_tokens: parse_optional_env("EMBEDDINGS_MAX_TOKENS", d.max_tokens)?,
            api_key: optional_env("EMBEDDINGS_API_KEY")?.map(SecretString::from),
        })
    }
}

/// Branch C (safety classifier) configuration.
#[derive(Debug, Clone)]
pub struct SafetyNlpConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for SafetyNlpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8083/classify".to_string(),
            timeout_ms: 35,
        }
    }
}

impl SafetyNlpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            endpoint: optional_env("SAFETY_NLP_ENDPOINT")?.unwrap_or(d.endpoint),
            timeout_ms: parse_optional_env("SAFETY_NLP_TIMEOUT_MS", d.timeout_ms)?,
        })
    }
}

/// PII detector configuration.
#[derive(Debug, Clone)]
pub struct PiiConfig {
    pub language: String,
    pub nlp_endpoint: String,
    pub nlp_timeout_ms: u64,
    pub label_keyword_window_chars: usize,
    pub label_keyword_boost: f64,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            nlp_endpoint: "http://localhost:8084/entities".to_string(),
            nlp_timeout_ms: 30,
            label_keyword_window_chars: 30,
            label_keyword_boost: 0.15,
        }
    }
}

impl PiiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            language: optional_env("PII_LANGUAGE")?.unwrap_or(d.language),
            nlp_endpoint: optional_env("PII_NLP_ENDPOINT")?.unwrap_or(d.nlp_endpoint),
            nlp_timeout_ms: parse_optional_env("PII_NLP_TIMEOUT_MS", d.nlp_timeout_ms)?,
            label_keyword_window_chars: parse_optional_env(
                "PII_LABEL_KEYWORD_WINDOW_CHARS",
                d.label_keyword_window_chars,
            )?,
            label_keyword_boost: parse_optional_env("PII_LABEL_KEYWORD_BOOST", d.label_keyword_boost)?,
        })
    }
}

/// Analytical event-store egress (spec §6): host/port/database/user/
/// password for the append-only store the event sink writes to.
/// Required at boot — a missing password is a `Fatal` error per spec §7,
/// not a silently-accepted default.
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub timeout_ms: u64,
}

impl EventStoreConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/{}/events", self.host, self.port, self.database)
    }

    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: required_env("EVENT_STORE_HOST")?,
            port: parse_required_env("EVENT_STORE_PORT")?,
            database: required_env("EVENT_STORE_DATABASE")?,
            user: required_env("EVENT_STORE_USER")?,
            password: SecretString::from(required_env("EVENT_STORE_PASSWORD")?),
            timeout_ms: parse_optional_env("EVENT_STORE_TIMEOUT_MS", 200u64)?,
        })
    }
}

impl Default for EventStoreConfig {
    /// Only used by tests and `FirewallConfig::default()` — a real boot
    /// always goes through `from_env`, where a missing password is fatal.
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            database: "promptwarden".to_string(),
            user: "promptwarden".to_string(),
            password: SecretString::from("test-only-default".to_string()),
            timeout_ms: 200,
        }
    }
}

// --- env helpers (teacher's optional_env / parse_optional_env idiom) ---

pub(crate) fn required_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

pub(crate) fn parse_required_env<T>(key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required_env(key)?;
    raw.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{e}"),
    })
}

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!("failed to read {key}: {e}"))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}

/// Rejects a malformed egress endpoint before it ever reaches `reqwest` —
/// an operator typo (missing scheme, stray whitespace) becomes a
/// `ConfigInvalid` at boot/reload instead of a confusing per-request error.
fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a valid URL: {e}"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global, so serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        for (k, v) in vars {
            unsafe { std::env::set_var(k, v) };
        }
        let result = f();
        for (k, _) in vars {
            unsafe { std::env::remove_var(k) };
        }
        result
    }

    #[test]
    fn optional_env_returns_none_for_missing_var() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_TEST_CFG_MISSING_42") };
        assert!(optional_env("_TEST_CFG_MISSING_42").unwrap().is_none());
    }

    #[test]
    fn optional_env_returns_none_for_empty_string() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(&[("_TEST_CFG_EMPTY_42", "")], || {
            assert!(optional_env("_TEST_CFG_EMPTY_42").unwrap().is_none());
        });
    }

    #[test]
    fn parse_optional_env_returns_default_when_missing() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_TEST_CFG_DEFAULT_42") };
        let v: u8 = parse_optional_env("_TEST_CFG_DEFAULT_42", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn parse_optional_env_parses_when_set() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(&[("_TEST_CFG_SET_42", "42")], || {
            let v: u8 = parse_optional_env("_TEST_CFG_SET_42", 7).unwrap();
            assert_eq!(v, 42);
        });
    }

    #[test]
    fn parse_optional_env_invalid_value_errors() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(&[("_TEST_CFG_BAD_42", "not_a_number")], || {
            let result: Result<u8, ConfigError> = parse_optional_env("_TEST_CFG_BAD_42", 7);
            assert!(result.is_err());
        });
    }

    #[test]
    fn default_weights_sum_to_one() {
        BranchWeights::default().validate().unwrap();
    }

    #[test]
    fn weights_not_summing_to_one_rejected() {
        let w = BranchWeights {
            a: 0.5,
            b: 0.5,
            c: 0.5,
        };
        let err = w.validate().unwrap_err();
        assert!(matches!(err, ConfigError::WeightsDoNotSumToOne { .. }));
    }

    #[test]
    fn negative_weight_rejected() {
        let w = BranchWeights {
            a: -0.1,
            b: 0.6,
            c: 0.5,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn branch_weights_from_env_overrides_default() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(
            &[
                ("BRANCH_WEIGHT_A", "0.2"),
                ("BRANCH_WEIGHT_B", "0.4"),
                ("BRANCH_WEIGHT_C", "0.4"),
            ],
            || {
                let w = BranchWeights::from_env().unwrap();
                assert_eq!(w.a, 0.2);
                w.validate().unwrap();
            },
        );
    }

    #[test]
    fn firewall_config_default_validates() {
        FirewallConfig::default().validate().unwrap();
    }

    #[test]
    fn malformed_vector_store_endpoint_rejected() {
        let mut cfg = FirewallConfig::default();
        cfg.vector_store.endpoint = "not a url".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "VECTOR_STORE_ENDPOINT"));
    }

    #[test]
    fn valid_url_passes_validation() {
        validate_url("TEST_ENDPOINT", "http://localhost:8080/query").unwrap();
    }

    #[test]
    fn boost_inversion_rejected() {
        let mut b = BoostConfig::default();
        b.unanimous_low_clamp = 95;
        b.llm_guard_veto_floor = 90;
        assert!(b.validate().is_err());
    }

    #[test]
    fn semantic_threshold_inversion_rejected() {
        let mut s = SemanticThresholds::default();
        s.b2_attack_max_min = 0.9;
        s.b2_attack_max_max = 0.8;
        assert!(s.validate().is_err());
    }

    #[test]
    fn required_env_missing_errors() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_TEST_CFG_REQUIRED_MISSING_42") };
        let err = required_env("_TEST_CFG_REQUIRED_MISSING_42").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn required_env_present_returns_value() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(&[("_TEST_CFG_REQUIRED_SET_42", "hello")], || {
            assert_eq!(required_env("_TEST_CFG_REQUIRED_SET_42").unwrap(), "hello");
        });
    }

    #[test]
    fn event_store_from_env_missing_password_is_fatal() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(
            &[
                ("EVENT_STORE_HOST", "db.internal"),
                ("EVENT_STORE_PORT", "9000"),
                ("EVENT_STORE_DATABASE", "analytics"),
                ("EVENT_STORE_USER", "writer"),
            ],
            || {
                unsafe { std::env::remove_var("EVENT_STORE_PASSWORD") };
                let err = EventStoreConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "EVENT_STORE_PASSWORD"));
            },
        );
    }

    #[test]
    fn event_store_from_env_builds_endpoint_from_host_port_database() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(
            &[
                ("EVENT_STORE_HOST", "db.internal"),
                ("EVENT_STORE_PORT", "9000"),
                ("EVENT_STORE_DATABASE", "analytics"),
                ("EVENT_STORE_USER", "writer"),
                ("EVENT_STORE_PASSWORD", "secret"),
            ],
            || {
                let cfg = EventStoreConfig::from_env().unwrap();
                assert_eq!(cfg.endpoint(), "http://db.internal:9000/analytics/events");
            },
        );
    }

    #[test]
    fn shared_config_reload_swaps_snapshot() {
        let _lock = ENV_LOCK.lock();
        with_env_vars(
            &[
                ("EVENT_STORE_HOST", "db.internal"),
                ("EVENT_STORE_PORT", "9000"),
                ("EVENT_STORE_DATABASE", "analytics"),
                ("EVENT_STORE_USER", "writer"),
                ("EVENT_STORE_PASSWORD", "secret"),
            ],
            || {
                let cfg = shared(FirewallConfig::default());
                let before = cfg.load_full();
                // Reloading with no other env overrides yields an equivalent but distinct Arc.
                reload(&cfg).unwrap();
                let after = cfg.load_full();
                assert_eq!(before.branch_weights, after.branch_weights);
            },
        );
    }
}
