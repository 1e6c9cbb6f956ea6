#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use bon::Builder;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_CONCURRENCY, DEFAULT_MAX_COMPLETION_RETRIES,
    DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL, DEFAULT_QUESTION_TIMEOUT, DEFAULT_ROW_LIMIT,
    DEFAULT_TEMPERATURE,
};

/// OpenAI credentials and optional tuning parameters sourced from the
/// environment.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:    String,
    /// API key used to authenticate OpenAI requests.
    api_key:     String,
    /// Default model identifier for chat completions.
    model:       String,
    /// Optional temperature override, if provided.
    temperature: Option<f32>,
}

impl OpenAiEnv {
    /// Construct an `OpenAiEnv` from environment variables; returns `None`
    /// when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_var("OPENAI_API_KEY")?;
        let api_base = non_empty_var("OPENAI_ENDPOINT").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = non_empty_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = non_empty_var("OPENAI_TEMPERATURE").and_then(|s| s.parse::<f32>().ok());

        Some(Self {
            api_base,
            api_key,
            model,
            temperature,
        })
    }

    /// Returns the API base URL used for OpenAI requests.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key used for OpenAI requests.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the default model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

impl std::fmt::Debug for OpenAiEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEnv")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/// Knobs of a grading run.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(on(String, into))]
pub struct GradingSettings {
    /// Model identifier.
    #[builder(default = DEFAULT_MODEL.to_string())]
    model:                  String,
    /// Sampling temperature.
    #[builder(default = DEFAULT_TEMPERATURE)]
    temperature:            f32,
    /// Tool-call rounds allowed per question.
    #[builder(default = DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds:        usize,
    /// Re-prompts allowed after a rejected grade.
    #[builder(default = DEFAULT_MAX_COMPLETION_RETRIES)]
    max_completion_retries: usize,
    /// Questions graded at once.
    #[builder(default = DEFAULT_CONCURRENCY)]
    concurrency:            usize,
    /// Wall-clock budget per question.
    #[builder(default = DEFAULT_QUESTION_TIMEOUT)]
    question_timeout:       Duration,
    /// Rows returned by one dataset query.
    #[builder(default = DEFAULT_ROW_LIMIT)]
    row_limit:              usize,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GradingSettings {
    /// Settings derived from the environment: model and temperature from the
    /// OpenAI variables, question timeout from
    /// `GRADEWISE_QUESTION_TIMEOUT_SECS`.
    pub fn from_env(openai: Option<&OpenAiEnv>) -> Self {
        Self::builder()
            .model(openai.map_or(DEFAULT_MODEL, OpenAiEnv::model))
            .temperature(
                openai
                    .and_then(OpenAiEnv::temperature)
                    .unwrap_or(DEFAULT_TEMPERATURE),
            )
            .question_timeout(read_timeout_secs(
                "GRADEWISE_QUESTION_TIMEOUT_SECS",
                DEFAULT_QUESTION_TIMEOUT.as_secs(),
            ))
            .build()
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Tool-call rounds allowed per question.
    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// Re-prompts allowed after a rejected grade.
    pub fn max_completion_retries(&self) -> usize {
        self.max_completion_retries
    }

    /// Questions graded at once, at least one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Wall-clock budget per question.
    pub fn question_timeout(&self) -> Duration {
        self.question_timeout
    }

    /// Rows returned by one dataset query, at least one.
    pub fn row_limit(&self) -> usize {
        self.row_limit.max(1)
    }

    /// Copy of the settings with CLI overrides applied.
    pub fn with_overrides(
        &self,
        model: Option<String>,
        temperature: Option<f32>,
        concurrency: Option<usize>,
        max_tool_rounds: Option<usize>,
    ) -> Self {
        Self {
            model: model.unwrap_or_else(|| self.model.clone()),
            temperature: temperature.unwrap_or(self.temperature),
            concurrency: concurrency.unwrap_or(self.concurrency),
            max_tool_rounds: max_tool_rounds.unwrap_or(self.max_tool_rounds),
            ..self.clone()
        }
    }
}

/// Runtime configuration shared across the crate.
#[derive(Debug)]
pub struct ConfigState {
    /// Cached OpenAI configuration, if available.
    openai:   Option<OpenAiEnv>,
    /// Grading settings before CLI overrides.
    settings: GradingSettings,
}

impl ConfigState {
    /// Construct a new configuration instance from the environment.
    fn new() -> Self {
        let openai = OpenAiEnv::from_env();
        let settings = GradingSettings::from_env(openai.as_ref());
        Self { openai, settings }
    }

    /// Returns the OpenAI configuration, if an API key is present.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns the environment-derived grading settings.
    pub fn settings(&self) -> &GradingSettings {
        &self.settings
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone, Debug)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> ConfigHandle {
    let mut guard = slot().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cfg) = guard.as_ref() {
        return ConfigHandle(Arc::clone(cfg));
    }

    let cfg = Arc::new(ConfigState::new());
    *guard = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    ensure_initialized()
}

/// Reads an environment variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
