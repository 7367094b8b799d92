use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Expected vector length; 0 disables the check.
    #[serde(default)]
    pub dimension: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    Pgvector,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Model label baked into every companion key.
    pub model_name: String,
    /// Size of the trailing window, both for reads and for trimming on write.
    pub max_history_turns: usize,
    /// Store-side expiry refreshed on every write. None keeps windows forever.
    pub history_ttl_seconds: Option<u64>,
    pub seed_separator: String,
    pub retrieval_top_k: usize,
    /// Max characters per indexed fragment.
    pub fragment_size: usize,
    pub fragment_overlap: usize,
    pub history_backend: HistoryBackend,
    pub index_backend: IndexBackend,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            model_name: "llame2-13b".to_string(),
            max_history_turns: 30,
            history_ttl_seconds: None,
            seed_separator: "\n\n".to_string(),
            retrieval_top_k: 3,
            fragment_size: 1000,
            fragment_overlap: 100,
            history_backend: HistoryBackend::Redis,
            index_backend: IndexBackend::Pgvector,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    /// `{name}` is replaced with the companion name.
    pub preamble: String,
    /// `{name}` is replaced with the companion name.
    pub relevant_history_intro: String,
    pub reply: ReplyPolicyConfig,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            preamble: "Produisez UNIQUEMENT des phrases simples sans préfixe de la personne qui parle. \
                       N'utilisez PAS {name}: préfixe."
                .to_string(),
            relevant_history_intro: "Vous trouverez ci-dessous des informations pertinentes sur {name} \
                                     et la conversation dans laquelle vous vous trouvez."
                .to_string(),
            reply: ReplyPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReplyPolicyConfig {
    pub strip_chars: String,
    pub split_on: String,
    pub skip_empty_segments: bool,
}

impl Default for ReplyPolicyConfig {
    fn default() -> Self {
        Self {
            strip_chars: ",".to_string(),
            split_on: "\n".to_string(),
            skip_empty_segments: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub period_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            period_seconds: 10,
        }
    }
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_tokens() -> usize {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let memory = &self.memory;
        if memory.max_history_turns == 0 {
            anyhow::bail!("memory.max_history_turns must be at least 1");
        }
        if memory.retrieval_top_k == 0 {
            anyhow::bail!("memory.retrieval_top_k must be at least 1");
        }
        if memory.fragment_size == 0 || memory.fragment_overlap >= memory.fragment_size {
            anyhow::bail!(
                "memory.fragment_overlap ({}) must be smaller than memory.fragment_size ({})",
                memory.fragment_overlap,
                memory.fragment_size
            );
        }
        if self.rate_limit.requests == 0 || self.rate_limit.period_seconds == 0 {
            anyhow::bail!("rate_limit.requests and rate_limit.period_seconds must be positive");
        }
        Ok(())
    }
}
