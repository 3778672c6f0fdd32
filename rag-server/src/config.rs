//! Service configuration.
//!
//! Resolution order for every setting: environment variable, then the TOML
//! file (`RAG_CONFIG`, or `config/rag.toml` when present), then the built-in
//! default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retrieval::DEFAULT_SEARCH_TIMEOUT;
use crate::types::DistanceMetric;

pub const DEFAULT_PORT: u16 = 8003;
pub const DEFAULT_VECTOR_DB_PATH: &str = "./data/knowledge.db";
pub const DEFAULT_COLLECTIONS: &[&str] = &["merged_collection", "langchain"];
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-oss-120b";
pub const DEFAULT_LLM_API_KEY_ENV: &str = "GROQ_API_KEY";
const DEFAULT_CONFIG_PATHS: &[&str] = &["rag-server/config/rag.toml", "config/rag.toml"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbedderBackend {
    #[default]
    FastEmbed,
    OpenAi,
    Stub,
    Disabled,
}

impl EmbedderBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastEmbed => "fastembed",
            Self::OpenAi => "openai",
            Self::Stub => "stub",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for EmbedderBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fastembed" | "local" => Ok(Self::FastEmbed),
            "openai" | "http" => Ok(Self::OpenAi),
            "stub" => Ok(Self::Stub),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(anyhow::anyhow!(
                "Invalid embedder backend '{other}'. Expected fastembed, openai, stub or disabled"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    /// Model name understood by the backend
    pub model: String,
    /// Where fastembed keeps downloaded model files
    pub cache_dir: Option<PathBuf>,
    /// Base URL for the `openai` backend
    pub endpoint: Option<String>,
    /// Bearer token for the `openai` backend
    pub api_key: Option<String>,
    /// Vector length for the `openai` and `stub` backends
    pub dimensions: usize,
    /// Upper bound on one embedding call
    pub timeout: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::FastEmbed,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache_dir: None,
            endpoint: None,
            api_key: None,
            dimensions: 384,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// OpenAI-compatible API root (Groq by default)
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the credential
    pub api_key_env: String,
    /// Credential resolved at startup; `None` disables the model
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key_env: DEFAULT_LLM_API_KEY_ENV.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

/// Wording and formatting knobs of the answer synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Subject of the corpus, used in the persona and canned messages
    pub knowledge_base: String,
    /// Title used when a passage has no `title` metadata
    pub default_source_label: String,
    /// Words of each passage quoted by the fallback answer
    pub snippet_words: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            knowledge_base: "Blender".to_string(),
            default_source_label: "Blender Guide".to_string(),
            snippet_words: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on
    pub port: u16,
    /// SQLite file holding the vector collections
    pub vector_db_path: String,
    /// Collections searched per query, in merge order
    pub collections: Vec<String>,
    /// Passages retrieved per question
    pub top_k: usize,
    /// Bound on one collection's search; a slower collection is skipped
    pub search_timeout: Duration,
    /// Metric every collection must share to be merged
    pub distance_metric: DistanceMetric,
    pub embedder: EmbedderConfig,
    pub llm: LlmConfig,
    pub synthesis: SynthesisConfig,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            vector_db_path: DEFAULT_VECTOR_DB_PATH.to_string(),
            collections: DEFAULT_COLLECTIONS.iter().map(|s| (*s).to_string()).collect(),
            top_k: DEFAULT_TOP_K,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            distance_metric: DistanceMetric::L2,
            embedder: EmbedderConfig::default(),
            llm: LlmConfig::default(),
            synthesis: SynthesisConfig::default(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

// ─── TOML file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub vector_db_path: Option<String>,
    pub collections: Option<Vec<String>>,
    pub top_k: Option<usize>,
    pub search_timeout_secs: Option<u64>,
    pub distance_metric: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub embedder: Option<FileEmbedderConfig>,
    pub llm: Option<FileLlmConfig>,
    pub synthesis: Option<FileSynthesisConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileEmbedderConfig {
    pub backend: Option<String>,
    pub model: Option<String>,
    pub cache_dir: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub dimensions: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileLlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSynthesisConfig {
    pub knowledge_base: Option<String>,
    pub default_source_label: Option<String>,
    pub snippet_words: Option<usize>,
}

impl FileConfig {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid config file: {e}"))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
        Self::parse(&raw)
    }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

impl Config {
    /// Resolve from the process environment and the optional config file.
    pub fn from_env() -> anyhow::Result<Self> {
        let file = match std::env::var("RAG_CONFIG") {
            Ok(path) if !path.trim().is_empty() => {
                tracing::info!(path = %path, "Loading config file");
                FileConfig::load(Path::new(path.trim()))?
            }
            _ => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
                Some(path) => {
                    tracing::info!(path = %path.display(), "Loading config file");
                    FileConfig::load(path)?
                }
                None => FileConfig::default(),
            },
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge `file` with variables from `lookup` over the defaults.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Config::default();
        let file_embedder = file.embedder.unwrap_or_default();
        let file_llm = file.llm.unwrap_or_default();
        let file_synthesis = file.synthesis.unwrap_or_default();

        let distance_metric = match env.str("RAG_DISTANCE_METRIC").or(file.distance_metric) {
            Some(raw) => DistanceMetric::parse(&raw)
                .ok_or_else(|| anyhow::anyhow!("Invalid distance metric '{raw}'. Expected l2, cosine or ip"))?,
            None => defaults.distance_metric,
        };

        let embedder = {
            let backend = match env.str("RAG_EMBEDDER").or(file_embedder.backend) {
                Some(raw) => raw.parse()?,
                None => defaults.embedder.backend,
            };
            let api_key_env = env
                .str("RAG_EMBEDDING_API_KEY_ENV")
                .or(file_embedder.api_key_env)
                .unwrap_or_else(|| "OPENAI_API_KEY".to_string());
            EmbedderConfig {
                backend,
                model: env
                    .str("RAG_EMBEDDING_MODEL")
                    .or(file_embedder.model)
                    .unwrap_or(defaults.embedder.model),
                cache_dir: env
                    .str("RAG_EMBEDDING_CACHE_DIR")
                    .or(file_embedder.cache_dir)
                    .map(PathBuf::from),
                endpoint: env.str("RAG_EMBEDDING_ENDPOINT").or(file_embedder.endpoint),
                api_key: env.str(&api_key_env),
                dimensions: env
                    .parse("RAG_EMBEDDING_DIMENSIONS")?
                    .or(file_embedder.dimensions)
                    .unwrap_or(defaults.embedder.dimensions),
                timeout: Duration::from_secs(
                    env.parse("RAG_EMBED_TIMEOUT_SECS")?
                        .or(file_embedder.timeout_secs)
                        .unwrap_or(defaults.embedder.timeout.as_secs()),
                ),
            }
        };

        let llm = {
            let api_key_env = env
                .str("RAG_LLM_API_KEY_ENV")
                .or(file_llm.api_key_env)
                .unwrap_or(defaults.llm.api_key_env);
            LlmConfig {
                base_url: env
                    .str("RAG_LLM_BASE_URL")
                    .or(file_llm.base_url)
                    .unwrap_or(defaults.llm.base_url),
                model: env
                    .str("RAG_LLM_MODEL")
                    .or(file_llm.model)
                    .unwrap_or(defaults.llm.model),
                api_key: env.str(&api_key_env),
                api_key_env,
                timeout: Duration::from_secs(
                    env.parse("RAG_LLM_TIMEOUT_SECS")?
                        .or(file_llm.timeout_secs)
                        .unwrap_or(defaults.llm.timeout.as_secs()),
                ),
                max_tokens: env
                    .parse("RAG_LLM_MAX_TOKENS")?
                    .or(file_llm.max_tokens)
                    .unwrap_or(defaults.llm.max_tokens),
                temperature: env
                    .parse("RAG_LLM_TEMPERATURE")?
                    .or(file_llm.temperature)
                    .unwrap_or(defaults.llm.temperature),
            }
        };

        let synthesis = SynthesisConfig {
            knowledge_base: env
                .str("RAG_KNOWLEDGE_BASE")
                .or(file_synthesis.knowledge_base)
                .unwrap_or(defaults.synthesis.knowledge_base),
            default_source_label: env
                .str("RAG_DEFAULT_SOURCE_LABEL")
                .or(file_synthesis.default_source_label)
                .unwrap_or(defaults.synthesis.default_source_label),
            snippet_words: env
                .parse("RAG_SNIPPET_WORDS")?
                .or(file_synthesis.snippet_words)
                .unwrap_or(defaults.synthesis.snippet_words),
        };

        let config = Config {
            port: env.parse("RAG_PORT")?.or(file.port).unwrap_or(defaults.port),
            vector_db_path: env
                .str("RAG_VECTOR_DB_PATH")
                .or(file.vector_db_path)
                .unwrap_or(defaults.vector_db_path),
            collections: env
                .csv("RAG_COLLECTIONS")
                .or(file.collections)
                .unwrap_or(defaults.collections),
            top_k: env.parse("RAG_TOP_K")?.or(file.top_k).unwrap_or(defaults.top_k),
            search_timeout: Duration::from_secs(
                env.parse("RAG_SEARCH_TIMEOUT_SECS")?
                    .or(file.search_timeout_secs)
                    .unwrap_or(defaults.search_timeout.as_secs()),
            ),
            distance_metric,
            embedder,
            llm,
            synthesis,
            cors_origins: env
                .csv("RAG_CORS_ORIGINS")
                .or(file.cors_origins)
                .unwrap_or(defaults.cors_origins),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        if self.search_timeout.is_zero() {
            anyhow::bail!("search timeout must be at least 1 second");
        }
        if self.synthesis.snippet_words == 0 {
            anyhow::bail!("snippet_words must be at least 1");
        }
        if self.embedder.dimensions == 0 {
            anyhow::bail!("embedding dimensions must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("LLM temperature {} outside 0.0..=2.0", self.llm.temperature);
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.collections {
            if !seen.insert(name.as_str()) {
                anyhow::bail!("collection '{name}' is listed twice");
            }
        }
        Ok(())
    }
}

struct Env<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.str(key) {
            Some(val) => val
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
            None => Ok(None),
        }
    }

    fn csv(&self, key: &str) -> Option<Vec<String>> {
        self.str(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
    }
}
