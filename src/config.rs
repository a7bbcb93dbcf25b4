use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::brain::OpenAiChat;
use crate::executor::Executor;
use crate::index::SuppressionRule;
use crate::types::{DEFAULT_MAX_RETRIES, DEFAULT_MAX_WAIT_SECS, DEFAULT_SEARCH_URL, DEFAULT_WAIT_SECS};

/// Settings for one agent. Every flag can also come from the environment
/// (a `.env` file is loaded first).
#[derive(Debug, Clone, Args)]
pub struct AgentConfig {
    /// API key for the chat completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "PILOT_API_BASE", default_value = "https://api.openai.com/v1")]
    pub api_base: String,

    #[arg(long, env = "PILOT_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long, env = "PILOT_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    /// Consecutive failed attempts allowed before the run is abandoned.
    #[arg(
        long,
        env = "PILOT_MAX_RETRIES",
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_retries: u32,

    /// Pause for `wait()` without an argument, in seconds.
    #[arg(long, env = "PILOT_WAIT_SECS", default_value_t = DEFAULT_WAIT_SECS)]
    pub wait_secs: f64,

    /// Upper bound on any pause the model requests, in seconds.
    #[arg(long, env = "PILOT_MAX_WAIT_SECS", default_value_t = DEFAULT_MAX_WAIT_SECS)]
    pub max_wait_secs: f64,

    /// Results URL for `search(text)`; `{query}` is replaced by the encoded text.
    #[arg(long, env = "PILOT_SEARCH_URL", default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    /// JSON file with extra element suppression rules.
    #[arg(long, env = "PILOT_RULES")]
    pub rules: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Args)]
pub struct BrowserConfig {
    /// Run Chrome without a window.
    #[arg(long, env = "PILOT_HEADLESS")]
    pub headless: bool,

    /// Chrome executable; found automatically when omitted.
    #[arg(long, env = "PILOT_CHROME")]
    pub chrome_path: Option<PathBuf>,

    /// Remote debugging port of an already running Chrome to attach to.
    #[arg(long, env = "PILOT_DEBUG_PORT", default_value_t = 9222)]
    pub debug_port: u16,

    /// Always launch a fresh Chrome instead of attaching.
    #[arg(long, env = "PILOT_NO_ATTACH")]
    pub no_attach: bool,

    /// Profile directory for a launched Chrome.
    #[arg(long, env = "PILOT_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Per-call browser timeout, in seconds.
    #[arg(long, env = "PILOT_BROWSER_TIMEOUT", default_value_t = 20)]
    pub timeout_secs: u64,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.wait_secs.is_finite() || self.wait_secs < 0.0 {
            bail!("--wait-secs must be a non-negative number, got {}", self.wait_secs);
        }
        if !self.max_wait_secs.is_finite() || self.max_wait_secs < self.wait_secs {
            bail!(
                "--max-wait-secs must be a number no smaller than --wait-secs ({}), got {}",
                self.wait_secs,
                self.max_wait_secs
            );
        }
        if !self.search_url.contains("{query}") {
            bail!("--search-url must contain a {{query}} placeholder");
        }
        Ok(())
    }

    pub fn executor(&self) -> Result<Executor> {
        let wait = Duration::try_from_secs_f64(self.wait_secs)
            .with_context(|| format!("invalid --wait-secs {}", self.wait_secs))?;
        let max_wait = Duration::try_from_secs_f64(self.max_wait_secs)
            .with_context(|| format!("invalid --max-wait-secs {}", self.max_wait_secs))?;
        Ok(Executor::new(self.search_url.clone(), wait).with_max_wait(max_wait))
    }

    /// Built-in rules followed by those from `--rules`, in file order.
    pub fn suppression_rules(&self) -> Result<Vec<SuppressionRule>> {
        let mut rules = SuppressionRule::defaults();
        if let Some(path) = &self.rules {
            let file = std::fs::File::open(path)
                .with_context(|| format!("cannot open rules file {}", path.display()))?;
            let extra: Vec<SuppressionRule> = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("invalid rules file {}", path.display()))?;
            rules.extend(extra);
        }
        Ok(rules)
    }

    pub fn chat_model(&self) -> OpenAiChat {
        OpenAiChat::new(&self.api_base, &self.api_key, &self.model, self.temperature)
    }
}
