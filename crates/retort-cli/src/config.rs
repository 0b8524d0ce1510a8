//! Runtime configuration.
//!
//! Secrets come from the environment only.  Non-secret tunables may also be
//! set in the `[bot]` section of a TOML file; the environment overrides it,
//! and `--account` overrides both for the account handle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use retort_adapters::OAuth1Credentials;
use retort_agent::{LlmClientConfig, LlmProvider};
use retort_kernel::{AccountHandle, CycleConfig, SchedulerConfig};

use crate::helpers::env_non_empty;

/// Default model when OpenAI is the provider.
pub const DEFAULT_MODEL_OPENAI: &str = "gpt-4o-mini";

/// Default model when Anthropic is the provider.
pub const DEFAULT_MODEL_ANTHROPIC: &str = "claude-sonnet-4-20250514";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_POST_LIMIT: u64 = 1;
const DEFAULT_COMMENT_LIMIT: u64 = 10;
const DEFAULT_RATE_LIMIT_FALLBACK_SECS: u64 = 900;
const DEFAULT_STATE_PATH: &str = "data/processed_comments.txt";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Startup configuration failure.  Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{var}`")]
    Missing { var: &'static str },

    #[error("invalid value for `{var}`: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("failed to load {}: {reason}", path.display())]
    File { path: PathBuf, reason: String },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// X API credentials.
#[derive(Debug, Clone)]
pub struct TwitterSettings {
    pub bearer_token: String,
    pub oauth: OAuth1Credentials,
}

/// Everything the binary needs to wire the bot together.
pub struct Settings {
    pub account: AccountHandle,
    pub twitter: TwitterSettings,
    pub llm: LlmClientConfig,
    pub poll_interval: Duration,
    pub rate_limit_fallback: Duration,
    pub post_limit: u32,
    pub comment_limit: u32,
    pub state_path: PathBuf,
}

impl Settings {
    /// Resolve settings from the process environment and an optional file.
    pub fn from_env(
        account_override: Option<String>,
        file: Option<&toml::Table>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(env_non_empty, account_override, file)
    }

    /// Resolve settings from an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        account_override: Option<String>,
        file: Option<&toml::Table>,
    ) -> Result<Self, ConfigError> {
        let src = Sources {
            lookup: &lookup,
            bot: file.and_then(|t| t.get("bot")).and_then(toml::Value::as_table),
        };

        let account = account_override
            .filter(|a| !a.trim().is_empty())
            .or_else(|| src.text("RETORT_ACCOUNT", "account"))
            .map(|a| AccountHandle::new(a.trim().trim_start_matches('@')))
            .ok_or(ConfigError::Missing {
                var: "RETORT_ACCOUNT",
            })?;

        let twitter = TwitterSettings {
            bearer_token: src.secret("TWITTER_BEARER_TOKEN")?,
            oauth: OAuth1Credentials {
                consumer_key: src.secret("TWITTER_API_KEY")?,
                consumer_secret: src.secret("TWITTER_API_SECRET")?,
                access_token: src.secret("TWITTER_ACCESS_TOKEN")?,
                access_token_secret: src.secret("TWITTER_ACCESS_TOKEN_SECRET")?,
            },
        };

        Ok(Self {
            account,
            twitter,
            llm: resolve_llm_config(&src)?,
            poll_interval: Duration::from_secs(src.positive(
                "RETORT_POLL_INTERVAL_SECS",
                "poll_interval_secs",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            rate_limit_fallback: Duration::from_secs(src.positive(
                "RETORT_RATE_LIMIT_FALLBACK_SECS",
                "rate_limit_fallback_secs",
                DEFAULT_RATE_LIMIT_FALLBACK_SECS,
            )?),
            post_limit: src.limit("RETORT_POST_LIMIT", "post_limit", DEFAULT_POST_LIMIT)?,
            comment_limit: src.limit(
                "RETORT_COMMENT_LIMIT",
                "comment_limit",
                DEFAULT_COMMENT_LIMIT,
            )?,
            state_path: src
                .text("RETORT_STATE_PATH", "state_path")
                .map_or_else(|| PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from),
        })
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            account: self.account.clone(),
            post_limit: self.post_limit,
            comment_limit: self.comment_limit,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: self.poll_interval,
            rate_limit_fallback: self.rate_limit_fallback,
        }
    }
}

/// Read the optional TOML file.  A missing file is not an error.
pub fn load_file(path: &Path) -> Result<Option<toml::Table>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::File {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    content.parse::<toml::Table>().map(Some).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

struct Sources<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    bot: Option<&'a toml::Table>,
}

impl Sources<'_> {
    fn env(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    /// Environment first, then the `[bot]` table.
    fn text(&self, var: &str, key: &str) -> Option<String> {
        self.env(var).or_else(|| {
            self.bot
                .and_then(|b| b.get(key))
                .and_then(toml::Value::as_str)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_owned)
        })
    }

    fn secret(&self, var: &'static str) -> Result<String, ConfigError> {
        self.env(var).ok_or(ConfigError::Missing { var })
    }

    /// A strictly positive integer.
    fn positive(&self, var: &'static str, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value = if let Some(raw) = self.env(var) {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var,
                reason: format!("`{raw}` is not a whole number: {e}"),
            })?
        } else if let Some(v) = self.bot.and_then(|b| b.get(key)) {
            v.as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| ConfigError::Invalid {
                    var,
                    reason: format!("[bot].{key} must be a non-negative integer, got {v}"),
                })?
        } else {
            default
        };

        if value == 0 {
            return Err(ConfigError::Invalid {
                var,
                reason: "must be greater than zero".into(),
            });
        }
        Ok(value)
    }

    fn limit(&self, var: &'static str, key: &str, default: u64) -> Result<u32, ConfigError> {
        let value = self.positive(var, key, default)?;
        u32::try_from(value).map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("{value} is too large"),
        })
    }
}

/// Pick the text-generation provider, its key, model and endpoint.
///
/// An explicit `RETORT_PROVIDER` requires that provider's key; otherwise
/// OpenAI is preferred when both keys are present.
fn resolve_llm_config(src: &Sources<'_>) -> Result<LlmClientConfig, ConfigError> {
    let explicit = src
        .text("RETORT_PROVIDER", "provider")
        .map(|p| {
            p.parse::<LlmProvider>().map_err(|e| ConfigError::Invalid {
                var: "RETORT_PROVIDER",
                reason: e.to_string(),
            })
        })
        .transpose()?;
    let model = src.text("RETORT_MODEL", "model");

    let openai_key = src.env("OPENAI_API_KEY");
    let anthropic_key = src.env("ANTHROPIC_API_KEY");

    let mut config = match (explicit, openai_key, anthropic_key) {
        (Some(LlmProvider::OpenAI), Some(key), _) | (None, Some(key), _) => LlmClientConfig::openai(
            key,
            model.unwrap_or_else(|| DEFAULT_MODEL_OPENAI.to_owned()),
        ),
        (Some(LlmProvider::Anthropic), _, Some(key)) | (None, None, Some(key)) => {
            LlmClientConfig::anthropic(
                key,
                model.unwrap_or_else(|| DEFAULT_MODEL_ANTHROPIC.to_owned()),
            )
        }
        (Some(LlmProvider::OpenAI), None, _) => {
            return Err(ConfigError::Missing {
                var: "OPENAI_API_KEY",
            });
        }
        (Some(LlmProvider::Anthropic), _, None) => {
            return Err(ConfigError::Missing {
                var: "ANTHROPIC_API_KEY",
            });
        }
        (None, None, None) => {
            return Err(ConfigError::Missing {
                var: "OPENAI_API_KEY or ANTHROPIC_API_KEY",
            });
        }
    };

    if let Some(base_url) = src.env("RETORT_API_BASE_URL") {
        config = config.with_base_url(base_url);
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("TWITTER_BEARER_TOKEN", "bt"),
            ("TWITTER_API_KEY", "ck"),
            ("TWITTER_API_SECRET", "cs"),
            ("TWITTER_ACCESS_TOKEN", "at"),
            ("TWITTER_ACCESS_TOKEN_SECRET", "ats"),
            ("OPENAI_API_KEY", "sk-test"),
            ("RETORT_ACCOUNT", "demo"),
        ])
    }

    fn resolve(
        env: &HashMap<&'static str, &'static str>,
        account: Option<&str>,
        file: Option<&toml::Table>,
    ) -> Result<Settings, ConfigError> {
        Settings::from_lookup(
            |k| env.get(k).map(|v| (*v).to_owned()),
            account.map(str::to_owned),
            file,
        )
    }

    fn table(src: &str) -> toml::Table {
        src.parse().unwrap()
    }

    #[test]
    fn defaults_apply() {
        let s = resolve(&base_env(), None, None).unwrap();
        assert_eq!(s.account.as_str(), "demo");
        assert_eq!(s.poll_interval, Duration::from_secs(300));
        assert_eq!(s.rate_limit_fallback, Duration::from_secs(900));
        assert_eq!(s.post_limit, 1);
        assert_eq!(s.comment_limit, 10);
        assert_eq!(s.state_path, PathBuf::from("data/processed_comments.txt"));
        assert_eq!(s.llm.provider, LlmProvider::OpenAI);
        assert_eq!(s.llm.default_model, DEFAULT_MODEL_OPENAI);
        assert_eq!(s.twitter.oauth.access_token_secret, "ats");
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let mut env = base_env();
        env.remove("TWITTER_ACCESS_TOKEN_SECRET");
        let err = resolve(&env, None, None).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::Missing {
                var: "TWITTER_ACCESS_TOKEN_SECRET"
            }
        ));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("TWITTER_BEARER_TOKEN", "  ");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Missing {
                var: "TWITTER_BEARER_TOKEN"
            }
        ));
    }

    #[test]
    fn account_flag_overrides_env_and_strips_at() {
        let s = resolve(&base_env(), Some("@other"), None).unwrap();
        assert_eq!(s.account.as_str(), "other");
    }

    #[test]
    fn account_is_required() {
        let mut env = base_env();
        env.remove("RETORT_ACCOUNT");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Missing {
                var: "RETORT_ACCOUNT"
            }
        ));
    }

    #[test]
    fn zero_or_garbage_numbers_are_invalid() {
        let mut env = base_env();
        env.insert("RETORT_POLL_INTERVAL_SECS", "0");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Invalid {
                var: "RETORT_POLL_INTERVAL_SECS",
                ..
            }
        ));

        let mut env = base_env();
        env.insert("RETORT_COMMENT_LIMIT", "ten");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Invalid {
                var: "RETORT_COMMENT_LIMIT",
                ..
            }
        ));
    }

    #[test]
    fn file_values_apply_and_env_overrides_them() {
        let file = table(
            r#"
            [bot]
            account = "from_file"
            poll_interval_secs = 60
            post_limit = 3
            state_path = "/var/lib/retort/processed.txt"
            "#,
        );
        let mut env = base_env();
        env.remove("RETORT_ACCOUNT");
        env.insert("RETORT_POST_LIMIT", "2");

        let s = resolve(&env, None, Some(&file)).unwrap();
        assert_eq!(s.account.as_str(), "from_file");
        assert_eq!(s.poll_interval, Duration::from_secs(60));
        assert_eq!(s.post_limit, 2);
        assert_eq!(
            s.state_path,
            PathBuf::from("/var/lib/retort/processed.txt")
        );
    }

    #[test]
    fn negative_file_value_is_invalid() {
        let file = table("[bot]\ncomment_limit = -1\n");
        assert!(matches!(
            resolve(&base_env(), None, Some(&file)).err().unwrap(),
            ConfigError::Invalid {
                var: "RETORT_COMMENT_LIMIT",
                ..
            }
        ));
    }

    #[test]
    fn anthropic_is_used_when_only_its_key_is_set() {
        let mut env = base_env();
        env.remove("OPENAI_API_KEY");
        env.insert("ANTHROPIC_API_KEY", "sk-ant-test");

        let s = resolve(&env, None, None).unwrap();
        assert_eq!(s.llm.provider, LlmProvider::Anthropic);
        assert_eq!(s.llm.default_model, DEFAULT_MODEL_ANTHROPIC);
    }

    #[test]
    fn explicit_provider_needs_its_own_key() {
        let mut env = base_env();
        env.insert("RETORT_PROVIDER", "anthropic");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Missing {
                var: "ANTHROPIC_API_KEY"
            }
        ));
    }

    #[test]
    fn unknown_provider_is_invalid() {
        let mut env = base_env();
        env.insert("RETORT_PROVIDER", "gemini");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Invalid {
                var: "RETORT_PROVIDER",
                ..
            }
        ));
    }

    #[test]
    fn no_llm_key_at_all_is_missing() {
        let mut env = base_env();
        env.remove("OPENAI_API_KEY");
        assert!(matches!(
            resolve(&env, None, None).err().unwrap(),
            ConfigError::Missing { .. }
        ));
    }

    #[test]
    fn model_and_base_url_overrides() {
        let mut env = base_env();
        env.insert("RETORT_MODEL", "llama3");
        env.insert("RETORT_API_BASE_URL", "http://localhost:11434/v1");

        let s = resolve(&env, None, None).unwrap();
        assert_eq!(s.llm.default_model, "llama3");
        assert_eq!(s.llm.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn load_file_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn load_file_parses_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[bot]\npost_limit = 2\n").unwrap();
        let table = load_file(&good).unwrap().unwrap();
        let post_limit = table
            .get("bot")
            .and_then(|b| b.get("post_limit"))
            .and_then(toml::Value::as_integer);
        assert_eq!(post_limit, Some(2));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[bot\n").unwrap();
        assert!(matches!(load_file(&bad), Err(ConfigError::File { .. })));
    }

    #[test]
    fn shipped_default_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let file = load_file(&path).unwrap().unwrap();
        let s = resolve(&base_env(), None, Some(&file)).unwrap();
        assert_eq!(s.poll_interval, Duration::from_secs(300));
        assert_eq!(s.comment_limit, 10);
    }
}
