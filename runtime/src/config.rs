//! Configuration loading and resolution.
//!
//! Every setting comes from its command-line flag first, then from a
//! `STATWATCH_*` environment variable, then from a built-in default.

use std::time::Duration;

use clap::ValueEnum;
use statwatch::{Emphasis, DEFAULT_TITLE};
use tracing::warn;
use url::Url;

use crate::acquisition::SelectorSet;
use crate::notify::telegram::DEFAULT_API_BASE;
use crate::notify::ChannelId;

pub const DEFAULT_URL: &str = "https://coronavirus.1point3acres.com";
pub const DEFAULT_PERIOD_SECS: u64 = 600;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A setting that is missing or unusable. Fatal at startup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {setting}: pass {flag} or set {env}")]
    Missing {
        setting: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("invalid {setting} {value:?}: {reason}")]
    Invalid {
        setting: &'static str,
        value: String,
        reason: String,
    },
}

/// How raw values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ValueMode {
    /// Compare values as text; report only that they changed.
    #[default]
    Opaque,
    /// Parse values as integers and report the delta.
    Numeric,
}

/// Markup used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Html,
    Plain,
}

impl From<ReportFormat> for Emphasis {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Markdown => Emphasis::Markdown,
            ReportFormat::Html => Emphasis::Html,
            ReportFormat::Plain => Emphasis::Plain,
        }
    }
}

/// Where the page comes from and how it is read.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SourceArgs {
    /// Statistics page URL [env: STATWATCH_URL]
    #[arg(long)]
    pub url: Option<String>,

    /// Fetch deadline in seconds, retries included [env: STATWATCH_TIMEOUT_SECS]
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// CSS selector of the statistics container [env: STATWATCH_CONTAINER_SELECTOR]
    #[arg(long)]
    pub container_selector: Option<String>,

    /// CSS selector of one category block [env: STATWATCH_GROUP_SELECTOR]
    #[arg(long)]
    pub group_selector: Option<String>,
}

/// Options of the watch loop.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Seconds between cycles [env: STATWATCH_PERIOD_SECS]
    #[arg(long)]
    pub period_secs: Option<u64>,

    /// Value representation [env: STATWATCH_MODE]
    #[arg(long, value_enum)]
    pub mode: Option<ValueMode>,

    /// Report markup [env: STATWATCH_FORMAT]
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Report title [env: STATWATCH_TITLE]
    #[arg(long)]
    pub title: Option<String>,

    /// Decorative text stripped from category labels; repeatable [env: STATWATCH_CATEGORY_STRIP, comma separated]
    #[arg(long = "strip-affix")]
    pub strip_affixes: Vec<String>,

    /// Telegram bot token [env: STATWATCH_BOT_TOKEN]
    #[arg(long)]
    pub bot_token: Option<String>,

    /// Chat receiving reports [env: STATWATCH_CHAT_ID]
    #[arg(long)]
    pub chat_id: Option<String>,

    /// Chat receiving operational errors [env: STATWATCH_ERROR_CHAT_ID]
    #[arg(long)]
    pub error_chat_id: Option<String>,

    /// Telegram Bot API base URL [env: STATWATCH_TELEGRAM_API]
    #[arg(long)]
    pub api_base: Option<String>,

    /// Print reports to stdout instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

/// Resolved source settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub url: Url,
    pub fetch_timeout: Duration,
    pub selectors: SelectorSet,
}

/// Where reports go.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Print to stdout.
    DryRun,
    Telegram {
        token: String,
        chat_id: ChannelId,
        error_chat_id: Option<ChannelId>,
        api_base: String,
    },
}

/// Fully resolved watch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub source: SourceConfig,
    pub period: Duration,
    pub mode: ValueMode,
    pub emphasis: Emphasis,
    pub title: String,
    pub strip_affixes: Vec<String>,
    pub delivery: Delivery,
}

impl SourceConfig {
    /// Resolve against the process environment.
    pub fn resolve(args: &SourceArgs) -> Result<Self, ConfigError> {
        Self::resolve_with(args, read_env_string)
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        args: &SourceArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw_url = pick(args.url.clone(), &env, "STATWATCH_URL")
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let url = parse_http_url("source URL", &raw_url)?;

        let timeout_secs = match args.timeout_secs {
            Some(v) => v,
            None => read_env_u64(&env, "STATWATCH_TIMEOUT_SECS", "fetch timeout")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                setting: "fetch timeout",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        let mut selectors = SelectorSet::default();
        if let Some(s) = pick(
            args.container_selector.clone(),
            &env,
            "STATWATCH_CONTAINER_SELECTOR",
        ) {
            selectors.container = s;
        }
        if let Some(s) = pick(args.group_selector.clone(), &env, "STATWATCH_GROUP_SELECTOR") {
            selectors.group = s;
        }

        Ok(Self {
            url,
            fetch_timeout: Duration::from_secs(timeout_secs),
            selectors,
        })
    }
}

impl WatchConfig {
    /// Resolve against the process environment.
    pub fn resolve(args: &RunArgs) -> Result<Self, ConfigError> {
        Self::resolve_with(args, read_env_string)
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        args: &RunArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut source = SourceConfig::resolve_with(&args.source, &env)?;

        let period_secs = match args.period_secs {
            Some(v) => v,
            None => read_env_u64(&env, "STATWATCH_PERIOD_SECS", "period")?
                .unwrap_or(DEFAULT_PERIOD_SECS),
        };
        if period_secs == 0 {
            return Err(ConfigError::Invalid {
                setting: "period",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        let period = Duration::from_secs(period_secs);
        if source.fetch_timeout > period {
            warn!(
                "fetch timeout {}s exceeds period {}s; using {}s",
                source.fetch_timeout.as_secs(),
                period_secs,
                period_secs
            );
            source.fetch_timeout = period;
        }

        let mode = match args.mode {
            Some(m) => m,
            None => read_env_enum(&env, "STATWATCH_MODE", "value mode")?.unwrap_or_default(),
        };
        let format: ReportFormat = match args.format {
            Some(f) => f,
            None => read_env_enum(&env, "STATWATCH_FORMAT", "report format")?.unwrap_or_default(),
        };
        let title = pick(args.title.clone(), &env, "STATWATCH_TITLE")
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let strip_affixes = if args.strip_affixes.is_empty() {
            env("STATWATCH_CATEGORY_STRIP")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        } else {
            args.strip_affixes.clone()
        };

        let delivery = if args.dry_run {
            Delivery::DryRun
        } else {
            let token = pick(args.bot_token.clone(), &env, "STATWATCH_BOT_TOKEN").ok_or(
                ConfigError::Missing {
                    setting: "bot token",
                    flag: "--bot-token",
                    env: "STATWATCH_BOT_TOKEN",
                },
            )?;
            let chat_id = pick(args.chat_id.clone(), &env, "STATWATCH_CHAT_ID").ok_or(
                ConfigError::Missing {
                    setting: "chat id",
                    flag: "--chat-id",
                    env: "STATWATCH_CHAT_ID",
                },
            )?;
            let error_chat_id = pick(args.error_chat_id.clone(), &env, "STATWATCH_ERROR_CHAT_ID");
            let api_base = pick(args.api_base.clone(), &env, "STATWATCH_TELEGRAM_API")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
            parse_http_url("Telegram API base", &api_base)?;

            Delivery::Telegram {
                token,
                chat_id: ChannelId::new(chat_id),
                error_chat_id: error_chat_id.map(ChannelId::new),
                api_base,
            }
        };

        Ok(Self {
            source,
            period,
            mode,
            emphasis: format.into(),
            title,
            strip_affixes,
            delivery,
        })
    }
}

/// Flag value if given, else a non-empty environment value.
fn pick(flag: Option<String>, env: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    flag.or_else(|| env(name)).filter(|v| !v.trim().is_empty())
}

fn parse_http_url(setting: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        setting,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            setting,
            value: raw.to_string(),
            reason: "only http and https are supported".to_string(),
        });
    }
    Ok(url)
}

fn read_env_u64(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    setting: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match env(name) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                setting,
                value: v,
                reason: e.to_string(),
            }),
    }
}

fn read_env_enum<T: ValueEnum>(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    setting: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(name) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => T::from_str(&v, true)
            .map(Some)
            .map_err(|reason| ConfigError::Invalid {
                setting,
                value: v,
                reason,
            }),
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}
