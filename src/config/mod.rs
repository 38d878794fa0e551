mod file_config;

pub use file_config::{
    FileConfig, GenerationConfig, InsightsConfig, MessagingConfig, PipelineConfig,
    ScheduleConfig, StoreConfig,
};

use crate::clients::{ChannelRef, DEFAULT_GEMINI_BASE_URL, DEFAULT_OPENSERV_BASE_URL};
use crate::pipeline::{CategoryChannels, ChannelMap, Granularity};
use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_TIMEZONE: &str = "Europe/London";
pub const DEFAULT_REFRESH_HOURS: u64 = 6;
pub const DEFAULT_GENERATION_AGENT_ID: &str = "140";
pub const DEFAULT_WATCHLIST_WORKSPACE: &str = "3422";
pub const DEFAULT_SECTOR_WORKSPACE: &str = "3420";
pub const DEFAULT_NARRATIVE_WORKSPACE: &str = "3421";
pub const DEFAULT_MESSAGING_WORKSPACE: &str = "3416";
pub const DEFAULT_MESSAGING_AGENT_ID: &str = "267";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INSIGHT_TIMEOUT_SECS: u64 = 90;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub port: u16,
    pub timezone: Option<String>,
    pub store_url: Option<String>,
    pub store_service_key: Option<String>,
    pub sqlite_path: Option<PathBuf>,
    pub openserv_api_key: Option<String>,
    pub openserv_session: Option<String>,
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreSettings,
    pub schedule: ScheduleSettings,
    pub pipeline: PipelineSettings,
    pub generation: GenerationSettings,

    // Optional collaborators
    pub insights: Option<InsightSettings>,
    pub messaging: Option<MessagingSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Rest {
        url: String,
        service_key: String,
        timeout: Duration,
    },
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub scheduled_refresh_interval: Duration,
    pub immediate_check_interval: Duration,
    pub message_interval: Duration,
    /// Upper bound of the random delay added to every interval cycle.
    pub jitter: Duration,
    pub timezone: Tz,
    pub midnight_user_concurrency: usize,
    pub shutdown_grace: Duration,
    pub initial_send_delay: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            scheduled_refresh_interval: Duration::from_secs(DEFAULT_REFRESH_HOURS * 60 * 60),
            immediate_check_interval: Duration::from_secs(5),
            message_interval: Duration::from_secs(1),
            jitter: Duration::ZERO,
            timezone: chrono_tz::Europe::London,
            midnight_user_concurrency: 8,
            shutdown_grace: Duration::from_millis(500),
            initial_send_delay: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub refresh_hours: u64,
    pub settle_wait: Duration,
    /// Global cap on in-flight generation tasks within one run.
    pub concurrency: usize,
    pub granularity: Granularity,
    /// Hold a generation channel from submit until collect, so tasks that
    /// share a channel (items of one category, or different users) never
    /// read each other's replies.
    pub exclusive_channels: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            refresh_hours: DEFAULT_REFRESH_HOURS,
            settle_wait: Duration::from_secs(65),
            concurrency: 5,
            granularity: Granularity::PerItem,
            exclusive_channels: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub base_url: String,
    pub api_key: String,
    pub session_cookie: Option<String>,
    pub timeout: Duration,
    pub channels: ChannelMap,
}

#[derive(Debug, Clone)]
pub struct InsightSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MessagingSettings {
    pub channel: ChannelRef,
    pub cooldown_hours: u64,
    pub send_delay: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);

        let timezone_name = non_empty(file.timezone.or_else(|| cli.timezone.clone()))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| anyhow!("Unknown timezone: {}", timezone_name))?;

        let store = resolve_store(cli, file.store.unwrap_or_default())?;

        // Schedule settings - merge file config with defaults
        let schedule_file = file.schedule.unwrap_or_default();
        let defaults = ScheduleSettings::default();
        let schedule = ScheduleSettings {
            scheduled_refresh_interval: schedule_file
                .scheduled_refresh_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.scheduled_refresh_interval),
            immediate_check_interval: schedule_file
                .immediate_check_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.immediate_check_interval),
            message_interval: schedule_file
                .message_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.message_interval),
            jitter: schedule_file
                .jitter_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.jitter),
            timezone,
            midnight_user_concurrency: schedule_file
                .midnight_user_concurrency
                .unwrap_or(defaults.midnight_user_concurrency),
            shutdown_grace: schedule_file
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            initial_send_delay: schedule_file
                .initial_send_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_send_delay),
        };
        if schedule.scheduled_refresh_interval.is_zero()
            || schedule.immediate_check_interval.is_zero()
            || schedule.message_interval.is_zero()
        {
            bail!("Cycle intervals must be greater than zero");
        }
        if schedule.midnight_user_concurrency == 0 {
            bail!("midnight_user_concurrency must be at least 1");
        }

        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline_defaults = PipelineSettings::default();
        let granularity = match pipeline_file.granularity {
            Some(raw) => raw.parse::<Granularity>().map_err(|e| anyhow!(e))?,
            None => pipeline_defaults.granularity,
        };
        let pipeline = PipelineSettings {
            refresh_hours: pipeline_file
                .refresh_hours
                .unwrap_or(pipeline_defaults.refresh_hours),
            settle_wait: pipeline_file
                .settle_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(pipeline_defaults.settle_wait),
            concurrency: pipeline_file
                .concurrency
                .unwrap_or(pipeline_defaults.concurrency),
            granularity,
            exclusive_channels: pipeline_file
                .exclusive_channels
                .unwrap_or(pipeline_defaults.exclusive_channels),
        };
        if pipeline.concurrency == 0 {
            bail!("pipeline concurrency must be at least 1");
        }
        if pipeline.refresh_hours == 0 {
            bail!("refresh_hours must be at least 1");
        }

        let generation = resolve_generation(cli, file.generation.unwrap_or_default())?;

        let insights_file = file.insights.unwrap_or_default();
        let insight_key = non_empty(insights_file.api_key.or_else(|| cli.gemini_api_key.clone()));
        let insights = match (insights_file.enabled, insight_key) {
            (Some(false), _) | (None, None) => None,
            (Some(true), None) => {
                bail!("Insights are enabled but no API key was given (GEMINI_API_KEY)")
            }
            (_, Some(api_key)) => Some(InsightSettings {
                base_url: insights_file
                    .base_url
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                api_key,
                model: insights_file
                    .model
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                timeout: Duration::from_secs(
                    insights_file
                        .timeout_secs
                        .unwrap_or(DEFAULT_INSIGHT_TIMEOUT_SECS),
                ),
            }),
        };

        let messaging_file = file.messaging.unwrap_or_default();
        let messaging = if messaging_file.enabled.unwrap_or(true) {
            let workspace = numeric_id(
                "messaging workspace_id",
                messaging_file.workspace_id.as_deref(),
                DEFAULT_MESSAGING_WORKSPACE,
            )?;
            let agent = numeric_id(
                "messaging agent_id",
                messaging_file.agent_id.as_deref(),
                DEFAULT_MESSAGING_AGENT_ID,
            )?;
            Some(MessagingSettings {
                channel: ChannelRef::new(workspace, agent),
                cooldown_hours: messaging_file
                    .cooldown_hours
                    .unwrap_or(DEFAULT_REFRESH_HOURS),
                send_delay: Duration::from_millis(messaging_file.send_delay_ms.unwrap_or(2000)),
            })
        } else {
            None
        };

        Ok(Self {
            port,
            store,
            schedule,
            pipeline,
            generation,
            insights,
            messaging,
        })
    }
}

fn resolve_store(cli: &CliConfig, file: StoreConfig) -> Result<StoreSettings> {
    let url = non_empty(file.url.or_else(|| cli.store_url.clone()));
    let service_key = non_empty(file.service_key.or_else(|| cli.store_service_key.clone()));
    let sqlite_path = file
        .sqlite_path
        .map(PathBuf::from)
        .or_else(|| cli.sqlite_path.clone());
    let timeout = Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_STORE_TIMEOUT_SECS));

    let rest = |url: Option<String>, service_key: Option<String>| match (url, service_key) {
        (Some(url), Some(service_key)) => Ok(StoreSettings::Rest {
            url,
            service_key,
            timeout,
        }),
        _ => Err(anyhow!(
            "Store must be configured: set SUPABASE_URL and SUPABASE_SERVICE_KEY, or --sqlite-path"
        )),
    };

    match file.backend.map(|b| b.to_lowercase()).as_deref() {
        Some("rest") => rest(url, service_key),
        Some("sqlite") => sqlite_path
            .map(|path| StoreSettings::Sqlite { path })
            .ok_or_else(|| anyhow!("SQLite store requires sqlite_path or --sqlite-path")),
        Some(other) => bail!("Unknown store backend: {}", other),
        None => match sqlite_path {
            Some(path) => Ok(StoreSettings::Sqlite { path }),
            None => rest(url, service_key),
        },
    }
}

fn resolve_generation(cli: &CliConfig, file: GenerationConfig) -> Result<GenerationSettings> {
    let api_key = non_empty(file.api_key.or_else(|| cli.openserv_api_key.clone()))
        .ok_or_else(|| {
            anyhow!("Generation API key must be specified via OPENSERV_API_KEY or in config file")
        })?;
    let agent_id = numeric_id(
        "generation agent_id",
        file.agent_id.as_deref(),
        DEFAULT_GENERATION_AGENT_ID,
    )?;

    let channels_for = |name: &str,
                        intel: Option<&str>,
                        default: &str,
                        social: Option<&str>|
     -> Result<CategoryChannels> {
        let intel = numeric_id(&format!("{} workspace", name), intel, default)?;
        let social = match social.filter(|s| !s.trim().is_empty()) {
            Some(ws) => Some(ChannelRef::new(
                numeric_id(&format!("{} social workspace", name), Some(ws), ws)?,
                agent_id.clone(),
            )),
            None => None,
        };
        Ok(CategoryChannels {
            intel: ChannelRef::new(intel, agent_id.clone()),
            social,
        })
    };

    let channels = ChannelMap {
        watchlist: channels_for(
            "watchlist",
            file.watchlist_workspace.as_deref(),
            DEFAULT_WATCHLIST_WORKSPACE,
            file.watchlist_social_workspace.as_deref(),
        )?,
        sector: channels_for(
            "sector",
            file.sector_workspace.as_deref(),
            DEFAULT_SECTOR_WORKSPACE,
            file.sector_social_workspace.as_deref(),
        )?,
        narrative: channels_for(
            "narrative",
            file.narrative_workspace.as_deref(),
            DEFAULT_NARRATIVE_WORKSPACE,
            file.narrative_social_workspace.as_deref(),
        )?,
    };

    Ok(GenerationSettings {
        base_url: file
            .base_url
            .unwrap_or_else(|| DEFAULT_OPENSERV_BASE_URL.to_string()),
        api_key,
        session_cookie: non_empty(file.session_cookie.or_else(|| cli.openserv_session.clone())),
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS)),
        channels,
    })
}

/// Channel ids end up in URL paths, so anything but digits is refused.
fn numeric_id(field: &str, value: Option<&str>, default: &str) -> Result<String> {
    let raw = value.unwrap_or(default).trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        bail!("{} must be numeric, got '{}'", field, raw);
    }
    Ok(raw.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest_cli() -> CliConfig {
        CliConfig {
            port: DEFAULT_PORT,
            store_url: Some("https://project.supabase.co".to_string()),
            store_service_key: Some("service-key".to_string()),
            openserv_api_key: Some("openserv-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let config = AppConfig::resolve(&rest_cli(), None).unwrap();

        assert_eq!(config.port, 3001);
        assert_eq!(
            config.store,
            StoreSettings::Rest {
                url: "https://project.supabase.co".to_string(),
                service_key: "service-key".to_string(),
                timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(config.schedule.timezone, chrono_tz::Europe::London);
        assert_eq!(
            config.schedule.scheduled_refresh_interval,
            Duration::from_secs(6 * 60 * 60)
        );
        assert_eq!(config.schedule.immediate_check_interval, Duration::from_secs(5));
        assert_eq!(config.schedule.message_interval, Duration::from_secs(1));
        assert_eq!(config.pipeline.settle_wait, Duration::from_secs(65));
        assert_eq!(config.pipeline.concurrency, 5);
        assert!(config.pipeline.exclusive_channels);
        assert_eq!(config.pipeline.granularity, Granularity::PerItem);
        assert_eq!(config.generation.channels.watchlist.intel, ChannelRef::new("3422", "140"));
        assert_eq!(config.generation.channels.sector.intel, ChannelRef::new("3420", "140"));
        assert_eq!(config.generation.channels.narrative.intel, ChannelRef::new("3421", "140"));
        assert!(config.generation.channels.watchlist.social.is_none());
        assert!(config.insights.is_none());

        let messaging = config.messaging.unwrap();
        assert_eq!(messaging.channel, ChannelRef::new("3416", "267"));
        assert_eq!(messaging.cooldown_hours, 6);
        assert_eq!(messaging.send_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            timezone: Some("Europe/Paris".to_string()),
            ..rest_cli()
        };
        let file_config = FileConfig {
            port: Some(4000),
            timezone: Some("America/New_York".to_string()),
            pipeline: Some(PipelineConfig {
                concurrency: Some(2),
                settle_wait_ms: Some(1500),
                granularity: Some("per-category".to_string()),
                exclusive_channels: Some(false),
                ..Default::default()
            }),
            generation: Some(GenerationConfig {
                sector_workspace: Some("9000".to_string()),
                sector_social_workspace: Some("9001".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.schedule.timezone, chrono_tz::America::New_York);
        assert_eq!(config.pipeline.concurrency, 2);
        assert_eq!(config.pipeline.settle_wait, Duration::from_millis(1500));
        assert_eq!(config.pipeline.granularity, Granularity::PerCategory);
        assert!(!config.pipeline.exclusive_channels);
        assert_eq!(config.generation.channels.sector.intel, ChannelRef::new("9000", "140"));
        assert_eq!(
            config.generation.channels.sector.social,
            Some(ChannelRef::new("9001", "140"))
        );
        // CLI value used when TOML doesn't specify
        assert_eq!(config.generation.api_key, "openserv-key");
    }

    #[test]
    fn test_resolve_sqlite_inferred_from_path() {
        let cli = CliConfig {
            store_url: None,
            store_service_key: None,
            sqlite_path: Some(PathBuf::from("/tmp/users.db")),
            ..rest_cli()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(
            config.store,
            StoreSettings::Sqlite {
                path: PathBuf::from("/tmp/users.db")
            }
        );
    }

    #[test]
    fn test_resolve_missing_store_error() {
        let cli = CliConfig {
            store_service_key: None,
            ..rest_cli()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("Store must be configured"));
    }

    #[test]
    fn test_resolve_missing_generation_key_error() {
        let cli = CliConfig {
            openserv_api_key: None,
            ..rest_cli()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("OPENSERV_API_KEY"));
    }

    #[test]
    fn test_resolve_zero_concurrency_error() {
        let file_config = FileConfig {
            pipeline: Some(PipelineConfig {
                concurrency: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&rest_cli(), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_resolve_unknown_timezone_error() {
        let cli = CliConfig {
            timezone: Some("Mars/Olympus".to_string()),
            ..rest_cli()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("Unknown timezone"));
    }

    #[test]
    fn test_resolve_non_numeric_channel_error() {
        let file_config = FileConfig {
            generation: Some(GenerationConfig {
                watchlist_workspace: Some("../admin".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&rest_cli(), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("watchlist workspace must be numeric"));
    }

    #[test]
    fn test_resolve_insights_follow_api_key() {
        let cli = CliConfig {
            gemini_api_key: Some("gemini-key".to_string()),
            ..rest_cli()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        let insights = config.insights.unwrap();
        assert_eq!(insights.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(insights.timeout, Duration::from_secs(90));

        let disabled = FileConfig {
            insights: Some(InsightsConfig {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(disabled)).unwrap();
        assert!(config.insights.is_none());

        let enabled_without_key = FileConfig {
            insights: Some(InsightsConfig {
                enabled: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&rest_cli(), Some(enabled_without_key)).is_err());
    }

    #[test]
    fn test_resolve_messaging_can_be_disabled() {
        let file_config = FileConfig {
            messaging: Some(MessagingConfig {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&rest_cli(), Some(file_config)).unwrap();
        assert!(config.messaging.is_none());
    }

    #[test]
    fn test_resolve_invalid_granularity_error() {
        let file_config = FileConfig {
            pipeline: Some(PipelineConfig {
                granularity: Some("hourly".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&rest_cli(), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("Unknown granularity"));
    }
}
