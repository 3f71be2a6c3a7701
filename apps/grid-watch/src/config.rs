use std::env;
use std::path::PathBuf;

use grid_model::viewport::DEFAULT_ROW_HEIGHT;
use live_link::LinkConfig;

use crate::telemetry::logging::LogLevel;

pub const DEFAULT_PAGE: &str = "grid-watch";
pub const DEFAULT_VIEWPORT_HEIGHT: usize = 630;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1_200;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub link: LinkConfig,
    /// Resources to subscribe; each one backs its own grid.
    pub urls: Vec<String>,
    /// Where row data is fetched from. Falls back to the link base url.
    pub data_base_url: String,
    pub page: String,
    pub viewport_height: usize,
    pub viewport_width: u32,
    pub row_height: usize,
    /// Collapse every node at this indent or deeper after each snapshot.
    pub collapse_level: Option<u16>,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
    pub dump_metrics: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let link = LinkConfig::from_env();
        let urls = env::var("GRID_WATCH_URLS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let data_base_url = non_empty("GRID_WATCH_DATA_URL").unwrap_or_else(|| link.base_url.clone());
        let page = non_empty("GRID_WATCH_PAGE").unwrap_or_else(|| DEFAULT_PAGE.into());
        let viewport_height = env::var("GRID_WATCH_VIEWPORT_HEIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
        let viewport_width = env::var("GRID_WATCH_VIEWPORT_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH);
        let row_height = env::var("GRID_WATCH_ROW_HEIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(DEFAULT_ROW_HEIGHT);
        let collapse_level = env::var("GRID_WATCH_COLLAPSE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok());
        let log_level = env::var("GRID_WATCH_LOG_LEVEL")
            .ok()
            .and_then(|v| <LogLevel as clap::ValueEnum>::from_str(v.trim(), true).ok())
            .unwrap_or_default();
        let log_file = non_empty("GRID_WATCH_LOG_FILE").map(PathBuf::from);
        let dump_metrics = env::var("GRID_WATCH_DUMP_METRICS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);
        Self {
            link,
            urls,
            data_base_url,
            page,
            viewport_height,
            viewport_width,
            row_height,
            collapse_level,
            log_level,
            log_file,
            dump_metrics,
        }
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "LIVE_LINK_BASE_URL",
        "GRID_WATCH_URLS",
        "GRID_WATCH_DATA_URL",
        "GRID_WATCH_PAGE",
        "GRID_WATCH_VIEWPORT_HEIGHT",
        "GRID_WATCH_VIEWPORT_WIDTH",
        "GRID_WATCH_ROW_HEIGHT",
        "GRID_WATCH_COLLAPSE_LEVEL",
        "GRID_WATCH_LOG_LEVEL",
        "GRID_WATCH_LOG_FILE",
        "GRID_WATCH_DUMP_METRICS",
    ];

    fn clear_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_follow_link_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_vars();
        env::set_var("LIVE_LINK_BASE_URL", "http://live.local/jax/");
        let config = AppConfig::from_env();
        clear_vars();

        assert!(config.urls.is_empty());
        assert_eq!(config.data_base_url, "http://live.local/jax/");
        assert_eq!(config.page, DEFAULT_PAGE);
        assert_eq!(config.row_height, DEFAULT_ROW_HEIGHT);
        assert_eq!(config.collapse_level, None);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.dump_metrics);
    }

    #[test]
    fn parses_lists_and_levels() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_vars();
        env::set_var("GRID_WATCH_URLS", "risk/positions, ,pnl/desk");
        env::set_var("GRID_WATCH_ROW_HEIGHT", "0");
        env::set_var("GRID_WATCH_COLLAPSE_LEVEL", "1");
        env::set_var("GRID_WATCH_LOG_LEVEL", "DEBUG");
        env::set_var("GRID_WATCH_DUMP_METRICS", "yes");
        let config = AppConfig::from_env();
        clear_vars();

        assert_eq!(config.urls, vec!["risk/positions", "pnl/desk"]);
        assert_eq!(config.row_height, DEFAULT_ROW_HEIGHT);
        assert_eq!(config.collapse_level, Some(1));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.dump_metrics);
    }
}
