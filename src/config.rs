use std::{env, path::PathBuf, time::Duration};

use log::warn;

/// Runtime knobs for the authority, surfaces and dispatcher.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cadence of `sessionTick` broadcasts.
    pub tick_interval: Duration,

    /// Fixed delay between subscription attempts after a transport failure.
    pub subscribe_retry_interval: Duration,

    /// Upper bound on a feedback submission before the overlay is hidden anyway.
    pub feedback_timeout: Duration,

    /// How often recurring schedules are checked against the local clock.
    pub schedule_check_interval: Duration,

    /// Focus losses this soon after the main window regained focus are
    /// treated as restore noise and do not bring up the widget.
    pub widget_focus_cooldown: Duration,

    /// Where the database and preferences file live.
    pub data_dir: PathBuf,

    /// Start an untagged session of this many minutes on launch.
    pub autostart_goal_minutes: Option<u32>,

    /// Matched case-insensitively against app names and window titles.
    pub distraction_keywords: Vec<String>,

    pub debug: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            subscribe_retry_interval: Duration::from_secs(2),
            feedback_timeout: Duration::from_secs(5),
            schedule_check_interval: Duration::from_secs(60),
            widget_focus_cooldown: Duration::from_millis(200),
            data_dir: PathBuf::from(".forcefocus"),
            autostart_goal_minutes: None,
            distraction_keywords: ["youtube", "netflix", "facebook", "discord", "steam.exe", "slack"]
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
            debug: false,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `FORCEFOCUS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.debug = lookup("FORCEFOCUS_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Some(dir) = lookup("FORCEFOCUS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_u64(&lookup, "FORCEFOCUS_TICK_MS") {
            if ms > 0 {
                config.tick_interval = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = parse_u64(&lookup, "FORCEFOCUS_RETRY_MS") {
            if ms > 0 {
                config.subscribe_retry_interval = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = parse_u64(&lookup, "FORCEFOCUS_FEEDBACK_TIMEOUT_MS") {
            config.feedback_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "FORCEFOCUS_SCHEDULE_CHECK_SECS") {
            if secs > 0 {
                config.schedule_check_interval = Duration::from_secs(secs);
            }
        }
        config.autostart_goal_minutes = parse_u64(&lookup, "FORCEFOCUS_AUTOSTART_MINUTES")
            .and_then(|minutes| u32::try_from(minutes).ok())
            .filter(|minutes| *minutes > 0);

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("forcefocus.sqlite3")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Ignoring {key}={raw:?}: {err}");
            None
        }
    }
}
