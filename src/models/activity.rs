use serde::{Deserialize, Serialize};

/// One observation of what the user is doing, fed to the intervention engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySample {
    pub app_name: String,
    pub window_title: String,
    /// Seconds since the last keyboard, click or wheel input.
    pub idle_seconds: u64,
}

impl ActivitySample {
    pub fn new(app_name: impl Into<String>, window_title: impl Into<String>, idle_seconds: u64) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
            idle_seconds,
        }
    }
}
