use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn distraction() -> Self {
        Self {
            title: "Time to focus".into(),
            body: "Your current activity looks like a distraction.".into(),
        }
    }

    pub fn schedule_started(name: &str) -> Self {
        Self {
            title: "Scheduled focus started".into(),
            body: format!("Starting focus mode for '{name}'."),
        }
    }
}

/// OS notification center.
pub trait Notifier: Send + Sync + 'static {
    fn permission_granted(&self) -> impl Future<Output = bool> + Send;

    /// Prompts the user. May be answered with a denial.
    fn request_permission(&self) -> impl Future<Output = PermissionState> + Send;

    fn send(&self, notice: Notice) -> impl Future<Output = Result<()>> + Send;
}

/// Writes notices to the log. Permission is whatever it was built with.
#[derive(Debug)]
pub struct LogNotifier {
    granted: AtomicBool,
}

impl LogNotifier {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Notifier for LogNotifier {
    async fn permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> PermissionState {
        if self.granted.load(Ordering::SeqCst) {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    async fn send(&self, notice: Notice) -> Result<()> {
        info!("[notification] {}: {}", notice.title, notice.body);
        Ok(())
    }
}
