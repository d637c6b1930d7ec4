//! Native window control behind a trait, plus an in-memory host.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, PoisonError},
};

use anyhow::Result;
use tokio::sync::broadcast;

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowLabel {
    Main,
    Widget,
    Overlay,
    /// Thin click-through border shown during a soft alert.
    Indicator,
}

impl WindowLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::Main => "main",
            WindowLabel::Widget => "widget",
            WindowLabel::Overlay => "overlay",
            WindowLabel::Indicator => "indicator",
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a window swallows pointer input or lets it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Capture,
    ClickThrough,
}

/// A window gained or lost keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusChange {
    pub label: WindowLabel,
    pub focused: bool,
}

const FOCUS_CHANNEL_CAPACITY: usize = 64;

pub trait WindowHost: Send + Sync {
    fn show(&self, label: WindowLabel, mode: InputMode) -> Result<()>;

    /// Hiding a window that is not shown is not an error.
    fn hide(&self, label: WindowLabel) -> Result<()>;

    /// Focus changes from now on.
    fn focus_changes(&self) -> broadcast::Receiver<FocusChange>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowState {
    visible: bool,
    mode: InputMode,
}

/// Host without a display server. Tracks what would be on screen.
#[derive(Debug)]
pub struct HeadlessHost {
    windows: Mutex<HashMap<WindowLabel, WindowState>>,
    focus: broadcast::Sender<FocusChange>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        let (focus, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self {
            windows: Mutex::new(HashMap::new()),
            focus,
        }
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a focus change, as the OS would.
    pub fn set_focus(&self, label: WindowLabel, focused: bool) {
        log_info!("Window {label} {}", if focused { "focused" } else { "blurred" });
        let _ = self.focus.send(FocusChange { label, focused });
    }

    pub fn is_visible(&self, label: WindowLabel) -> bool {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&label)
            .is_some_and(|state| state.visible)
    }

    /// Input mode of a visible window.
    pub fn input_mode(&self, label: WindowLabel) -> Option<InputMode> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&label)
            .filter(|state| state.visible)
            .map(|state| state.mode)
    }
}

impl WindowHost for HeadlessHost {
    fn show(&self, label: WindowLabel, mode: InputMode) -> Result<()> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.insert(
            label,
            WindowState {
                visible: true,
                mode,
            },
        );
        log_info!("Window {label} shown ({mode:?})");
        Ok(())
    }

    fn hide(&self, label: WindowLabel) -> Result<()> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get_mut(&label) {
            Some(state) if state.visible => {
                state.visible = false;
                log_info!("Window {label} hidden");
            }
            _ => {}
        }
        Ok(())
    }

    fn focus_changes(&self) -> broadcast::Receiver<FocusChange> {
        self.focus.subscribe()
    }
}
