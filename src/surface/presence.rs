//! Keeps the floating widget in step with the main window.
//!
//! The widget comes up when the main window loses focus during a session and
//! goes away when the main window is focused again or the session ends.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::host::{FocusChange, InputMode, WindowHost, WindowLabel};

use super::state::SurfaceView;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub struct WidgetPresence {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WidgetPresence {
    /// `session` is any surface's view stream; only `is_active` is read.
    pub fn spawn(
        host: Arc<dyn WindowHost>,
        mut session: watch::Receiver<SurfaceView>,
        cooldown: Duration,
    ) -> Self {
        let mut focus = host.focus_changes();
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut last_focus_gain: Option<Instant> = None;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    change = focus.recv() => match change {
                        Ok(FocusChange { label: WindowLabel::Main, focused: true }) => {
                            last_focus_gain = Some(Instant::now());
                            hide_widget(&*host);
                        }
                        Ok(FocusChange { label: WindowLabel::Main, focused: false }) => {
                            if last_focus_gain.is_some_and(|at| at.elapsed() < cooldown) {
                                log_debug!("Focus loss ignored during restore cooldown");
                                continue;
                            }
                            if session.borrow().is_active {
                                show_widget(&*host);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log_warn!("Widget presence skipped {skipped} focus changes");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = session.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !session.borrow_and_update().is_active {
                            hide_widget(&*host);
                        }
                    }
                }
            }
        });

        Self { token, handle }
    }

    pub fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

fn show_widget(host: &dyn WindowHost) {
    if let Err(err) = host.show(WindowLabel::Widget, InputMode::Capture) {
        log_warn!("Failed to show widget: {err:#}");
    }
}

fn hide_widget(host: &dyn WindowHost) {
    if let Err(err) = host.hide(WindowLabel::Widget) {
        log_warn!("Failed to hide widget: {err:#}");
    }
}
