//! Pure per-surface state. Every change goes through [`SurfaceState::reduce`].

use serde::Serialize;

use crate::{
    error::{AuthorityError, Presentation},
    models::SessionSnapshot,
    settings::{Preferences, Theme},
    utils::time::{elapsed_since, format_hms},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceKind {
    Main,
    Widget,
    Overlay,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::Main => "main",
            SurfaceKind::Widget => "widget",
            SurfaceKind::Overlay => "overlay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    /// Nothing announced yet; the surface waits for a session or login.
    Waiting,
    Active,
}

/// Optimistic hint after a command was accepted, cleared by the next tick
/// that confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provisional {
    Starting,
    Ending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Load,
    Start,
    End,
    SavePreferences,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceAction {
    /// Result of the single pull at mount.
    Seeded {
        snapshot: Option<SessionSnapshot>,
        now_epoch_ms: i64,
    },
    Tick(u64),
    SessionAnnounced(String),
    StartAccepted,
    EndAccepted,
    CommandFailed {
        command: Command,
        error: AuthorityError,
    },
    SubscriptionFailed(AuthorityError),
    SubscriptionRestored,
    ThemeToggled,
    DismissMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    kind: SurfaceKind,
    theme: Theme,
    logged_in: bool,
    screen: Screen,
    /// Last accepted tick, `None` until the first one arrives.
    last_tick: Option<u64>,
    /// Floor for out-of-order ticks. Reset by a zero tick.
    last_nonzero: u64,
    placeholder: Option<u64>,
    provisional: Option<Provisional>,
    inline_message: Option<AuthorityError>,
    banner: Option<AuthorityError>,
}

/// Everything a renderer needs, already formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceView {
    pub kind: SurfaceKind,
    pub screen: Screen,
    pub theme: Theme,
    pub logged_in: bool,
    pub elapsed_secs: u64,
    pub timer_text: String,
    pub is_active: bool,
    pub pending: Option<Provisional>,
    pub inline_message: Option<String>,
    pub banner: Option<String>,
}

impl SurfaceState {
    /// Fresh state. Only theme and login come from disk.
    pub fn init(kind: SurfaceKind, preferences: &Preferences) -> Self {
        Self {
            kind,
            theme: preferences.theme,
            logged_in: preferences.logged_in,
            screen: if preferences.logged_in {
                Screen::Active
            } else {
                Screen::Waiting
            },
            last_tick: None,
            last_nonzero: 0,
            placeholder: None,
            provisional: None,
            inline_message: None,
            banner: None,
        }
    }

    pub fn reduce(&mut self, action: SurfaceAction) {
        match action {
            SurfaceAction::Seeded {
                snapshot,
                now_epoch_ms,
            } => {
                // A real tick already won.
                if self.last_tick.is_some() {
                    return;
                }
                self.placeholder = snapshot.map(|snapshot| {
                    elapsed_since(snapshot.start_time_epoch_seconds, now_epoch_ms)
                });
                if self.displayed_elapsed() > 0 {
                    self.screen = Screen::Active;
                }
            }
            SurfaceAction::Tick(0) => {
                self.last_tick = Some(0);
                self.last_nonzero = 0;
                self.placeholder = None;
                if self.provisional == Some(Provisional::Ending) {
                    self.provisional = None;
                }
            }
            SurfaceAction::Tick(elapsed) => {
                if elapsed < self.last_nonzero {
                    return;
                }
                self.last_tick = Some(elapsed);
                self.last_nonzero = elapsed;
                self.placeholder = None;
                self.screen = Screen::Active;
                if self.provisional == Some(Provisional::Starting) {
                    self.provisional = None;
                }
            }
            SurfaceAction::SessionAnnounced(_) => {
                self.screen = Screen::Active;
                self.logged_in = true;
            }
            SurfaceAction::StartAccepted => {
                self.provisional = Some(Provisional::Starting);
                self.inline_message = None;
            }
            SurfaceAction::EndAccepted => {
                self.provisional = Some(Provisional::Ending);
                self.inline_message = None;
            }
            SurfaceAction::CommandFailed { command, error } => {
                match (command, &error) {
                    // Someone else already ended it.
                    (Command::End, AuthorityError::NotFound) => {
                        self.provisional = Some(Provisional::Ending);
                    }
                    (Command::Start, _) => {
                        if self.provisional == Some(Provisional::Starting) {
                            self.provisional = None;
                        }
                    }
                    _ => {}
                }
                match error.presentation() {
                    Presentation::Inline => self.inline_message = Some(error),
                    Presentation::Banner => self.banner = Some(error),
                }
            }
            SurfaceAction::SubscriptionFailed(error) => {
                self.banner = Some(error);
            }
            SurfaceAction::SubscriptionRestored => {
                if matches!(self.banner, Some(AuthorityError::Transport(_))) {
                    self.banner = None;
                }
            }
            SurfaceAction::ThemeToggled => {
                self.theme = self.theme.toggled();
            }
            SurfaceAction::DismissMessage => {
                self.inline_message = None;
                self.banner = None;
            }
        }
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    /// Last accepted tick, or the mount placeholder before any tick.
    pub fn displayed_elapsed(&self) -> u64 {
        self.last_tick.or(self.placeholder).unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.displayed_elapsed() > 0
    }

    pub fn provisional(&self) -> Option<Provisional> {
        self.provisional
    }

    pub fn view(&self) -> SurfaceView {
        let elapsed = self.displayed_elapsed();
        SurfaceView {
            kind: self.kind,
            screen: self.screen,
            theme: self.theme,
            logged_in: self.logged_in,
            elapsed_secs: elapsed,
            timer_text: format_hms(elapsed),
            is_active: elapsed > 0,
            pending: self.provisional,
            inline_message: self.inline_message.as_ref().map(ToString::to_string),
            banner: self.banner.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> SurfaceState {
        SurfaceState::init(SurfaceKind::Widget, &Preferences::default())
    }

    fn snapshot(start: i64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: "s".into(),
            task_id: None,
            start_time_epoch_seconds: start,
        }
    }

    #[test]
    fn seeding_without_session_shows_zero() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Seeded {
            snapshot: None,
            now_epoch_ms: 1_000_000,
        });
        assert_eq!(state.view().timer_text, "00:00:00");
        assert!(!state.is_active());
        assert_eq!(state.view().screen, Screen::Waiting);
    }

    #[test]
    fn placeholder_rounds_and_first_tick_overwrites() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Seeded {
            snapshot: Some(snapshot(1_000)),
            now_epoch_ms: 1_042_600,
        });
        assert_eq!(state.displayed_elapsed(), 43);
        assert!(state.is_active());

        state.reduce(SurfaceAction::Tick(41));
        assert_eq!(state.displayed_elapsed(), 41);
    }

    #[test]
    fn placeholder_never_overrides_a_seen_tick() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Tick(5));
        state.reduce(SurfaceAction::Seeded {
            snapshot: Some(snapshot(0)),
            now_epoch_ms: 90_000,
        });
        assert_eq!(state.displayed_elapsed(), 5);
    }

    #[test]
    fn future_start_time_clamps_to_zero() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Seeded {
            snapshot: Some(snapshot(2_000)),
            now_epoch_ms: 1_000_000,
        });
        assert_eq!(state.displayed_elapsed(), 0);
        assert!(!state.is_active());
    }

    #[test]
    fn stale_ticks_are_dropped_but_zero_always_wins() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Tick(10));
        state.reduce(SurfaceAction::Tick(8));
        assert_eq!(state.displayed_elapsed(), 10);

        state.reduce(SurfaceAction::Tick(0));
        assert_eq!(state.displayed_elapsed(), 0);
        assert!(!state.is_active());

        // A new session starts counting from the bottom again.
        state.reduce(SurfaceAction::Tick(1));
        assert_eq!(state.displayed_elapsed(), 1);
    }

    #[test]
    fn optimistic_markers_do_not_change_activity() {
        let mut state = fresh();
        state.reduce(SurfaceAction::StartAccepted);
        assert_eq!(state.provisional(), Some(Provisional::Starting));
        assert!(!state.is_active());

        state.reduce(SurfaceAction::Tick(1));
        assert_eq!(state.provisional(), None);
        assert!(state.is_active());

        state.reduce(SurfaceAction::EndAccepted);
        assert!(state.is_active());
        state.reduce(SurfaceAction::Tick(0));
        assert_eq!(state.provisional(), None);
        assert!(!state.is_active());
    }

    #[test]
    fn errors_route_to_inline_or_banner() {
        let mut state = fresh();
        state.reduce(SurfaceAction::CommandFailed {
            command: Command::Start,
            error: AuthorityError::Conflict {
                active_session_id: "other".into(),
            },
        });
        let view = state.view();
        assert!(view.inline_message.unwrap().contains("already active"));
        assert_eq!(view.banner, None);

        state.reduce(SurfaceAction::SubscriptionFailed(AuthorityError::transport(
            "bridge closed",
        )));
        assert!(state.view().banner.is_some());
        state.reduce(SurfaceAction::SubscriptionRestored);
        assert_eq!(state.view().banner, None);

        state.reduce(SurfaceAction::DismissMessage);
        assert_eq!(state.view().inline_message, None);
    }

    #[test]
    fn not_found_on_end_marks_session_over() {
        let mut state = fresh();
        state.reduce(SurfaceAction::Tick(30));
        state.reduce(SurfaceAction::CommandFailed {
            command: Command::End,
            error: AuthorityError::NotFound,
        });
        assert_eq!(state.provisional(), Some(Provisional::Ending));
        // Still driven by ticks only.
        assert!(state.is_active());
    }

    #[test]
    fn announcement_leaves_waiting_screen() {
        let mut state = fresh();
        state.reduce(SurfaceAction::SessionAnnounced("s-1".into()));
        assert_eq!(state.view().screen, Screen::Active);
        assert!(state.logged_in());
    }

    #[test]
    fn init_takes_only_persisted_preferences() {
        let prefs = Preferences {
            theme: Theme::Dark,
            logged_in: true,
        };
        let state = SurfaceState::init(SurfaceKind::Main, &prefs);
        let view = state.view();
        assert_eq!(view.theme, Theme::Dark);
        assert!(view.logged_in);
        assert_eq!(view.elapsed_secs, 0);
        assert_eq!(view.pending, None);
    }
}
