//! Test doubles shared by the in-crate unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::NaiveDateTime;
use tokio::sync::Notify;

use crate::{
    authority::SessionAuthorityClient,
    bus::{EventBus, EventHandler, EventSource, Subscription},
    error::AuthorityError,
    host::{HeadlessHost, WindowHost, WindowLabel},
    intervention::{Notice, Notifier, PermissionState},
    models::{FeedbackKind, SessionSnapshot, Topic},
    utils::time::Clock,
};

#[derive(Debug, Clone)]
pub enum FeedbackBehavior {
    Succeed,
    Fail(AuthorityError),
    Hang,
}

/// Authority that answers from scripted fields and records every call.
pub struct MockAuthority {
    pub current: Mutex<Option<SessionSnapshot>>,
    pub get_error: Mutex<Option<AuthorityError>>,
    pub start_error: Mutex<Option<AuthorityError>>,
    pub end_error: Mutex<Option<AuthorityError>>,
    pub feedback: Mutex<FeedbackBehavior>,
    /// Window closed by `hide_overlay`, like the real authority does.
    pub overlay_host: Mutex<Option<Arc<HeadlessHost>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl Default for MockAuthority {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
            get_error: Mutex::new(None),
            start_error: Mutex::new(None),
            end_error: Mutex::new(None),
            feedback: Mutex::new(FeedbackBehavior::Succeed),
            overlay_host: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockAuthority {
    pub fn with_session(snapshot: SessionSnapshot) -> Self {
        let mock = Self::default();
        *mock.current.lock().unwrap() = Some(snapshot);
        mock
    }

    pub fn hiding_on(host: Arc<HeadlessHost>) -> Self {
        let mock = Self::default();
        *mock.overlay_host.lock().unwrap() = Some(host);
        mock
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == name)
            .count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

impl SessionAuthorityClient for MockAuthority {
    async fn get_current_session(&self) -> Result<Option<SessionSnapshot>, AuthorityError> {
        self.record("get_current_session");
        if let Some(err) = self.get_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn start_session(
        &self,
        task_id: Option<String>,
        _goal_duration_minutes: u32,
    ) -> Result<SessionSnapshot, AuthorityError> {
        self.record("start_session");
        if let Some(err) = self.start_error.lock().unwrap().clone() {
            return Err(err);
        }
        let snapshot = SessionSnapshot {
            session_id: "mock-session".into(),
            task_id,
            start_time_epoch_seconds: crate::utils::time::now_epoch_seconds(),
        };
        *self.current.lock().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn end_session(&self, _user_evaluation_score: u8) -> Result<(), AuthorityError> {
        self.record("end_session");
        if let Some(err) = self.end_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.current.lock().unwrap().take();
        Ok(())
    }

    async fn submit_feedback(&self, _kind: FeedbackKind) -> Result<(), AuthorityError> {
        self.record("submit_feedback");
        let behavior = self.feedback.lock().unwrap().clone();
        match behavior {
            FeedbackBehavior::Succeed => Ok(()),
            FeedbackBehavior::Fail(err) => Err(err),
            FeedbackBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn hide_overlay(&self) -> Result<(), AuthorityError> {
        self.record("hide_overlay");
        if let Some(host) = self.overlay_host.lock().unwrap().clone() {
            host.hide(WindowLabel::Overlay)
                .map_err(AuthorityError::internal)?;
        }
        Ok(())
    }
}

/// Notifier with a fixed permission answer and an optional gate that holds
/// `send` until the test releases it.
pub struct ScriptedNotifier {
    granted: AtomicBool,
    grant_on_request: bool,
    gated: bool,
    pub requests: AtomicUsize,
    pub sent: Mutex<Vec<Notice>>,
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedNotifier {
    pub fn new(granted: bool, grant_on_request: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            grant_on_request,
            gated: false,
            requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for ScriptedNotifier {
    async fn permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> PermissionState {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_on_request {
            self.granted.store(true, Ordering::SeqCst);
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    async fn send(&self, notice: Notice) -> anyhow::Result<()> {
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.sent.lock().unwrap().push(notice);
        Ok(())
    }
}

/// Event source that refuses the first `failures` subscriptions.
pub struct FlakySource {
    pub bus: EventBus,
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakySource {
    pub fn new(bus: EventBus, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            bus,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        })
    }
}

impl EventSource for FlakySource {
    fn subscribe(
        &self,
        topic: Topic,
        handler: EventHandler,
    ) -> Result<Subscription, AuthorityError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AuthorityError::transport("bridge not ready"));
        }
        self.bus.subscribe(topic, handler)
    }
}

/// Clock that only moves when told to.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn local_now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}
