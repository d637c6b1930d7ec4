use std::{
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use log::{error, info};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    bus::EventBus,
    config::SyncConfig,
    db::Database,
    error::AuthorityError,
    host::{WindowHost, WindowLabel},
    models::{
        ActiveSession, ActivitySample, BridgeEvent, CompletedSession, FeedbackKind,
        InterventionSignal, Schedule, SessionSnapshot,
    },
    utils::time::now_epoch_seconds,
};

use super::{client::SessionAuthorityClient, engine::InterventionEngine};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

const MAX_EVALUATION_SCORE: u8 = 5;

#[derive(Debug, Clone)]
struct Running {
    session: ActiveSession,
    /// Monotonic instant matching `start_time_epoch_seconds`.
    anchor: Instant,
}

struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single active session and broadcasts its progress.
#[derive(Clone)]
pub struct SessionAuthority {
    state: Arc<Mutex<Option<Running>>>,
    engine: Arc<StdMutex<InterventionEngine>>,
    db: Database,
    bus: EventBus,
    host: Arc<dyn WindowHost>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    tick_interval: Duration,
}

impl SessionAuthority {
    pub fn new(db: Database, bus: EventBus, host: Arc<dyn WindowHost>, config: &SyncConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
            engine: Arc::new(StdMutex::new(InterventionEngine::new(
                &config.distraction_keywords,
                epoch_now(),
            ))),
            db,
            bus,
            host,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: config.tick_interval,
        }
    }

    /// Builds the authority, resumes a session left by a previous process and
    /// starts ticking.
    pub async fn launch(
        db: Database,
        bus: EventBus,
        host: Arc<dyn WindowHost>,
        config: &SyncConfig,
    ) -> anyhow::Result<Self> {
        let authority = Self::new(db, bus, host, config);
        authority.restore().await?;
        Ok(authority)
    }

    /// Picks up the persisted active session, if any, and (re)starts the
    /// ticker aligned to its whole seconds.
    pub async fn restore(&self) -> anyhow::Result<Option<SessionSnapshot>> {
        let persisted = self.db.load_active_session().await?;

        let first_tick = {
            let mut guard = self.state.lock().await;
            match persisted.clone() {
                Some(session) => {
                    let age_s = now_epoch_seconds()
                        .saturating_sub(session.snapshot.start_time_epoch_seconds)
                        .max(0) as u64;
                    let now = Instant::now();
                    let anchor = now
                        .checked_sub(Duration::from_secs(age_s))
                        .unwrap_or(now);
                    info!(
                        "Restored session {} started {}s ago",
                        session.session_id(),
                        age_s
                    );
                    *guard = Some(Running { session, anchor });
                    next_aligned_tick(anchor, self.tick_interval)
                }
                None => {
                    *guard = None;
                    Instant::now() + self.tick_interval
                }
            }
        };

        self.spawn_ticker(first_tick).await;
        Ok(persisted.map(|session| session.snapshot))
    }

    pub async fn current(&self) -> Option<ActiveSession> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|running| running.session.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Feeds one activity observation to the intervention engine. Ignored
    /// while no session is active.
    pub async fn report_activity(
        &self,
        sample: &ActivitySample,
    ) -> Result<Option<InterventionSignal>, AuthorityError> {
        self.report_activity_at(sample, epoch_now()).await
    }

    pub async fn report_activity_at(
        &self,
        sample: &ActivitySample,
        now_s: u64,
    ) -> Result<Option<InterventionSignal>, AuthorityError> {
        let guard = self.state.lock().await;
        if guard.is_none() {
            return Ok(None);
        }

        let verdict = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluate(sample, now_s);

        if let Some(signal) = verdict {
            info!("Intervention raised: {signal:?} ({})", sample.app_name);
            self.bus.publish(BridgeEvent::Intervention(signal));
        }
        Ok(verdict)
    }

    pub async fn recent_sessions(
        &self,
        limit: usize,
    ) -> Result<Vec<CompletedSession>, AuthorityError> {
        self.db
            .list_completed_sessions(limit)
            .await
            .map_err(AuthorityError::internal)
    }

    pub async fn save_schedule(&self, schedule: &Schedule) -> Result<(), AuthorityError> {
        self.db
            .save_schedule(schedule)
            .await
            .map_err(AuthorityError::internal)
    }

    pub async fn active_schedules(&self) -> Result<Vec<Schedule>, AuthorityError> {
        self.db
            .list_active_schedules()
            .await
            .map_err(AuthorityError::internal)
    }

    pub async fn shutdown(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.token.cancel();
            if let Err(err) = ticker.handle.await {
                if !err.is_cancelled() {
                    error!("Ticker task failed: {err}");
                }
            }
        }
    }

    async fn spawn_ticker(&self, first_tick: Instant) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.token.cancel();
            previous.handle.abort();
        }

        let state = self.state.clone();
        let bus = self.bus.clone();
        let tick_interval = self.tick_interval;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first_tick, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                // Published under the lock so a concurrent end cannot be
                // overtaken by a stale elapsed value.
                let guard = state.lock().await;
                let elapsed = guard
                    .as_ref()
                    .map(|running| elapsed_secs(running.anchor))
                    .unwrap_or(0);
                log_debug!("tick {elapsed}");
                bus.publish(BridgeEvent::Tick(elapsed));
            }
        });

        *ticker_guard = Some(Ticker { token, handle });
    }

    fn reset_engine(&self) {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset(epoch_now());
    }
}

impl SessionAuthorityClient for SessionAuthority {
    async fn get_current_session(&self) -> Result<Option<SessionSnapshot>, AuthorityError> {
        Ok(self
            .state
            .lock()
            .await
            .as_ref()
            .map(|running| running.session.snapshot.clone()))
    }

    async fn start_session(
        &self,
        task_id: Option<String>,
        goal_duration_minutes: u32,
    ) -> Result<SessionSnapshot, AuthorityError> {
        if goal_duration_minutes == 0 {
            return Err(AuthorityError::InvalidRequest(
                "goal_duration_minutes must be greater than zero".into(),
            ));
        }

        let (snapshot, anchor) = {
            let mut guard = self.state.lock().await;
            if let Some(running) = guard.as_ref() {
                return Err(AuthorityError::Conflict {
                    active_session_id: running.session.session_id().to_string(),
                });
            }

            let session = ActiveSession {
                snapshot: SessionSnapshot {
                    session_id: Uuid::new_v4().to_string(),
                    task_id,
                    start_time_epoch_seconds: now_epoch_seconds(),
                },
                goal_duration_minutes,
            };

            self.db
                .save_active_session(&session)
                .await
                .map_err(AuthorityError::internal)?;

            let anchor = Instant::now();
            info!(
                "Session {} started (task: {:?}, goal: {} min)",
                session.session_id(),
                session.snapshot.task_id,
                goal_duration_minutes
            );
            self.bus.publish(BridgeEvent::SessionStarted(
                session.session_id().to_string(),
            ));
            let snapshot = session.snapshot.clone();
            *guard = Some(Running { session, anchor });
            (snapshot, anchor)
        };

        self.reset_engine();
        self.spawn_ticker(anchor + self.tick_interval).await;
        Ok(snapshot)
    }

    async fn end_session(&self, user_evaluation_score: u8) -> Result<(), AuthorityError> {
        if user_evaluation_score > MAX_EVALUATION_SCORE {
            return Err(AuthorityError::InvalidRequest(format!(
                "user_evaluation_score must be between 0 and {MAX_EVALUATION_SCORE}"
            )));
        }

        let completed = {
            let mut guard = self.state.lock().await;
            let Some(running) = guard.as_ref() else {
                return Err(AuthorityError::NotFound);
            };

            let completed = self
                .db
                .finish_session(&running.session, Utc::now(), user_evaluation_score)
                .await
                .map_err(AuthorityError::internal)?;

            *guard = None;
            self.bus.publish(BridgeEvent::Tick(0));
            completed
        };

        self.reset_engine();
        info!(
            "Session {} ended after {}s (score {})",
            completed.session_id,
            completed.duration_secs(),
            user_evaluation_score
        );
        Ok(())
    }

    async fn submit_feedback(&self, kind: FeedbackKind) -> Result<(), AuthorityError> {
        let session_id = self
            .state
            .lock()
            .await
            .as_ref()
            .map(|running| running.session.session_id().to_string());

        self.db
            .insert_feedback(kind, session_id, Utc::now())
            .await
            .map_err(AuthorityError::internal)?;
        info!("Feedback recorded: {}", kind.as_str());
        Ok(())
    }

    async fn hide_overlay(&self) -> Result<(), AuthorityError> {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .manual_reset();
        self.host
            .hide(WindowLabel::Overlay)
            .map_err(AuthorityError::internal)
    }
}

fn epoch_now() -> u64 {
    now_epoch_seconds().max(0) as u64
}

/// Rounded whole seconds since `anchor`, never below 1 while active.
fn elapsed_secs(anchor: Instant) -> u64 {
    let rounded = (anchor.elapsed().as_millis() + 500) / 1000;
    u64::try_from(rounded).unwrap_or(u64::MAX).max(1)
}

fn next_aligned_tick(anchor: Instant, tick_interval: Duration) -> Instant {
    let tick_ms = tick_interval.as_millis().max(1);
    let into_tick = anchor.elapsed().as_millis() % tick_ms;
    let wait_ms = u64::try_from(tick_ms - into_tick).unwrap_or(u64::MAX);
    Instant::now() + Duration::from_millis(wait_ms)
}
