use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    authority::SessionAuthorityClient,
    bus::{EventSource, Subscription},
    config::SyncConfig,
    error::AuthorityError,
    models::{BridgeEvent, SessionSnapshot, Topic},
    settings::SettingsStore,
    utils::time::now_epoch_millis,
};

use super::state::{Command, SurfaceAction, SurfaceKind, SurfaceState, SurfaceView};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// State plus the channel renderers watch. Shared with subscription handlers.
struct Shared {
    state: Mutex<SurfaceState>,
    view_tx: watch::Sender<SurfaceView>,
    settings: Arc<SettingsStore>,
}

impl Shared {
    fn apply(&self, action: SurfaceAction) {
        let view = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.reduce(action);
            state.view()
        };
        self.view_tx.send_replace(view);
    }

    fn on_event(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Tick(elapsed) => self.apply(SurfaceAction::Tick(*elapsed)),
            BridgeEvent::SessionStarted(marker) => {
                self.apply(SurfaceAction::SessionAnnounced(marker.clone()));
                if let Err(err) = self.settings.set_logged_in(true) {
                    log_error!("Failed to persist login flag: {err:#}");
                }
            }
            BridgeEvent::Intervention(_) => {}
        }
    }
}

#[derive(Default)]
struct Links {
    subscriptions: Vec<Subscription>,
    closed: bool,
}

struct Retry {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One mounted presentation surface (main window, widget or overlay).
pub struct Surface<A> {
    kind: SurfaceKind,
    authority: Arc<A>,
    shared: Arc<Shared>,
    links: Arc<Mutex<Links>>,
    retry: Option<Retry>,
}

impl<A: SessionAuthorityClient> Surface<A> {
    /// Pulls the current session once, then subscribes to ticks and session
    /// announcements. A failed subscription shows a banner and is retried in
    /// the background.
    pub async fn mount<S>(
        kind: SurfaceKind,
        authority: Arc<A>,
        source: Arc<S>,
        settings: Arc<SettingsStore>,
        config: &SyncConfig,
    ) -> Self
    where
        S: EventSource + ?Sized + 'static,
    {
        let initial = SurfaceState::init(kind, &settings.preferences());
        let (view_tx, _) = watch::channel(initial.view());
        let shared = Arc::new(Shared {
            state: Mutex::new(initial),
            view_tx,
            settings,
        });

        match authority.get_current_session().await {
            Ok(snapshot) => shared.apply(SurfaceAction::Seeded {
                snapshot,
                now_epoch_ms: now_epoch_millis(),
            }),
            Err(error) => {
                log_warn!("{} surface could not load session: {error}", kind.as_str());
                shared.apply(SurfaceAction::CommandFailed {
                    command: Command::Load,
                    error,
                });
            }
        }

        let links = Arc::new(Mutex::new(Links::default()));
        let mut surface = Self {
            kind,
            authority,
            shared,
            links,
            retry: None,
        };

        match subscribe_all(&*source, &surface.shared) {
            Ok(subscriptions) => {
                lock(&surface.links).subscriptions = subscriptions;
            }
            Err(error) => {
                log_warn!(
                    "{} surface subscription failed: {error}; retrying every {:?}",
                    kind.as_str(),
                    config.subscribe_retry_interval
                );
                surface
                    .shared
                    .apply(SurfaceAction::SubscriptionFailed(error));
                surface.retry = Some(spawn_retry(
                    kind,
                    source,
                    surface.shared.clone(),
                    surface.links.clone(),
                    config.subscribe_retry_interval,
                ));
            }
        }

        log_info!("{} surface mounted", kind.as_str());
        surface
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn view(&self) -> SurfaceView {
        self.shared.view_tx.borrow().clone()
    }

    /// Receiver that sees every new view.
    pub fn watch(&self) -> watch::Receiver<SurfaceView> {
        self.shared.view_tx.subscribe()
    }

    pub fn is_subscribed(&self) -> bool {
        !lock(&self.links).subscriptions.is_empty()
    }

    /// Asks the authority to start. The display changes only when the
    /// resulting ticks arrive.
    pub async fn start_session(
        &self,
        task_id: Option<String>,
        goal_duration_minutes: u32,
    ) -> Result<SessionSnapshot, AuthorityError> {
        let result = self
            .authority
            .start_session(task_id, goal_duration_minutes)
            .await;
        match &result {
            Ok(_) => self.shared.apply(SurfaceAction::StartAccepted),
            Err(error) => self.shared.apply(SurfaceAction::CommandFailed {
                command: Command::Start,
                error: error.clone(),
            }),
        }
        result
    }

    pub async fn end_session(&self, user_evaluation_score: u8) -> Result<(), AuthorityError> {
        let result = self.authority.end_session(user_evaluation_score).await;
        match &result {
            Ok(()) => self.shared.apply(SurfaceAction::EndAccepted),
            Err(error) => self.shared.apply(SurfaceAction::CommandFailed {
                command: Command::End,
                error: error.clone(),
            }),
        }
        result
    }

    pub fn toggle_theme(&self) {
        self.shared.apply(SurfaceAction::ThemeToggled);
        let theme = lock(&self.shared.state).theme();
        if let Err(err) = self.shared.settings.set_theme(theme) {
            log_error!("Failed to persist theme: {err:#}");
            self.shared.apply(SurfaceAction::CommandFailed {
                command: Command::SavePreferences,
                error: AuthorityError::internal(err),
            });
        }
    }

    pub fn dismiss_message(&self) {
        self.shared.apply(SurfaceAction::DismissMessage);
    }

    pub fn unmount(mut self) {
        self.teardown();
    }
}

impl<A> Surface<A> {
    /// Releases every subscription and stops the retry task. Runs once.
    fn teardown(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.token.cancel();
            retry.handle.abort();
        }

        let subscriptions = {
            let mut links = lock(&self.links);
            if links.closed {
                return;
            }
            links.closed = true;
            std::mem::take(&mut links.subscriptions)
        };
        for subscription in subscriptions {
            subscription.cancel();
        }
        log_info!("{} surface unmounted", self.kind.as_str());
    }
}

impl<A> Drop for Surface<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn subscribe_all<S>(source: &S, shared: &Arc<Shared>) -> Result<Vec<Subscription>, AuthorityError>
where
    S: EventSource + ?Sized,
{
    [Topic::SessionTick, Topic::SessionStarted]
        .into_iter()
        .map(|topic| {
            let shared = Arc::clone(shared);
            source.subscribe(topic, Box::new(move |event| shared.on_event(event)))
        })
        .collect()
}

fn spawn_retry<S>(
    kind: SurfaceKind,
    source: Arc<S>,
    shared: Arc<Shared>,
    links: Arc<Mutex<Links>>,
    every: Duration,
) -> Retry
where
    S: EventSource + ?Sized + 'static,
{
    let token = CancellationToken::new();
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = interval.tick() => {}
            }

            match subscribe_all(&*source, &shared) {
                Ok(subscriptions) => {
                    {
                        let mut guard = lock(&links);
                        if guard.closed {
                            return;
                        }
                        guard.subscriptions = subscriptions;
                    }
                    shared.apply(SurfaceAction::SubscriptionRestored);
                    log_info!("{} surface subscribed after retry", kind.as_str());
                    return;
                }
                Err(error) => {
                    log_warn!("{} surface retry failed: {error}", kind.as_str());
                    shared.apply(SurfaceAction::SubscriptionFailed(error));
                }
            }
        }
    });

    Retry { token, handle }
}
