//! Reacts to `interventionSignal` broadcasts.
//!
//! A soft signal shows a click-through border and sends an OS notification.
//! A hard signal raises the overlay, which captures input until the user
//! answers it with feedback. Whatever happens to that feedback, the overlay
//! is closed exactly once, even if the caller of `resolve` goes away.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle, time};

use crate::{
    authority::SessionAuthorityClient,
    bus::{EventSource, Subscription},
    config::SyncConfig,
    error::AuthorityError,
    host::{InputMode, WindowHost, WindowLabel},
    models::{BridgeEvent, FeedbackKind, InterventionSignal, Topic},
};

use super::notifier::{Notice, Notifier, PermissionState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Alerting(Severity),
}

/// Who receives a pointer event while an alert is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Underlying,
    Overlay,
}

/// What a single signal ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Notified,
    /// Soft alert shown, but the OS notice was not delivered.
    NotificationSuppressed(AuthorityError),
    OverlayShown,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub feedback: Result<(), AuthorityError>,
    pub hidden: Result<(), AuthorityError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Unknown,
    Granted,
    Denied,
}

pub struct InterventionDispatcher<A, N> {
    authority: Arc<A>,
    notifier: Arc<N>,
    host: Arc<dyn WindowHost>,
    feedback_timeout: Duration,
    state: Mutex<AlertState>,
    permission: Mutex<Permission>,
    banner: Mutex<Option<AuthorityError>>,
    /// Serializes `handle` and `resolve` so a signal never lands halfway
    /// through closing the overlay.
    reaction: Arc<tokio::sync::Mutex<()>>,
}

impl<A, N> InterventionDispatcher<A, N>
where
    A: SessionAuthorityClient,
    N: Notifier,
{
    pub fn new(
        authority: Arc<A>,
        notifier: Arc<N>,
        host: Arc<dyn WindowHost>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            authority,
            notifier,
            host,
            feedback_timeout: config.feedback_timeout,
            state: Mutex::new(AlertState::Idle),
            permission: Mutex::new(Permission::Unknown),
            banner: Mutex::new(None),
            reaction: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn state(&self) -> AlertState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pointer_target(&self) -> PointerTarget {
        match self.state() {
            AlertState::Alerting(Severity::Hard) => PointerTarget::Overlay,
            AlertState::Idle | AlertState::Alerting(Severity::Soft) => PointerTarget::Underlying,
        }
    }

    /// Error to surface as a banner, if one is pending.
    pub fn banner(&self) -> Option<AuthorityError> {
        self.banner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn dismiss_banner(&self) {
        self.banner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub async fn handle(&self, signal: InterventionSignal) -> Reaction {
        let _serial = self.reaction.lock().await;

        match (self.state(), signal) {
            (AlertState::Alerting(Severity::Hard), InterventionSignal::Notification) => {
                log_info!("Notification ignored while the overlay is up");
                Reaction::Ignored
            }
            (_, InterventionSignal::Overlay) => self.raise_overlay(),
            (_, InterventionSignal::Notification) => self.notify().await,
        }
    }

    /// Answers the overlay. Feedback is best-effort and bounded by the
    /// configured timeout; `hide_overlay` is then called exactly once.
    ///
    /// Only one answer is accepted per overlay. Once accepted, the close runs
    /// on its own task and completes even if this future is dropped.
    pub async fn resolve(
        self: &Arc<Self>,
        kind: FeedbackKind,
    ) -> Result<ResolveOutcome, AuthorityError> {
        let serial = Arc::clone(&self.reaction).lock_owned().await;
        if self.state() != AlertState::Alerting(Severity::Hard) {
            return Err(AuthorityError::InvalidRequest(
                "no overlay is being shown".into(),
            ));
        }

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let _serial = serial;
            dispatcher.close_overlay(kind).await
        })
        .await
        .map_err(|err| AuthorityError::Internal(format!("overlay close task failed: {err}")))
    }

    /// Subscribes to intervention signals and processes them one at a time
    /// on a worker task. Dropping the attachment stops both.
    pub fn attach<S>(self: &Arc<Self>, source: &S) -> Result<Attachment, AuthorityError>
    where
        S: EventSource + ?Sized,
    {
        let runtime = Handle::try_current()
            .map_err(|_| AuthorityError::transport("no async runtime for the dispatcher"))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = source.subscribe(
            Topic::InterventionSignal,
            Box::new(move |event| {
                if let BridgeEvent::Intervention(signal) = event {
                    let _ = tx.send(*signal);
                }
            }),
        )?;

        let dispatcher = Arc::clone(self);
        let worker = runtime.spawn(async move {
            while let Some(signal) = rx.recv().await {
                let reaction = dispatcher.handle(signal).await;
                log_info!("Handled {signal:?}: {reaction:?}");
            }
        });

        Ok(Attachment {
            subscription: Some(subscription),
            worker,
        })
    }

    async fn close_overlay(&self, kind: FeedbackKind) -> ResolveOutcome {
        let feedback =
            match time::timeout(self.feedback_timeout, self.authority.submit_feedback(kind)).await
            {
                Ok(result) => result,
                Err(_) => Err(AuthorityError::transport(format!(
                    "feedback not acknowledged within {:?}",
                    self.feedback_timeout
                ))),
            };
        if let Err(err) = &feedback {
            log_warn!("Feedback {} failed: {err}", kind.as_str());
        }

        let hidden = self.authority.hide_overlay().await;
        if let Err(err) = &hidden {
            log_error!("hide_overlay failed: {err}; closing overlay locally");
            if let Err(local) = self.host.hide(WindowLabel::Overlay) {
                log_error!("Local overlay close failed: {local:#}");
            }
        }

        self.set_state(AlertState::Idle);
        ResolveOutcome { feedback, hidden }
    }

    fn raise_overlay(&self) -> Reaction {
        if let Err(err) = self.host.show(WindowLabel::Overlay, InputMode::Capture) {
            log_error!("Failed to show overlay: {err:#}");
        }
        self.set_state(AlertState::Alerting(Severity::Hard));
        Reaction::OverlayShown
    }

    async fn notify(&self) -> Reaction {
        self.set_state(AlertState::Alerting(Severity::Soft));
        if let Err(err) = self
            .host
            .show(WindowLabel::Indicator, InputMode::ClickThrough)
        {
            log_warn!("Failed to show indicator: {err:#}");
        }

        let reaction = match self.ensure_permission().await {
            Ok(()) => match self.notifier.send(Notice::distraction()).await {
                Ok(()) => Reaction::Notified,
                Err(err) => {
                    log_error!("Failed to send notification: {err:#}");
                    let err = AuthorityError::internal(err);
                    self.raise_banner(err.clone());
                    Reaction::NotificationSuppressed(err)
                }
            },
            Err(err) => Reaction::NotificationSuppressed(err),
        };

        if let Err(err) = self.host.hide(WindowLabel::Indicator) {
            log_warn!("Failed to hide indicator: {err:#}");
        }
        self.set_state(AlertState::Idle);
        reaction
    }

    async fn ensure_permission(&self) -> Result<(), AuthorityError> {
        let known = *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let resolved = match known {
            Permission::Granted => Permission::Granted,
            Permission::Denied => return Err(AuthorityError::PermissionDenied),
            Permission::Unknown => {
                if self.notifier.permission_granted().await {
                    Permission::Granted
                } else {
                    match self.notifier.request_permission().await {
                        PermissionState::Granted => Permission::Granted,
                        PermissionState::Denied => Permission::Denied,
                    }
                }
            }
        };

        *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = resolved;

        if resolved == Permission::Denied {
            log_warn!("Notification permission denied; soft alerts stay silent");
            self.raise_banner(AuthorityError::PermissionDenied);
            return Err(AuthorityError::PermissionDenied);
        }
        Ok(())
    }

    fn raise_banner(&self, err: AuthorityError) {
        *self.banner.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn set_state(&self, next: AlertState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Live link between a dispatcher and an event source.
pub struct Attachment {
    subscription: Option<Subscription>,
    worker: JoinHandle<()>,
}

impl Attachment {
    /// Same as dropping the attachment.
    pub fn detach(self) {}
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::EventBus,
        host::HeadlessHost,
        testing::{FeedbackBehavior, MockAuthority, ScriptedNotifier},
    };

    fn dispatcher(
        authority: Arc<MockAuthority>,
        notifier: Arc<ScriptedNotifier>,
        host: Arc<HeadlessHost>,
    ) -> Arc<InterventionDispatcher<MockAuthority, ScriptedNotifier>> {
        Arc::new(InterventionDispatcher::new(
            authority,
            notifier,
            host,
            &SyncConfig::default(),
        ))
    }

    #[tokio::test]
    async fn soft_alert_is_click_through_and_returns_to_idle() {
        let host = Arc::new(HeadlessHost::new());
        let notifier = Arc::new(ScriptedNotifier::new(true, true).gated());
        let d = dispatcher(Arc::new(MockAuthority::default()), notifier.clone(), host.clone());

        let running = {
            let d = d.clone();
            tokio::spawn(async move { d.handle(InterventionSignal::Notification).await })
        };

        notifier.entered.notified().await;
        assert_eq!(d.state(), AlertState::Alerting(Severity::Soft));
        assert_eq!(d.pointer_target(), PointerTarget::Underlying);
        assert_eq!(
            host.input_mode(WindowLabel::Indicator),
            Some(InputMode::ClickThrough)
        );

        notifier.release.notify_one();
        assert_eq!(running.await.unwrap(), Reaction::Notified);
        assert_eq!(d.state(), AlertState::Idle);
        assert!(!host.is_visible(WindowLabel::Indicator));
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn denied_permission_is_recorded_once_and_never_re_requested() {
        let host = Arc::new(HeadlessHost::new());
        let notifier = Arc::new(ScriptedNotifier::new(false, false));
        let d = dispatcher(Arc::new(MockAuthority::default()), notifier.clone(), host);

        assert_eq!(
            d.handle(InterventionSignal::Notification).await,
            Reaction::NotificationSuppressed(AuthorityError::PermissionDenied)
        );
        assert_eq!(d.banner(), Some(AuthorityError::PermissionDenied));
        d.dismiss_banner();

        assert_eq!(
            d.handle(InterventionSignal::Notification).await,
            Reaction::NotificationSuppressed(AuthorityError::PermissionDenied)
        );
        assert_eq!(notifier.requests.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(d.banner(), None);
        assert_eq!(notifier.sent_count(), 0);
        assert_eq!(d.state(), AlertState::Idle);
    }

    #[tokio::test]
    async fn missing_permission_is_requested_then_used() {
        let notifier = Arc::new(ScriptedNotifier::new(false, true));
        let d = dispatcher(
            Arc::new(MockAuthority::default()),
            notifier.clone(),
            Arc::new(HeadlessHost::new()),
        );

        assert_eq!(
            d.handle(InterventionSignal::Notification).await,
            Reaction::Notified
        );
        assert_eq!(
            d.handle(InterventionSignal::Notification).await,
            Reaction::Notified
        );
        assert_eq!(notifier.requests.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(notifier.sent_count(), 2);
    }

    #[tokio::test]
    async fn hard_alert_captures_input_and_ignores_soft_signals() {
        let host = Arc::new(HeadlessHost::new());
        let notifier = Arc::new(ScriptedNotifier::new(true, true));
        let d = dispatcher(Arc::new(MockAuthority::default()), notifier.clone(), host.clone());

        assert_eq!(
            d.handle(InterventionSignal::Overlay).await,
            Reaction::OverlayShown
        );
        assert_eq!(d.state(), AlertState::Alerting(Severity::Hard));
        assert_eq!(d.pointer_target(), PointerTarget::Overlay);
        assert_eq!(host.input_mode(WindowLabel::Overlay), Some(InputMode::Capture));

        assert_eq!(
            d.handle(InterventionSignal::Notification).await,
            Reaction::Ignored
        );
        assert_eq!(notifier.sent_count(), 0);
        assert!(!host.is_visible(WindowLabel::Indicator));

        host.hide(WindowLabel::Overlay).unwrap();
        assert_eq!(
            d.handle(InterventionSignal::Overlay).await,
            Reaction::OverlayShown
        );
        assert!(host.is_visible(WindowLabel::Overlay));
    }

    #[tokio::test]
    async fn failed_feedback_still_hides_overlay_once() {
        let authority = Arc::new(MockAuthority::default());
        *authority.feedback.lock().unwrap() =
            FeedbackBehavior::Fail(AuthorityError::transport("backend down"));
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            Arc::new(HeadlessHost::new()),
        );

        d.handle(InterventionSignal::Overlay).await;
        let outcome = d.resolve(FeedbackKind::IsWork).await.unwrap();

        assert_eq!(
            outcome.feedback,
            Err(AuthorityError::transport("backend down"))
        );
        assert_eq!(outcome.hidden, Ok(()));
        assert_eq!(authority.calls("submit_feedback"), 1);
        assert_eq!(authority.calls("hide_overlay"), 1);
        assert_eq!(d.state(), AlertState::Idle);
        assert_eq!(d.pointer_target(), PointerTarget::Underlying);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_feedback_times_out_then_hides() {
        let authority = Arc::new(MockAuthority::default());
        *authority.feedback.lock().unwrap() = FeedbackBehavior::Hang;
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            Arc::new(HeadlessHost::new()),
        );

        d.handle(InterventionSignal::Overlay).await;
        let outcome = d.resolve(FeedbackKind::DistractionIgnored).await.unwrap();

        assert!(matches!(outcome.feedback, Err(AuthorityError::Transport(_))));
        assert_eq!(authority.calls("hide_overlay"), 1);
        assert_eq!(d.state(), AlertState::Idle);
    }

    #[tokio::test]
    async fn resolve_without_overlay_is_rejected() {
        let authority = Arc::new(MockAuthority::default());
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            Arc::new(HeadlessHost::new()),
        );
        assert!(matches!(
            d.resolve(FeedbackKind::IsWork).await,
            Err(AuthorityError::InvalidRequest(_))
        ));
        assert_eq!(authority.calls("hide_overlay"), 0);
    }

    async fn settle(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never met");
    }

    fn hanging_authority(host: &Arc<HeadlessHost>) -> Arc<MockAuthority> {
        let authority = Arc::new(MockAuthority::hiding_on(host.clone()));
        *authority.feedback.lock().unwrap() = FeedbackBehavior::Hang;
        authority
    }

    #[tokio::test(start_paused = true)]
    async fn racing_answers_close_the_overlay_once() {
        let host = Arc::new(HeadlessHost::new());
        let authority = hanging_authority(&host);
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            host.clone(),
        );
        d.handle(InterventionSignal::Overlay).await;

        let (work, ignored) = tokio::join!(
            d.resolve(FeedbackKind::IsWork),
            d.resolve(FeedbackKind::DistractionIgnored)
        );
        assert_eq!(work.is_ok() as u8 + ignored.is_ok() as u8, 1);
        assert!(matches!(
            work.err().or(ignored.err()),
            Some(AuthorityError::InvalidRequest(_))
        ));
        assert_eq!(authority.calls("submit_feedback"), 1);
        assert_eq!(authority.calls("hide_overlay"), 1);
        assert!(!host.is_visible(WindowLabel::Overlay));
        assert_eq!(d.state(), AlertState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_answer_still_closes_the_overlay() {
        let host = Arc::new(HeadlessHost::new());
        let authority = hanging_authority(&host);
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            host.clone(),
        );
        d.handle(InterventionSignal::Overlay).await;

        let answering = {
            let d = d.clone();
            tokio::spawn(async move { d.resolve(FeedbackKind::IsWork).await })
        };
        settle(|| authority.calls("submit_feedback") == 1).await;
        answering.abort();

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(authority.calls("hide_overlay"), 1);
        assert!(!host.is_visible(WindowLabel::Overlay));
        assert_eq!(d.state(), AlertState::Idle);
        assert_eq!(d.pointer_target(), PointerTarget::Underlying);
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_raised_while_answering_stays_up() {
        let host = Arc::new(HeadlessHost::new());
        let authority = hanging_authority(&host);
        let d = dispatcher(
            authority.clone(),
            Arc::new(ScriptedNotifier::new(true, true)),
            host.clone(),
        );
        d.handle(InterventionSignal::Overlay).await;

        let answering = {
            let d = d.clone();
            tokio::spawn(async move { d.resolve(FeedbackKind::IsWork).await })
        };
        settle(|| authority.calls("submit_feedback") == 1).await;
        let raising = {
            let d = d.clone();
            tokio::spawn(async move { d.handle(InterventionSignal::Overlay).await })
        };

        let outcome = answering.await.unwrap().unwrap();
        assert_eq!(outcome.hidden, Ok(()));
        assert_eq!(raising.await.unwrap(), Reaction::OverlayShown);

        assert_eq!(d.state(), AlertState::Alerting(Severity::Hard));
        assert_eq!(d.pointer_target(), PointerTarget::Overlay);
        assert!(host.is_visible(WindowLabel::Overlay));
        assert_eq!(authority.calls("hide_overlay"), 1);
    }

    #[tokio::test]
    async fn attached_dispatcher_follows_the_bus_until_dropped() {
        let bus = EventBus::new();
        let host = Arc::new(HeadlessHost::new());
        let d = dispatcher(
            Arc::new(MockAuthority::default()),
            Arc::new(ScriptedNotifier::new(true, true)),
            host.clone(),
        );

        let attachment = d.attach(&bus).unwrap();
        bus.publish(BridgeEvent::Intervention(InterventionSignal::Overlay));
        for _ in 0..50 {
            if d.state() == AlertState::Alerting(Severity::Hard) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(d.state(), AlertState::Alerting(Severity::Hard));

        d.resolve(FeedbackKind::IsWork).await.unwrap();
        attachment.detach();

        bus.publish(BridgeEvent::Intervention(InterventionSignal::Overlay));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(d.state(), AlertState::Idle);
        assert_eq!(bus.receiver_count(), 0);
    }
}
