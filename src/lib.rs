pub mod authority;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod host;
pub mod intervention;
pub mod models;
pub mod settings;
pub mod surface;
pub mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use authority::{ScheduleMonitor, SessionAuthority};
use bus::EventBus;
use config::SyncConfig;
use db::Database;
use host::{HeadlessHost, InputMode, WindowHost, WindowLabel};
use intervention::{Attachment, InterventionDispatcher, LogNotifier};
use settings::SettingsStore;
use surface::{Surface, SurfaceKind, WidgetPresence};
use utils::time::SystemClock;

pub type AgentDispatcher = InterventionDispatcher<SessionAuthority, LogNotifier>;

/// Everything the headless agent keeps alive while it runs.
pub struct AppState {
    pub db: Database,
    pub bus: EventBus,
    pub host: Arc<HeadlessHost>,
    pub settings: Arc<SettingsStore>,
    pub authority: Arc<SessionAuthority>,
    pub dispatcher: Arc<AgentDispatcher>,
    pub main: Surface<SessionAuthority>,
    pub widget: Surface<SessionAuthority>,
    pub overlay: Surface<SessionAuthority>,
    attachment: Attachment,
    presence: WidgetPresence,
    schedules: ScheduleMonitor,
}

impl AppState {
    pub async fn start(config: &SyncConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        let db = Database::new(config.database_path())?;
        let settings = Arc::new(SettingsStore::new(config.settings_path())?);
        let bus = EventBus::new();
        let host = Arc::new(HeadlessHost::new());

        // Resumes a session the previous process left running.
        let authority = Arc::new(
            SessionAuthority::launch(db.clone(), bus.clone(), host.clone(), config).await?,
        );
        if let Some(session) = authority.current().await {
            warn!(
                "Resuming session {} from a previous run",
                session.session_id()
            );
        }

        let source = Arc::new(bus.clone());
        let main = Surface::mount(
            SurfaceKind::Main,
            authority.clone(),
            source.clone(),
            settings.clone(),
            config,
        )
        .await;
        let widget = Surface::mount(
            SurfaceKind::Widget,
            authority.clone(),
            source.clone(),
            settings.clone(),
            config,
        )
        .await;
        let overlay = Surface::mount(
            SurfaceKind::Overlay,
            authority.clone(),
            source.clone(),
            settings.clone(),
            config,
        )
        .await;

        host.show(WindowLabel::Main, InputMode::Capture)?;
        let presence =
            WidgetPresence::spawn(host.clone(), widget.watch(), config.widget_focus_cooldown);
        host.set_focus(WindowLabel::Main, true);

        let notifier = Arc::new(LogNotifier::default());
        let dispatcher = Arc::new(InterventionDispatcher::new(
            authority.clone(),
            notifier.clone(),
            host.clone(),
            config,
        ));
        let attachment = dispatcher
            .attach(&*source)
            .context("failed to attach intervention dispatcher")?;

        let schedules = ScheduleMonitor::spawn(
            authority.clone(),
            notifier,
            Arc::new(SystemClock),
            config.schedule_check_interval,
        );

        Ok(Self {
            db,
            bus,
            host,
            settings,
            authority,
            dispatcher,
            main,
            widget,
            overlay,
            attachment,
            presence,
            schedules,
        })
    }

    pub async fn shutdown(self) {
        let Self {
            authority,
            main,
            widget,
            overlay,
            attachment,
            presence,
            schedules,
            ..
        } = self;

        schedules.stop().await;
        attachment.detach();
        presence.stop();
        main.unmount();
        widget.unmount();
        overlay.unmount();
        authority.shutdown().await;
        info!("forcefocus stopped");
    }
}

pub fn run() -> Result<()> {
    let config = SyncConfig::from_env();

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    info!("forcefocus starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async move {
        let app = AppState::start(&config).await?;

        if let Some(minutes) = config.autostart_goal_minutes {
            match app.main.start_session(None, minutes).await {
                Ok(snapshot) => info!("Auto-started session {}", snapshot.session_id),
                Err(err) => warn!("Auto-start rejected: {err}"),
            }
        }

        let mut widget_view = app.widget.watch();
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut last_text = String::new();
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    if let Err(err) = signal {
                        warn!("Failed to listen for Ctrl-C: {err}");
                    }
                    break;
                }
                changed = widget_view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = widget_view.borrow_and_update().clone();
                    if view.timer_text != last_text {
                        if config.debug {
                            info!("widget {} (active: {})", view.timer_text, view.is_active);
                        } else {
                            debug!("widget {}", view.timer_text);
                        }
                        last_text = view.timer_text;
                    }
                }
            }
        }

        app.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
