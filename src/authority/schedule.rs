//! Starts focus sessions from recurring schedules.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use log::{error, info};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AuthorityError,
    intervention::{Notice, Notifier},
    models::SessionSnapshot,
    utils::time::Clock,
};

use super::{client::SessionAuthorityClient, service::SessionAuthority};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Schedule id plus the local minute it fired in.
type FiredSlot = (String, NaiveDate, u32, u32);

/// Background task checking schedules on a fixed cadence.
pub struct ScheduleMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
    checks: watch::Receiver<u64>,
}

impl ScheduleMonitor {
    pub fn spawn<N: Notifier>(
        authority: Arc<SessionAuthority>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        every: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let (checks_tx, checks) = watch::channel(0u64);

        let handle = tokio::spawn(async move {
            let mut fired = HashSet::new();
            let mut interval = time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Schedule monitor started (every {every:?})");

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let now = clock.local_now();
                match start_due_schedule(&authority, &*notifier, now, &mut fired).await {
                    Ok(Some(snapshot)) => {
                        info!("Schedule started session {}", snapshot.session_id)
                    }
                    Ok(None) => {}
                    Err(err) => error!("Schedule check failed: {err}"),
                }
                checks_tx.send_modify(|count| *count += 1);
            }
        });

        Self {
            token,
            handle,
            checks,
        }
    }

    /// Counts completed checks.
    pub fn checks(&self) -> watch::Receiver<u64> {
        self.checks.clone()
    }

    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            if !err.is_cancelled() {
                error!("Schedule monitor failed: {err}");
            }
        }
    }
}

/// Starts the first schedule due at `now`, unless a session is already
/// running. Each schedule fires at most once per minute.
async fn start_due_schedule<N: Notifier>(
    authority: &SessionAuthority,
    notifier: &N,
    now: NaiveDateTime,
    fired: &mut HashSet<FiredSlot>,
) -> Result<Option<SessionSnapshot>, AuthorityError> {
    fired.retain(|(_, date, _, _)| *date == now.date());

    let due = authority
        .active_schedules()
        .await?
        .into_iter()
        .filter(|schedule| schedule.is_due(now));

    for schedule in due {
        let slot = (schedule.id.clone(), now.date(), now.hour(), now.minute());
        if fired.contains(&slot) {
            continue;
        }

        let started = authority
            .start_session(schedule.task_id.clone(), schedule.goal_duration_minutes())
            .await;
        let snapshot = match started {
            Ok(snapshot) => snapshot,
            Err(AuthorityError::Conflict { active_session_id }) => {
                log_info!(
                    "Schedule '{}' skipped: session {active_session_id} already running",
                    schedule.name
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        fired.insert(slot);

        if notifier.permission_granted().await {
            if let Err(err) = notifier.send(Notice::schedule_started(&schedule.name)).await {
                log_warn!("Failed to announce schedule '{}': {err:#}", schedule.name);
            }
        }
        return Ok(Some(snapshot));
    }

    Ok(None)
}
