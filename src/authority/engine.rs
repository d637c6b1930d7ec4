//! Deviation scoring that decides when to nudge or block the user.

use crate::models::{ActivitySample, InterventionSignal};

const THRESHOLD_NOTIFICATION: u16 = 10;
const THRESHOLD_OVERLAY: u16 = 20;
const MAX_SCORE: u16 = 100;

const SCORE_DISTRACTION: u16 = 5;
const SCORE_IDLE_MILD: u16 = 3;
const SCORE_IDLE_SEVERE: u16 = 10;

const IDLE_MILD_S: u64 = 180;
const IDLE_SEVERE_S: u64 = 600;

/// One point of decay per this many productive seconds.
const DECAY_INTERVAL_S: u64 = 10;
const SNOOZE_S: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Escalation {
    None,
    Notified,
    Blocked,
}

#[derive(Debug)]
pub struct InterventionEngine {
    keywords: Vec<String>,
    score: u16,
    last_decay_s: u64,
    level: Escalation,
    last_intervention_s: u64,
}

impl InterventionEngine {
    pub fn new(keywords: &[String], now_s: u64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            score: 0,
            last_decay_s: now_s,
            level: Escalation::None,
            last_intervention_s: 0,
        }
    }

    pub fn score(&self) -> u16 {
        self.score
    }

    /// Fresh state for a new session. Keywords are kept.
    pub fn reset(&mut self, now_s: u64) {
        self.score = 0;
        self.last_decay_s = now_s;
        self.manual_reset();
    }

    /// The user answered an overlay: drop the escalation so it is not re-raised
    /// on the next sample. The score itself is untouched.
    pub fn manual_reset(&mut self) {
        self.level = Escalation::None;
        self.last_intervention_s = 0;
    }

    pub fn is_distraction(&self, sample: &ActivitySample) -> bool {
        let app = sample.app_name.to_lowercase();
        let title = sample.window_title.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| app.contains(keyword.as_str()) || title.contains(keyword.as_str()))
    }

    pub fn evaluate(&mut self, sample: &ActivitySample, now_s: u64) -> Option<InterventionSignal> {
        if !self.is_distraction(sample) {
            self.decay(now_s);
            return None;
        }

        let mut added = SCORE_DISTRACTION;
        if sample.idle_seconds >= IDLE_SEVERE_S {
            added += SCORE_IDLE_SEVERE;
        } else if sample.idle_seconds >= IDLE_MILD_S {
            added += SCORE_IDLE_MILD;
        }
        self.score = self.score.saturating_add(added).min(MAX_SCORE);
        self.last_decay_s = now_s;

        let snooze_over = now_s.saturating_sub(self.last_intervention_s) >= SNOOZE_S;

        let (signal, level) = if self.score >= THRESHOLD_OVERLAY {
            (InterventionSignal::Overlay, Escalation::Blocked)
        } else if self.score >= THRESHOLD_NOTIFICATION {
            (InterventionSignal::Notification, Escalation::Notified)
        } else {
            return None;
        };

        if self.level < level || snooze_over {
            self.level = level;
            self.last_intervention_s = now_s;
            Some(signal)
        } else {
            None
        }
    }

    fn decay(&mut self, now_s: u64) {
        if now_s.saturating_sub(self.last_decay_s) >= DECAY_INTERVAL_S {
            self.score = self.score.saturating_sub(1);
            self.last_decay_s = now_s;
        }

        if self.score < THRESHOLD_NOTIFICATION && self.level > Escalation::None {
            self.manual_reset();
        }
    }
}
