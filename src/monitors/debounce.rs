//! Per-channel debounce/cooldown state machine
//!
//! ```text
//! Normal:
//!   deviation <  threshold  → LeakEvaluation::Ok
//!   deviation >= threshold  → LeakEvaluation::StartsToLeak (emit one alert, → Alerting)
//!
//! Alerting / Cooldown:
//!   cooldown running        → LeakEvaluation::Suppressed (→ Cooldown)
//!   cooldown elapsed        → back to Normal unconditionally, then evaluated as Normal:
//!                               deviation >= threshold → StartsToLeak (re-alert)
//!                               deviation <  threshold → BackToNormal
//! ```
//!
//! A leak that never goes away therefore re-alerts exactly once per cooldown window.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Normal,
    Alerting,
    Cooldown,
}

impl ChannelState {
    pub fn is_alerting(self) -> bool {
        !matches!(self, ChannelState::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakEvaluation {
    Ok,
    StartsToLeak,
    Suppressed,
    BackToNormal,
}

impl LeakEvaluation {
    pub fn evaluate(
        state: ChannelState,
        deviation: f32,
        threshold: f32,
        since_alert: Option<Duration>,
        cooldown: Duration,
    ) -> LeakEvaluation {
        let exceeds = deviation >= threshold;

        if state.is_alerting() {
            let elapsed = since_alert.is_some_and(|since| since >= cooldown);
            if !elapsed {
                return LeakEvaluation::Suppressed;
            }

            // cooldown is over: the channel is Normal again before looking at the reading
            if exceeds {
                return LeakEvaluation::StartsToLeak;
            }
            return LeakEvaluation::BackToNormal;
        }

        if exceeds {
            return LeakEvaluation::StartsToLeak;
        }

        LeakEvaluation::Ok
    }
}

/// Debounce state for one sensor channel
#[derive(Debug, Clone)]
pub struct LeakDebouncer {
    threshold: f32,
    cooldown: Duration,
    state: ChannelState,
    alerted_at: Option<Instant>,
}

impl LeakDebouncer {
    pub fn new(threshold: f32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: ChannelState::Normal,
            alerted_at: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one deviation sample taken at `now`
    pub fn update(&mut self, deviation: f32, now: Instant) -> LeakEvaluation {
        let since_alert = self
            .alerted_at
            .map(|at| now.saturating_duration_since(at));

        let evaluation = LeakEvaluation::evaluate(
            self.state,
            deviation,
            self.threshold,
            since_alert,
            self.cooldown,
        );

        match evaluation {
            LeakEvaluation::Ok => {}
            LeakEvaluation::StartsToLeak => {
                self.state = ChannelState::Alerting;
                self.alerted_at = Some(now);
            }
            LeakEvaluation::Suppressed => {
                self.state = ChannelState::Cooldown;
            }
            LeakEvaluation::BackToNormal => {
                self.state = ChannelState::Normal;
                self.alerted_at = None;
            }
        }

        evaluation
    }

    /// Drop any alert/cooldown state, used after recalibration
    pub fn reset(&mut self) {
        self.state = ChannelState::Normal;
        self.alerted_at = None;
    }
}
