use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::trace;

use crate::config::ClickSettings;
use crate::domain::LatLng;

/// A raw pointer click on the map canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    pub at: DateTime<Utc>,
    pub location: LatLng,
    /// Set when the click was synthesised by pressing enter in a focused form
    pub keyboard_submit: bool,
}

impl ClickEvent {
    pub const fn new(at: DateTime<Utc>, location: LatLng) -> Self {
        Self {
            at,
            location,
            keyboard_submit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickState {
    Idle,
    PendingSingle(DateTime<Utc>),
}

/// Snapshot of a click waiting for its disambiguation delay. The host
/// schedules a timer for `delay` and hands the snapshot back to `settle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingClick {
    pub clicked_at: DateTime<Utc>,
    pub location: LatLng,
    pub delay: Duration,
    generation: u64,
}

impl PendingClick {
    /// Whether the disambiguation delay has run out at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        TimeDelta::from_std(self.delay)
            .ok()
            .and_then(|delay| self.clicked_at.checked_add_signed(delay))
            .is_some_and(|due| now >= due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickOutcome {
    /// Enter pressed inside a form; not a pointer gesture at all
    KeyboardSubmit,
    /// Echo of an interaction that just happened
    Duplicate,
    Pending(PendingClick),
}

/// Turns raw click and double-click events into at most one resolved gesture.
///
/// A pending click is never cancelled. Any newer click, double click or
/// interaction bumps the generation, and `settle` refuses snapshots from an
/// older generation.
#[derive(Debug)]
pub struct ClickDisambiguator {
    state: ClickState,
    last_event: Option<DateTime<Utc>>,
    generation: u64,
    duplicate_window: TimeDelta,
    delay: Duration,
}

impl ClickDisambiguator {
    pub fn new(settings: &ClickSettings) -> Self {
        let duplicate_window =
            TimeDelta::from_std(settings.duplicate_window()).unwrap_or(TimeDelta::MAX);

        Self {
            state: ClickState::Idle,
            last_event: None,
            generation: 0,
            duplicate_window,
            delay: settings.single_click_delay(),
        }
    }

    pub const fn state(&self) -> ClickState {
        self.state
    }

    pub const fn last_event(&self) -> Option<DateTime<Utc>> {
        self.last_event
    }

    pub fn on_click(&mut self, event: &ClickEvent) -> ClickOutcome {
        if event.keyboard_submit {
            return ClickOutcome::KeyboardSubmit;
        }

        if let Some(last) = self.last_event {
            let floor = event.at.checked_sub_signed(self.duplicate_window);
            if floor.map_or(true, |floor| last > floor) {
                trace!(at = %event.at, last = %last, "swallowed duplicate click");
                return ClickOutcome::Duplicate;
            }
        }

        self.last_event = Some(event.at);
        self.generation += 1;
        self.state = ClickState::PendingSingle(event.at);

        ClickOutcome::Pending(PendingClick {
            clicked_at: event.at,
            location: event.location,
            delay: self.delay,
            generation: self.generation,
        })
    }

    /// Neutralises any pending single click
    pub fn on_double_click(&mut self) {
        self.last_event = None;
        self.supersede();
    }

    /// Records a popup opening or a resolved gesture at `now`. Clicks echoing
    /// it are swallowed, and a click still waiting to settle is superseded.
    pub fn mark_interaction(&mut self, now: DateTime<Utc>) {
        self.last_event = Some(now);
        self.supersede();
    }

    /// Claims the resolution of `pending`. Returns false when anything newer
    /// happened since it was scheduled, or when its delay has not run out
    /// yet at `now`; the caller must then do nothing. An early attempt leaves
    /// the click pending.
    pub fn settle(&mut self, pending: &PendingClick, now: DateTime<Utc>) -> bool {
        if !pending.is_due(now) {
            trace!(clicked_at = %pending.clicked_at, %now, "click is not due yet");
            return false;
        }

        let current = pending.generation == self.generation
            && self.state == ClickState::PendingSingle(pending.clicked_at);

        if current {
            self.state = ClickState::Idle;
        } else {
            trace!(clicked_at = %pending.clicked_at, "dropped stale click");
        }

        current
    }

    fn supersede(&mut self) {
        self.generation += 1;
        self.state = ClickState::Idle;
    }
}
