use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something planned to happen as `scheduled` that may actually happen as
/// `actual` instead. Without a known actual value the two are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent<T> {
    scheduled: T,
    actual: T,
}

impl<T: Clone> ScheduledEvent<T> {
    pub fn new(scheduled: T) -> Self {
        Self {
            actual: scheduled.clone(),
            scheduled,
        }
    }

    /// Build an event whose actual value may be unknown.
    pub fn with_actual(scheduled: T, actual: Option<T>) -> Self {
        match actual {
            Some(actual) => Self { scheduled, actual },
            None => Self::new(scheduled),
        }
    }

    /// Build an event from two optional values; `None` if nothing was planned.
    pub fn from_options(scheduled: Option<T>, actual: Option<T>) -> Option<Self> {
        scheduled.map(|scheduled| Self::with_actual(scheduled, actual))
    }
}

impl<T> ScheduledEvent<T> {
    pub fn scheduled(&self) -> &T {
        &self.scheduled
    }

    pub fn actual(&self) -> &T {
        &self.actual
    }

    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> ScheduledEvent<U> {
        ScheduledEvent {
            scheduled: f(self.scheduled),
            actual: f(self.actual),
        }
    }
}

impl<T: PartialEq> ScheduledEvent<T> {
    /// Whether the actual value differs from the plan.
    pub fn is_changed(&self) -> bool {
        self.scheduled != self.actual
    }
}

impl ScheduledEvent<DateTime<Utc>> {
    /// How much later (or, if negative, earlier) than planned this happens.
    pub fn delay(&self) -> Duration {
        self.actual - self.scheduled
    }

    pub fn is_delayed(&self) -> bool {
        self.delay() > Duration::zero()
    }
}

impl<T: fmt::Display> fmt::Display for ScheduledEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.actual.fmt(f)
    }
}
