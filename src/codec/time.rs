use std::time::Duration;

use serde::Serialize;

/// A race time in milliseconds. `-1` stands for "no time".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeInt(pub i32);

impl TimeInt {
    /// The "no time" marker.
    pub const NONE: Self = Self(-1);

    /// The time as a [`Duration`], or `None` for negative values.
    pub fn duration(self) -> Option<Duration> {
        u64::try_from(self.0).ok().map(Duration::from_millis)
    }
}

impl Default for TimeInt {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<Duration> for TimeInt {
    fn from(d: Duration) -> Self {
        Self(i32::try_from(d.as_millis()).unwrap_or(i32::MAX))
    }
}

/// A duration in seconds stored as a float. Negative values mean "none".
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TimeSingle(pub f32);

impl TimeSingle {
    /// The "no time" marker.
    pub const NONE: Self = Self(-1.0);

    /// The time as a [`Duration`], or `None` for negative or non-finite values.
    pub fn duration(self) -> Option<Duration> {
        Duration::try_from_secs_f32(self.0).ok()
    }
}

impl Default for TimeSingle {
    fn default() -> Self {
        Self::NONE
    }
}
