//! Local trigger time-of-day parsing.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};

/// A rule's local trigger time, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerTime(NaiveTime);

impl TriggerTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// Due from the trigger minute until the end of the local day.
    pub fn is_due(&self, local: NaiveTime) -> bool {
        local >= self.0
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl FromStr for TriggerTime {
    type Err = String;

    /// Accepts `"HH:MM"` and `"H:MM"` on a 24-hour clock.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (h, m) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("invalid trigger time '{trimmed}', expected HH:MM"))?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(format!("invalid trigger time '{trimmed}', expected HH:MM"));
        }
        let hour: u32 = h
            .parse()
            .map_err(|_| format!("invalid hour in trigger time '{trimmed}'"))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| format!("invalid minute in trigger time '{trimmed}'"))?;
        Self::new(hour, minute).ok_or_else(|| format!("trigger time '{trimmed}' is out of range"))
    }
}
