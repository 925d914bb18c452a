//! Kline intervals.

use crate::domain::error::RrsweepError;
use chrono::TimeDelta;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn duration(&self) -> TimeDelta {
        match self {
            Interval::FiveMinutes => TimeDelta::minutes(5),
            Interval::FifteenMinutes => TimeDelta::minutes(15),
            Interval::OneHour => TimeDelta::hours(1),
            Interval::FourHours => TimeDelta::hours(4),
            Interval::OneDay => TimeDelta::days(1),
        }
    }

    /// Intraday intervals below four hours take their trend filter from `higher`.
    pub fn needs_higher_timeframe(&self, higher: Interval) -> bool {
        self.duration() < higher.duration()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = RrsweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            other => Err(RrsweepError::InvalidInterval {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for interval in Interval::ALL {
            assert_eq!(interval.as_str().parse::<Interval>().unwrap(), interval);
        }
    }

    #[test]
    fn rejects_unknown_interval() {
        match "2h".parse::<Interval>() {
            Err(RrsweepError::InvalidInterval { value }) => assert_eq!(value, "2h"),
            other => panic!("expected InvalidInterval, got {other:?}"),
        }
    }

    #[test]
    fn intraday_intervals_need_four_hour_trend() {
        let higher = Interval::FourHours;
        assert!(Interval::FiveMinutes.needs_higher_timeframe(higher));
        assert!(Interval::FifteenMinutes.needs_higher_timeframe(higher));
        assert!(Interval::OneHour.needs_higher_timeframe(higher));
        assert!(!Interval::FourHours.needs_higher_timeframe(higher));
        assert!(!Interval::OneDay.needs_higher_timeframe(higher));
    }
}
