// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Calendar buckets used to pre-aggregate records by time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    /// Every period, smallest first.
    pub const ALL: [Period; 6] = [
        Period::Hour,
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::Year,
    ];

    /// Record field that holds the bucket start for this period.
    pub fn field_name(self) -> &'static str {
        match self {
            Period::Hour => "_hour_start_at",
            Period::Day => "_day_start_at",
            Period::Week => "_week_start_at",
            Period::Month => "_month_start_at",
            Period::Quarter => "_quarter_start_at",
            Period::Year => "_year_start_at",
        }
    }

    /// Start of the bucket enclosing `t`.
    pub fn value(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        match self {
            Period::Hour => {
                (date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(t.hour()))).and_utc()
            }
            Period::Day => midnight(date),
            Period::Week => {
                let back = u64::from(date.weekday().num_days_from_monday());
                midnight(date - Days::new(back))
            }
            Period::Month => midnight(month_start(date)),
            Period::Quarter => {
                let back = date.month0() % 3;
                midnight(month_start(date) - Months::new(back))
            }
            Period::Year => midnight(date - Days::new(u64::from(date.ordinal0()))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| format!("Period value not recognised {s}"))
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
