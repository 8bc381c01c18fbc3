use std::fmt::Display;

use chrono::{Datelike as _, Months, NaiveDate};
use thiserror::Error;

use crate::jobs::Job;

/// An inclusive range of calendar days covering one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    /// The first day of the month.
    pub start: NaiveDate,
    /// The last day of the month.
    pub end: NaiveDate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonthError {
    #[error("invalid month \"{0}\". Use a month number (1-12) or '%Y-%m'")]
    Unrecognized(String),
    #[error("month {0} is out of range")]
    OutOfRange(u32),
}

impl ReportPeriod {
    /// The period covering the given month, or `None` if `month` is not in
    /// 1..=12 or the year is out of chrono's range.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        // day 1 of the next month, minus a day
        let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
        Some(Self { start, end })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self::month(date.year(), date.month())
            .expect("the month of a valid date should be a valid period")
    }

    /// Resolves a month selection relative to `today`.
    ///
    /// With no selection, this is the month containing `today`. A bare month
    /// number means that month of the current year, unless it has not
    /// happened yet, in which case it means that month of last year. A
    /// `%Y-%m` selection is taken literally.
    pub fn resolve(selection: Option<&str>, today: NaiveDate) -> Result<Self, MonthError> {
        let Some(selection) = selection.map(str::trim) else {
            return Ok(Self::containing(today));
        };

        if let Some((year, month)) = selection.split_once('-') {
            let parsed = year.parse::<i32>().ok().zip(month.parse::<u32>().ok());
            let Some((year, month)) = parsed else {
                return Err(MonthError::Unrecognized(selection.to_owned()));
            };
            return Self::month(year, month).ok_or(MonthError::OutOfRange(month));
        }

        let month: u32 =
            selection.parse().map_err(|_| MonthError::Unrecognized(selection.to_owned()))?;
        let year = if month > today.month() { today.year() - 1 } else { today.year() };
        Self::month(year, month).ok_or(MonthError::OutOfRange(month))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month_number(&self) -> u32 {
        self.start.month()
    }

    /// The full English name of the month, e.g. "January".
    pub fn month_name(&self) -> String {
        self.start.format("%B").to_string()
    }
}

impl Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Keeps the jobs scheduled to start within `period`. Jobs without a
/// scheduled start are always kept, since there is no way to place them.
pub fn filter_by_period(jobs: impl IntoIterator<Item = Job>, period: &ReportPeriod) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| job.scheduled_start.map_or(true, |start| period.contains(start)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{test_support::job, JobType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_bounds() {
        let jan = ReportPeriod::month(2026, 1).unwrap();
        assert_eq!((jan.start, jan.end), (date(2026, 1, 1), date(2026, 1, 31)));

        let dec = ReportPeriod::month(2025, 12).unwrap();
        assert_eq!((dec.start, dec.end), (date(2025, 12, 1), date(2025, 12, 31)));

        let leap_feb = ReportPeriod::month(2028, 2).unwrap();
        assert_eq!(leap_feb.end, date(2028, 2, 29));

        assert_eq!(ReportPeriod::month(2026, 13), None);
        assert_eq!(ReportPeriod::month(2026, 0), None);
    }

    #[test]
    fn resolving_month_selections() {
        let today = date(2026, 3, 15);
        assert_eq!(ReportPeriod::resolve(None, today), Ok(ReportPeriod::month(2026, 3).unwrap()));
        assert_eq!(
            ReportPeriod::resolve(Some("1"), today),
            Ok(ReportPeriod::month(2026, 1).unwrap())
        );
        // a month that has not happened yet this year refers to last year
        assert_eq!(
            ReportPeriod::resolve(Some("11"), today),
            Ok(ReportPeriod::month(2025, 11).unwrap())
        );
        assert_eq!(
            ReportPeriod::resolve(Some("2024-12"), today),
            Ok(ReportPeriod::month(2024, 12).unwrap())
        );
        assert_eq!(ReportPeriod::resolve(Some("13"), today), Err(MonthError::OutOfRange(13)));
        assert_eq!(
            ReportPeriod::resolve(Some("march"), today),
            Err(MonthError::Unrecognized("march".to_owned()))
        );
    }

    #[test]
    fn filter_is_inclusive_and_keeps_undated_jobs() {
        let period = ReportPeriod::month(2026, 1).unwrap();
        let mut jobs = Vec::new();
        for (number, start) in [
            ("first", Some(date(2026, 1, 1))),
            ("last", Some(date(2026, 1, 31))),
            ("next", Some(date(2026, 2, 1))),
            ("before", Some(date(2025, 12, 31))),
            ("undated", None),
        ] {
            let mut j = job(number, JobType::Enhancement, 0, 0);
            j.scheduled_start = start;
            jobs.push(j);
        }

        let kept: Vec<_> =
            filter_by_period(jobs, &period).into_iter().map(|j| j.job_number).collect();
        assert_eq!(kept, ["first", "last", "undated"]);
    }

    #[test]
    fn month_names() {
        assert_eq!(ReportPeriod::month(2026, 1).unwrap().month_name(), "January");
        assert_eq!(ReportPeriod::month(2026, 1).unwrap().to_string(), "2026-01-01 to 2026-01-31");
    }
}
