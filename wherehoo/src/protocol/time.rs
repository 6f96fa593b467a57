//! Record validity windows expressed as offsets from session start.
//!
//! `BEG` and `END` carry six signed integers (years, months, days, hours,
//! minutes, seconds) that are applied, in that order, to the moment the
//! session was created.

use chrono::{DateTime, Months, NaiveDate, TimeDelta, Utc};
use thiserror::Error;

/// Errors from parsing or applying a time offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSpecError {
    #[error("expected 6 offsets, got {0}")]
    TokenCount(usize),

    #[error("invalid offset: {0}")]
    Parse(String),

    #[error("offset moves time out of range")]
    OutOfRange,
}

/// The default end of every interval, 9999-12-31T23:59:59Z.
pub fn far_future() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|n| n.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parses exactly six whitespace-separated signed integers.
pub fn parse_offsets(params: &str) -> Result<[i32; 6], TimeSpecError> {
    let tokens: Vec<&str> = params.split_whitespace().collect();
    if tokens.len() != 6 {
        return Err(TimeSpecError::TokenCount(tokens.len()));
    }
    let mut offsets = [0i32; 6];
    for (slot, token) in offsets.iter_mut().zip(tokens) {
        *slot = token
            .parse()
            .map_err(|_| TimeSpecError::Parse(token.to_string()))?;
    }
    Ok(offsets)
}

/// Applies `[years, months, days, hours, minutes, seconds]` to `base`.
///
/// Calendar fields go first so that month arithmetic clamps to the end of
/// the month the way a calendar would.
pub fn apply_offsets(base: DateTime<Utc>, offsets: [i32; 6]) -> Result<DateTime<Utc>, TimeSpecError> {
    let [years, months, days, hours, minutes, seconds] = offsets.map(i64::from);

    let total_months = years * 12 + months;
    let magnitude = u32::try_from(total_months.unsigned_abs()).map_err(|_| TimeSpecError::OutOfRange)?;
    let shifted = if total_months >= 0 {
        base.checked_add_months(Months::new(magnitude))
    } else {
        base.checked_sub_months(Months::new(magnitude))
    }
    .ok_or(TimeSpecError::OutOfRange)?;

    let delta = [
        TimeDelta::try_days(days),
        TimeDelta::try_hours(hours),
        TimeDelta::try_minutes(minutes),
        TimeDelta::try_seconds(seconds),
    ]
    .into_iter()
    .try_fold(TimeDelta::zero(), |acc, part| acc.checked_add(&part?))
    .ok_or(TimeSpecError::OutOfRange)?;

    shifted
        .checked_add_signed(delta)
        .ok_or(TimeSpecError::OutOfRange)
}

/// A validity window anchored at session start.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeInterval {
    base: DateTime<Utc>,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    begin_set: bool,
    end_set: bool,
}

impl TimeInterval {
    /// Interval from `base` to [`far_future`].
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            begin: base,
            end: far_future(),
            begin_set: false,
            end_set: false,
        }
    }

    pub fn base(&self) -> DateTime<Utc> {
        self.base
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn begin_is_set(&self) -> bool {
        self.begin_set
    }

    pub fn end_is_set(&self) -> bool {
        self.end_set
    }

    /// Sets the begin from a `BEG` parameter. Leaves the interval untouched
    /// on error.
    pub fn set_begin(&mut self, params: &str) -> Result<(), TimeSpecError> {
        self.begin = apply_offsets(self.base, parse_offsets(params)?)?;
        self.begin_set = true;
        Ok(())
    }

    /// Sets the end from an `END` parameter. Leaves the interval untouched
    /// on error.
    pub fn set_end(&mut self, params: &str) -> Result<(), TimeSpecError> {
        self.end = apply_offsets(self.base, parse_offsets(params)?)?;
        self.end_set = true;
        Ok(())
    }

    /// True if a record with this window may be inserted at `now`: it must
    /// begin before it ends and stay alive for at least `min_life`.
    pub fn complies_for_insert(&self, now: DateTime<Utc>, min_life: TimeDelta) -> bool {
        let earliest_end = now.checked_add_signed(min_life).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.begin < self.end && self.end >= earliest_end
    }
}
