//! Renewal-date rollover for recurring subscriptions.
//!
//! Pure date arithmetic with no store access. Nothing on the read path calls
//! it: whether reads should roll subscriptions forward is undecided, so the
//! caller decides when to apply a [`RenewalAction`].

use chrono::{DateTime, Months, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalAction {
    /// Renewal date is still in the future.
    Keep,
    /// Lapsed and not recurring.
    Expire,
    /// Lapsed and recurring: move to this date.
    Renew(DateTime<Utc>),
}

/// Adds one calendar month at a time until the date is strictly after `now`.
///
/// Each step clamps the day to the target month's length and the next step
/// starts from the clamped date, so Jan 31 rolls to Feb 28 and then Mar 28.
/// Returns `current` unchanged if it is already in the future.
pub fn next_renewal_date(current: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut next = current;
    while next <= now {
        match next.checked_add_months(Months::new(1)) {
            Some(d) => next = d,
            None => break,
        }
    }
    next
}

pub fn plan_renewal(renewal_date: DateTime<Utc>, recurring: bool, now: DateTime<Utc>) -> RenewalAction {
    if renewal_date > now {
        RenewalAction::Keep
    } else if recurring {
        RenewalAction::Renew(next_renewal_date(renewal_date, now))
    } else {
        RenewalAction::Expire
    }
}
