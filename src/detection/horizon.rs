//! Booking-horizon discovery strategies.
//!
//! Each strategy answers "how far ahead can this venue currently be booked"
//! using whatever availability primitive its platform exposes: a direct
//! answer (OpenTable), a bounded calendar (Resy), or a small windowed oracle
//! that the adaptive probe search interrogates (SevenRooms).

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::adapters::{
    AdapterResult, CalendarAvailability, DirectAvailability, WindowedAvailability,
};

/// Window size of one probe, in days. Refining a boundary below this gives
/// no extra precision.
pub const PROBE_WINDOW_DAYS: i64 = 3;

/// Stride of the exponential-jump phase.
pub const JUMP_STRIDE_DAYS: i64 = 28;

/// No probing past this offset; horizons beyond it are reported as the last
/// probed bookable date.
pub const PROBE_CEILING_DAYS: i64 = 180;

/// Lookahead of the calendar-read strategy. Horizons past this cap are
/// under-reported; callers surface a signal when the answer saturates it.
pub const CALENDAR_LOOKAHEAD_DAYS: i64 = 90;

/// Party size used for every availability query.
pub const CANONICAL_PARTY_SIZE: u32 = 2;

/// Discovered booking horizon. Both fields are null when no bookable date
/// was found at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Horizon {
    pub opening_window_days: Option<i64>,
    pub last_available_date: Option<NaiveDate>,
}

impl Horizon {
    fn none() -> Self {
        Self::default()
    }

    fn at(last_bookable: NaiveDate, today: NaiveDate) -> Self {
        Self {
            opening_window_days: Some((last_bookable - today).num_days()),
            last_available_date: Some(last_bookable),
        }
    }

    pub fn is_known(&self) -> bool {
        self.last_available_date.is_some()
    }
}

/// Direct-read strategy: one availability query whose response states the
/// platform's maximum days-in-advance.
pub async fn direct_read(
    adapter: &dyn DirectAvailability,
    external_id: &str,
    today: NaiveDate,
) -> AdapterResult<Horizon> {
    // The queried date is arbitrary; the horizon comes from response metadata.
    let probe_date = today + Duration::days(7);
    let snapshot = adapter
        .availability(external_id, probe_date, CANONICAL_PARTY_SIZE)
        .await?;

    Ok(match snapshot.max_days_in_advance {
        Some(days) if days >= 0 => Horizon::at(today + Duration::days(days), today),
        _ => Horizon::none(),
    })
}

/// Calendar-read strategy: one calendar query over a bounded window; the
/// response states the last day with inventory.
pub async fn calendar_read(
    adapter: &dyn CalendarAvailability,
    external_id: &str,
    today: NaiveDate,
) -> AdapterResult<Horizon> {
    let end = today + Duration::days(CALENDAR_LOOKAHEAD_DAYS);
    let window = adapter
        .calendar(external_id, CANONICAL_PARTY_SIZE, today, end)
        .await?;

    Ok(match window.last_calendar_day {
        Some(day) if day >= today => Horizon::at(day, today),
        _ => Horizon::none(),
    })
}

/// Adaptive probe search for platforms whose only primitive is "does this
/// 3-day window contain a bookable slot".
///
/// Phase 1 jumps forward in 28-day strides while probes keep finding
/// bookable dates; phase 2 binary-searches the first empty gap down to probe
/// granularity. Converges in O(log horizon) probes, which is the point:
/// every probe is a rate-limited network round trip.
pub async fn probe_search(
    oracle: &dyn WindowedAvailability,
    external_id: &str,
    today: NaiveDate,
) -> AdapterResult<Horizon> {
    let mut last_bookable;
    let mut lo;
    let mut hi;

    match probe(oracle, external_id, today, JUMP_STRIDE_DAYS).await? {
        Some(found) => {
            last_bookable = found;
            lo = JUMP_STRIDE_DAYS;

            let mut offset = 2 * JUMP_STRIDE_DAYS;
            hi = loop {
                if offset > PROBE_CEILING_DAYS {
                    // Never saw an empty window: no boundary to refine.
                    debug!(external_id, %last_bookable, "probe search hit ceiling");
                    return Ok(Horizon::at(last_bookable, today));
                }
                match probe(oracle, external_id, today, offset).await? {
                    Some(found) => {
                        last_bookable = last_bookable.max(found);
                        lo = offset;
                        offset += JUMP_STRIDE_DAYS;
                    }
                    None => break offset,
                }
            };
        }
        None => {
            // The first jump found nothing; the venue may only be bookable
            // in the very near term.
            match probe(oracle, external_id, today, 0).await? {
                Some(found) => {
                    last_bookable = found;
                    lo = 0;
                    hi = JUMP_STRIDE_DAYS;
                }
                None => return Ok(Horizon::none()),
            }
        }
    }

    while hi - lo > PROBE_WINDOW_DAYS {
        let mid = lo + (hi - lo) / 2;
        match probe(oracle, external_id, today, mid).await? {
            Some(found) => {
                last_bookable = last_bookable.max(found);
                lo = mid;
            }
            None => hi = mid,
        }
    }

    debug!(external_id, %last_bookable, "probe search converged");
    Ok(Horizon::at(last_bookable, today))
}

/// Probe one window of `PROBE_WINDOW_DAYS` days starting at `today +
/// offset`, returning the latest date inside it with an instantly bookable
/// slot. Request-only slots never count.
async fn probe(
    oracle: &dyn WindowedAvailability,
    external_id: &str,
    today: NaiveDate,
    offset: i64,
) -> AdapterResult<Option<NaiveDate>> {
    let start = today + Duration::days(offset);
    let days = oracle
        .availability_window(
            external_id,
            start,
            PROBE_WINDOW_DAYS as u32,
            CANONICAL_PARTY_SIZE,
        )
        .await?;

    Ok(days
        .iter()
        .filter(|day| day.has_bookable_slot())
        .map(|day| day.date)
        .max())
}
