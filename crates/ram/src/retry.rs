use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::types::{LogStatus, Settlement};
use crate::error::RamError;

/// Decides what a failed attempt does to its event.
///
/// An event that failed `n` times before is on attempt `n + 1`. Once that
/// reaches `max_retry_time`, or the handler asked to stop, the event is
/// dropped. Otherwise `retry_count` becomes `n + 1` and the event is
/// rescheduled `delays[n + 1]` into the future. `delays[0]` is never used,
/// and the index equal to `max_retry_time` is the exhaustion boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retry_time: u32,
    delays: Vec<TimeDelta>,
}

impl RetryPolicy {
    /// `delay_minutes` must hold exactly `max_retry_time` entries.
    pub fn new(max_retry_time: u32, delay_minutes: &[u64]) -> Result<Self, RamError> {
        if max_retry_time == 0 {
            return Err(RamError::InvalidMaxRetryTime);
        }
        if delay_minutes.len() != max_retry_time as usize {
            return Err(RamError::RetryScheduleLength {
                expected: max_retry_time,
                actual: delay_minutes.len(),
            });
        }
        let delays = delay_minutes
            .iter()
            .map(|&minutes| {
                i64::try_from(minutes)
                    .ok()
                    .and_then(TimeDelta::try_minutes)
                    .ok_or(RamError::DurationOutOfRange {
                        field: "delay_time_when_retries",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            max_retry_time,
            delays,
        })
    }

    pub fn max_retry_time(&self) -> u32 {
        self.max_retry_time
    }

    pub fn on_failure(
        &self,
        retry_count: i32,
        stop_retry: bool,
        now: DateTime<Utc>,
    ) -> (LogStatus, Settlement) {
        let previous = u32::try_from(retry_count).unwrap_or(0);
        let attempts = previous.saturating_add(1);
        if stop_retry || attempts >= self.max_retry_time {
            return (LogStatus::FailAndDone, Settlement::Delete);
        }

        // attempts < max_retry_time == delays.len(), so `attempts` indexes a delay.
        let backoff = self.delays[attempts as usize];
        let want_to_send_after = now
            .checked_add_signed(backoff)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (
            LogStatus::FailAndRetry,
            Settlement::Reschedule {
                retry_count: i32::try_from(attempts).unwrap_or(i32::MAX),
                want_to_send_after,
            },
        )
    }
}
