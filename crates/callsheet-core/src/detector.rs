use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, trace};

use crate::datetime::format_us_locale;
use crate::record::ScheduledCallRecord;

pub const DEFAULT_LOOKAHEAD_MS: i64 = 60_000;

/// A record whose call falls inside the lookahead window, with the
/// rendered popup text. The text doubles as the dedup key.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReminder {
    pub message: String,
    pub customer: ScheduledCallRecord,
}

#[derive(Debug, Clone, Copy)]
pub struct Detector {
    lookahead: Duration,
    timezone: Tz,
}

impl Detector {
    pub fn new(lookahead: Duration, timezone: Tz) -> Self {
        Self {
            lookahead,
            timezone,
        }
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    /// Records are kept when `0 < scheduled - now <= lookahead`, in input
    /// order. Records without a usable `scheduled_at` are skipped.
    #[tracing::instrument(skip(self, records), fields(records = records.len()))]
    pub fn detect(&self, records: &[ScheduledCallRecord], now: DateTime<Utc>) -> Vec<DueReminder> {
        let mut due = Vec::new();

        for record in records {
            let Some(scheduled) = record.scheduled_time(&self.timezone) else {
                trace!(
                    identifier = ?record.identifier,
                    scheduled_at = ?record.scheduled_at,
                    "skipping record without parseable scheduled_at"
                );
                continue;
            };

            let delta = scheduled - now;
            if delta <= Duration::zero() || delta > self.lookahead {
                continue;
            }

            due.push(DueReminder {
                message: self.message_for(record, scheduled),
                customer: record.clone(),
            });
        }

        debug!(due = due.len(), "detected reminders inside lookahead window");
        due
    }

    pub fn message_for(&self, record: &ScheduledCallRecord, scheduled: DateTime<Utc>) -> String {
        format!(
            "Call scheduled for {} at {}",
            record.display_name(),
            format_us_locale(scheduled, &self.timezone)
        )
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(
            Duration::milliseconds(DEFAULT_LOOKAHEAD_MS),
            *crate::datetime::display_timezone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn record(first: &str, last: &str, scheduled_at: &str) -> ScheduledCallRecord {
        ScheduledCallRecord {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            phone_no: Some("9000000001".to_string()),
            scheduled_at: Some(scheduled_at.to_string()),
            ..ScheduledCallRecord::default()
        }
    }

    fn detector() -> Detector {
        Detector::new(Duration::milliseconds(DEFAULT_LOOKAHEAD_MS), chrono_tz::UTC)
    }

    #[test]
    fn flags_record_inside_window() {
        let due = detector().detect(&[record("Asha", "Rao", "2025-01-15T12:00:30Z")], noon());

        assert_eq!(due.len(), 1);
        assert_eq!(
            due[0].message,
            "Call scheduled for Asha Rao at 1/15/2025, 12:00:30 PM"
        );
    }

    #[test]
    fn window_is_open_at_now_and_closed_at_lookahead() {
        let records = [
            record("At", "Now", "2025-01-15T12:00:00Z"),
            record("Edge", "Lookahead", "2025-01-15T12:01:00Z"),
            record("Just", "Past", "2025-01-15T12:01:00.001Z"),
            record("Already", "Gone", "2025-01-15T11:59:59Z"),
            record("Far", "Future", "2025-01-15T12:01:30Z"),
        ];

        let due = detector().detect(&records, noon());

        let names: Vec<_> = due.iter().map(|d| d.customer.display_name()).collect();
        assert_eq!(names, vec!["Edge Lookahead".to_string()]);
    }

    #[test]
    fn wider_lookahead_widens_the_window() {
        let wide = Detector::new(Duration::minutes(5), chrono_tz::UTC);
        let records = [record("Far", "Future", "2025-01-15T12:01:30Z")];

        assert_eq!(wide.lookahead(), Duration::seconds(300));
        assert_eq!(wide.detect(&records, noon()).len(), 1);
        assert!(detector().detect(&records, noon()).is_empty());
    }

    #[test]
    fn malformed_records_do_not_block_others() {
        let mut no_time = record("No", "Time", "");
        no_time.scheduled_at = None;
        let records = [
            record("Bad", "Stamp", "not a date"),
            no_time,
            record("Good", "One", "2025-01-15T12:00:10Z"),
            record("Good", "Two", "2025-01-15T12:00:20Z"),
        ];

        let due = detector().detect(&records, noon());

        let messages: Vec<_> = due.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Call scheduled for Good One at 1/15/2025, 12:00:10 PM",
                "Call scheduled for Good Two at 1/15/2025, 12:00:20 PM",
            ]
        );
    }

    #[test]
    fn identical_name_and_time_yield_identical_message() {
        let mut a = record("Asha", "Rao", "2025-01-15T12:00:30Z");
        let mut b = record("Asha", "Rao", "2025-01-15T17:30:30+05:30");
        a.phone_no = Some("1".to_string());
        b.phone_no = Some("2".to_string());

        let due = detector().detect(&[a, b], noon());

        assert_eq!(due.len(), 2);
        assert_eq!(due[0].message, due[1].message);
    }

    #[test]
    fn renders_in_configured_zone() {
        let tz: Tz = "Asia/Kolkata".parse().expect("known zone");
        let detector = Detector::new(Duration::milliseconds(DEFAULT_LOOKAHEAD_MS), tz);

        let due = detector.detect(&[record("Asha", "Rao", "2025-01-15T12:00:30Z")], noon());

        assert_eq!(
            due[0].message,
            "Call scheduled for Asha Rao at 1/15/2025, 5:30:30 PM"
        );
    }
}
