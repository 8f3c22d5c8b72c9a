use std::io::Write;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::debug;

use crate::datetime::format_gb_locale;
use crate::navigation::NavigationRequest;
use crate::poller::{ReminderSnapshot, SnapshotSubscriber};
use crate::record::ScheduledCallRecord;
use crate::render::{Palette, write_table};

pub const EMPTY_BOARD_TEXT: &str = "No upcoming reminders";

#[derive(Debug, Default)]
struct BoardState {
    rows: Vec<ScheduledCallRecord>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// The "Upcoming Reminders" table: every record from the latest poll,
/// in backend order.
#[derive(Debug)]
pub struct ReminderBoard {
    state: Mutex<BoardState>,
    timezone: Tz,
}

impl ReminderBoard {
    pub fn new(timezone: Tz) -> Self {
        Self {
            state: Mutex::new(BoardState::default()),
            timezone,
        }
    }

    pub fn replace(&self, rows: Vec<ScheduledCallRecord>, refreshed_at: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.rows = rows;
        state.refreshed_at = Some(refreshed_at);
        debug!(rows = state.rows.len(), "reminder board refreshed");
    }

    pub fn rows(&self) -> Vec<ScheduledCallRecord> {
        self.state.lock().rows.clone()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().refreshed_at
    }

    pub fn open(&self, row: usize) -> Option<NavigationRequest> {
        self.state
            .lock()
            .rows
            .get(row)
            .cloned()
            .map(NavigationRequest::customer_edit)
    }

    pub fn render_to<W: Write>(&self, writer: &mut W, palette: Palette) -> anyhow::Result<()> {
        let rows = self.rows();
        if rows.is_empty() {
            writeln!(writer, "{EMPTY_BOARD_TEXT}")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Customer Name".to_string(),
            "Phone".to_string(),
            "Scheduled Date & Time".to_string(),
        ];
        let cells = rows
            .iter()
            .map(|record| {
                let scheduled = record
                    .scheduled_time(&self.timezone)
                    .map(|dt| format_gb_locale(dt, &self.timezone))
                    .unwrap_or_default();
                vec![
                    palette.paint(record.identifier.as_deref().unwrap_or_default(), "33"),
                    record.full_name(),
                    record.phone_no.clone().unwrap_or_default(),
                    scheduled,
                ]
            })
            .collect();

        write_table(writer, headers, cells)
    }
}

impl SnapshotSubscriber for ReminderBoard {
    fn name(&self) -> &'static str {
        "board"
    }

    fn on_snapshot(&self, snapshot: &ReminderSnapshot) {
        self.replace(snapshot.records.to_vec(), snapshot.fetched_at);
    }
}
