use std::sync::Arc;

use callsheet_core::detector::{DEFAULT_LOOKAHEAD_MS, Detector};
use callsheet_core::notifications::NotificationCenter;
use callsheet_core::popup::{ClickTarget, PopupAction, PopupView};
use callsheet_core::record::ScheduledCallRecord;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, h, m, s)
        .single()
        .expect("valid instant")
}

fn customer(scheduled_at: &str) -> ScheduledCallRecord {
    serde_json::from_value(serde_json::json!({
        "C_unique_id": "L-1001",
        "first_name": "Asha",
        "last_name": "Rao",
        "phone_no": "9876543210",
        "scheduled_at": scheduled_at,
    }))
    .expect("decode customer")
}

struct Harness {
    detector: Detector,
    center: Arc<NotificationCenter>,
    view: PopupView,
}

impl Harness {
    fn new() -> Self {
        let center = Arc::new(NotificationCenter::default());
        Self {
            detector: Detector::new(Duration::milliseconds(DEFAULT_LOOKAHEAD_MS), chrono_tz::UTC),
            view: PopupView::new(Arc::clone(&center)),
            center,
        }
    }

    fn poll(&self, records: &[ScheduledCallRecord], now: DateTime<Utc>) -> usize {
        let due = self.detector.detect(records, now);
        self.center.submit_all(due, now).len()
    }

    fn tile_messages(&self) -> Vec<String> {
        self.view.tiles().into_iter().map(|t| t.message).collect()
    }
}

#[test]
fn scenario_call_inside_window_raises_one_tile() {
    let harness = Harness::new();

    let raised = harness.poll(&[customer("2025-01-15T12:00:30Z")], at(12, 0, 0));

    assert_eq!(raised, 1);
    assert_eq!(
        harness.tile_messages(),
        vec!["Call scheduled for Asha Rao at 1/15/2025, 12:00:30 PM".to_string()]
    );
}

#[test]
fn scenario_second_cycle_does_not_duplicate() {
    let harness = Harness::new();
    let records = [customer("2025-01-15T12:00:30Z")];

    harness.poll(&records, at(12, 0, 0));
    let raised = harness.poll(&records, at(12, 0, 5));

    assert_eq!(raised, 0);
    assert_eq!(harness.tile_messages().len(), 1);
}

#[test]
fn scenario_far_future_call_is_ignored() {
    let harness = Harness::new();

    harness.poll(&[customer("2025-01-15T12:01:30Z")], at(12, 0, 0));

    assert!(harness.tile_messages().is_empty());
    assert!(!harness.view.is_visible());
}

#[test]
fn scenario_past_call_is_ignored() {
    let harness = Harness::new();

    harness.poll(&[customer("2025-01-15T11:59:59Z")], at(12, 0, 0));

    assert!(harness.tile_messages().is_empty());
}

#[test]
fn scenario_dismissed_reminder_stays_dismissed() {
    let harness = Harness::new();
    let records = [customer("2025-01-15T12:00:30Z")];
    harness.poll(&records, at(12, 0, 0));

    let tile = harness.view.tile_at(0).expect("tile raised");
    assert_eq!(harness.view.click(tile.id, ClickTarget::Close), PopupAction::Dismissed);

    let raised = harness.poll(&records, at(12, 0, 20));

    assert_eq!(raised, 0);
    assert!(harness.tile_messages().is_empty());
}

#[test]
fn reminder_is_raised_exactly_once_across_many_cycles() {
    let harness = Harness::new();
    let records = [customer("2025-01-15T12:00:55Z")];

    let total: usize = (0..6)
        .map(|cycle| harness.poll(&records, at(12, 0, 0) + Duration::seconds(cycle * 10)))
        .sum();

    assert_eq!(total, 1);
    assert_eq!(harness.center.seen_count(), 1);
}

#[test]
fn cycle_order_follows_backend_order() {
    let harness = Harness::new();
    let mut later = customer("2025-01-15T12:00:50Z");
    later.first_name = Some("Zed".to_string());
    let sooner = customer("2025-01-15T12:00:10Z");

    harness.poll(&[later, sooner], at(12, 0, 0));

    assert_eq!(
        harness.tile_messages(),
        vec![
            "Call scheduled for Zed Rao at 1/15/2025, 12:00:50 PM".to_string(),
            "Call scheduled for Asha Rao at 1/15/2025, 12:00:10 PM".to_string(),
        ]
    );
}

#[test]
fn rescheduled_call_is_a_new_reminder() {
    let harness = Harness::new();
    harness.poll(&[customer("2025-01-15T12:00:30Z")], at(12, 0, 0));
    let first = harness.view.tile_at(0).expect("first tile");
    harness.view.click(first.id, ClickTarget::Close);

    harness.poll(&[customer("2025-01-15T12:05:30Z")], at(12, 5, 0));

    assert_eq!(
        harness.tile_messages(),
        vec!["Call scheduled for Asha Rao at 1/15/2025, 12:05:30 PM".to_string()]
    );
}

#[test]
fn clicking_tile_carries_full_record_to_edit_view() {
    let harness = Harness::new();
    harness.poll(&[customer("2025-01-15T12:00:30Z")], at(12, 0, 0));
    let tile = harness.view.tile_at(0).expect("tile raised");

    let PopupAction::Navigate(nav) = harness.view.click(tile.id, ClickTarget::Tile) else {
        panic!("tile click should navigate");
    };

    assert_eq!(nav.route, "/customers/phone/9876543210");
    assert_eq!(nav.customer.identifier.as_deref(), Some("L-1001"));
    assert_eq!(harness.tile_messages().len(), 1);
}
