use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::board::ReminderBoard;
use crate::config::ReminderSettings;
use crate::detector::Detector;
use crate::fetcher::ReminderSource;
use crate::notifications::NotificationCenter;
use crate::poller::{Clock, PollHub, ReminderSnapshot, SnapshotSubscriber, system_clock};
use crate::popup::PopupView;
use crate::registry::DedupRegistry;

/// Poll subscriber that turns snapshots into popups.
pub struct PopupPipeline {
    detector: Detector,
    center: Arc<NotificationCenter>,
    clock: Clock,
}

impl PopupPipeline {
    pub fn new(detector: Detector, center: Arc<NotificationCenter>, clock: Clock) -> Self {
        Self {
            detector,
            center,
            clock,
        }
    }
}

impl SnapshotSubscriber for PopupPipeline {
    fn name(&self) -> &'static str {
        "popup"
    }

    fn on_snapshot(&self, snapshot: &ReminderSnapshot) {
        let now = (self.clock)();
        let due = self.detector.detect(&snapshot.records, now);
        let raised = self.center.submit_all(due, now);
        if !raised.is_empty() {
            info!(seq = snapshot.seq, raised = raised.len(), "new reminder popups");
        }
    }
}

/// The process-wide reminder service. Built once, started once, stopped
/// once; views borrow its notification center and board.
pub struct ReminderService {
    center: Arc<NotificationCenter>,
    board: Arc<ReminderBoard>,
    latest: watch::Receiver<Option<ReminderSnapshot>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ReminderService {
    /// Spawns the poll loop on the current tokio runtime.
    pub fn start<S: ReminderSource>(settings: &ReminderSettings, source: S) -> Self {
        Self::start_with_clock(settings, source, system_clock())
    }

    pub fn start_with_clock<S: ReminderSource>(
        settings: &ReminderSettings,
        source: S,
        clock: Clock,
    ) -> Self {
        let center = Arc::new(NotificationCenter::new(DedupRegistry::new(
            settings.registry_capacity,
            settings.registry_retention,
        )));
        let board = Arc::new(ReminderBoard::new(settings.timezone));
        let pipeline = PopupPipeline::new(
            Detector::new(settings.lookahead, settings.timezone),
            Arc::clone(&center),
            Arc::clone(&clock),
        );

        let mut hub = PollHub::new(source, clock);
        hub.subscribe(Arc::new(pipeline), settings.popup_interval);
        hub.subscribe(
            Arc::clone(&board) as Arc<dyn SnapshotSubscriber>,
            settings.board_interval,
        );
        let latest = hub.latest();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(hub.run(shutdown_rx));
        info!(
            popup_interval_ms = settings.popup_interval.as_millis() as u64,
            board_interval_ms = settings.board_interval.as_millis() as u64,
            lookahead_ms = settings.lookahead.num_milliseconds(),
            "reminder service started"
        );

        Self {
            center,
            board,
            latest,
            shutdown,
            task: Some(task),
        }
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.center
    }

    pub fn board(&self) -> &Arc<ReminderBoard> {
        &self.board
    }

    pub fn popup_view(&self) -> PopupView {
        PopupView::new(Arc::clone(&self.center))
    }

    pub fn latest(&self) -> watch::Receiver<Option<ReminderSnapshot>> {
        self.latest.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops polling and waits for the loop to exit. In-flight fetches are
    /// dropped; the notification state is left as it was.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "reminder poll loop ended abnormally");
        }
        info!("reminder service stopped");
    }
}

impl Drop for ReminderService {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
