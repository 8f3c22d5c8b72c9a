use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::fetcher::{FetchError, ReminderSource, log_fetch_failure};
use crate::record::ScheduledCallRecord;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Result of one successful (or "empty by definition") poll.
#[derive(Debug, Clone)]
pub struct ReminderSnapshot {
    pub seq: u64,
    pub fetched_at: DateTime<Utc>,
    pub records: Arc<[ScheduledCallRecord]>,
}

pub trait SnapshotSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_snapshot(&self, snapshot: &ReminderSnapshot);
}

struct Registration {
    subscriber: Arc<dyn SnapshotSubscriber>,
    cadence: Duration,
    next_due: Instant,
}

/// One fetch loop shared by every subscriber.
///
/// The loop ticks at the gcd of the registered cadences and dispatches a
/// fetch only when at least one subscriber is due. Each dispatch carries a
/// sequence number; a response older than the newest applied one is
/// dropped, and the subscribers it was fetched for are served by the newer
/// response instead.
pub struct PollHub<S> {
    source: Arc<S>,
    clock: Clock,
    registrations: Vec<Registration>,
    latest: watch::Sender<Option<ReminderSnapshot>>,
}

impl<S: ReminderSource> PollHub<S> {
    pub fn new(source: S, clock: Clock) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            source: Arc::new(source),
            clock,
            registrations: Vec::new(),
            latest,
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn SnapshotSubscriber>, cadence: Duration) {
        let cadence = cadence.max(Duration::from_millis(1));
        debug!(
            subscriber = subscriber.name(),
            cadence_ms = cadence.as_millis() as u64,
            "registered poll subscriber"
        );
        self.registrations.push(Registration {
            subscriber,
            cadence,
            next_due: Instant::now(),
        });
    }

    pub fn latest(&self) -> watch::Receiver<Option<ReminderSnapshot>> {
        self.latest.subscribe()
    }

    fn tick_period(&self) -> Duration {
        let millis = self
            .registrations
            .iter()
            .map(|reg| reg.cadence.as_millis() as u64)
            .reduce(gcd)
            .unwrap_or(1_000);
        Duration::from_millis(millis.max(1))
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    /// In-flight fetches are aborted on exit.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.registrations.is_empty() {
            warn!("poll hub started without subscribers; nothing to do");
            return;
        }

        let period = self.tick_period();
        info!(
            period_ms = period.as_millis() as u64,
            subscribers = self.registrations.len(),
            "starting reminder poll loop"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight = JoinSet::new();
        let mut pending: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        let mut next_seq: u64 = 0;
        let mut applied_seq: u64 = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let due = self.take_due(Instant::now());
                    if due.is_empty() {
                        continue;
                    }
                    next_seq += 1;
                    let seq = next_seq;
                    trace!(seq, due = ?due, "dispatching reminders fetch");
                    pending.insert(seq, due);
                    let source = Arc::clone(&self.source);
                    in_flight.spawn(async move { (seq, source.fetch().await) });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let (seq, result) = match joined {
                        Ok(done) => done,
                        Err(err) => {
                            warn!(error = %err, "reminders fetch task failed");
                            continue;
                        }
                    };
                    if seq <= applied_seq {
                        debug!(seq, applied_seq, "discarding stale reminders response");
                        continue;
                    }
                    applied_seq = seq;

                    let mut targets: Vec<usize> = Vec::new();
                    let newer = pending.split_off(&(seq + 1));
                    for (_, due) in std::mem::replace(&mut pending, newer) {
                        targets.extend(due);
                    }
                    targets.sort_unstable();
                    targets.dedup();

                    self.apply(seq, result, &targets);
                }
            }
        }

        in_flight.abort_all();
        info!("reminder poll loop stopped");
    }

    fn take_due(&mut self, now: Instant) -> Vec<usize> {
        let mut due = Vec::new();
        for (idx, reg) in self.registrations.iter_mut().enumerate() {
            if reg.next_due <= now {
                // Stay on the original schedule unless we fell behind it.
                reg.next_due += reg.cadence;
                if reg.next_due <= now {
                    reg.next_due = now + reg.cadence;
                }
                due.push(idx);
            }
        }
        due
    }

    fn apply(
        &self,
        seq: u64,
        result: Result<Vec<ScheduledCallRecord>, FetchError>,
        targets: &[usize],
    ) {
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                log_fetch_failure(&err);
                if !err.means_empty() {
                    return;
                }
                Vec::new()
            }
        };

        let snapshot = ReminderSnapshot {
            seq,
            fetched_at: (self.clock)(),
            records: records.into(),
        };
        debug!(seq, records = snapshot.records.len(), "applying reminders snapshot");

        for &idx in targets {
            if let Some(reg) = self.registrations.get(idx) {
                trace!(seq, subscriber = reg.subscriber.name(), "delivering snapshot");
                reg.subscriber.on_snapshot(&snapshot);
            }
        }
        self.latest.send_replace(Some(snapshot));
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}
