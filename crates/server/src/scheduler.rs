//! Fetch scheduler: the daily roster reset and the fixed-interval
//! fetch-merge-persist-notify cycle.
//!
//! The roster is owned by the fetch task alone. The reset task never
//! touches it; it loads a fresh roster and sends a [`RosterCommand`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use livetrack_core::Pilot;
use livetrack_notify::{Dispatcher, EventClassifier};
use livetrack_store::{StoreError, TrackStore};
use livetrack_tracker::{high_water_mark, merge, FetchError, FetcherRegistry};

// ── Cron helpers ────────────────────────────────────────────────────

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow).
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&normalize_cron(expr))
}

fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

// ── Roster ──────────────────────────────────────────────────────────

/// Pilots of `organization`, or everyone when unset.
pub async fn load_roster(
    store: &dyn TrackStore,
    organization: Option<&str>,
) -> Result<Vec<Pilot>, StoreError> {
    match organization {
        Some(org) => store.get_pilots_from_org(org).await,
        None => store.get_all_pilots().await,
    }
}

/// Messages the fetch task accepts from other tasks.
#[derive(Debug)]
pub enum RosterCommand {
    /// Daily reset. `roster` is `None` when reloading failed; the current
    /// pilots are then kept, with their tracks.
    Reset { roster: Option<Vec<Pilot>> },
}

#[derive(Debug, thiserror::Error)]
enum PilotError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Totals for one pass over the roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub pilots: usize,
    pub failed: usize,
    pub new_points: usize,
    pub notifications: usize,
}

// ── Fetch task ──────────────────────────────────────────────────────

pub struct TrackScheduler {
    roster: IndexMap<String, Pilot>,
    fetchers: FetcherRegistry,
    store: Arc<dyn TrackStore>,
    classifier: EventClassifier,
    dispatcher: Dispatcher,
    pacing: Duration,
}

impl TrackScheduler {
    pub fn new(
        roster: Vec<Pilot>,
        fetchers: FetcherRegistry,
        store: Arc<dyn TrackStore>,
        classifier: EventClassifier,
        dispatcher: Dispatcher,
        pacing: Duration,
    ) -> Self {
        Self {
            roster: index_roster(roster),
            fetchers,
            store,
            classifier,
            dispatcher,
            pacing,
        }
    }

    pub fn pilot(&self, id: &str) -> Option<&Pilot> {
        self.roster.get(id)
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// Run a cycle every `interval`, starting now, and apply roster
    /// commands in between until cancelled.
    pub async fn run(
        mut self,
        interval: Duration,
        mut commands: mpsc::Receiver<RosterCommand>,
        cancel: CancellationToken,
    ) {
        info!(pilots = self.roster.len(), interval_secs = interval.as_secs(), "fetch scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.apply(command).await,
                _ = ticker.tick() => {
                    let summary = self.run_cycle(Utc::now(), &cancel).await;
                    info!(
                        pilots = summary.pilots,
                        failed = summary.failed,
                        new_points = summary.new_points,
                        notifications = summary.notifications,
                        "fetch cycle finished"
                    );
                }
            }
        }
        info!("fetch scheduler stopped");
    }

    pub async fn apply(&mut self, command: RosterCommand) {
        match command {
            RosterCommand::Reset { roster } => self.reset(roster).await,
        }
    }

    /// Retract every message sent so far and drop every track. `roster`
    /// replaces the pilot list when the reload succeeded.
    pub async fn reset(&mut self, roster: Option<Vec<Pilot>>) {
        match self.dispatcher.retract_all().await {
            Ok(count) => info!(count, "daily reset: notifications retracted"),
            Err(e) => error!(error = %e, "daily reset: retraction incomplete"),
        }
        match roster {
            Some(pilots) => {
                self.roster = index_roster(pilots);
                info!(pilots = self.roster.len(), "daily reset: roster reloaded");
            }
            None => {
                for pilot in self.roster.values_mut() {
                    pilot.points.clear();
                }
                warn!(pilots = self.roster.len(), "daily reset: keeping previous roster");
            }
        }
    }

    /// Process every pilot once, sequentially. A failing pilot is logged
    /// and skipped.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>, cancel: &CancellationToken) -> CycleSummary {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let ids: Vec<String> = self.roster.keys().cloned().collect();
        let mut summary = CycleSummary::default();

        for (i, id) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            summary.pilots += 1;
            match self.process_pilot(id, day_start).await {
                Ok((points, sent)) => {
                    summary.new_points += points;
                    summary.notifications += sent;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(pilot_id = %id, error = %e, "pilot skipped this cycle");
                }
            }
            if i + 1 < ids.len() && !self.pacing.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
        }
        summary
    }

    /// Fetch, merge, persist and notify for one pilot. Returns the number
    /// of merged points and of messages sent.
    async fn process_pilot(
        &mut self,
        id: &str,
        day_start: DateTime<Utc>,
    ) -> Result<(usize, usize), PilotError> {
        let Some(pilot) = self.roster.get(id) else {
            return Ok((0, 0));
        };
        let since = high_water_mark(&pilot.points, day_start);
        let fetcher = self.fetchers.get(&pilot.tracker_type)?;
        let fetched = fetcher.fetch_since(&pilot.id, since).await?;
        let outcome = merge(&pilot.points, fetched);
        if outcome.new_points.is_empty() {
            debug!(pilot_id = %id, "no new points");
            return Ok((0, 0));
        }

        let written = self.store.write_track(id, &outcome.new_points).await?;
        debug!(pilot_id = %id, inserted = written.inserted, duplicates = written.duplicates, "track persisted");

        let Some(pilot) = self.roster.get_mut(id) else {
            return Ok((0, 0));
        };
        pilot.points.extend(outcome.new_points.iter().cloned());
        let pilot = &*pilot;
        info!(pilot = %pilot.name, new_points = outcome.new_points.len(), "track extended");

        let mut sent = 0;
        if let Some(at) = outcome.session_start {
            match self.classifier.session_start(pilot, at) {
                Ok(text) => {
                    if self.dispatcher.send(id, &text).await.is_ok() {
                        sent += 1;
                    }
                }
                Err(e) => warn!(pilot_id = %id, error = %e, "session start message not rendered"),
            }
        }

        for point in &outcome.new_points {
            match self.classifier.classify(point, pilot).await {
                Ok(c) if c.should_notify => {
                    if self.dispatcher.send(id, &c.text).await.is_ok() {
                        sent += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(pilot_id = %id, error = %e, "notification not rendered"),
            }
        }
        Ok((outcome.new_points.len(), sent))
    }
}

fn index_roster(pilots: Vec<Pilot>) -> IndexMap<String, Pilot> {
    pilots.into_iter().map(|p| (p.id.clone(), p)).collect()
}

// ── Reset task ──────────────────────────────────────────────────────

/// Wait for each fire time of `schedule` (local time), reload the roster
/// and hand it to the fetch task.
pub async fn run_daily_reset(
    schedule: Schedule,
    store: Arc<dyn TrackStore>,
    organization: Option<String>,
    commands: mpsc::Sender<RosterCommand>,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            warn!("reset schedule has no upcoming fire time");
            return;
        };
        let wait = (next - Local::now()).to_std().unwrap_or_default();
        info!(next = %next, "next daily reset scheduled");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let roster = match load_roster(store.as_ref(), organization.as_deref()).await {
            Ok(pilots) => Some(pilots),
            Err(e) => {
                error!(error = %e, "daily reset: roster reload failed");
                None
            }
        };
        if commands.send(RosterCommand::Reset { roster }).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use livetrack_core::{Point, TrackerKind};
    use livetrack_notify::{ChatChannel, ItineraryLookup, MessageId, NotifyError};
    use livetrack_store::{DateCount, WriteSummary};
    use livetrack_tracker::Fetcher;

    fn at(h: u32, m: u32, kind: &str) -> Point {
        Point::new(Utc.with_ymd_and_hms(2023, 1, 14, h, m, 0).unwrap(), 46.0, 7.0, 1000, kind, "")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 14, 12, 0, 0).unwrap()
    }

    /// Per-feed canned responses; unknown feeds fail with a 503.
    struct MockFetcher {
        feeds: Arc<Mutex<HashMap<String, Vec<Point>>>>,
        calls: Arc<Mutex<Vec<(String, DateTime<Utc>)>>>,
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, feed_id: &str) -> Result<Vec<Point>, FetchError> {
            match self.feeds.lock().unwrap().get(feed_id) {
                Some(points) => Ok(points.clone()),
                None => Err(FetchError::Status {
                    status: 503,
                    url: format!("mock://{feed_id}"),
                }),
            }
        }

        async fn fetch_since(&self, feed_id: &str, since: DateTime<Utc>) -> Result<Vec<Point>, FetchError> {
            self.calls.lock().unwrap().push((feed_id.to_string(), since));
            let points = self.fetch(feed_id).await?;
            Ok(points.into_iter().filter(|p| p.date_time > since).collect())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        written: Mutex<Vec<(String, Point)>>,
        fail_writes_for: Option<String>,
    }

    #[async_trait]
    impl TrackStore for MemoryStore {
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_all_pilots(&self) -> Result<Vec<Pilot>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_pilots_from_org(&self, _org: &str) -> Result<Vec<Pilot>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_track_since(&self, _id: &str, _since: DateTime<Utc>) -> Result<Vec<Point>, StoreError> {
            Ok(Vec::new())
        }
        async fn write_track(&self, pilot_id: &str, points: &[Point]) -> Result<WriteSummary, StoreError> {
            if self.fail_writes_for.as_deref() == Some(pilot_id) {
                return Err(StoreError::FeedClosed);
            }
            let mut written = self.written.lock().unwrap();
            written.extend(points.iter().map(|p| (pilot_id.to_string(), p.clone())));
            Ok(WriteSummary {
                inserted: points.len(),
                duplicates: 0,
            })
        }
        async fn get_track_of_day(&self, _id: &str, _day: NaiveDate) -> Result<Vec<Point>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_all_tracks_of_day(&self, _day: NaiveDate) -> Result<BTreeMap<String, Vec<Point>>, StoreError> {
            Ok(BTreeMap::new())
        }
        async fn get_dates_with_count(&self, _limit: u32) -> Result<Vec<DateCount>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        deleted: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatChannel for RecordingChannel {
        async fn send_message(&self, text: &str) -> Result<MessageId, NotifyError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(text.to_string());
            Ok(sent.len() as MessageId)
        }
        async fn delete_message(&self, _id: MessageId) -> Result<(), NotifyError> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn channel_name(&self) -> &str {
            "recording"
        }
    }

    struct NoItinerary;

    #[async_trait]
    impl ItineraryLookup for NoItinerary {
        async fn lookup(&self, _lat: f64, _lon: f64, _home: &str) -> Result<String, NotifyError> {
            Err(NotifyError::Api("offline".into()))
        }
    }

    struct Harness {
        scheduler: TrackScheduler,
        store: Arc<MemoryStore>,
        channel: Arc<RecordingChannel>,
        calls: Arc<Mutex<Vec<(String, DateTime<Utc>)>>>,
        feeds: Arc<Mutex<HashMap<String, Vec<Point>>>>,
    }

    fn harness(feeds: Vec<(&str, Vec<Point>)>, roster: Vec<Pilot>, store: MemoryStore) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let feeds: HashMap<String, Vec<Point>> =
            feeds.into_iter().map(|(id, pts)| (id.to_string(), pts)).collect();
        let feeds = Arc::new(Mutex::new(feeds));
        let fetcher = MockFetcher {
            feeds: Arc::clone(&feeds),
            calls: calls.clone(),
        };
        let mut fetchers = FetcherRegistry::new();
        fetchers.register(TrackerKind::Spot, Arc::new(fetcher));

        let store = Arc::new(store);
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            deleted: Arc::new(AtomicUsize::new(0)),
        });
        let scheduler = TrackScheduler::new(
            roster,
            fetchers,
            store.clone(),
            EventClassifier::new("https://test.xyz/", Arc::new(NoItinerary)),
            Dispatcher::new(channel.clone()),
            Duration::ZERO,
        );
        Harness {
            scheduler,
            store,
            channel,
            calls,
            feeds,
        }
    }

    fn spot_pilot(id: &str, name: &str) -> Pilot {
        Pilot::new(id, name, "Bern", TrackerKind::Spot)
    }

    #[test]
    fn cron_five_fields_get_seconds() {
        assert_eq!(normalize_cron(" 0 0 * * * "), "0 0 0 * * *");
        assert_eq!(normalize_cron("0 0 0 * * *"), "0 0 0 * * *");
        let schedule = parse_cron("0 0 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");
        assert!(parse_cron("not a cron").is_err());
    }

    #[tokio::test]
    async fn first_cycle_sends_session_start_then_classified_points() {
        let mut h = harness(
            vec![("feed-a", vec![at(9, 0, "OK"), at(8, 0, "UNLIMITED-TRACK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );

        let summary = h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        assert_eq!(
            summary,
            CycleSummary {
                pilots: 1,
                failed: 0,
                new_points: 2,
                notifications: 2
            }
        );

        let sent = h.channel.sent.lock().unwrap().clone();
        assert!(sent[0].starts_with("*alice* started tracking at 14 Jan 23 08:00 UTC"));
        assert!(sent[1].starts_with("*alice* sent OK at 14 Jan 23 09:00 UTC\nFlight time: 1h0m0s"));
        assert!(sent[1].ends_with("No SBB itinerary"));

        let pilot = h.scheduler.pilot("feed-a").unwrap();
        assert_eq!(pilot.points, vec![at(8, 0, "UNLIMITED-TRACK"), at(9, 0, "OK")]);
        assert_eq!(h.store.written.lock().unwrap().len(), 2);

        // Day start is the first high-water mark.
        let calls = h.calls.lock().unwrap().clone();
        assert_eq!(calls[0].1, Utc.with_ymd_and_hms(2023, 1, 14, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn second_cycle_only_sees_newer_points() {
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        let cancel = CancellationToken::new();
        h.scheduler.run_cycle(now(), &cancel).await;
        let summary = h.scheduler.run_cycle(now(), &cancel).await;

        assert_eq!(summary.new_points, 0);
        assert_eq!(summary.notifications, 0);
        assert_eq!(h.channel.sent.lock().unwrap().len(), 2);
        let calls = h.calls.lock().unwrap().clone();
        assert_eq!(calls[1].1, at(8, 0, "OK").date_time);
    }

    #[tokio::test]
    async fn one_failing_pilot_does_not_block_the_others() {
        let mut h = harness(
            vec![("feed-b", vec![at(10, 0, "HELP")])],
            vec![spot_pilot("feed-a", "alice"), spot_pilot("feed-b", "bob")],
            MemoryStore::default(),
        );

        let summary = h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        assert_eq!(summary.pilots, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.new_points, 1);

        let sent = h.channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("*bob* started tracking"));
        assert_eq!(sent[1], "*bob* sent HELP!!!");
    }

    #[tokio::test]
    async fn persist_failure_skips_merge_and_notifications() {
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")]), ("feed-b", vec![at(8, 30, "OK")])],
            vec![spot_pilot("feed-a", "alice"), spot_pilot("feed-b", "bob")],
            MemoryStore {
                fail_writes_for: Some("feed-a".into()),
                ..MemoryStore::default()
            },
        );

        let summary = h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        assert_eq!(summary.failed, 1);
        assert!(h.scheduler.pilot("feed-a").unwrap().points.is_empty());
        assert_eq!(h.scheduler.pilot("feed-b").unwrap().points.len(), 1);
        assert!(h.channel.sent.lock().unwrap().iter().all(|t| t.contains("bob")));
    }

    #[tokio::test]
    async fn unsupported_tracker_is_isolated() {
        let garmin = Pilot::new("feed-g", "gary", "Bern", TrackerKind::Garmin);
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![garmin, spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        let summary = h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.new_points, 1);
    }

    #[tokio::test]
    async fn reset_retracts_and_replaces_roster() {
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        assert_eq!(h.scheduler.pilot("feed-a").unwrap().points.len(), 1);

        h.scheduler
            .apply(RosterCommand::Reset {
                roster: Some(vec![spot_pilot("feed-a", "alice"), spot_pilot("feed-c", "carol")]),
            })
            .await;
        assert_eq!(h.channel.deleted.load(Ordering::SeqCst), 2);
        assert_eq!(h.scheduler.roster_len(), 2);
        assert!(h.scheduler.pilot("feed-a").unwrap().points.is_empty());
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_roster() {
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        h.scheduler.run_cycle(now(), &CancellationToken::new()).await;
        h.scheduler.reset(None).await;

        assert_eq!(h.channel.deleted.load(Ordering::SeqCst), 2);
        assert_eq!(h.scheduler.roster_len(), 1);
        assert!(h.scheduler.pilot("feed-a").unwrap().points.is_empty());
    }

    #[tokio::test]
    async fn next_day_after_failed_reload_starts_a_new_session() {
        let mut h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        let cancel = CancellationToken::new();
        h.scheduler.run_cycle(now(), &cancel).await;
        h.scheduler.reset(None).await;

        let day2 = |h, m| Utc.with_ymd_and_hms(2023, 1, 15, h, m, 0).unwrap();
        let next_ok = Point::new(day2(9, 0), 46.0, 7.0, 1000, "OK", "");
        h.feeds
            .lock()
            .unwrap()
            .insert("feed-a".into(), vec![next_ok.clone(), at(8, 0, "OK")]);
        h.channel.sent.lock().unwrap().clear();

        let summary = h.scheduler.run_cycle(day2(12, 0), &cancel).await;
        assert_eq!(summary.new_points, 1);
        assert_eq!(h.scheduler.pilot("feed-a").unwrap().points, vec![next_ok]);
        assert_eq!(h.calls.lock().unwrap()[1].1, day2(0, 0));

        let sent = h.channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("*alice* started tracking at 15 Jan 23 09:00 UTC"));
        assert!(sent[1].contains("Flight time: 0s"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_cycles_and_stops_on_cancel() {
        let h = harness(
            vec![("feed-a", vec![at(8, 0, "OK")])],
            vec![spot_pilot("feed-a", "alice")],
            MemoryStore::default(),
        );
        let calls = h.calls.clone();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.scheduler.run(Duration::from_secs(240), rx, cancel.clone()));

        // First tick fires immediately, the second after one interval.
        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(calls.lock().unwrap().len(), 2);

        tx.send(RosterCommand::Reset { roster: None }).await.unwrap();
        cancel.cancel();
        task.await.unwrap();
    }
}
