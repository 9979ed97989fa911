// ===============================
// src/scheduler.rs
// ===============================
//
// Refresh scheduler: satu task pemilik state market.
// - fetch saat start, saat range dipilih, dan tiap `refresh_every`
// - tick periodik di-skip kalau fetch untuk range yang sama masih jalan
// - ganti range: timer lama dibuang, timer baru mulai; fetch lama TIDAK di-abort
// - setiap fetch diberi nomor urut; hasil yang lebih tua dari yang sudah
//   dipublish dibuang (bukan last-to-arrive-wins)
//
use std::time::Duration;

use ahash::AHashMap as HashMap;
use chrono::Utc;
use tokio::{
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::domain::{Event, MarketSnapshot, TimeRange};
use crate::feed::{MarketFeed, SpotQuote};
use crate::metrics::{DEGRADED, REFERENCE_PRICE, STALE_DISCARDED};

enum Completion {
    Provisional { seq: u64, range: TimeRange, spot: SpotQuote },
    Final { seq: u64, snapshot: MarketSnapshot },
}

/// Ordering guard for out-of-order completions.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
    applied: u64,
    finalized: u64,
}

impl Sequencer {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn accept_provisional(&mut self, seq: u64) -> bool {
        if seq >= self.applied && seq > self.finalized {
            self.applied = seq;
            true
        } else {
            false
        }
    }

    pub fn accept_final(&mut self, seq: u64) -> bool {
        if seq >= self.applied && seq > self.finalized {
            self.applied = seq;
            self.finalized = seq;
            true
        } else {
            false
        }
    }
}

pub struct SchedulerHandle {
    range_tx: watch::Sender<TimeRange>,
    snap_rx: watch::Receiver<Option<MarketSnapshot>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn select_range(&self, range: TimeRange) {
        let _ = self.range_tx.send(range);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MarketSnapshot>> {
        self.snap_rx.clone()
    }

    pub fn latest(&self) -> Option<MarketSnapshot> {
        self.snap_rx.borrow().clone()
    }

    /// Stops the timer. Fetches already in flight finish but are ignored.
    pub async fn shutdown(self) {
        let SchedulerHandle { range_tx, task, .. } = self;
        drop(range_tx);
        let _ = task.await;
    }
}

pub fn spawn(
    feed: MarketFeed,
    initial: TimeRange,
    refresh_every: Duration,
    rec_tx: Option<mpsc::Sender<Event>>,
) -> SchedulerHandle {
    let (range_tx, range_rx) = watch::channel(initial);
    let (snap_tx, snap_rx) = watch::channel::<Option<MarketSnapshot>>(None);
    let task = tokio::spawn(run(feed, range_rx, snap_tx, refresh_every, rec_tx));
    SchedulerHandle { range_tx, snap_rx, task }
}

fn start_fetch(feed: &MarketFeed, range: TimeRange, seq: u64, done_tx: &mpsc::Sender<Completion>) {
    let feed = feed.clone();
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let spot_tx = done_tx.clone();
        let snapshot = feed
            .fetch_observed(range, |spot| {
                let _ = spot_tx.try_send(Completion::Provisional { seq, range, spot: spot.clone() });
            })
            .await;
        let _ = done_tx.send(Completion::Final { seq, snapshot }).await;
    });
}

/// Spot sudah ada, series belum. Series dikosongkan supaya `change_percent`
/// (24h provider) tidak bertabrakan dengan first/last dari series lama.
fn provisional_snapshot(range: TimeRange, spot: &SpotQuote) -> MarketSnapshot {
    MarketSnapshot {
        series: Vec::new(),
        reference_price: spot.price,
        local_price: spot.local_price,
        change_percent: spot.change_24h,
        range,
        degraded: false,
        provisional: true,
        fetched_at: Utc::now(),
    }
}

fn publish(
    snap_tx: &watch::Sender<Option<MarketSnapshot>>,
    rec_tx: &Option<mpsc::Sender<Event>>,
    snapshot: MarketSnapshot,
) {
    REFERENCE_PRICE.set(snapshot.reference_price);
    DEGRADED
        .with_label_values(&[snapshot.range.as_str()])
        .set(snapshot.degraded as i64);
    if let Some(tx) = rec_tx {
        let _ = tx.try_send(Event::Snapshot(snapshot.clone()));
    }
    snap_tx.send_replace(Some(snapshot));
}

async fn run(
    feed: MarketFeed,
    mut range_rx: watch::Receiver<TimeRange>,
    snap_tx: watch::Sender<Option<MarketSnapshot>>,
    every: Duration,
    rec_tx: Option<mpsc::Sender<Event>>,
) {
    let (done_tx, mut done_rx) = mpsc::channel::<Completion>(64);
    let mut seqs = Sequencer::default();
    let mut in_flight: HashMap<TimeRange, u32> = HashMap::new();
    let mut range = *range_rx.borrow_and_update();

    // tick pertama langsung (initial load)
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(%range, every_s = every.as_secs(), "refresh scheduler started");

    loop {
        select! {
            _ = tick.tick() => {
                if in_flight.get(&range).copied().unwrap_or(0) > 0 {
                    debug!(%range, "refresh skipped, fetch outstanding");
                    continue;
                }
                let seq = seqs.issue();
                *in_flight.entry(range).or_insert(0) += 1;
                start_fetch(&feed, range, seq, &done_tx);
            }
            changed = range_rx.changed() => {
                if changed.is_err() {
                    break; // handle dropped -> teardown
                }
                range = *range_rx.borrow_and_update();
                tick = interval_at(Instant::now() + every, every);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let seq = seqs.issue();
                *in_flight.entry(range).or_insert(0) += 1;
                info!(%range, seq, "range selected");
                start_fetch(&feed, range, seq, &done_tx);
            }
            Some(done) = done_rx.recv() => match done {
                Completion::Provisional { seq, range: r, spot } => {
                    if seqs.accept_provisional(seq) {
                        let snap = provisional_snapshot(r, &spot);
                        publish(&snap_tx, &rec_tx, snap);
                    } else {
                        STALE_DISCARDED.inc();
                        debug!(seq, range = %r, "stale provisional discarded");
                    }
                }
                Completion::Final { seq, snapshot } => {
                    if let Some(n) = in_flight.get_mut(&snapshot.range) {
                        *n = n.saturating_sub(1);
                    }
                    if seqs.accept_final(seq) {
                        publish(&snap_tx, &rec_tx, snapshot);
                    } else {
                        STALE_DISCARDED.inc();
                        debug!(seq, range = %snapshot.range, "stale snapshot discarded");
                    }
                }
            },
        }
    }
    info!("refresh scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change_percent;
    use crate::feed::FeedCfg;
    use crate::testutil::{chart_body, Route, TestServer, SPOT_BODY};
    use chrono::FixedOffset;
    use tokio::time::{sleep, timeout};

    fn feed(base: String) -> MarketFeed {
        MarketFeed::new(FeedCfg {
            base_url: base,
            asset_id: "worldcoin-wld".into(),
            quote_currency: "usd".into(),
            local_currency: "kes".into(),
            timeout: Duration::from_secs(3),
            display_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
            live: true,
        })
    }

    fn chart() -> String {
        let t0 = 1_742_292_000_000i64;
        chart_body(&[(t0, 2.0), (t0 + 60_000, 2.1)])
    }

    #[test]
    fn sequencer_orders_completions() {
        let mut s = Sequencer::default();
        let a = s.issue();
        let b = s.issue();
        assert!(s.accept_provisional(a));
        assert!(s.accept_provisional(b));
        assert!(!s.accept_final(a)); // newer request already showing
        assert!(s.accept_final(b));
        assert!(!s.accept_provisional(b)); // never override a final of same seq
        let c = s.issue();
        assert!(s.accept_final(c));
        assert!(!s.accept_provisional(b));
    }

    #[tokio::test]
    async fn publishes_initial_snapshot() {
        let srv = TestServer::start(vec![Route::ok("/simple/price", SPOT_BODY), Route::ok("/coins/", chart())]).await;
        let h = spawn(feed(srv.base.clone()), TimeRange::D1, Duration::from_secs(3600), None);
        let mut rx = h.subscribe();
        let snap = timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                let s = rx.borrow().clone();
                if let Some(s) = s {
                    if !s.provisional {
                        return s;
                    }
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(snap.range, TimeRange::D1);
        assert!(!snap.degraded);
        assert_eq!(snap.series.len(), 2);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn slow_stale_range_does_not_overwrite_newer_selection() {
        let srv = TestServer::start(vec![
            Route::ok("/simple/price", SPOT_BODY),
            Route::ok("days=1", chart()).delayed(500),
            Route::ok("days=7", chart()),
        ])
        .await;
        let h = spawn(feed(srv.base.clone()), TimeRange::D1, Duration::from_secs(3600), None);
        let mut rx = h.subscribe();

        // tunggu provisional 1D (spot cepat, series 1D lambat)
        timeout(Duration::from_secs(5), rx.changed()).await.unwrap().unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().range, TimeRange::D1);

        h.select_range(TimeRange::W1);
        sleep(Duration::from_millis(1_000)).await; // 1D response lands after 1W

        let last = h.latest().unwrap();
        assert_eq!(last.range, TimeRange::W1);
        assert!(!last.provisional);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn periodic_tick_skips_while_fetch_outstanding() {
        let srv = TestServer::start(vec![
            Route::ok("/simple/price", SPOT_BODY),
            Route::ok("/coins/", chart()).delayed(600),
        ])
        .await;
        let h = spawn(feed(srv.base.clone()), TimeRange::D1, Duration::from_millis(50), None);
        sleep(Duration::from_millis(400)).await;
        // ~8 ticks elapsed, only the first started a fetch (spot + history)
        assert_eq!(srv.hits(), 2);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_feed_publishes_degraded() {
        let h = spawn(feed("http://127.0.0.1:1".into()), TimeRange::H1, Duration::from_secs(3600), None);
        let mut rx = h.subscribe();
        timeout(Duration::from_secs(5), rx.changed()).await.unwrap().unwrap();
        let s = h.latest().unwrap();
        assert!(s.degraded);
        assert_eq!(s.series.len(), 50);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn range_switch_restarts_cadence() {
        let srv = TestServer::start(vec![
            Route::ok("/simple/price", SPOT_BODY),
            Route::ok("days=1", chart()),
            Route::ok("days=7", chart()),
        ])
        .await;
        // tick 0ms (1D), switch at 200ms (1W now, next tick 600ms, bukan 400ms)
        let h = spawn(feed(srv.base.clone()), TimeRange::D1, Duration::from_millis(400), None);
        sleep(Duration::from_millis(200)).await;
        h.select_range(TimeRange::W1);

        sleep(Duration::from_millis(300)).await; // t=500
        assert_eq!(srv.hits_matching("days=1"), 1);
        assert_eq!(srv.hits_matching("days=7"), 1);

        sleep(Duration::from_millis(350)).await; // t=850
        assert_eq!(srv.hits_matching("days=1"), 1);
        assert_eq!(srv.hits_matching("days=7"), 2);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn every_published_snapshot_keeps_change_consistent() {
        let srv = TestServer::start(vec![
            Route::ok("/simple/price", SPOT_BODY),
            Route::ok("/coins/", chart()).delayed(100),
        ])
        .await;
        let (rec_tx, mut rec_rx) = mpsc::channel(64);
        let h = spawn(feed(srv.base.clone()), TimeRange::D1, Duration::from_millis(400), Some(rec_tx));
        sleep(Duration::from_millis(700)).await; // dua siklus di range yang sama
        h.shutdown().await;

        let mut published = Vec::new();
        while let Ok(ev) = rec_rx.try_recv() {
            if let Event::Snapshot(s) = ev {
                published.push(s);
            }
        }
        assert!(published.len() >= 4, "got {}", published.len());
        // provisional kedua datang setelah final pertama (series sudah ada)
        let first_final = published.iter().position(|s| !s.provisional).unwrap();
        assert!(published[first_final..].iter().any(|s| s.provisional));

        for s in &published {
            if s.provisional {
                assert!(s.series.is_empty());
                assert_eq!(s.change_percent, -1.5);
            } else {
                assert!(!s.series.is_empty());
                assert!((s.change_percent - change_percent(&s.series)).abs() < 1e-9);
            }
        }
    }
}
