use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::collection::{Folder, Membership};
use crate::config::SyncConfig;
use crate::database::Database;
use crate::error::WaxPulseError;
use crate::pool::WorkerPool;
use crate::prices::Observation;
use crate::releases::Release;
use crate::remote::{MarketSnapshot, RemoteClient};
use crate::retry::{with_retry, RetryConfig};
use crate::wants::WantEntry;

/// Explicit run configuration; the orchestrator never reads ambient state.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub staleness_hours: i64,
    pub force: bool,
    pub batch_pause: Duration,
    pub retry: RetryConfig,
}

impl SyncSettings {
    /// Config-file values with CLI overrides layered on top.
    pub fn from_config(
        config: &SyncConfig,
        threads: Option<usize>,
        batch_size: Option<usize>,
        staleness_hours: Option<i64>,
        force: bool,
    ) -> Self {
        SyncSettings {
            workers: threads.unwrap_or_else(|| config.threads()),
            batch_size: batch_size.unwrap_or_else(|| config.batch_size()).max(1),
            staleness_hours: staleness_hours.unwrap_or_else(|| config.staleness_hours()),
            force,
            batch_pause: Duration::from_secs(config.batch_pause_secs()),
            retry: RetryConfig::default(),
        }
    }
}

/// Aggregate counts for one sync run. Per-item failures are tallied here
/// and surfaced once at the end; they never abort the run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub folders: usize,
    pub collected: usize,
    pub wants: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub no_listings: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Worker-side result of one fetch task. Workers only talk to the network;
/// all database writes happen on the coordinating thread afterwards.
enum FetchOutcome {
    Listed {
        snapshot: MarketSnapshot,
        wants_count: i64,
    },
    Unlisted,
}

pub struct SyncOrchestrator<'a> {
    db: &'a Database,
    remote: Arc<RemoteClient>,
    settings: SyncSettings,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(db: &'a Database, remote: Arc<RemoteClient>, settings: SyncSettings) -> Self {
        SyncOrchestrator {
            db,
            remote,
            settings,
        }
    }

    /// Runs a full sync: collection and wantlist first (hard prerequisites),
    /// then a batched, rate-limited price refresh of every stale item.
    pub fn run(&self) -> Result<SyncSummary, WaxPulseError> {
        let mut summary = SyncSummary::default();

        self.sync_collection(&mut summary)?;
        self.sync_wantlist(&mut summary)?;

        let refresh_set = self.build_refresh_set(&mut summary)?;
        info!(
            "Refreshing {} release(s), {} already fresh",
            refresh_set.len(),
            summary.skipped
        );

        self.refresh_prices(refresh_set, &mut summary)?;

        info!(
            "Sync complete: {} refreshed, {} skipped, {} unlisted, {} failed",
            summary.refreshed, summary.skipped, summary.no_listings, summary.failed
        );
        Ok(summary)
    }

    /// Phase 1: folders and their releases. Network failure here aborts the
    /// whole run; everything downstream depends on it.
    fn sync_collection(&self, summary: &mut SyncSummary) -> Result<(), WaxPulseError> {
        let folders = self.remote.folders()?;
        summary.folders = folders.len();

        // Distinct releases seen in this run; memberships lingering in the
        // database from folders that have since shrunk don't count
        let mut seen = HashSet::new();

        for folder in &folders {
            Folder::new(folder.id, folder.name.clone(), folder.count).upsert(self.db)?;

            let items = self.remote.folder_releases(folder.id)?;
            info!("Folder '{}': {} item(s)", folder.name, items.len());

            for item in items {
                let release = item.basic_information.to_release();
                release.upsert(self.db)?;
                Membership::upsert(
                    self.db,
                    release.release_id(),
                    folder.id,
                    item.instance_id,
                    item.date_added.as_deref(),
                )?;
                seen.insert(release.release_id());
            }
        }

        summary.collected = seen.len();
        Ok(())
    }

    /// Phase 2: the wantlist. Also a hard prerequisite.
    fn sync_wantlist(&self, summary: &mut SyncSummary) -> Result<(), WaxPulseError> {
        let want_items = self.remote.wantlist()?;
        summary.wants = want_items.len();

        for item in want_items {
            let release = item.basic_information.to_release();
            release.upsert(self.db)?;
            WantEntry::new(release.release_id(), item.notes.clone(), item.date_added.clone())
                .upsert(self.db)?;
        }
        Ok(())
    }

    /// Phase 3: every collected release whose latest observation is older
    /// than the staleness threshold (or all of them under --force).
    fn build_refresh_set(&self, summary: &mut SyncSummary) -> Result<Vec<i64>, WaxPulseError> {
        let collected = Membership::collected_release_ids(self.db)?;
        let now = Utc::now().timestamp();

        let mut refresh_set = Vec::new();
        for release_id in collected {
            let latest = Observation::latest_for_release(self.db, release_id)?;
            if self.settings.force || is_stale(latest.as_ref(), now, self.settings.staleness_hours)
            {
                refresh_set.push(release_id);
            } else {
                summary.skipped += 1;
            }
        }
        Ok(refresh_set)
    }

    /// Phases 4-5: fan the refresh set out across the worker pool in fixed
    /// batches, pausing between batches. The pause is the inter-batch
    /// throttle; per-task retry backoff is handled inside each task.
    fn refresh_prices(
        &self,
        refresh_set: Vec<i64>,
        summary: &mut SyncSummary,
    ) -> Result<(), WaxPulseError> {
        if refresh_set.is_empty() {
            return Ok(());
        }

        let remote = Arc::clone(&self.remote);
        let retry = self.settings.retry.clone();
        let pool = WorkerPool::new(
            move |release_id: &i64| fetch_one(&remote, &retry, *release_id),
            self.settings.workers,
        );

        for (batch_index, batch) in refresh_set.chunks(self.settings.batch_size).enumerate() {
            if batch_index > 0 {
                thread::sleep(self.settings.batch_pause);
            }
            info!(
                "Batch {}: fetching {} release(s)",
                batch_index + 1,
                batch.len()
            );

            // Results come back in submission order, so they stay aligned
            // with the batch slice even when completions interleave
            let results = pool.submit_batch(batch.to_vec());

            for (release_id, result) in batch.iter().zip(results) {
                match result.outcome {
                    Ok(FetchOutcome::Listed {
                        snapshot,
                        wants_count,
                    }) => {
                        Observation::new(
                            *release_id,
                            snapshot.price,
                            snapshot.currency,
                            "Various".to_string(),
                            snapshot.listing_count,
                            wants_count,
                        )
                        .append(self.db)?;
                        summary.refreshed += 1;
                    }
                    Ok(FetchOutcome::Unlisted) => {
                        summary.no_listings += 1;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        summary.errors.push(format!("release {}: {}", release_id, e));
                    }
                }
            }
        }

        pool.terminate();
        Ok(())
    }
}

/// One rate-limited fetch task. A failed want-count lookup degrades to a
/// zero count rather than failing the whole item.
fn fetch_one(
    remote: &RemoteClient,
    retry: &RetryConfig,
    release_id: i64,
) -> Result<FetchOutcome, WaxPulseError> {
    let snapshot = with_retry(retry, || remote.marketplace_stats(release_id))?;

    match snapshot {
        Some(snapshot) => {
            let wants_count = match with_retry(retry, || remote.want_count(release_id)) {
                Ok(count) => count,
                Err(e) => {
                    warn!(
                        "Want count lookup failed for release {}: {} (recording 0)",
                        release_id, e
                    );
                    0
                }
            };
            Ok(FetchOutcome::Listed {
                snapshot,
                wants_count,
            })
        }
        None => Ok(FetchOutcome::Unlisted),
    }
}

/// True when the latest observation is older than the threshold. An item
/// with no observations is always stale; an observation exactly at the
/// threshold age is still fresh.
fn is_stale(latest: Option<&Observation>, now: i64, staleness_hours: i64) -> bool {
    match latest {
        None => true,
        Some(obs) => {
            let age_hours = (now - obs.observed_at()) as f64 / 3600.0;
            age_hours > staleness_hours as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;

    fn obs_at(ts: i64) -> Observation {
        Observation::new_at(1, 10.0, "USD".to_string(), 0, ts)
    }

    #[test]
    fn staleness_boundary() {
        let now = 1_000_000 * 3600;
        let h = 3600;

        assert!(is_stale(None, now, 24), "never-observed items are stale");
        assert!(
            !is_stale(Some(&obs_at(now - 23 * h)), now, 24),
            "23h-old observation is fresh"
        );
        assert!(
            is_stale(Some(&obs_at(now - 25 * h)), now, 24),
            "25h-old observation is stale"
        );
        assert!(
            !is_stale(Some(&obs_at(now - 24 * h)), now, 24),
            "exactly at the threshold is still fresh"
        );
    }

    fn test_settings() -> SyncSettings {
        SyncSettings {
            workers: 2,
            batch_size: 2,
            staleness_hours: 24,
            force: false,
            batch_pause: Duration::ZERO,
            retry: RetryConfig::fast(),
        }
    }

    fn test_remote(server: &mockito::ServerGuard) -> Arc<RemoteClient> {
        let config = RemoteConfig {
            username: "tester".to_string(),
            token: "tok".to_string(),
        };
        Arc::new(RemoteClient::with_base_url(&config, &server.url()).unwrap())
    }

    fn mock_collection(server: &mut mockito::ServerGuard) {
        server
            .mock("GET", "/users/tester/collection/folders")
            .with_body(r#"{"folders":[{"id":0,"name":"All","count":2}]}"#)
            .create();
        server
            .mock(
                "GET",
                "/users/tester/collection/folders/0/releases?page=1&per_page=100",
            )
            .with_body(
                r#"{"pagination":{"page":1,"pages":1},"releases":[
                    {"instance_id":11,"folder_id":0,"date_added":"2023-01-01",
                     "basic_information":{"id":100,"title":"A","year":1980,"thumb":"",
                        "formats":[{"name":"Vinyl"}],"artists":[{"name":"X"}]}},
                    {"instance_id":12,"folder_id":0,
                     "basic_information":{"id":101,"title":"B","artists":[{"name":"Y"}],"formats":[]}}
                ]}"#,
            )
            .create();
        server
            .mock("GET", "/users/tester/wants?page=1&per_page=100")
            .with_body(
                r#"{"pagination":{"page":1,"pages":1},"wants":[
                    {"notes":"grail","date_added":"2024-05-05",
                     "basic_information":{"id":102,"title":"C","artists":[{"name":"Z"}],"formats":[]}}
                ]}"#,
            )
            .create();
    }

    #[test]
    fn full_run_commits_observations_and_reports_counts() {
        let mut server = mockito::Server::new();
        mock_collection(&mut server);

        server
            .mock("GET", "/marketplace/stats/100")
            .with_body(
                r#"{"lowest_price":{"value":30.0,"currency":"USD"},"num_for_sale":5,"blocked_from_sale":false}"#,
            )
            .create();
        server
            .mock("GET", "/releases/100")
            .with_body(r#"{"community":{"want":150,"have":40}}"#)
            .create();
        server
            .mock("GET", "/marketplace/stats/101")
            .with_body(r#"{"lowest_price":null,"num_for_sale":0,"blocked_from_sale":false}"#)
            .create();

        let db = Database::open_in_memory().unwrap();
        let remote = test_remote(&server);
        let orchestrator = SyncOrchestrator::new(&db, remote, test_settings());

        let summary = orchestrator.run().unwrap();

        assert_eq!(summary.folders, 1);
        assert_eq!(summary.collected, 2);
        assert_eq!(summary.wants, 1);
        assert_eq!(summary.refreshed, 1);
        assert_eq!(summary.no_listings, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);

        // The listed release got an observation with the fetched want count
        let obs = Observation::latest_for_release(&db, 100).unwrap().unwrap();
        assert_eq!(obs.price(), 30.0);
        assert_eq!(obs.wants_count(), 150);
        assert_eq!(obs.listing_count(), 5);

        // The unlisted release produced no observation
        assert!(Observation::latest_for_release(&db, 101).unwrap().is_none());

        // The wantlist release is tracked but not part of the refresh set
        assert!(Release::get_by_id(&db, 102).unwrap().is_some());
        assert_eq!(WantEntry::count(&db).unwrap(), 1);
        assert!(Observation::latest_for_release(&db, 102).unwrap().is_none());
    }

    #[test]
    fn fresh_items_are_skipped_unless_forced() {
        let mut server = mockito::Server::new();
        mock_collection(&mut server);

        // Only needed when force bypasses staleness
        server
            .mock("GET", "/marketplace/stats/100")
            .with_body(r#"{"lowest_price":null,"num_for_sale":0,"blocked_from_sale":false}"#)
            .create();
        server
            .mock("GET", "/marketplace/stats/101")
            .with_body(r#"{"lowest_price":null,"num_for_sale":0,"blocked_from_sale":false}"#)
            .create();

        let db = Database::open_in_memory().unwrap();

        // Seed both releases with fresh observations
        let now = Utc::now().timestamp();
        for id in [100, 101] {
            Release::new(id, "seed".to_string(), "seed".to_string(), None, None, None)
                .upsert(&db)
                .unwrap();
            Observation::new_at(id, 5.0, "USD".to_string(), 0, now - 3600)
                .append(&db)
                .unwrap();
        }

        let remote = test_remote(&server);
        let summary = SyncOrchestrator::new(&db, Arc::clone(&remote), test_settings())
            .run()
            .unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.refreshed, 0);

        let mut forced = test_settings();
        forced.force = true;
        let summary = SyncOrchestrator::new(&db, remote, forced).run().unwrap();
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.no_listings, 2);
    }

    #[test]
    fn per_item_failures_do_not_abort_the_run() {
        let mut server = mockito::Server::new();
        mock_collection(&mut server);

        server
            .mock("GET", "/marketplace/stats/100")
            .with_status(404)
            .with_body("not found")
            .create();
        server
            .mock("GET", "/marketplace/stats/101")
            .with_body(
                r#"{"lowest_price":{"value":12.0,"currency":"USD"},"num_for_sale":1,"blocked_from_sale":false}"#,
            )
            .create();
        // Want count lookup fails terminally; the item still succeeds with 0
        server
            .mock("GET", "/releases/101")
            .with_status(404)
            .create();

        let db = Database::open_in_memory().unwrap();
        let summary = SyncOrchestrator::new(&db, test_remote(&server), test_settings())
            .run()
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.refreshed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("release 100"));

        let obs = Observation::latest_for_release(&db, 101).unwrap().unwrap();
        assert_eq!(obs.wants_count(), 0);
    }

    #[test]
    fn batches_are_paced_by_the_configured_pause() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/users/tester/collection/folders")
            .with_body(r#"{"folders":[{"id":0,"name":"All","count":3}]}"#)
            .create();
        server
            .mock(
                "GET",
                "/users/tester/collection/folders/0/releases?page=1&per_page=100",
            )
            .with_body(
                r#"{"pagination":{"page":1,"pages":1},"releases":[
                    {"instance_id":11,"folder_id":0,
                     "basic_information":{"id":100,"title":"A","artists":[],"formats":[]}},
                    {"instance_id":12,"folder_id":0,
                     "basic_information":{"id":101,"title":"B","artists":[],"formats":[]}},
                    {"instance_id":13,"folder_id":0,
                     "basic_information":{"id":102,"title":"C","artists":[],"formats":[]}}
                ]}"#,
            )
            .create();
        server
            .mock("GET", "/users/tester/wants?page=1&per_page=100")
            .with_body(r#"{"pagination":{"page":1,"pages":1},"wants":[]}"#)
            .create();
        for id in [100, 101, 102] {
            server
                .mock("GET", format!("/marketplace/stats/{}", id).as_str())
                .with_body(r#"{"lowest_price":null,"num_for_sale":0,"blocked_from_sale":false}"#)
                .create();
        }

        let db = Database::open_in_memory().unwrap();
        let mut settings = test_settings();
        settings.batch_size = 1;
        settings.batch_pause = Duration::from_millis(50);

        // Three single-item batches: the pause runs before the second and
        // third, so the whole run cannot finish faster than two pauses
        let started = std::time::Instant::now();
        let summary = SyncOrchestrator::new(&db, test_remote(&server), settings)
            .run()
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.no_listings, 3);
        assert!(
            elapsed >= Duration::from_millis(100),
            "expected at least 2 x 50ms of inter-batch pauses, ran in {:?}",
            elapsed
        );
    }

    #[test]
    fn collected_counts_only_releases_seen_this_run() {
        let mut server = mockito::Server::new();
        mock_collection(&mut server);

        for id in [100, 101, 999] {
            server
                .mock("GET", format!("/marketplace/stats/{}", id).as_str())
                .with_body(r#"{"lowest_price":null,"num_for_sale":0,"blocked_from_sale":false}"#)
                .create();
        }

        let db = Database::open_in_memory().unwrap();

        // A membership left over from an earlier sync; the remote folder no
        // longer contains it
        Release::new(999, "Gone".to_string(), "X".to_string(), None, None, None)
            .upsert(&db)
            .unwrap();
        Membership::upsert(&db, 999, 0, 99, None).unwrap();

        let summary = SyncOrchestrator::new(&db, test_remote(&server), test_settings())
            .run()
            .unwrap();

        // The stale membership still gets its price refreshed, but it is
        // not part of this run's collected tally
        assert_eq!(summary.collected, 2);
        assert_eq!(summary.no_listings, 3);
    }

    #[test]
    fn collection_listing_failure_aborts_the_run() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/users/tester/collection/folders")
            .with_status(404)
            .with_body("nope")
            .create();

        let db = Database::open_in_memory().unwrap();
        let result = SyncOrchestrator::new(&db, test_remote(&server), test_settings()).run();
        assert!(result.is_err());
    }
}
