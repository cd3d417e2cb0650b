// src/links/scheduler.rs
// =============================================================================
// Runs one page's worth of links through the classifier and the prober.
//
// How it works:
// 1. The whole link list goes into one shared job queue up front
// 2. A fixed number of worker tasks drain that queue in parallel
// 3. Each job produces exactly one LinkOutcome on a results channel
// 4. The caller's task collects outcomes and folds them into counts until
//    every link is accounted for or the batch deadline passes
// 5. Whatever is still running at that point is cancelled; late outcomes
//    are dropped on the floor
//
// Worker count and deadline both grow with the number of links. The numbers
// come from measuring real pages with hundreds of links: probing is pure
// network wait, so far more workers than CPU cores is the right call, up to
// a ceiling that keeps us (and the probed sites) from drowning.
// =============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::aggregate::{AggregateCounts, LinkOutcome, Verdict};
use super::classify::{classify, Classification};
use super::probe::Prober;

pub const MIN_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 100;
pub const MIN_DEADLINE: Duration = Duration::from_secs(30);
pub const MAX_DEADLINE: Duration = Duration::from_secs(45);

// Progress is logged every this many outcomes on pages with more than
// PROGRESS_MIN_LINKS links
const PROGRESS_EVERY: usize = 20;
const PROGRESS_MIN_LINKS: usize = 50;

// Step function, not a formula; the breakpoints are measured values
pub fn workers_for(link_count: usize) -> usize {
    match link_count {
        0..=10 => MIN_WORKERS,
        11..=25 => 12,
        26..=50 => 24,
        51..=100 => 48,
        101..=150 => 64,
        151..=200 => 80,
        _ => MAX_WORKERS,
    }
}

// One second per three links, never below 30s or above 45s
pub fn deadline_for(link_count: usize) -> Duration {
    let seconds = u64::try_from(link_count / 3).unwrap_or(u64::MAX);
    Duration::from_secs(seconds).clamp(MIN_DEADLINE, MAX_DEADLINE)
}

/// The links of one page plus the limits they are processed under
#[derive(Debug, Clone)]
pub struct AnalysisBatch {
    links: Vec<String>,
    base: Url,
    workers: usize,
    deadline: Duration,
}

impl AnalysisBatch {
    pub fn new(links: Vec<String>, base: Url) -> Self {
        let workers = workers_for(links.len());
        let deadline = deadline_for(links.len());
        Self {
            links,
            base,
            workers,
            deadline,
        }
    }

    // Replaces the computed deadline. Meant for tests and operators who
    // need a tighter budget; the normal path never calls it.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Counts for a finished batch plus how the batch went
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub counts: AggregateCounts,
    /// Links handed to the workers
    pub submitted: usize,
    /// Outcomes collected before the loop ended
    pub received: usize,
    /// Outcomes that were Skip (fragment, empty, special protocol)
    pub ignored: usize,
    /// Outcomes that failed to resolve or probe
    pub failed: usize,
    pub timed_out: bool,
    pub cancelled: bool,
    pub workers: usize,
    pub deadline: Duration,
    pub elapsed: Duration,
}

impl BatchReport {
    fn empty(batch: &AnalysisBatch) -> Self {
        Self {
            counts: AggregateCounts::default(),
            submitted: batch.len(),
            received: 0,
            ignored: 0,
            failed: 0,
            timed_out: false,
            cancelled: false,
            workers: batch.workers(),
            deadline: batch.deadline(),
            elapsed: Duration::ZERO,
        }
    }

    /// Links whose outcome never arrived (deadline or cancellation)
    pub fn skipped(&self) -> usize {
        self.submitted.saturating_sub(self.received)
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.submitted
    }

    fn record(&mut self, outcome: &LinkOutcome) {
        self.received += 1;
        match outcome.verdict {
            Verdict::Skipped => self.ignored += 1,
            Verdict::Failed(_) => self.failed += 1,
            Verdict::Internal | Verdict::External { .. } => {}
        }
        self.counts.fold(outcome);
    }
}

// Shared job source. Holds the full link list from the start, so handing
// out a job never waits on a producer.
#[derive(Clone)]
struct JobQueue {
    jobs: Arc<Mutex<VecDeque<String>>>,
}

impl JobQueue {
    fn new(links: Vec<String>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(links.into())),
        }
    }

    fn next(&self) -> Option<String> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

/// Fans link batches out over worker tasks
#[derive(Clone)]
pub struct Scheduler {
    prober: Prober,
}

impl Scheduler {
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }

    pub async fn run(&self, batch: AnalysisBatch) -> BatchReport {
        self.run_with_cancel(batch, &CancellationToken::new()).await
    }

    // Processes the batch and returns the counts collected before the
    // deadline (or before `cancel` fired). Never fails: per-link problems
    // end up in the report, and running out of time just means a partial
    // result.
    pub async fn run_with_cancel(&self, batch: AnalysisBatch, cancel: &CancellationToken) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::empty(&batch);

        if batch.is_empty() {
            return report;
        }

        let AnalysisBatch {
            links,
            base,
            workers,
            deadline,
        } = batch;
        let submitted = links.len();

        info!(
            base = %base,
            total_links = submitted,
            workers,
            deadline_ms = deadline.as_millis() as u64,
            "starting link analysis"
        );

        // Room for every outcome, so a worker never blocks on send
        let (results_tx, mut results_rx) = mpsc::channel(submitted);
        let jobs = JobQueue::new(links);
        let base = Arc::new(base);
        // Fires when we stop collecting; also fires if the caller cancels
        let stop = cancel.child_token();

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers.min(submitted) {
            tasks.spawn(worker(
                worker_id,
                jobs.clone(),
                Arc::clone(&base),
                self.prober.clone(),
                results_tx.clone(),
                stop.clone(),
            ));
        }
        // Only workers hold senders now; the channel closes when they all exit
        drop(results_tx);

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        while report.received < submitted {
            tokio::select! {
                // Checked in this order on every turn, so a cancelled or
                // expired batch stops even while outcomes keep arriving
                biased;

                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    warn!(base = %base, links_processed = report.received, "link analysis cancelled");
                    break;
                }
                _ = &mut expiry => {
                    report.timed_out = true;
                    warn!(
                        base = %base,
                        links_processed = report.received,
                        total_links = submitted,
                        deadline_ms = deadline.as_millis() as u64,
                        "link analysis deadline reached"
                    );
                    break;
                }
                received = results_rx.recv() => {
                    let Some(outcome) = received else {
                        warn!(base = %base, received = report.received, total = submitted, "link workers exited early");
                        break;
                    };

                    if let Some(error) = outcome.probe_error() {
                        warn!(base = %base, link = %outcome.original_ref, %error, "link analysis error");
                    }
                    report.record(&outcome);

                    if submitted > PROGRESS_MIN_LINKS && report.received % PROGRESS_EVERY == 0 {
                        info!(
                            base = %base,
                            processed = report.received,
                            total = submitted,
                            internal = report.counts.internal_links,
                            external = report.counts.external_links,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "link analysis progress"
                        );
                    }
                }
            }
        }

        // Interrupt in-flight probes, then make sure no task outlives us
        stop.cancel();
        tasks.abort_all();

        report.elapsed = started.elapsed();

        info!(
            base = %base,
            total = submitted,
            skipped = report.skipped(),
            ignored = report.ignored,
            failed = report.failed,
            internal = report.counts.internal_links,
            external = report.counts.external_links,
            inaccessible = report.counts.inaccessible_links,
            duration_ms = report.elapsed.as_millis() as u64,
            workers,
            "link analysis completed"
        );

        report
    }
}

async fn worker(
    worker_id: usize,
    jobs: JobQueue,
    base: Arc<Url>,
    prober: Prober,
    results: mpsc::Sender<LinkOutcome>,
    stop: CancellationToken,
) {
    let mut handled = 0usize;

    while let Some(href) = jobs.next() {
        if stop.is_cancelled() {
            break;
        }

        let outcome = process_link(&href, &base, &prober, &stop).await;
        handled += 1;

        // The collector is gone (deadline); nobody wants the rest
        if results.send(outcome).await.is_err() {
            break;
        }
    }

    debug!(worker_id, handled, "link worker finished");
}

// Classify, then probe if external. Always produces an outcome.
async fn process_link(href: &str, base: &Url, prober: &Prober, stop: &CancellationToken) -> LinkOutcome {
    let verdict = match classify(href, base) {
        Ok(Classification::Skip) => Verdict::Skipped,
        Ok(Classification::Resolved { internal: true, .. }) => Verdict::Internal,
        Ok(Classification::Resolved { url, internal: false }) => {
            match prober.try_probe(url.as_str(), stop).await {
                Ok(accessible) => Verdict::External { accessible },
                Err(error) => Verdict::Failed(error),
            }
        }
        Err(error) => Verdict::Failed(error),
    };

    LinkOutcome::new(href, verdict)
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why a Mutex<VecDeque> and not a channel for the jobs?
//    - All jobs are known before the first worker starts
//    - Any number of workers can pop from the same queue
//    - tokio's mpsc only allows one receiver
//
// 2. Why do the workers send outcomes instead of bumping shared counters?
//    - Only the collection loop ever mutates AggregateCounts
//    - No locks or atomics on the counting path
//    - The fold is commutative, so arrival order doesn't matter
//
// 3. What happens to a probe still running at the deadline?
//    - stop.cancel() makes its tokio::select! drop the request
//    - abort_all() tears down any task that hasn't noticed yet
//    - Its outcome, if one was already queued, is dropped with the channel
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{ClientPool, PoolConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scheduler() -> Scheduler {
        Scheduler::new(Prober::new(ClientPool::new(PoolConfig::default())))
    }

    fn site() -> Url {
        Url::parse("https://site.test").unwrap()
    }

    async fn external_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/c"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    fn scenario_links(server: &MockServer) -> Vec<String> {
        vec![
            "/a".to_string(),
            "https://site.test/b".to_string(),
            format!("{}/c", server.uri()),
            "#frag".to_string(),
            "mailto:x@y.com".to_string(),
        ]
    }

    #[test]
    fn test_worker_table_breakpoints() {
        let expected = [(10, 4), (25, 12), (50, 24), (100, 48), (150, 64), (200, 80), (500, 100)];
        for (links, workers) in expected {
            assert_eq!(workers_for(links), workers, "{links} links");
        }
        assert_eq!(workers_for(0), 4);
        assert_eq!(workers_for(11), 12);
        assert_eq!(workers_for(201), 100);
    }

    #[test]
    fn test_worker_count_is_monotonic_and_bounded() {
        let mut previous = 0;
        for links in 0..1000 {
            let workers = workers_for(links);
            assert!(workers >= previous);
            assert!((MIN_WORKERS..=MAX_WORKERS).contains(&workers));
            previous = workers;
        }
    }

    #[test]
    fn test_deadline_clamping() {
        assert_eq!(deadline_for(1), Duration::from_secs(30));
        assert_eq!(deadline_for(90), Duration::from_secs(30));
        assert_eq!(deadline_for(100), Duration::from_secs(33));
        assert_eq!(deadline_for(135), Duration::from_secs(45));
        assert_eq!(deadline_for(1000), Duration::from_secs(45));
    }

    #[test]
    fn test_batch_computes_limits_once() {
        let links: Vec<String> = (0..120).map(|i| format!("/p{i}")).collect();
        let batch = AnalysisBatch::new(links, site());
        assert_eq!(batch.workers(), 64);
        assert_eq!(batch.deadline(), Duration::from_secs(40));
        assert_eq!(batch.len(), 120);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = scheduler().run(AnalysisBatch::new(Vec::new(), site())).await;
        assert_eq!(report.counts, AggregateCounts::default());
        assert_eq!(report.submitted, 0);
        assert!(report.is_complete());
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_end_to_end_accessible() {
        let server = external_server(200).await;
        let batch = AnalysisBatch::new(scenario_links(&server), site());

        let report = scheduler().run(batch).await;

        assert_eq!(report.counts.internal_links, 2);
        assert_eq!(report.counts.external_links, 1);
        assert_eq!(report.counts.inaccessible_links, 0);
        assert_eq!(report.ignored, 2);
        assert_eq!(report.received, 5);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_end_to_end_inaccessible() {
        let server = external_server(503).await;
        let batch = AnalysisBatch::new(scenario_links(&server), site());

        let report = scheduler().run(batch).await;

        assert_eq!(report.counts.internal_links, 2);
        assert_eq!(report.counts.external_links, 1);
        assert_eq!(report.counts.inaccessible_links, 1);
    }

    #[tokio::test]
    async fn test_partition_excludes_skips_and_failures() {
        let server = external_server(200).await;
        let links = vec![
            "/one".to_string(),
            "two".to_string(),
            "https://site.test/three".to_string(),
            format!("{}/c", server.uri()),
            format!("{}/missing", server.uri()),
            "".to_string(),
            "javascript:void(0)".to_string(),
            "http://[::1".to_string(),
        ];
        let total = links.len();

        let report = scheduler().run(AnalysisBatch::new(links, site())).await;

        // 3 internal + 2 external resolvable; 2 skipped, 1 malformed
        assert_eq!(report.counts.total(), 5);
        assert_eq!(report.counts.internal_links, 3);
        assert_eq!(report.counts.external_links, 2);
        // /missing gets wiremock's default 404
        assert_eq!(report.counts.inaccessible_links, 1);
        assert_eq!(report.ignored, 2);
        assert_eq!(report.failed, 1);
        assert!(report.counts.total() <= total);
    }

    #[tokio::test]
    async fn test_more_links_than_workers() {
        let links: Vec<String> = (0..250).map(|i| format!("/page/{i}")).collect();
        let report = scheduler().run(AnalysisBatch::new(links, site())).await;

        assert_eq!(report.workers, 100);
        assert_eq!(report.counts.internal_links, 250);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_result() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let links: Vec<String> = (0..60).map(|i| format!("{}/slow/{i}", server.uri())).collect();
        let batch = AnalysisBatch::new(links, site()).with_deadline(Duration::from_millis(300));

        let started = Instant::now();
        let report = scheduler().run(batch).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.timed_out);
        assert_eq!(report.received + report.skipped(), 60);
        assert!(report.counts.inaccessible_links <= report.counts.external_links);
        assert!(report.counts.total() <= 60);
    }

    #[tokio::test]
    async fn test_caller_cancellation_stops_batch() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let links: Vec<String> = (0..10).map(|i| format!("{}/slow/{i}", server.uri())).collect();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let report = scheduler()
            .run_with_cancel(AnalysisBatch::new(links, site()), &cancel)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.cancelled);
        assert!(!report.is_complete());
    }
}
