use crate::classify::{extract_links, FormClassifier};
use crate::error::Result;
use crate::fetch::{FetchRequest, FetchedPage, Fetcher};
use crate::forms::classify_page;
use crate::frontier::{CrawlBudget, CrawlFrontier, FrontierEntry};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Persists discovered form URLs. Each method is called at most once per
/// run; implementations must tolerate a repeated call with the same value.
pub trait DiscoveryStore: Send + Sync {
    fn record_login_url(&self, url: &str);
    fn record_registration_url(&self, url: &str);
}

/// Progress hook, invoked with each crawled page URL.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// What one discovery run produced. Every termination path is a normal
/// completion; runs differ only in which URLs ended up populated.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub login_url: Option<String>,
    pub registration_url: Option<String>,
    pub pages_fetched: usize,
}

impl DiscoveryOutcome {
    /// Both target form types were found.
    pub fn complete(&self) -> bool {
        self.login_url.is_some() && self.registration_url.is_some()
    }
}

/// Crawls out from a seed URL until a login and a registration form have
/// been seen, the page budget is spent, or the frontier runs dry.
///
/// One event loop owns the frontier and the found-form state; fetches run
/// as spawned tasks whose completions are consumed here, so the page budget
/// is counted once and the first-found flags cannot race.
pub struct FormDiscoveryController<F> {
    fetcher: Arc<F>,
    classifier: Arc<dyn FormClassifier>,
    budget: CrawlBudget,
    store: Option<Arc<dyn DiscoveryStore>>,
    progress_callback: Option<ProgressCallback>,
}

impl<F: Fetcher + 'static> FormDiscoveryController<F> {
    pub fn new(fetcher: F, classifier: Arc<dyn FormClassifier>, budget: CrawlBudget) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            classifier,
            budget,
            store: None,
            progress_callback: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DiscoveryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn run(&self, seed: &Url) -> Result<DiscoveryOutcome> {
        info!("starting form discovery from {}", seed);
        let mut frontier = CrawlFrontier::new(seed, self.budget.clone())?;
        let mut login_url: Option<String> = None;
        let mut registration_url: Option<String> = None;

        let mut in_flight: JoinSet<(String, usize, Result<FetchedPage>)> = JoinSet::new();
        // Popped but gated by the per-domain dispatch rules.
        let mut held: Option<FrontierEntry> = None;

        loop {
            if login_url.is_some() && registration_url.is_some() {
                // Done: new dispatches stop here; whatever is still in
                // flight is dropped with the JoinSet below.
                frontier.raise_stop();
                info!("both form types found, closing crawl");
                break;
            }

            if !frontier.should_stop() {
                self.fill_dispatch_slots(&mut frontier, &mut held, &mut in_flight)
                    .await;
            }

            if in_flight.is_empty() {
                // Nothing running and nothing dispatchable.
                break;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (domain, depth, outcome) = joined?;
            frontier.note_completed(&domain);

            if frontier.should_stop() {
                // Budget ran out while this fetch was in flight; its result
                // no longer counts.
                continue;
            }

            match outcome {
                Ok(page) => {
                    if let Some(callback) = &self.progress_callback {
                        callback(page.url.as_str());
                    }
                    self.process_page(
                        &page,
                        depth,
                        &mut frontier,
                        &mut login_url,
                        &mut registration_url,
                    );
                }
                Err(e) => {
                    // Individual fetch failures never abort the run.
                    warn!("fetch failed: {}", e);
                }
            }
        }

        Ok(DiscoveryOutcome {
            login_url,
            registration_url,
            pages_fetched: frontier.pages_dispatched(),
        })
    }

    /// Dispatch pending entries until the queue is dry or a per-domain gate
    /// blocks. A rate-limited entry is only waited on when nothing else is
    /// in flight; otherwise it is held for the next pass.
    async fn fill_dispatch_slots(
        &self,
        frontier: &mut CrawlFrontier,
        held: &mut Option<FrontierEntry>,
        in_flight: &mut JoinSet<(String, usize, Result<FetchedPage>)>,
    ) {
        loop {
            if frontier.should_stop() {
                return;
            }
            let Some(entry) = held.take().or_else(|| frontier.pop()) else {
                return;
            };
            let domain = entry.url.host_str().unwrap_or_default().to_string();

            match frontier.dispatch_delay(&domain, Instant::now()) {
                Some(wait) if wait.is_zero() => {
                    frontier.note_dispatched(&domain, Instant::now());
                    let fetcher = self.fetcher.clone();
                    let depth = entry.depth;
                    let url = entry.url.clone();
                    debug!("dispatching {} (depth {}, priority {})", url, depth, entry.priority);
                    in_flight.spawn(async move {
                        let outcome = fetcher.fetch(FetchRequest::get(url)).await;
                        (domain, depth, outcome)
                    });
                }
                Some(wait) => {
                    if in_flight.is_empty() {
                        tokio::time::sleep(wait).await;
                        *held = Some(entry);
                        continue;
                    }
                    *held = Some(entry);
                    return;
                }
                None => {
                    // Concurrency slots full; a completion will free one.
                    *held = Some(entry);
                    return;
                }
            }
        }
    }

    fn process_page(
        &self,
        page: &FetchedPage,
        depth: usize,
        frontier: &mut CrawlFrontier,
        login_url: &mut Option<String>,
        registration_url: &mut Option<String>,
    ) {
        if !(200..400).contains(&page.status) {
            debug!("skipping {} (status {})", page.url, page.status);
            return;
        }
        info!("{}", page.url);

        let forms = self.classifier.classify(&page.body, &page.url);
        let classification = classify_page(&forms);

        if classification.has_login && login_url.is_none() {
            info!("Found login form at {}", page.url);
            *login_url = Some(page.url.to_string());
            if let Some(store) = &self.store {
                store.record_login_url(page.url.as_str());
            }
        }
        if classification.has_registration && registration_url.is_none() {
            info!("Found registration form at {}", page.url);
            *registration_url = Some(page.url.to_string());
            if let Some(store) = &self.store {
                store.record_registration_url(page.url.as_str());
            }
        }
        if login_url.is_some() && registration_url.is_some() {
            // No point queueing more work; the run loop closes next pass.
            return;
        }

        for link in extract_links(&page.body, &page.url) {
            frontier.push(&link.url, &link.text, depth + 1);
        }
    }
}
