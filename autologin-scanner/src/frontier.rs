use crate::error::{Result, ScanError};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Link-text and path keywords that mark a URL as likely to lead to a login
/// or registration form.
pub const PRIORITY_PATTERNS: &[&str] = &[
    // Login links
    "login",
    "log in",
    "logon",
    "signin",
    "sign in",
    "sign-in",
    // Registration links
    "signup",
    "sign up",
    "sign-up",
    "register",
    "registration",
    "account",
    "join",
];

pub const PRIORITY_BOOST: i32 = 100;

/// Immutable configuration for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlBudget {
    pub max_depth: usize,
    pub max_pages: usize,
    pub delay_per_request: Duration,
    pub max_concurrent_per_domain: usize,
    pub max_response_bytes: usize,
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 2000,
            delay_per_request: Duration::from_secs(2),
            max_concurrent_per_domain: 2,
            max_response_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub priority: i32,
    pub depth: usize,
}

/// Heap item: highest priority first, FIFO within a priority tier.
struct QueueItem {
    entry: FrontierEntry,
    seq: u64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .priority
            .cmp(&other.entry.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct DomainState {
    in_flight: usize,
    next_allowed: Option<Instant>,
}

/// Bounded, priority-ordered pending-URL queue for one crawl run.
///
/// The frontier owns ordering, deduplication, the page budget and the
/// per-domain dispatch gates. It never fetches anything itself.
pub struct CrawlFrontier {
    budget: CrawlBudget,
    allowed_domain: String,
    queue: BinaryHeap<QueueItem>,
    seen: HashSet<String>,
    next_seq: u64,
    pages_dispatched: usize,
    stopped: bool,
    domains: HashMap<String, DomainState>,
}

impl CrawlFrontier {
    /// Seed the frontier with a start URL. The seed's domain becomes the
    /// allowed domain set for the whole run.
    pub fn new(seed: &Url, budget: CrawlBudget) -> Result<Self> {
        let allowed_domain = seed
            .host_str()
            .ok_or_else(|| ScanError::InvalidUrl(format!("no host in seed URL {}", seed)))?
            .to_string();

        let mut frontier = Self {
            budget,
            allowed_domain,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            next_seq: 0,
            pages_dispatched: 0,
            stopped: false,
            domains: HashMap::new(),
        };
        frontier.enqueue(seed.clone(), 0, 0);
        Ok(frontier)
    }

    pub fn allowed_domain(&self) -> &str {
        &self.allowed_domain
    }

    /// Priority of a link given its URL and anchor text: boosted when the
    /// case-folded text or the URL's own path/query mentions a login or
    /// registration keyword.
    pub fn link_priority(url: &Url, link_text: &str) -> i32 {
        let mut haystack = url.path().to_string();
        if let Some(query) = url.query() {
            haystack.push('?');
            haystack.push_str(query);
        }
        haystack.push(' ');
        haystack.push_str(link_text);
        let haystack = haystack.to_lowercase();

        if PRIORITY_PATTERNS.iter().any(|p| haystack.contains(p)) {
            PRIORITY_BOOST
        } else {
            0
        }
    }

    /// Offer a discovered link. Returns whether it was enqueued; links past
    /// the depth cap, outside the allowed domain, or already offered this
    /// run are dropped.
    pub fn push(&mut self, url: &Url, link_text: &str, depth: usize) -> bool {
        if depth > self.budget.max_depth {
            debug!("dropping {} (depth {} past limit)", url, depth);
            return false;
        }
        if !self.in_allowed_domain(url) {
            debug!("dropping {} (outside {})", url, self.allowed_domain);
            return false;
        }
        if self.seen.contains(url.as_str()) {
            return false;
        }
        let priority = Self::link_priority(url, link_text);
        self.enqueue(url.clone(), priority, depth);
        true
    }

    fn enqueue(&mut self, url: Url, priority: i32, depth: usize) {
        self.seen.insert(url.as_str().to_string());
        self.queue.push(QueueItem {
            entry: FrontierEntry {
                url,
                priority,
                depth,
            },
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Highest-priority pending entry; FIFO among equal priorities.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop().map(|item| item.entry)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pages_dispatched(&self) -> usize {
        self.pages_dispatched
    }

    /// True once the page budget is spent or an explicit stop was raised.
    pub fn should_stop(&self) -> bool {
        self.stopped || self.pages_dispatched >= self.budget.max_pages
    }

    pub fn raise_stop(&mut self) {
        self.stopped = true;
    }

    /// Whether a popped entry may be dispatched to its domain right now.
    /// `None` means the domain's concurrency slots are full; `Some(d)`
    /// means dispatch is allowed after waiting `d` (possibly zero).
    pub fn dispatch_delay(&self, domain: &str, now: Instant) -> Option<Duration> {
        let state = self.domains.get(domain);
        let in_flight = state.map(|s| s.in_flight).unwrap_or(0);
        if in_flight >= self.budget.max_concurrent_per_domain {
            return None;
        }
        let wait = state
            .and_then(|s| s.next_allowed)
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);
        Some(wait)
    }

    /// Record that a popped entry was handed to the fetch engine. Counts
    /// against the page budget and opens the per-domain spacing window.
    pub fn note_dispatched(&mut self, domain: &str, now: Instant) {
        let state = self.domains.entry(domain.to_string()).or_default();
        state.in_flight += 1;
        state.next_allowed = Some(now + self.budget.delay_per_request);
        self.pages_dispatched += 1;
    }

    pub fn note_completed(&mut self, domain: &str) {
        if let Some(state) = self.domains.get_mut(domain) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    fn in_allowed_domain(&self, url: &Url) -> bool {
        match url.host_str() {
            Some(host) => {
                host == self.allowed_domain
                    || host.ends_with(&format!(".{}", self.allowed_domain))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    fn frontier() -> CrawlFrontier {
        CrawlFrontier::new(&seed(), CrawlBudget::default()).unwrap()
    }

    fn url(path: &str) -> Url {
        seed().join(path).unwrap()
    }

    #[test]
    fn test_seed_is_enqueued_at_depth_zero() {
        let mut f = frontier();
        let entry = f.pop().unwrap();
        assert_eq!(entry.url, seed());
        assert_eq!(entry.depth, 0);
        assert!(f.is_empty());
    }

    #[test]
    fn test_priority_link_pops_first() {
        // Scenario: "Sign Up Now" beats "About Us" regardless of push order.
        let mut f = frontier();
        f.pop();
        assert!(f.push(&url("/about"), "About Us", 1));
        assert!(f.push(&url("/new-users"), "Sign Up Now", 1));

        let first = f.pop().unwrap();
        assert_eq!(first.url, url("/new-users"));
        assert_eq!(first.priority, PRIORITY_BOOST);
        let second = f.pop().unwrap();
        assert_eq!(second.priority, 0);
    }

    #[test]
    fn test_url_path_alone_grants_priority() {
        let mut f = frontier();
        f.pop();
        f.push(&url("/login"), "click here", 1);
        assert_eq!(f.pop().unwrap().priority, PRIORITY_BOOST);
    }

    #[test]
    fn test_fifo_within_priority_tier() {
        let mut f = frontier();
        f.pop();
        f.push(&url("/a"), "", 1);
        f.push(&url("/b"), "", 1);
        f.push(&url("/c"), "", 1);
        assert_eq!(f.pop().unwrap().url, url("/a"));
        assert_eq!(f.pop().unwrap().url, url("/b"));
        assert_eq!(f.pop().unwrap().url, url("/c"));
    }

    #[test]
    fn test_depth_cap_rejects() {
        let mut f = frontier();
        assert!(!f.push(&url("/deep"), "", 4));
        assert!(f.push(&url("/ok"), "", 3));
    }

    #[test]
    fn test_foreign_domain_rejected_subdomain_allowed() {
        let mut f = frontier();
        assert!(!f.push(&Url::parse("http://evil.com/login").unwrap(), "", 1));
        assert!(f.push(&Url::parse("http://auth.example.com/login").unwrap(), "", 1));
    }

    #[test]
    fn test_duplicate_url_not_reenqueued() {
        let mut f = frontier();
        assert!(f.push(&url("/page"), "", 1));
        assert!(!f.push(&url("/page"), "different text", 2));
        f.pop();
        f.pop();
        // Still deduplicated after having been yielded.
        assert!(!f.push(&url("/page"), "", 1));
    }

    #[test]
    fn test_page_budget_stops_run() {
        let budget = CrawlBudget {
            max_pages: 2,
            ..CrawlBudget::default()
        };
        let mut f = CrawlFrontier::new(&seed(), budget).unwrap();
        let now = Instant::now();
        assert!(!f.should_stop());
        f.note_dispatched("example.com", now);
        assert!(!f.should_stop());
        f.note_dispatched("example.com", now);
        assert!(f.should_stop());
    }

    #[test]
    fn test_raise_stop() {
        let mut f = frontier();
        assert!(!f.should_stop());
        f.raise_stop();
        assert!(f.should_stop());
    }

    #[test]
    fn test_concurrency_gate() {
        let budget = CrawlBudget {
            max_concurrent_per_domain: 2,
            delay_per_request: Duration::ZERO,
            ..CrawlBudget::default()
        };
        let mut f = CrawlFrontier::new(&seed(), budget).unwrap();
        let now = Instant::now();

        assert_eq!(f.dispatch_delay("example.com", now), Some(Duration::ZERO));
        f.note_dispatched("example.com", now);
        f.note_dispatched("example.com", now);
        assert_eq!(f.dispatch_delay("example.com", now), None);
        f.note_completed("example.com");
        assert_eq!(f.dispatch_delay("example.com", now), Some(Duration::ZERO));
    }

    #[test]
    fn test_request_spacing_gate() {
        let budget = CrawlBudget {
            delay_per_request: Duration::from_secs(2),
            ..CrawlBudget::default()
        };
        let mut f = CrawlFrontier::new(&seed(), budget).unwrap();
        let now = Instant::now();

        f.note_dispatched("example.com", now);
        let wait = f.dispatch_delay("example.com", now).unwrap();
        assert!(wait > Duration::from_millis(1900));
        // Other domains are not delayed by example.com's window.
        assert_eq!(f.dispatch_delay("auth.example.com", now), Some(Duration::ZERO));
    }
}
