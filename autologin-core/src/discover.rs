use autologin_scanner::classify::HeuristicClassifier;
use autologin_scanner::discovery::{
    DiscoveryOutcome, DiscoveryStore, FormDiscoveryController, ProgressCallback,
};
use autologin_scanner::fetch::{Fetcher, HttpFetcher, RenderFetcher, DEFAULT_USER_AGENT};
use autologin_scanner::frontier::CrawlBudget;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Options for configuring a discovery run
pub struct DiscoverOptions {
    pub seed_url: String,
    pub budget: CrawlBudget,
    pub user_agent: String,
    pub timeout: Duration,
    /// Address of a headless rendering service; plain HTTP when unset.
    pub render_service: Option<String>,
    pub show_progress: bool,
}

impl DiscoverOptions {
    pub fn new(seed_url: &str) -> Self {
        Self {
            seed_url: seed_url.to_string(),
            budget: CrawlBudget::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            render_service: None,
            show_progress: false,
        }
    }
}

/// Execute a discovery run with the given options.
/// Returns the discovery outcome.
pub async fn execute_discovery(
    options: DiscoverOptions,
    store: Option<Arc<dyn DiscoveryStore>>,
) -> Result<DiscoveryOutcome, String> {
    let seed = Url::parse(&options.seed_url).map_err(|e| format!("Invalid URL: {}", e))?;

    // Single spinner for overall progress (only if enabled)
    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.set_message("Starting discovery...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));
    let progress_callback: Option<ProgressCallback> = progress_bar.as_ref().map(|pb| {
        let pb = pb.clone();
        let count = processed_count.clone();
        let callback: ProgressCallback = Arc::new(move |url: &str| {
            let n = count.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Crawling... {} pages, last: {}", n, url));
            pb.tick();
        });
        callback
    });

    let outcome = match &options.render_service {
        Some(address) => {
            let fetcher = RenderFetcher::new(address, &options.user_agent, options.timeout)
                .map_err(|e| e.to_string())?;
            run_discovery(fetcher, &options, store, progress_callback, &seed).await?
        }
        None => {
            let fetcher = HttpFetcher::new(
                &options.user_agent,
                options.timeout,
                options.budget.max_response_bytes,
            )
            .map_err(|e| e.to_string())?;
            run_discovery(fetcher, &options, store, progress_callback, &seed).await?
        }
    };

    if let Some(pb) = &progress_bar {
        pb.finish_with_message(format!(
            "Discovery complete! {} pages fetched",
            outcome.pages_fetched
        ));
    }

    Ok(outcome)
}

async fn run_discovery<F: Fetcher + 'static>(
    fetcher: F,
    options: &DiscoverOptions,
    store: Option<Arc<dyn DiscoveryStore>>,
    progress_callback: Option<ProgressCallback>,
    seed: &Url,
) -> Result<DiscoveryOutcome, String> {
    let mut controller = FormDiscoveryController::new(
        fetcher,
        Arc::new(HeuristicClassifier),
        options.budget.clone(),
    );
    if let Some(store) = store {
        controller = controller.with_store(store);
    }
    if let Some(callback) = progress_callback {
        controller = controller.with_progress_callback(callback);
    }
    controller.run(seed).await.map_err(|e| e.to_string())
}

/// Generate a discovery report from an outcome
pub fn generate_discovery_report(seed_url: &str, outcome: &DiscoveryOutcome) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str(&format!(
        "# Form discovery ({})\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));
    report.push_str(&format!("  Seed: {}\n", seed_url));
    report.push_str(&format!("  Pages fetched: {}\n\n", outcome.pages_fetched));

    report.push_str(&format!(
        "  Login form:        {}\n",
        outcome.login_url.as_deref().unwrap_or("not found")
    ));
    report.push_str(&format!(
        "  Registration form: {}\n",
        outcome.registration_url.as_deref().unwrap_or("not found")
    ));

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report
}
