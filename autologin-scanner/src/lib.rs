pub mod classify;
pub mod cookies;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod forms;
pub mod frontier;
pub mod login;

pub use classify::{extract_links, FormClassifier, HeuristicClassifier, Link};
pub use cookies::{verify, AuthVerdict, CookieRecord, CookieSet};
pub use discovery::{
    DiscoveryOutcome, DiscoveryStore, FormDiscoveryController, ProgressCallback,
};
pub use error::ScanError;
pub use fetch::{FetchRequest, FetchedPage, Fetcher, HttpFetcher, RenderFetcher, DEFAULT_USER_AGENT};
pub use forms::{
    build_login_submission, classify_page, find_login_form, ClassifiedForm, SubmissionRequest,
};
pub use frontier::{CrawlBudget, CrawlFrontier, FrontierEntry};
pub use login::{LoginController, LoginFailure, LoginReport, LoginResult};
