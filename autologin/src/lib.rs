// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{expand_db_path, resolve_login_target};

// Re-export the discovery and login entry points from autologin-core
pub use autologin_core::discover::{
    execute_discovery, generate_discovery_report, DiscoverOptions,
};
pub use autologin_core::login_run::{execute_login, LoginOptions};
