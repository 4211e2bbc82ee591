use autologin_scanner::classify::HeuristicClassifier;
use autologin_scanner::fetch::{HttpFetcher, RenderFetcher, DEFAULT_USER_AGENT};
use autologin_scanner::login::{LoginController, LoginReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Options for a single login attempt
pub struct LoginOptions {
    pub url: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub render_service: Option<String>,
    pub screenshot_dir: Option<PathBuf>,
}

impl LoginOptions {
    pub fn new(url: &str, username: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            max_response_bytes: 1024 * 1024,
            render_service: None,
            screenshot_dir: None,
        }
    }
}

/// Run one login attempt against the given URL.
///
/// Each call builds a fresh fetcher so cookie state never leaks between
/// attempts.
pub async fn execute_login(options: LoginOptions) -> Result<LoginReport, String> {
    let start_url = Url::parse(&options.url).map_err(|e| format!("Invalid URL: {}", e))?;
    let classifier = Arc::new(HeuristicClassifier);

    let result = match &options.render_service {
        Some(address) => {
            let fetcher = RenderFetcher::new(address, &options.user_agent, options.timeout)
                .map_err(|e| e.to_string())?;
            let mut controller = LoginController::new(fetcher, classifier);
            if let Some(dir) = options.screenshot_dir {
                controller = controller.with_screenshot_dir(dir);
            }
            controller
                .attempt(&start_url, &options.username, &options.password)
                .await
        }
        None => {
            let fetcher = HttpFetcher::new(
                &options.user_agent,
                options.timeout,
                options.max_response_bytes,
            )
            .map_err(|e| e.to_string())?;
            let controller = LoginController::new(fetcher, classifier);
            controller
                .attempt(&start_url, &options.username, &options.password)
                .await
        }
    };

    result.map(LoginReport::from).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let options = LoginOptions::new("::::", "user", "pass");
        let result = execute_login(options).await;
        assert!(result.unwrap_err().contains("Invalid URL"));
    }

    #[test]
    fn test_defaults() {
        let options = LoginOptions::new("http://example.com/login", "user", "pass");
        assert_eq!(options.max_response_bytes, 1024 * 1024);
        assert!(options.render_service.is_none());
        assert!(options.screenshot_dir.is_none());
    }
}
