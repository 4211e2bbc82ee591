use crate::classify::FormClassifier;
use crate::cookies::{verify, AuthVerdict, CookieRecord, CookieSet};
use crate::error::Result;
use crate::fetch::{FetchRequest, Fetcher};
use crate::forms::{build_login_submission, find_login_form};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// No classifiable login form, or the form lacks a username/password
    /// pair. Field absence and form absence are the same failure.
    NoLoginForm,
    /// The submission changed no cookie: the credentials were rejected.
    BadAuth,
}

impl LoginFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginFailure::NoLoginForm => "nologinform",
            LoginFailure::BadAuth => "badauth",
        }
    }
}

#[derive(Debug)]
pub enum LoginResult {
    Success { cookies: CookieSet, landed_url: Url },
    Failure(LoginFailure),
}

/// Caller-facing record of one login attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<CookieRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

impl From<LoginResult> for LoginReport {
    fn from(result: LoginResult) -> Self {
        match result {
            LoginResult::Success {
                cookies,
                landed_url,
            } => LoginReport {
                ok: true,
                error: None,
                cookies: Some(cookies.into_records()),
                start_url: Some(landed_url.to_string()),
            },
            LoginResult::Failure(failure) => LoginReport {
                ok: false,
                error: Some(failure.as_str().to_string()),
                cookies: None,
                start_url: None,
            },
        }
    }
}

/// Runs the two-request login protocol: fetch the page, select and fill the
/// login form, submit it, and compare the cookie jar before and after.
///
/// One controller performs one strictly sequential attempt; it must own its
/// fetcher so the cookie-jar lineage is never shared with another attempt.
pub struct LoginController<F> {
    fetcher: F,
    classifier: Arc<dyn FormClassifier>,
    screenshot_dir: Option<PathBuf>,
}

impl<F: Fetcher> LoginController<F> {
    pub fn new(fetcher: F, classifier: Arc<dyn FormClassifier>) -> Self {
        Self {
            fetcher,
            classifier,
            screenshot_dir: None,
        }
    }

    /// Where to save a diagnostic screenshot of a failed rendered login.
    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = Some(dir);
        self
    }

    pub async fn attempt(
        &self,
        start_url: &Url,
        username: &str,
        password: &str,
    ) -> Result<LoginResult> {
        // Fetch errors here are fatal for the attempt and propagate; retry
        // policy belongs to the caller.
        let page = self
            .fetcher
            .fetch(FetchRequest::get(start_url.clone()))
            .await?;

        let forms = self.classifier.classify(&page.body, &page.url);
        let Some(form) = find_login_form(&forms) else {
            return Ok(LoginResult::Failure(LoginFailure::NoLoginForm));
        };
        info!("found login form on {}", page.url);

        let Some(submission) = build_login_submission(form, Some(&page.url), username, password)
        else {
            return Ok(LoginResult::Failure(LoginFailure::NoLoginForm));
        };
        debug!("submit parameters: {:?}", submission);

        let initial_cookies = page.cookies.clone();
        let response = self
            .fetcher
            .fetch(FetchRequest::from_submission(submission))
            .await?;

        match verify(&initial_cookies, &response.cookies) {
            AuthVerdict::Success => Ok(LoginResult::Success {
                cookies: response.cookies,
                landed_url: response.url,
            }),
            AuthVerdict::BadAuth => {
                // Observability only; rendered fetches carry a screenshot of
                // the page the failed submission landed on.
                if let Some(screenshot) = &response.screenshot {
                    self.save_debug_screenshot(screenshot);
                }
                Ok(LoginResult::Failure(LoginFailure::BadAuth))
            }
        }
    }

    fn save_debug_screenshot(&self, screenshot: &[u8]) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let filename = dir.join(format!("{}.jpeg", uuid::Uuid::new_v4()));
        match fs::write(&filename, screenshot) {
            Ok(()) => debug!("saved failure screenshot to {}", filename.display()),
            Err(e) => warn!("could not save screenshot to {}: {}", filename.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::HeuristicClassifier;
    use crate::fetch::{HttpFetcher, DEFAULT_USER_AGENT};
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form action="/session" method="post">
            <input type="text" name="user">
            <input type="password" name="pass">
            <input type="checkbox" name="remember">
            <input type="submit" name="go" value="Log in">
        </form>
        </body></html>
    "#;

    fn controller() -> LoginController<HttpFetcher> {
        let fetcher =
            HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap();
        LoginController::new(fetcher, Arc::new(HeuristicClassifier))
    }

    async fn mount_login_page(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(LOGIN_PAGE),
            )
            .mount(server)
            .await;
    }

    /// A session cookie issued by the submission means success.
    #[tokio::test]
    async fn test_login_success_on_new_cookie() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_string_contains("user=alice"))
            .and(body_string_contains("pass=hunter2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "sid=abc123; Path=/")
                    .set_body_string("<html><body>welcome</body></html>"),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "alice", "hunter2").await.unwrap();

        let LoginResult::Success {
            cookies,
            landed_url,
        } = result
        else {
            panic!("expected success, got {:?}", result);
        };
        assert!(cookies.records().iter().any(|c| c.name == "sid"));
        assert_eq!(landed_url.path(), "/session");
    }

    /// No cookie change after submission is a rejected login.
    #[tokio::test]
    async fn test_login_badauth_when_cookies_unchanged() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>nope</body></html>"),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "alice", "wrong").await.unwrap();

        assert!(matches!(
            result,
            LoginResult::Failure(LoginFailure::BadAuth)
        ));
        let report = LoginReport::from(result);
        assert!(!report.ok);
        assert_eq!(report.error.as_deref(), Some("badauth"));
    }

    /// An anonymous cookie reissued unchanged does not count as a login.
    #[tokio::test]
    async fn test_login_badauth_when_same_cookie_reissued() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .insert_header("set-cookie", "anon=xyz; Path=/")
                    .set_body_string(LOGIN_PAGE),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "anon=xyz; Path=/")
                    .set_body_string("<html><body>nope</body></html>"),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "alice", "wrong").await.unwrap();
        assert!(matches!(
            result,
            LoginResult::Failure(LoginFailure::BadAuth)
        ));
    }

    /// A page without any login form yields the nologinform failure.
    #[tokio::test]
    async fn test_no_login_form() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body><p>just text</p></body></html>"),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "a", "b").await.unwrap();

        let report = LoginReport::from(result);
        assert!(!report.ok);
        assert_eq!(report.error.as_deref(), Some("nologinform"));
        assert!(report.cookies.is_none());
    }

    /// A form with a username field but no password field is treated the
    /// same as no form at all.
    #[tokio::test]
    async fn test_form_without_password_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(
                        r#"<html><body>
                        <form action="/go" method="post">
                            <input type="email" name="email">
                            <input type="checkbox" name="remember_me">
                        </form>
                        </body></html>"#,
                    ),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "a", "b").await.unwrap();

        assert!(matches!(
            result,
            LoginResult::Failure(LoginFailure::NoLoginForm)
        ));
    }

    /// A form the classifier labelled "login" that still lacks a password
    /// field fails the same way as a missing form.
    #[tokio::test]
    async fn test_login_typed_form_missing_password_field() {
        use crate::forms::{ClassifiedForm, ControlKind, FieldControl};

        struct StubClassifier;
        impl FormClassifier for StubClassifier {
            fn classify(&self, _html: &str, _page_url: &Url) -> Vec<ClassifiedForm> {
                let mut form = ClassifiedForm::new("login", "/go", "POST");
                form.push_field(
                    "email",
                    "username or email",
                    FieldControl::new(ControlKind::Text, None),
                );
                form.push_field(
                    "remember",
                    "remember me checkbox",
                    FieldControl::new(ControlKind::Checkbox, None),
                );
                vec![form]
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher =
            HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap();
        let controller = LoginController::new(fetcher, Arc::new(StubClassifier));
        let start = Url::parse(&server.uri()).unwrap();
        let result = controller.attempt(&start, "a", "b").await.unwrap();

        assert!(matches!(
            result,
            LoginResult::Failure(LoginFailure::NoLoginForm)
        ));
    }

    /// Cookies set on a post-login redirect hop are still observed.
    #[tokio::test]
    async fn test_cookie_set_on_redirect_is_captured() {
        let server = MockServer::start().await;
        mount_login_page(&server).await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("set-cookie", "sid=fresh; Path=/")
                    .insert_header("location", "/home"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>home</body></html>"),
            )
            .mount(&server)
            .await;

        let start = Url::parse(&server.uri()).unwrap();
        let result = controller().attempt(&start, "alice", "hunter2").await.unwrap();

        let LoginResult::Success {
            cookies,
            landed_url,
        } = result
        else {
            panic!("expected success, got {:?}", result);
        };
        assert!(cookies.records().iter().any(|c| c.name == "sid"));
        assert_eq!(landed_url.path(), "/home");
    }

    /// A rendered fetch carries a screenshot; on a rejected login it is
    /// written into the configured directory as a jpeg.
    #[tokio::test]
    async fn test_badauth_screenshot_is_saved_for_rendered_fetch() {
        use crate::fetch::RenderFetcher;
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
        use tempfile::TempDir;

        const JPEG_BYTES: &[u8] = b"\xff\xd8\xffjpeg";

        let server = MockServer::start().await;
        // The submission job (its serialized body carries the filled
        // username) answers with the same cookie jar plus a screenshot.
        Mock::given(method("POST"))
            .and(path("/render"))
            .and(body_string_contains("user=alice"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(
                    r#"{{"url":"http://site.example/session","status":200,
                        "html":"<html>nope</html>",
                        "cookies":[{{"name":"anon","value":"x",
                                     "domain":"site.example","path":"/","port":null}}],
                        "screenshot":"{}"}}"#,
                    BASE64.encode(JPEG_BYTES)
                ),
                "application/json",
            ))
            .mount(&server)
            .await;
        // Any other render job is the initial page fetch.
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"url":"http://site.example/login","status":200,
                    "html":"<form action='/session' method='post'><input type='text' name='user'><input type='password' name='pass'></form>",
                    "cookies":[{"name":"anon","value":"x",
                                "domain":"site.example","path":"/","port":null}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let screenshot_dir = TempDir::new().unwrap();
        let fetcher =
            RenderFetcher::new(&server.uri(), DEFAULT_USER_AGENT, Duration::from_secs(5))
                .unwrap();
        let controller = LoginController::new(fetcher, Arc::new(HeuristicClassifier))
            .with_screenshot_dir(screenshot_dir.path().to_path_buf());

        let start = Url::parse("http://site.example/login").unwrap();
        let result = controller.attempt(&start, "alice", "wrong").await.unwrap();
        assert!(matches!(
            result,
            LoginResult::Failure(LoginFailure::BadAuth)
        ));

        let saved: Vec<_> = fs::read_dir(screenshot_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].extension().and_then(|e| e.to_str()), Some("jpeg"));
        assert_eq!(fs::read(&saved[0]).unwrap(), JPEG_BYTES);
    }
}
