use crate::cookies::{CookieRecord, CookieSet};
use crate::error::{Result, ScanError};
use crate::forms::SubmissionRequest;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux i686) AppleWebKit/537.36 \
    (KHTML, like Gecko) Ubuntu Chromium/43.0.2357.130 \
    Chrome/43.0.2357.130 Safari/537.36";

const MAX_REDIRECTS: usize = 5;

/// One request handed to the fetch engine. Submissions are never filtered
/// as duplicates of an earlier GET; the frontier's dedup only applies to
/// crawl entries, which never reach this type twice.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A GET submission carries its pairs in the query string; a POST
    /// carries them in the body.
    pub fn from_submission(submission: SubmissionRequest) -> Self {
        let SubmissionRequest {
            mut url,
            method,
            headers,
            body,
        } = submission;
        let body = if method == "GET" {
            if !body.is_empty() {
                url.set_query(Some(&body));
            }
            None
        } else {
            Some(body)
        };
        Self {
            url,
            method,
            headers,
            body,
        }
    }
}

/// A fetched, fully-read page with the cookie set of its browsing context.
///
/// Both fetcher implementations normalize to this shape, so callers never
/// branch on whether rendering was used; `screenshot` is simply absent for
/// plain HTTP fetches.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
    pub cookies: CookieSet,
    pub screenshot: Option<Vec<u8>>,
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> impl Future<Output = Result<FetchedPage>> + Send;
}

/// Plain HTTP fetch engine. Follows redirects manually so that cookies set
/// on intermediate responses are captured in the shadow jar, and caps every
/// body read at `max_response_bytes`.
pub struct HttpFetcher {
    client: Client,
    // Shadow jar mirroring the client's cookie store; reqwest's own jar is
    // not inspectable. Never locked across an await point.
    jar: Mutex<CookieSet>,
    max_response_bytes: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_response_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            jar: Mutex::new(CookieSet::new()),
            max_response_bytes,
        })
    }

    fn harvest_cookies(&self, response: &reqwest::Response) -> CookieSet {
        let url = response.url();
        let host = url.host_str().unwrap_or_default().to_string();
        let port = url.port_or_known_default();

        let mut jar = self.jar.lock().unwrap();
        for cookie in response.cookies() {
            jar.insert(CookieRecord {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain: cookie
                    .domain()
                    .map(str::to_string)
                    .unwrap_or_else(|| host.clone()),
                path: cookie
                    .path()
                    .map(str::to_string)
                    .unwrap_or_else(|| "/".to_string()),
                port,
                secure: cookie.secure(),
                http_only: cookie.http_only(),
            });
        }
        jar.clone()
    }

    async fn read_body_limited(&self, mut response: reqwest::Response) -> Result<String> {
        let url = response.url().clone();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if buf.len() + chunk.len() > self.max_response_bytes {
                return Err(ScanError::ResponseTooLarge {
                    url: url.to_string(),
                    limit: self.max_response_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedPage> {
        let mut url = request.url;
        let mut method = request.method;
        let mut headers = request.headers;
        let mut body = request.body;

        for _ in 0..=MAX_REDIRECTS {
            debug!("{} {}", method, url);
            let mut builder = match method.as_str() {
                "POST" => self.client.post(url.clone()),
                _ => self.client.get(url.clone()),
            };
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }
            if let Some(payload) = &body {
                builder = builder.body(payload.clone());
            }

            let response = builder.send().await?;
            let status = response.status();
            let cookies = self.harvest_cookies(&response);

            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    let final_url = response.url().clone();
                    let text = self.read_body_limited(response).await?;
                    return Ok(FetchedPage {
                        url: final_url,
                        status: status.as_u16(),
                        body: text,
                        cookies,
                        screenshot: None,
                    });
                };
                let next = url
                    .join(location)
                    .map_err(|e| ScanError::InvalidUrl(format!("redirect target: {}", e)))?;
                // A POST answered with 301/302/303 is refetched as GET, the
                // way browsers do; 307/308 keep method and body.
                if !matches!(status.as_u16(), 307 | 308) {
                    method = "GET".to_string();
                    headers.clear();
                    body = None;
                }
                url = next;
                continue;
            }

            let final_url = response.url().clone();
            let text = self.read_body_limited(response).await?;
            return Ok(FetchedPage {
                url: final_url,
                status: status.as_u16(),
                body: text,
                cookies,
                screenshot: None,
            });
        }

        Err(ScanError::Other(format!(
            "too many redirects fetching {}",
            url
        )))
    }
}

#[derive(Serialize)]
struct RenderJob<'a> {
    url: &'a str,
    method: &'a str,
    headers: &'a [(String, String)],
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    user_agent: &'a str,
}

#[derive(Deserialize)]
struct RenderReply {
    url: String,
    status: u16,
    html: String,
    #[serde(default)]
    cookies: Vec<CookieRecord>,
    /// Base64-encoded JPEG of the rendered viewport.
    #[serde(default)]
    screenshot: Option<String>,
}

/// Fetch engine backed by a headless rendering service. The service owns
/// the browsing context, so each reply carries the full cookie jar and an
/// optional screenshot.
pub struct RenderFetcher {
    client: Client,
    endpoint: Url,
    user_agent: String,
}

impl RenderFetcher {
    pub fn new(service_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(service_url)
            .and_then(|u| u.join("render"))
            .map_err(|e| ScanError::InvalidUrl(format!("render service: {}", e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            user_agent: user_agent.to_string(),
        })
    }
}

impl Fetcher for RenderFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedPage> {
        let job = RenderJob {
            url: request.url.as_str(),
            method: &request.method,
            headers: &request.headers,
            body: request.body.as_deref(),
            user_agent: &self.user_agent,
        };
        debug!("render {} via {}", request.url, self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&job)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ScanError::RenderService(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )));
        }
        let reply: RenderReply = response.json().await?;

        let url = Url::parse(&reply.url)
            .map_err(|e| ScanError::RenderService(format!("bad final URL: {}", e)))?;
        let screenshot = reply.screenshot.and_then(|encoded| {
            BASE64
                .decode(encoded)
                .inspect_err(|e| warn!("discarding undecodable screenshot: {}", e))
                .ok()
        });

        Ok(FetchedPage {
            url,
            status: reply.status,
            body: reply.html,
            cookies: reply.cookies.into_iter().collect(),
            screenshot,
        })
    }
}
