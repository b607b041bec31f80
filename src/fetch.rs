use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::config::ScrapeSettings;
use crate::error::{PipelineError, PipelineResult};

/// Source of raw page bodies rooted at one base URL.
pub trait Fetch {
    /// `Some(body)` on success, `None` when the page is gone or empty.
    fn get(&self, parameter_url: &str) -> PipelineResult<Option<String>>;

    /// Same transport, different base URL.
    fn with_base(&self, base_url: &str) -> Self
    where
        Self: Sized;
}

#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    base_url: String,
    delay: Duration,
}

impl PageFetcher {
    pub fn new(settings: &ScrapeSettings) -> PipelineResult<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            delay: Duration::from_millis(settings.request_delay_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Fetch for PageFetcher {
    fn get(&self, parameter_url: &str) -> PipelineResult<Option<String>> {
        let url = build_url(&self.base_url, parameter_url);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let resp = self.client.get(&url).send()?;
        let status = resp.status();
        debug!(%url, status = status.as_u16(), "GET");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PipelineError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let body = resp.text()?;
        Ok(if body.trim().is_empty() { None } else { Some(body) })
    }

    fn with_base(&self, base_url: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: base_url.to_string(),
            delay: self.delay,
        }
    }
}

pub fn build_url(base_url: &str, parameter_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), parameter_url)
}

/// Split an absolute link into `(scheme://host/path, "?query")`.
pub fn split_link(link: &str) -> PipelineResult<(String, String)> {
    let invalid = || PipelineError::InvalidUrl(link.to_string());
    let url = Url::parse(link).map_err(|_| invalid())?;
    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;

    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let base = format!("{}://{}{}", url.scheme(), authority, url.path());
    let query = format!("?{}", url.query().unwrap_or(""));
    Ok((base, query))
}
