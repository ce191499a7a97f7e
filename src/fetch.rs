use crate::probes::ProbeOutcome;
use headless_chrome::{Browser, LaunchOptions};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Two-tier page fetcher. Tier 1 is a plain GET with a realistic browser
/// User-Agent following redirects; bot-walled (403) or transport-failed
/// requests fall back to tier 2, a headless Chrome render scoped to the
/// single call and torn down on every exit path.
pub struct PageFetcher {
    client: Client,
    fetch_budget: Duration,
    browser_budget: Duration,
    browser_fallback: bool,
}

enum PlainOutcome {
    Body(String),
    Blocked,
    BadStatus(StatusCode),
}

impl PageFetcher {
    pub fn new(
        fetch_budget: Duration,
        browser_budget: Duration,
        browser_fallback: bool,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(fetch_budget)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            fetch_budget,
            browser_budget,
            browser_fallback,
        })
    }

    /// Fetch the document at `url`, or report why none is available.
    pub async fn fetch(&self, url: &str) -> ProbeOutcome<String> {
        match timeout(self.fetch_budget, self.plain_get(url)).await {
            Ok(Ok(PlainOutcome::Body(body))) => ProbeOutcome::Success(body),
            Ok(Ok(PlainOutcome::Blocked)) => {
                debug!("{url} answered 403, falling back to headless browser");
                self.render(url).await
            }
            Ok(Ok(PlainOutcome::BadStatus(code))) => {
                ProbeOutcome::Failure(format!("unexpected status {code}"))
            }
            Ok(Err(e)) => {
                debug!("plain fetch of {url} failed ({e}), falling back to headless browser");
                self.render(url).await
            }
            Err(_) => {
                debug!("plain fetch of {url} timed out, falling back to headless browser");
                match self.render(url).await {
                    ProbeOutcome::Failure(_) if !self.browser_fallback => ProbeOutcome::Timeout,
                    outcome => outcome,
                }
            }
        }
    }

    async fn plain_get(&self, url: &str) -> Result<PlainOutcome, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(PlainOutcome::Body(response.text().await?)),
            StatusCode::FORBIDDEN => Ok(PlainOutcome::Blocked),
            code => Ok(PlainOutcome::BadStatus(code)),
        }
    }

    async fn render(&self, url: &str) -> ProbeOutcome<String> {
        if !self.browser_fallback {
            return ProbeOutcome::Failure("browser fallback disabled".to_string());
        }

        let url = url.to_string();
        let budget = self.browser_budget;
        let rendered = tokio::task::spawn_blocking(move || render_page(&url, budget));

        // The hard page-load deadline. The spawned closure owns the
        // Browser handle, so the child process dies with the closure even
        // when we stop waiting here.
        match timeout(self.browser_budget, rendered).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(join_err)) => {
                warn!("headless browser task panicked: {join_err}");
                ProbeOutcome::Failure("browser task failed".to_string())
            }
            Ok(Ok(Ok(body))) => ProbeOutcome::Success(body),
            Ok(Ok(Err(e))) => ProbeOutcome::Failure(format!("browser render failed: {e}")),
        }
    }
}

fn render_page(url: &str, budget: Duration) -> anyhow::Result<String> {
    let browser = Browser::new(LaunchOptions {
        headless: true,
        sandbox: false,
        idle_browser_timeout: budget,
        ..Default::default()
    })?;

    let tab = browser.new_tab()?;
    tab.set_default_timeout(budget);
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;
    tab.get_content()
}
