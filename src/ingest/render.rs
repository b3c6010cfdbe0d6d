// src/ingest/render.rs
//! Rendered-page retrieval over the W3C WebDriver protocol.
//!
//! The browser itself (chromedriver, geckodriver, a selenium grid) runs outside
//! this process. One render = open a session, navigate, poll until the marker
//! element exists, read the page source, delete the session. The session is
//! deleted on every path, including a marker timeout and a render future that
//! is dropped mid-wait (outer deadline, aborted run).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::FetchSettings;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Final markup of `url` once an element matching `marker_css` exists.
    async fn render(&self, url: &str, marker_css: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct WdEnvelope<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Open session on the driver. Dropping it while still armed schedules the
/// DELETE on the runtime, so a cancelled render does not leak the browser.
struct SessionGuard {
    http: reqwest::Client,
    url: String,
    id: String,
    armed: bool,
}

impl SessionGuard {
    async fn close(mut self) {
        delete_session(&self.http, &self.url, &self.id).await;
        self.armed = false;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (http, url, id) = (self.http.clone(), self.url.clone(), self.id.clone());
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                tracing::debug!(session = %id, "webdriver: render cancelled, releasing session");
                rt.spawn(async move { delete_session(&http, &url, &id).await });
            }
            Err(_) => tracing::warn!(session = %id, "webdriver: no runtime to release session"),
        }
    }
}

async fn delete_session(http: &reqwest::Client, url: &str, session: &str) {
    let res = http.delete(url).send().await;
    if let Err(e) = res {
        tracing::warn!(error = %e, session, "webdriver: failed to delete session");
    }
}

#[derive(Clone)]
pub struct WebDriverRenderer {
    http: reqwest::Client,
    base_url: String,
    wait: Duration,
    poll_every: Duration,
    user_agent: String,
}

impl WebDriverRenderer {
    pub fn new(base_url: impl Into<String>, settings: &FetchSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()
            .context("building webdriver client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wait: settings.render_timeout(),
            poll_every: Duration::from_millis(250),
            user_agent: settings.user_agent.clone(),
        })
    }

    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_every = every;
        self
    }

    async fn open_session(&self) -> Result<SessionGuard> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--disable-blink-features=AutomationControlled",
                            format!("--user-agent={}", self.user_agent),
                        ],
                        "excludeSwitches": ["enable-automation"]
                    }
                }
            }
        });
        let resp = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(&caps)
            .send()
            .await
            .context("webdriver: new session")?;
        if !resp.status().is_success() {
            bail!("webdriver: new session returned {}", resp.status());
        }
        let env: WdEnvelope<NewSession> = resp.json().await.context("webdriver: session body")?;
        let id = env.value.session_id;
        Ok(SessionGuard {
            http: self.http.clone(),
            url: format!("{}/session/{id}", self.base_url),
            id,
            armed: true,
        })
    }

    async fn navigate(&self, session: &str, url: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/session/{session}/url", self.base_url))
            .json(&json!({ "url": url }))
            .send()
            .await
            .context("webdriver: navigate")?;
        if !resp.status().is_success() {
            bail!("webdriver: navigate to {url} returned {}", resp.status());
        }
        Ok(())
    }

    async fn marker_present(&self, session: &str, marker_css: &str) -> Result<bool> {
        let resp = self
            .http
            .post(format!("{}/session/{session}/element", self.base_url))
            .json(&json!({ "using": "css selector", "value": marker_css }))
            .send()
            .await
            .context("webdriver: find element")?;
        // 404 "no such element" is the normal not-yet answer.
        Ok(resp.status().is_success())
    }

    async fn wait_for_marker(&self, session: &str, marker_css: &str) -> Result<()> {
        let poll = async {
            loop {
                if self.marker_present(session, marker_css).await? {
                    return Ok::<(), anyhow::Error>(());
                }
                tokio::time::sleep(self.poll_every).await;
            }
        };
        match tokio::time::timeout(self.wait, poll).await {
            Ok(res) => res,
            Err(_) => Err(anyhow!(
                "marker {marker_css:?} did not appear within {:?}",
                self.wait
            )),
        }
    }

    async fn page_source(&self, session: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/session/{session}/source", self.base_url))
            .send()
            .await
            .context("webdriver: page source")?;
        if !resp.status().is_success() {
            bail!("webdriver: page source returned {}", resp.status());
        }
        let env: WdEnvelope<Value> = resp.json().await.context("webdriver: source body")?;
        env.value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("webdriver: page source is not a string"))
    }

    async fn render_in(&self, session: &str, url: &str, marker_css: &str) -> Result<String> {
        self.navigate(session, url).await?;
        self.wait_for_marker(session, marker_css).await?;
        self.page_source(session).await
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn render(&self, url: &str, marker_css: &str) -> Result<String> {
        let session = self.open_session().await?;
        let out = self.render_in(&session.id, url, marker_css).await;
        session.close().await;
        out
    }
}
