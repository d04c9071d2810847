use async_trait::async_trait;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Handler};
use futures_util::{Stream, StreamExt};
use satbot_core::config::{BrowserConfig, TimeoutConfig};
use satbot_core::{AppConfig, AutomationError, BrowserProvisioner, PageDriver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::page::ChromiumPage;

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Session {
    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }
}

/// Owns the browser process (or the attached remote browser) and hands out
/// one tab per run. The browser is started lazily on the first request and
/// started again if its event loop has ended.
pub struct ChromiumProvisioner {
    browser: BrowserConfig,
    timeouts: TimeoutConfig,
    session: Mutex<Option<Session>>,
}

impl ChromiumProvisioner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            timeouts: config.timeouts.clone(),
            session: Mutex::new(None),
        }
    }

    pub async fn shutdown(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        if let Err(error) = session.browser.close().await {
            warn!(
                event_name = "satbot.browser.close_failed",
                error = %error,
                "browser did not close cleanly"
            );
        }
        session.handler.abort();
        info!(event_name = "satbot.browser.closed", "browser session closed");
    }

    async fn start(&self) -> Result<Session, AutomationError> {
        let (browser, handler) = match &self.browser.websocket_url {
            Some(url) => {
                info!(event_name = "satbot.browser.connect", url = %url, "attaching to browser");
                Browser::connect(url.as_str()).await.map_err(|error| {
                    AutomationError::BrowserConnection(format!("connect to `{url}`: {error}"))
                })?
            }
            None => {
                info!(
                    event_name = "satbot.browser.launch",
                    headless = self.browser.headless,
                    "launching browser"
                );
                Browser::launch(launch_config(&self.browser)?).await.map_err(|error| {
                    AutomationError::BrowserConnection(format!("launch: {error}"))
                })?
            }
        };

        Ok(Session { browser, handler: tokio::spawn(drive(handler)) })
    }
}

#[async_trait]
impl BrowserProvisioner for ChromiumProvisioner {
    async fn create_page(&self) -> Result<Box<dyn PageDriver>, AutomationError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|current| !current.is_alive()) {
            warn!(event_name = "satbot.browser.restart", "browser event loop ended, restarting");
            *session = None;
        }
        if session.is_none() {
            *session = Some(self.start().await?);
        }
        let Some(current) = session.as_mut() else {
            return Err(AutomationError::BrowserConnection("browser session unavailable".to_owned()));
        };

        let page = current
            .browser
            .new_page("about:blank")
            .await
            .map_err(|error| AutomationError::BrowserConnection(format!("new page: {error}")))?;
        Ok(Box::new(ChromiumPage::new(page, self.timeouts.poll_interval())))
    }
}

async fn drive(handler: Handler) {
    let errors = drain_events(handler).await;
    debug!(
        event_name = "satbot.browser.handler_stopped",
        errors,
        "browser event loop ended"
    );
}

/// Polls the CDP event stream until it ends. Event errors are logged and
/// skipped; returns how many were seen.
async fn drain_events<S, E>(mut events: S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(error) = event {
            errors += 1;
            debug!(
                event_name = "satbot.browser.handler_error",
                error = %error,
                "browser event error ignored"
            );
        }
    }
    errors
}

fn launch_config(config: &BrowserConfig) -> Result<chromiumoxide::BrowserConfig, AutomationError> {
    let mut builder = chromiumoxide::BrowserConfig::builder()
        .window_size(config.window_width, config.window_height)
        .viewport(Viewport {
            width: config.window_width,
            height: config.window_height,
            ..Viewport::default()
        });
    if !config.headless {
        builder = builder.with_head();
    }
    if let Some(path) = &config.executable_path {
        builder = builder.chrome_executable(path);
    }
    builder.build().map_err(AutomationError::BrowserConnection)
}
