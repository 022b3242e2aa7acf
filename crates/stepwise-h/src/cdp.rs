use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig as LaunchConfig, Page};
use futures::StreamExt;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use stepwise_engine::config::BrowserConfig;
use stepwise_engine::driver::{DriverError, NetworkEvent};
use tokio::task::JoinHandle;

/// Console messages captured by the listener task, as `(level, text)`.
pub type ConsoleBuffer = Arc<Mutex<Vec<(String, String)>>>;

/// Requests and responses captured by the network listeners, in arrival order.
pub type NetworkBuffer = Arc<Mutex<Vec<NetworkEvent>>>;

/// Keeps cross-origin frames in the page's process so one CDP session sees them all.
const SAME_PROCESS_FRAMES: &str = "--disable-features=IsolateOrigins,site-per-process";

pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    pub console: ConsoleBuffer,
    pub network: NetworkBuffer,
    user_data_dir: Option<PathBuf>,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, DriverError> {
        let mut config_builder = LaunchConfig::builder()
            .no_sandbox()
            .arg(SAME_PROCESS_FRAMES)
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Viewport::default()
            });
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder.user_data_dir(&user_data_dir);

        if config.headless {
            tracing::info!("Launching browser in headless mode");
        } else {
            tracing::info!("Launching browser in visible mode");
            config_builder = config_builder.with_head();
        }

        // CHROME_BIN wins over the configured executable.
        let executable = std::env::var("CHROME_BIN")
            .ok()
            .map(PathBuf::from)
            .or_else(|| config.chrome_executable.clone());
        if let Some(chrome_bin) = executable {
            tracing::info!("Using custom Chrome binary: {}", chrome_bin.display());
            config_builder = config_builder.chrome_executable(chrome_bin);
        }

        let (browser, mut handler) = Browser::launch(
            config_builder
                .build()
                .map_err(|e| DriverError::Other(format!("Failed to build browser config: {}", e)))?,
        )
        .await
        .map_err(|e| DriverError::Other(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    tracing::error!("Browser handler error (ignoring): {}", e);
                    continue;
                }
            }
            tracing::info!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Other(format!("Failed to create page: {}", e)))?;

        let console = ConsoleBuffer::default();
        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| DriverError::Other(format!("Failed to subscribe to console events: {}", e)))?;

        let sink = console.clone();
        tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let text: Vec<String> = event
                    .args
                    .iter()
                    .map(|arg| {
                        arg.value
                            .as_ref()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .or_else(|| arg.description.clone())
                            .unwrap_or_else(|| "unknown".to_string())
                    })
                    .collect();
                let level = format!("{:?}", event.r#type).to_lowercase();
                let text = text.join(" ");
                tracing::info!("Browser Console [{}]: {}", level, text);
                sink.lock().push((level, text));
            }
        });

        // JavaScript dialogs (alert/confirm/prompt) are auto-accepted.
        let mut dialog_events = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| DriverError::Other(format!("Failed to subscribe to dialog events: {}", e)))?;

        let page_clone = page.clone();
        tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                tracing::info!(
                    "Handling JavaScript Dialog: {} ({:?})",
                    event.message,
                    event.r#type
                );
                let cmd = HandleJavaScriptDialogParams::new(true);
                if let Err(e) = page_clone.execute(cmd).await {
                    tracing::error!("Failed to handle/accept dialog: {}", e);
                }
            }
        });

        let network = NetworkBuffer::default();
        if config.log_network {
            if let Err(e) = enable_network_logging(&page, network.clone()).await {
                tracing::warn!("Failed to enable network logging: {}", e);
            }
        } else {
            tracing::info!("Network logging disabled");
        }

        Ok(Self {
            browser,
            handler_task,
            page,
            console,
            network,
            user_data_dir: Some(user_data_dir),
            cleanup_user_data_dir,
        })
    }

    pub async fn close(mut self) -> Result<(), DriverError> {
        self.browser
            .close()
            .await
            .map_err(|e| DriverError::Other(format!("Error closing browser: {}", e)))?;
        self.handler_task
            .await
            .map_err(|e| DriverError::Other(format!("Error awaiting handler: {}", e)))?;

        if self.cleanup_user_data_dir
            && let Some(dir) = &self.user_data_dir
            && let Err(e) = std::fs::remove_dir_all(dir)
        {
            tracing::debug!("Failed to clean up user-data-dir {}: {}", dir.display(), e);
        }

        Ok(())
    }
}

async fn enable_network_logging(page: &Page, sink: NetworkBuffer) -> Result<(), DriverError> {
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| DriverError::Other(format!("Failed to subscribe to network events: {}", e)))?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| DriverError::Other(format!("Failed to subscribe to network events: {}", e)))?;

    let request_sink = sink.clone();
    tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            tracing::debug!("Network Request: [{}] {}", event.request.method, event.request.url);
            request_sink.lock().push(NetworkEvent::Request {
                method: event.request.method.clone(),
                url: event.request.url.clone(),
            });
        }
    });
    tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            tracing::debug!("Network Response: [{}] {}", event.response.status, event.response.url);
            sink.lock().push(NetworkEvent::Response {
                status: event.response.status,
                url: event.response.url.clone(),
            });
        }
    });
    Ok(())
}

fn resolve_user_data_dir() -> Result<(PathBuf, bool), DriverError> {
    if let Ok(dir) = std::env::var("STEPWISE_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!(
            "Using user data dir from STEPWISE_USER_DATA_DIR: {}",
            path.display()
        );
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| DriverError::Other(format!("System clock error: {}", e)))?
        .as_nanos();
    let unique = format!("stepwise-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::info!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
