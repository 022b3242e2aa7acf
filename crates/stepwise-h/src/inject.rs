use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{CreateIsolatedWorldParams, FrameId};
use chromiumoxide::cdp::js_protocol::runtime::{
    EvaluateParams, EvaluateReturns, ExecutionContextId, RemoteObjectId,
};
use std::collections::HashMap;
use std::time::Duration;
use stepwise_engine::driver::{DriverError, ElementHandle, SearchRoot};

pub const LOCATOR_JS: &str = include_str!("locator.js");

/// Name of the isolated world created in each embedded frame.
const WORLD_NAME: &str = "stepwise";

/// Default timeout for JavaScript evaluation (10 seconds).
/// This prevents hanging when dialogs (alert/confirm/prompt) block the JS thread.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

/// Delay between retries when context is not found (page navigating).
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

/// Element id from a `stale:<id>` exception raised by the locator script.
fn stale_id(err: &str) -> Option<u64> {
    let rest = &err[err.find("stale:")? + "stale:".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

impl From<EvalError> for DriverError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::Timeout => {
                DriverError::timeout("script evaluation (possibly blocked by a dialog)")
            }
            EvalError::Context(msg) => DriverError::Script(msg),
            EvalError::Other(msg) => match stale_id(&msg) {
                Some(id) => DriverError::StaleElement(id),
                None => DriverError::Script(msg),
            },
        }
    }
}

/// Evaluates locator calls in the main world of the page or in one isolated
/// world per embedded frame, injecting the locator script on first use.
pub struct Evaluator {
    page: Page,
    worlds: HashMap<String, ExecutionContextId>,
}

impl Evaluator {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            worlds: HashMap::new(),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Forget every frame world; called after navigation.
    pub fn reset(&mut self) {
        self.worlds.clear();
    }

    /// Drop worlds of frames that are no longer attached.
    pub fn retain_frames(&mut self, live: &[String]) {
        self.worlds.retain(|frame, _| live.contains(frame));
    }

    /// Call `window.__stepwise.<method>(...args)` in `root` and return its JSON result.
    pub async fn call(
        &mut self,
        root: &SearchRoot,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, DriverError> {
        let expression = format!(
            "window.__stepwise.{}(...{})",
            method,
            serde_json::Value::Array(args.to_vec())
        );
        self.call_with_retry(method, root, &expression, true)
            .await
            .map(|ret| ret.result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Remote object id of the element behind `handle`, for CDP DOM commands.
    pub async fn object_id(&mut self, handle: &ElementHandle) -> Result<RemoteObjectId, DriverError> {
        let expression = format!("window.__stepwise.element({})", handle.id);
        let ret = self
            .call_with_retry("element", &handle.root, &expression, false)
            .await?;
        ret.result
            .object_id
            .ok_or(DriverError::StaleElement(handle.id))
    }

    /// Retry while the target context is unavailable (e.g., during navigation).
    /// Returns immediately on success or non-context errors.
    async fn call_with_retry(
        &mut self,
        operation_name: &str,
        root: &SearchRoot,
        expression: &str,
        by_value: bool,
    ) -> Result<EvaluateReturns, DriverError> {
        let mut last_error = None;

        for attempt in 0..MAX_CONTEXT_RETRIES {
            match self.try_call(root, expression, by_value).await {
                Ok(ret) => return Ok(ret),
                Err(EvalError::Context(err_str)) => {
                    tracing::debug!(
                        "{} context error (attempt {}/{}), retrying...",
                        operation_name,
                        attempt + 1,
                        MAX_CONTEXT_RETRIES
                    );
                    last_error = Some(err_str);
                    tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(DriverError::Script(last_error.unwrap_or_else(|| {
            format!("{} failed after retries", operation_name)
        })))
    }

    async fn try_call(
        &mut self,
        root: &SearchRoot,
        expression: &str,
        by_value: bool,
    ) -> Result<EvaluateReturns, EvalError> {
        let context = self.context_for(root).await?;
        self.ensure_injected(root, context.clone()).await?;
        self.evaluate(root, context, expression, by_value).await
    }

    async fn context_for(&mut self, root: &SearchRoot) -> Result<Option<ExecutionContextId>, EvalError> {
        let SearchRoot::Frame(frame) = root else {
            return Ok(None);
        };
        if let Some(id) = self.worlds.get(frame) {
            return Ok(Some(id.clone()));
        }
        let mut params = CreateIsolatedWorldParams::new(FrameId::new(frame.clone()));
        params.world_name = Some(WORLD_NAME.to_string());
        let created = self
            .page
            .execute(params)
            .await
            .map_err(|e| classify(e.to_string()))?;
        let id = created.result.execution_context_id;
        self.worlds.insert(frame.clone(), id.clone());
        Ok(Some(id))
    }

    async fn ensure_injected(
        &mut self,
        root: &SearchRoot,
        context: Option<ExecutionContextId>,
    ) -> Result<(), EvalError> {
        let loaded = self
            .evaluate(root, context.clone(), "typeof window.__stepwise !== 'undefined'", true)
            .await?
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !loaded {
            self.evaluate(root, context, LOCATOR_JS, true).await?;
        }
        Ok(())
    }

    async fn evaluate(
        &mut self,
        root: &SearchRoot,
        context: Option<ExecutionContextId>,
        expression: &str,
        by_value: bool,
    ) -> Result<EvaluateReturns, EvalError> {
        let mut params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(by_value)
            .build()
            .map_err(EvalError::Other)?;
        params.context_id = context;

        let result = tokio::time::timeout(EVAL_TIMEOUT, self.page.execute(params)).await;
        let ret = match result {
            Err(_) => return Err(EvalError::Timeout),
            Ok(Err(e)) => {
                let err = classify(e.to_string());
                if matches!(err, EvalError::Context(_))
                    && let SearchRoot::Frame(frame) = root
                {
                    self.worlds.remove(frame);
                }
                return Err(err);
            }
            Ok(Ok(response)) => response.result,
        };
        if let Some(details) = &ret.exception_details {
            let description = details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone());
            return Err(classify(description));
        }
        Ok(ret)
    }
}

fn classify(err: String) -> EvalError {
    if is_context_error(&err) {
        EvalError::Context(err)
    } else {
        EvalError::Other(err)
    }
}
