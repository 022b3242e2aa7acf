//! [`Driver`] implementation over the Chrome DevTools Protocol.
//!
//! Element lookups run in the injected locator script (main world for the
//! top document, one isolated world per frame). Pointer and keyboard input is
//! dispatched as trusted `Input.*` events at the element's on-screen centre.

use crate::cdp::{CdpClient, ConsoleBuffer, NetworkBuffer};
use crate::inject::Evaluator;
use crate::keys::KeyChord;
use crate::trace::Tracer;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::{GetContentQuadsParams, SetFileInputFilesParams};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{FrameTree, GetFrameTreeParams};
use chromiumoxide::page::ScreenshotParams;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use stepwise_engine::config::BrowserConfig;
use stepwise_engine::driver::{
    ClickOptions, Driver, DriverError, ElementHandle, NetworkEvent, Query, SearchRoot, TextMatch,
};
use tracing::{debug, info};

/// Interval between actionability checks while a click waits.
const ACTIONABILITY_POLL: Duration = Duration::from_millis(100);

pub struct ChromiumDriver {
    client: Option<CdpClient>,
    eval: Evaluator,
    console: ConsoleBuffer,
    network: NetworkBuffer,
    tracer: Tracer,
}

impl ChromiumDriver {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, DriverError> {
        info!("Launching Chromium driver...");
        let client = CdpClient::launch(config).await?;
        Ok(Self {
            eval: Evaluator::new(client.page.clone()),
            console: client.console.clone(),
            network: client.network.clone(),
            client: Some(client),
            tracer: Tracer::default(),
        })
    }

    fn ready(&self) -> Result<(), DriverError> {
        self.client.as_ref().map(|_| ()).ok_or(DriverError::NotReady)
    }

    async fn call(
        &mut self,
        element: &ElementHandle,
        method: &str,
        extra: &[Value],
    ) -> Result<Value, DriverError> {
        self.ready()?;
        let mut args = vec![json!(element.id)];
        args.extend_from_slice(extra);
        self.eval.call(&element.root, method, &args).await
    }

    async fn call_string(&mut self, element: &ElementHandle, method: &str) -> Result<String, DriverError> {
        Ok(self
            .call(element, method, &[])
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    fn handles(root: &SearchRoot, value: Value) -> Vec<ElementHandle> {
        value
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_u64)
                    .map(|id| ElementHandle::new(root.clone(), id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Centre of the element's first content quad, in main-frame viewport pixels.
    async fn center(&mut self, element: &ElementHandle) -> Result<(f64, f64), DriverError> {
        self.call(element, "scrollIntoView", &[]).await?;
        let object_id = self.eval.object_id(element).await?;
        let quads = self
            .eval
            .page()
            .execute(GetContentQuadsParams::builder().object_id(object_id).build())
            .await
            .map_err(|e| DriverError::Script(format!("getContentQuads failed: {}", e)))?;
        let quad = quads
            .result
            .quads
            .first()
            .map(|q| q.inner().clone())
            .filter(|points| points.len() >= 8)
            .ok_or_else(|| DriverError::Other("element has no layout box".into()))?;
        let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
        let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
        Ok((x, y))
    }

    async fn mouse(&mut self, kind: DispatchMouseEventType, x: f64, y: f64) -> Result<(), DriverError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind.clone()).x(x).y(y);
        if kind != DispatchMouseEventType::MouseMoved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder
            .build()
            .map_err(|e| DriverError::Other(format!("Failed to build mouse event: {:?}", e)))?;
        self.eval
            .page()
            .execute(params)
            .await
            .map_err(|e| DriverError::Other(format!("mouse event failed: {}", e)))?;
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), DriverError> {
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await?;
        self.mouse(DispatchMouseEventType::MousePressed, x, y).await?;
        self.mouse(DispatchMouseEventType::MouseReleased, x, y).await
    }

    async fn key_event(&mut self, kind: DispatchKeyEventType, chord: &KeyChord) -> Result<(), DriverError> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(chord.key.clone())
            .code(chord.code.clone())
            .modifiers(chord.modifiers);
        if chord.virtual_key != 0 {
            builder = builder
                .windows_virtual_key_code(chord.virtual_key)
                .native_virtual_key_code(chord.virtual_key);
        }
        if kind == DispatchKeyEventType::KeyDown
            && let Some(text) = &chord.text
        {
            builder = builder.text(text.clone());
        }
        let params = builder
            .build()
            .map_err(|e| DriverError::Other(format!("Failed to build key event: {:?}", e)))?;
        self.eval
            .page()
            .execute(params)
            .await
            .map_err(|e| DriverError::Other(format!("key event failed: {}", e)))?;
        Ok(())
    }

    async fn press(&mut self, chord: &KeyChord) -> Result<(), DriverError> {
        // Keys without text go down as rawKeyDown so no character is inserted.
        let down = if chord.text.is_some() {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };
        self.key_event(down, chord).await?;
        self.key_event(DispatchKeyEventType::KeyUp, chord).await
    }

    /// Wait until the element can receive a pointer click. Returns the last
    /// reason it could not once `timeout` elapses.
    async fn wait_actionable(&mut self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let blocked = self.call(element, "actionable", &[]).await?;
            let Some(reason) = blocked.as_str() else {
                return Ok(());
            };
            if Instant::now() >= deadline {
                return Err(DriverError::Other(reason.to_string()));
            }
            tokio::time::sleep(ACTIONABILITY_POLL).await;
        }
    }

    fn trace<T>(
        &mut self,
        op: &str,
        element: Option<&ElementHandle>,
        extra: Option<&str>,
        outcome: &Result<T, DriverError>,
    ) {
        if !self.tracer.is_active() {
            return;
        }
        let detail = match (element, extra) {
            (Some(el), Some(x)) => Some(format!("{}#{} {}", el.root, el.id, x)),
            (Some(el), None) => Some(format!("{}#{}", el.root, el.id)),
            (None, Some(x)) => Some(x.to_string()),
            (None, None) => None,
        };
        self.tracer.record(op, detail, outcome);
    }
}

/// JSON shape understood by the locator script.
fn query_spec(query: &Query) -> Value {
    fn text(m: &TextMatch) -> Value {
        json!({ "text": m.text(), "exact": m.is_exact() })
    }
    match query {
        Query::Role { role, name } => json!({ "kind": "role", "role": role, "name": text(name) }),
        Query::Label(m) => json!({ "kind": "label", "match": text(m) }),
        Query::Placeholder(m) => json!({ "kind": "placeholder", "match": text(m) }),
        Query::Css(css) => json!({ "kind": "css", "css": css }),
        Query::CssWithText { css, text: m } => {
            json!({ "kind": "cssText", "css": css, "match": text(m) })
        }
        Query::Text(m) => json!({ "kind": "text", "match": text(m) }),
        Query::XPath(xpath) => json!({ "kind": "xpath", "xpath": xpath }),
    }
}

fn child_frames(tree: &FrameTree, out: &mut Vec<String>) {
    for child in tree.child_frames.iter().flatten() {
        out.push(child.frame.id.inner().clone());
        child_frames(child, out);
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.ready()?;
        info!("Navigating to: {}", url);
        let outcome = self
            .eval
            .page()
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation(e.to_string()));
        self.eval.reset();
        self.trace("navigate", None, Some(url), &outcome);
        outcome
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        self.ready()?;
        Ok(self
            .eval
            .page()
            .url()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?
            .unwrap_or_default())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.ready()?;
        self.eval
            .page()
            .content()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn frames(&mut self) -> Result<Vec<SearchRoot>, DriverError> {
        self.ready()?;
        let tree = self
            .eval
            .page()
            .execute(GetFrameTreeParams::default())
            .await
            .map_err(|e| DriverError::Script(format!("getFrameTree failed: {}", e)))?;
        let mut ids = Vec::new();
        child_frames(&tree.result.frame_tree, &mut ids);
        self.eval.retain_frames(&ids);
        Ok(ids.into_iter().map(SearchRoot::Frame).collect())
    }

    async fn query_all(
        &mut self,
        root: &SearchRoot,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.ready()?;
        let found = self.eval.call(root, "query", &[query_spec(query)]).await?;
        Ok(Self::handles(root, found))
    }

    async fn query_within(
        &mut self,
        element: &ElementHandle,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let found = self.call(element, "queryWithin", &[query_spec(query)]).await?;
        Ok(Self::handles(&element.root, found))
    }

    async fn closest(
        &mut self,
        element: &ElementHandle,
        css: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let found = self.call(element, "closest", &[json!(css)]).await?;
        Ok(found
            .as_u64()
            .map(|id| ElementHandle::new(element.root.clone(), id)))
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.call(element, "visible", &[]).await?.as_bool().unwrap_or(false))
    }

    async fn tag_name(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.call_string(element, "tag").await
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self.call(element, "attr", &[json!(name)]).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn value(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.call_string(element, "value").await
    }

    async fn inner_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.call_string(element, "text").await
    }

    async fn is_checked(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.call(element, "checked", &[]).await?.as_bool().unwrap_or(false))
    }

    async fn selector_for(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Option<String>, DriverError> {
        let value = self.call(element, "selectorFor", &[]).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(
        &mut self,
        element: &ElementHandle,
        options: ClickOptions,
    ) -> Result<(), DriverError> {
        let outcome = async {
            if !options.force {
                self.wait_actionable(element, options.timeout).await?;
            }
            let (x, y) = self.center(element).await?;
            self.click_at(x, y).await
        }
        .await;
        let mode = if options.force { "forced" } else { "default" };
        self.trace("click", Some(element), Some(mode), &outcome);
        outcome
    }

    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let outcome = self.call(element, "click", &[]).await.map(|_| ());
        self.trace("script_click", Some(element), None, &outcome);
        outcome
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let outcome = self.call(element, "fill", &[json!(value)]).await.map(|_| ());
        self.trace("fill", Some(element), None, &outcome);
        outcome
    }

    async fn check(&mut self, element: &ElementHandle, force: bool) -> Result<(), DriverError> {
        if self.is_checked(element).await? {
            return Ok(());
        }
        let timeout = ClickOptions::default().timeout;
        let options = if force {
            ClickOptions::with_timeout(timeout).forced()
        } else {
            ClickOptions::with_timeout(timeout)
        };
        self.click(element, options).await?;
        if self.is_checked(element).await? {
            Ok(())
        } else {
            Err(DriverError::Other("checkbox did not become checked".into()))
        }
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        option: &str,
    ) -> Result<bool, DriverError> {
        let outcome = self
            .call(element, "select", &[json!(option)])
            .await
            .map(|v| v.as_bool().unwrap_or(false));
        self.trace("select_option", Some(element), Some(option), &outcome);
        outcome
    }

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let (x, y) = self.center(element).await?;
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await
    }

    async fn drag_to(
        &mut self,
        source: &ElementHandle,
        target: &ElementHandle,
    ) -> Result<(), DriverError> {
        let outcome = async {
            let (sx, sy) = self.center(source).await?;
            self.mouse(DispatchMouseEventType::MouseMoved, sx, sy).await?;
            self.mouse(DispatchMouseEventType::MousePressed, sx, sy).await?;
            let (tx, ty) = self.center(target).await?;
            self.mouse(DispatchMouseEventType::MouseMoved, tx, ty).await?;
            self.mouse(DispatchMouseEventType::MouseReleased, tx, ty).await
        }
        .await;
        let detail = format!("-> {}#{}", target.root, target.id);
        self.trace("drag", Some(source), Some(&detail), &outcome);
        outcome
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.call(element, "scrollIntoView", &[]).await.map(|_| ())
    }

    async fn set_input_files(
        &mut self,
        element: &ElementHandle,
        files: &[PathBuf],
    ) -> Result<(), DriverError> {
        let outcome = async {
            let object_id = self.eval.object_id(element).await?;
            let names: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
            let params = SetFileInputFilesParams::builder()
                .files(names)
                .object_id(object_id)
                .build()
                .map_err(DriverError::Other)?;
            self.eval
                .page()
                .execute(params)
                .await
                .map_err(|e| DriverError::Other(format!("setFileInputFiles failed: {}", e)))?;
            Ok::<(), DriverError>(())
        }
        .await;
        self.trace("upload", Some(element), None, &outcome);
        outcome
    }

    async fn dispatch_event(
        &mut self,
        element: &ElementHandle,
        event: &str,
    ) -> Result<(), DriverError> {
        self.call(element, "dispatch", &[json!(event)]).await.map(|_| ())
    }

    async fn blur(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.call(element, "blur", &[]).await.map(|_| ())
    }

    async fn set_highlight(&mut self, element: &ElementHandle, on: bool) -> Result<(), DriverError> {
        self.call(element, "highlight", &[json!(on)]).await.map(|_| ())
    }

    async fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        self.ready()?;
        let outcome = self.press(&KeyChord::parse(key)).await;
        self.trace("press", None, Some(key), &outcome);
        outcome
    }

    async fn type_text(&mut self, text: &str, delay: Duration) -> Result<(), DriverError> {
        self.ready()?;
        let outcome = async {
            for c in text.chars() {
                self.press(&KeyChord::character(c)).await?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Ok::<(), DriverError>(())
        }
        .await;
        self.trace("type", None, None, &outcome);
        outcome
    }

    async fn mouse_click(&mut self, x: f64, y: f64) -> Result<(), DriverError> {
        self.ready()?;
        let outcome = self.click_at(x, y).await;
        self.trace("mouse_click", None, Some(&format!("{:.0},{:.0}", x, y)), &outcome);
        outcome
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        self.ready()?;
        let bytes = self
            .eval
            .page()
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| DriverError::Other(format!("Screenshot failed: {}", e)))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn start_trace(&mut self) -> Result<(), DriverError> {
        self.ready()?;
        self.tracer.start();
        Ok(())
    }

    async fn stop_trace(&mut self, path: &Path) -> Result<(), DriverError> {
        let url = self.current_url().await.unwrap_or_default();
        self.tracer.finish(path, &url).await
    }

    async fn drain_console(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.console.lock())
    }

    async fn drain_network(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut *self.network.lock())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.take() {
            debug!("Closing Chromium driver");
            client.close().await?;
        }
        Ok(())
    }
}
