//! W3C WebDriver surface host.
//!
//! One WebDriver session is shared by every surface; each surface is one
//! browser tab. WebDriver commands apply to the focused window, so every
//! command first switches to the surface's window under a session-wide lock.
//! The lock is held for one command only: page uploads start in the page and
//! are polled, so a slow upload never blocks sibling tabs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WebDriverConfig;

use super::{
    ElementHandle, MutationObserver, NativeFile, PageUpload, Surface, SurfaceError, SurfaceHost,
};

/// Key WebDriver uses to tag element references in JSON.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const INSTALL_OBSERVER_JS: &str = r#"
const key = arguments[0];
window.__multipostObservers = window.__multipostObservers || {};
const state = { count: 0 };
state.observer = new MutationObserver(() => { state.count += 1; });
state.observer.observe(document.documentElement, {
  childList: true, subtree: true, attributes: true, characterData: true
});
window.__multipostObservers[key] = state;
return true;
"#;

const POLL_OBSERVER_JS: &str = r#"
const registry = window.__multipostObservers || {};
const state = registry[arguments[0]];
return state ? state.count : -1;
"#;

const REMOVE_OBSERVER_JS: &str = r#"
const registry = window.__multipostObservers || {};
const state = registry[arguments[0]];
if (state) { state.observer.disconnect(); delete registry[arguments[0]]; }
return true;
"#;

const SET_PROPERTY_JS: &str = "arguments[0][arguments[1]] = arguments[2]; return true;";

const DISPATCH_EVENT_JS: &str =
    "arguments[0].dispatchEvent(new Event(arguments[1], { bubbles: true })); return true;";

const SET_FILES_JS: &str = r#"
const input = arguments[0];
const files = arguments[1];
const transfer = new DataTransfer();
for (const f of files) {
  const raw = atob(f.data);
  const bytes = new Uint8Array(raw.length);
  for (let i = 0; i < raw.length; i++) { bytes[i] = raw.charCodeAt(i); }
  transfer.items.add(new File([bytes], f.name, { type: f.type }));
}
input.files = transfer.files;
return input.files.length;
"#;

const START_UPLOAD_JS: &str = r#"
const [key, endpoint, field, file, extra] = arguments;
window.__multipostUploads = window.__multipostUploads || {};
const slots = window.__multipostUploads;
slots[key] = null;
const raw = atob(file.data);
const bytes = new Uint8Array(raw.length);
for (let i = 0; i < raw.length; i++) { bytes[i] = raw.charCodeAt(i); }
const form = new FormData();
for (const [k, v] of Object.entries(extra)) { form.append(k, v); }
form.append(field, new File([bytes], file.name, { type: file.type }));
fetch(endpoint, { method: 'POST', body: form, credentials: 'include' })
  .then(r => r.json())
  .then(body => { slots[key] = { ok: true, body }; })
  .catch(e => { slots[key] = { ok: false, error: String(e) }; });
return true;
"#;

const POLL_UPLOAD_JS: &str = r#"
const slots = window.__multipostUploads || {};
const key = arguments[0];
if (!(key in slots)) { return { lost: true }; }
const result = slots[key];
if (result !== null) { delete slots[key]; }
return result;
"#;

/// WebDriver session shared across surfaces.
struct Session {
    client: Client,
    base_url: String,
    session_id: String,
    /// Window currently focused by the driver.
    focused: Mutex<Option<String>>,
}

impl Session {
    async fn create(client: Client, config: &WebDriverConfig) -> Result<Self, SurfaceError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let body = json!({
            "capabilities": { "alwaysMatch": config.capabilities.clone() }
        });

        let value = send(&client, Method::POST, &format!("{}/session", base_url), Some(body))
            .await
            .map_err(|e| SurfaceError::OpenFailed(e.to_string()))?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SurfaceError::OpenFailed("session response without sessionId".into()))?
            .to_string();

        info!("WebDriver session {} created at {}", session_id, base_url);

        Ok(Self {
            client,
            base_url,
            session_id,
            focused: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    /// Run a command against a specific window.
    async fn command(
        &self,
        window: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SurfaceError> {
        let mut focused = self.focused.lock().await;
        if focused.as_deref() != Some(window) {
            send(
                &self.client,
                Method::POST,
                &self.url("/window"),
                Some(json!({ "handle": window })),
            )
            .await?;
            *focused = Some(window.to_string());
        }
        send(&self.client, method, &self.url(path), body).await
    }

    async fn new_window(&self) -> Result<String, SurfaceError> {
        let _focused = self.focused.lock().await;
        let value = send(
            &self.client,
            Method::POST,
            &self.url("/window/new"),
            Some(json!({ "type": "tab" })),
        )
        .await?;
        value
            .get("handle")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SurfaceError::Driver("new window response without handle".into()))
    }

    async fn forget_window(&self, window: &str) {
        let mut focused = self.focused.lock().await;
        if focused.as_deref() == Some(window) {
            *focused = None;
        }
    }
}

/// Send one WebDriver request and unwrap the `value` member.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, SurfaceError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SurfaceError::Driver("request timed out".to_string())
        } else {
            SurfaceError::Driver(e.to_string())
        }
    })?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| SurfaceError::Driver(format!("invalid driver response: {}", e)))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(match error {
        "no such window" | "invalid session id" => SurfaceError::Closed,
        "stale element reference" | "no such element" => SurfaceError::StaleElement(message),
        "invalid selector" => SurfaceError::InvalidSelector(message),
        "javascript error" | "script timeout" => SurfaceError::Script(message),
        _ => SurfaceError::Driver(format!("{}: {}", error, message)),
    })
}

fn element_arg(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.id() })
}

fn parse_element(value: &Value) -> Option<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(ElementHandle::new)
}

fn file_arg(file: &NativeFile) -> Value {
    json!({
        "name": file.name,
        "type": file.mime_type,
        "data": BASE64.encode(&file.bytes),
    })
}

/// Poll a page-side slot until it holds a value.
///
/// `Null` means still pending. The deadline covers the whole wait.
async fn await_settled<F, Fut>(
    interval: Duration,
    deadline: Duration,
    mut poll: F,
) -> Result<Value, SurfaceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Value, SurfaceError>>,
{
    let wait = async {
        loop {
            let value = poll().await?;
            if !value.is_null() {
                return Ok(value);
            }
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(deadline, wait)
        .await
        .unwrap_or_else(|_| Err(SurfaceError::Script("page upload timed out".to_string())))
}

fn upload_outcome(result: Value) -> Result<Value, SurfaceError> {
    if result.get("lost").and_then(Value::as_bool) == Some(true) {
        return Err(SurfaceError::Script(
            "page navigated away during upload".to_string(),
        ));
    }
    if result.get("ok").and_then(Value::as_bool) == Some(true) {
        Ok(result.get("body").cloned().unwrap_or(Value::Null))
    } else {
        Err(SurfaceError::Script(
            result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("upload failed")
                .to_string(),
        ))
    }
}

/// Surface host backed by a WebDriver endpoint (chromedriver, geckodriver).
pub struct WebDriverHost {
    config: WebDriverConfig,
    client: Client,
    session: OnceCell<Arc<Session>>,
}

impl WebDriverHost {
    pub fn new(config: WebDriverConfig) -> Result<Self, SurfaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SurfaceError::Driver(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            session: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<Arc<Session>, SurfaceError> {
        self.session
            .get_or_try_init(|| async {
                Session::create(self.client.clone(), &self.config)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl SurfaceHost for WebDriverHost {
    async fn open(&self, url: &str) -> Result<Arc<dyn Surface>, SurfaceError> {
        let session = self.session().await?;
        let window = session
            .new_window()
            .await
            .map_err(|e| SurfaceError::OpenFailed(e.to_string()))?;

        session
            .command(&window, Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map_err(|e| SurfaceError::OpenFailed(e.to_string()))?;

        debug!("Opened WebDriver window {} at {}", window, url);

        Ok(Arc::new(WebDriverSurface {
            id: uuid::Uuid::new_v4().to_string(),
            window,
            session,
            cancel: CancellationToken::new(),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            upload_timeout: Duration::from_secs(self.config.timeout_secs),
        }))
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }
}

/// One browser tab driven through WebDriver.
pub struct WebDriverSurface {
    id: String,
    window: String,
    session: Arc<Session>,
    cancel: CancellationToken,
    poll_interval: Duration,
    upload_timeout: Duration,
}

impl WebDriverSurface {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SurfaceError> {
        if self.cancel.is_cancelled() {
            return Err(SurfaceError::Closed);
        }
        self.session.command(&self.window, method, path, body).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, SurfaceError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait]
impl Surface for WebDriverSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, SurfaceError> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, SurfaceError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(parse_element).collect())
            .unwrap_or_default())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.id()), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.id(), name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn observe(&self) -> Result<MutationObserver, SurfaceError> {
        let key = uuid::Uuid::new_v4().to_string();
        self.execute(INSTALL_OBSERVER_JS, vec![json!(key)]).await?;

        let (tx, rx) = mpsc::channel(1);
        let stop = self.cancel.child_token();
        let poller_stop = stop.clone();
        let session = Arc::clone(&self.session);
        let window = self.window.clone();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last_count = 0i64;
            loop {
                tokio::select! {
                    _ = poller_stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let poll = session
                    .command(
                        &window,
                        Method::POST,
                        "/execute/sync",
                        Some(json!({ "script": POLL_OBSERVER_JS, "args": [key] })),
                    )
                    .await;

                match poll {
                    Ok(value) => {
                        let count = value.as_i64().unwrap_or(-1);
                        if count < 0 {
                            // Navigation wiped the page-side observer; reinstall and
                            // report the navigation as a mutation batch.
                            let _ = session
                                .command(
                                    &window,
                                    Method::POST,
                                    "/execute/sync",
                                    Some(json!({ "script": INSTALL_OBSERVER_JS, "args": [key] })),
                                )
                                .await;
                            last_count = 0;
                            let _ = tx.try_send(());
                        } else if count != last_count {
                            last_count = count;
                            let _ = tx.try_send(());
                        }
                    }
                    Err(SurfaceError::Closed) => break,
                    Err(e) => warn!("Mutation poll failed on window {}: {}", window, e),
                }
            }

            let _ = session
                .command(
                    &window,
                    Method::POST,
                    "/execute/sync",
                    Some(json!({ "script": REMOVE_OBSERVER_JS, "args": [key] })),
                )
                .await;
        });

        Ok(MutationObserver::new(rx, move || stop.cancel()))
    }

    async fn set_property(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Value,
    ) -> Result<(), SurfaceError> {
        self.execute(SET_PROPERTY_JS, vec![element_arg(element), json!(name), value])
            .await
            .map(|_| ())
    }

    async fn dispatch_event(
        &self,
        element: &ElementHandle,
        event: &str,
    ) -> Result<(), SurfaceError> {
        self.execute(DISPATCH_EVENT_JS, vec![element_arg(element), json!(event)])
            .await
            .map(|_| ())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.id()),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn set_files(
        &self,
        element: &ElementHandle,
        files: Vec<NativeFile>,
    ) -> Result<(), SurfaceError> {
        let payload: Vec<Value> = files.iter().map(file_arg).collect();
        let assigned = self
            .execute(SET_FILES_JS, vec![element_arg(element), Value::Array(payload)])
            .await?;

        let assigned = assigned.as_u64().unwrap_or(0) as usize;
        if assigned != files.len() {
            return Err(SurfaceError::Script(format!(
                "input accepted {} of {} files",
                assigned,
                files.len()
            )));
        }
        Ok(())
    }

    async fn upload(&self, request: PageUpload) -> Result<Value, SurfaceError> {
        let key = uuid::Uuid::new_v4().to_string();
        self.execute(
            START_UPLOAD_JS,
            vec![
                json!(key),
                json!(request.endpoint),
                json!(request.form_field),
                file_arg(&request.file),
                json!(request.extra_fields),
            ],
        )
        .await?;

        let result = await_settled(self.poll_interval, self.upload_timeout, || {
            self.execute(POLL_UPLOAD_JS, vec![json!(key)])
        })
        .await?;

        upload_outcome(result)
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn activate(&self) -> Result<(), SurfaceError> {
        // Switching windows is how WebDriver focuses a tab.
        self.command(Method::GET, "/window", None).await.map(|_| ())
    }

    async fn reload(&self) -> Result<(), SurfaceError> {
        self.command(Method::POST, "/refresh", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();

        let result = self
            .session
            .command(&self.window, Method::DELETE, "/window", None)
            .await;
        self.session.forget_window(&self.window).await;

        match result {
            Ok(_) | Err(SurfaceError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_element_reference() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(parse_element(&value), Some(ElementHandle::new("abc-123")));
        assert_eq!(parse_element(&json!({ "other": "x" })), None);
    }

    #[test]
    fn test_element_arg_round_trips() {
        let handle = ElementHandle::new("el-9");
        assert_eq!(parse_element(&element_arg(&handle)), Some(handle));
    }

    #[test]
    fn test_file_arg_encodes_base64() {
        let file = NativeFile {
            name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: b"hello".to_vec(),
        };
        let arg = file_arg(&file);
        assert_eq!(arg["name"], "a.png");
        assert_eq!(arg["type"], "image/png");
        assert_eq!(arg["data"], "aGVsbG8=");
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_settled_polls_until_value() {
        let polls = std::sync::atomic::AtomicUsize::new(0);
        let value = await_settled(Duration::from_millis(100), Duration::from_secs(5), || {
            let n = polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                Ok(if n < 3 {
                    Value::Null
                } else {
                    json!({ "ok": true, "body": { "url": "https://cdn/a.png" } })
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(upload_outcome(value).unwrap(), json!({ "url": "https://cdn/a.png" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_settled_times_out() {
        let result = await_settled(Duration::from_millis(100), Duration::from_secs(1), || async {
            Ok(Value::Null)
        })
        .await;
        assert_eq!(
            result,
            Err(SurfaceError::Script("page upload timed out".to_string()))
        );
    }

    #[tokio::test]
    async fn test_await_settled_propagates_closed() {
        let result = await_settled(Duration::from_millis(100), Duration::from_secs(1), || async {
            Err(SurfaceError::Closed)
        })
        .await;
        assert_eq!(result, Err(SurfaceError::Closed));
    }

    #[test]
    fn test_upload_outcome() {
        assert_eq!(
            upload_outcome(json!({ "ok": false, "error": "TypeError: Failed to fetch" })),
            Err(SurfaceError::Script("TypeError: Failed to fetch".to_string()))
        );
        assert!(matches!(
            upload_outcome(json!({ "lost": true })),
            Err(SurfaceError::Script(m)) if m.contains("navigated")
        ));
    }

    #[test]
    fn test_host_name() {
        let host = WebDriverHost::new(WebDriverConfig::default()).unwrap();
        assert_eq!(host.name(), "webdriver");
    }
}
