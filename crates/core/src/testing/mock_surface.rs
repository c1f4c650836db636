//! Mock execution surface for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::surface::{
    ElementHandle, MutationObserver, NativeFile, PageUpload, Surface, SurfaceError,
};

/// An operation performed on the mock surface, recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    SetProperty {
        element: ElementHandle,
        name: String,
        value: Value,
    },
    DispatchEvent {
        element: ElementHandle,
        event: String,
    },
    Click {
        element: ElementHandle,
    },
    SetFiles {
        element: ElementHandle,
        names: Vec<String>,
    },
    Upload {
        endpoint: String,
        file_name: String,
    },
    Activate,
    Reload,
    Close,
}

/// Scripted reaction to a click on an element matching a selector.
#[derive(Debug, Clone)]
pub enum MockReaction {
    /// Insert a new element after `delay`.
    AddElement {
        selector: String,
        text: String,
        attributes: Vec<(String, String)>,
        delay: Duration,
    },
    /// Change the current URL after `delay`.
    Navigate { url: String, delay: Duration },
}

#[derive(Debug, Clone)]
struct MockElement {
    handle: ElementHandle,
    selectors: Vec<String>,
    text: String,
    attributes: HashMap<String, String>,
    properties: HashMap<String, Value>,
    files: Vec<NativeFile>,
    removed: bool,
}

impl MockElement {
    fn matches(&self, selector: &str) -> bool {
        !self.removed && self.selectors.iter().any(|s| s == selector)
    }
}

#[derive(Default)]
struct MockState {
    url: String,
    closed: bool,
    elements: Vec<MockElement>,
    observers: HashMap<u64, mpsc::Sender<()>>,
    reactions: Vec<(String, MockReaction)>,
    upload_response: Option<Result<Value, SurfaceError>>,
    uploads: Vec<PageUpload>,
    ops: Vec<MockOp>,
    query_counts: HashMap<String, usize>,
    query_all_counts: HashMap<String, usize>,
    fail_set_files: bool,
}

struct Inner {
    id: String,
    cancel: CancellationToken,
    state: Mutex<MockState>,
    active_observers: AtomicUsize,
    next_id: AtomicU64,
}

/// In-memory surface with a flat element list.
///
/// Elements match a selector when the exact selector string was registered
/// for them; no CSS engine is involved. Adding or removing an element emits a
/// mutation batch; changing text does not, which models content streamed into
/// an existing node.
///
/// # Example
///
/// ```rust,ignore
/// use multipost_core::testing::MockSurface;
///
/// let surface = MockSurface::new("https://blog.example/editor");
/// surface.add_element("#editor", "").await;
/// surface.add_element_after(Duration::from_millis(50), ".toast-success", "Published").await;
/// ```
#[derive(Clone)]
pub struct MockSurface {
    inner: Arc<Inner>,
}

impl MockSurface {
    /// Create a new mock surface at the given URL.
    pub fn new(url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                cancel: CancellationToken::new(),
                state: Mutex::new(MockState {
                    url: url.to_string(),
                    ..Default::default()
                }),
                active_observers: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_locked(state: &MockState) {
        for tx in state.observers.values() {
            let _ = tx.try_send(());
        }
    }

    /// Add an element matching one selector.
    pub async fn add_element(&self, selector: &str, text: &str) -> ElementHandle {
        self.add_element_with(&[selector], text, &[]).await
    }

    /// Add an element matching several selectors, with attributes.
    pub async fn add_element_with(
        &self,
        selectors: &[&str],
        text: &str,
        attributes: &[(&str, &str)],
    ) -> ElementHandle {
        let handle = ElementHandle::new(format!(
            "el-{}",
            self.inner.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let mut state = self.state();
        state.elements.push(MockElement {
            handle: handle.clone(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            properties: HashMap::new(),
            files: Vec::new(),
            removed: false,
        });
        Self::notify_locked(&state);
        handle
    }

    /// Add an element after a delay (spawned).
    pub async fn add_element_after(&self, delay: Duration, selector: &str, text: &str) {
        let surface = self.clone();
        let selector = selector.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !surface.is_closed() {
                surface.add_element(&selector, &text).await;
            }
        });
    }

    /// Replace an element's text without emitting a mutation batch.
    pub async fn set_text(&self, handle: &ElementHandle, text: &str) {
        let mut state = self.state();
        if let Some(el) = state.elements.iter_mut().find(|e| &e.handle == handle) {
            el.text = text.to_string();
        }
    }

    /// Remove an element (emits a mutation batch).
    pub async fn remove_element(&self, handle: &ElementHandle) {
        let mut state = self.state();
        if let Some(el) = state.elements.iter_mut().find(|e| &e.handle == handle) {
            el.removed = true;
        }
        Self::notify_locked(&state);
    }

    /// React to clicks on elements matching `selector`.
    pub async fn on_click(&self, selector: &str, reaction: MockReaction) {
        self.state()
            .reactions
            .push((selector.to_string(), reaction));
    }

    /// Configure the result of page-side uploads.
    pub async fn set_upload_response(&self, response: Result<Value, SurfaceError>) {
        self.state().upload_response = Some(response);
    }

    /// Make `set_files` fail.
    pub async fn set_fail_set_files(&self, fail: bool) {
        self.state().fail_set_files = fail;
    }

    /// All recorded operations.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state().ops.clone()
    }

    /// Current value of a property assigned through `set_property`.
    pub fn property(&self, handle: &ElementHandle, name: &str) -> Option<Value> {
        self.state()
            .elements
            .iter()
            .find(|e| &e.handle == handle)
            .and_then(|e| e.properties.get(name).cloned())
    }

    /// Files currently assigned to an input.
    pub fn files(&self, handle: &ElementHandle) -> Vec<NativeFile> {
        self.state()
            .elements
            .iter()
            .find(|e| &e.handle == handle)
            .map(|e| e.files.clone())
            .unwrap_or_default()
    }

    /// Events dispatched on an element, in order.
    pub fn events(&self, handle: &ElementHandle) -> Vec<String> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                MockOp::DispatchEvent { element, event } if element == handle => {
                    Some(event.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of clicks an element received.
    pub fn clicks(&self, handle: &ElementHandle) -> usize {
        self.state()
            .ops
            .iter()
            .filter(|op| matches!(op, MockOp::Click { element } if element == handle))
            .count()
    }

    /// Number of `query` calls for a selector.
    pub fn query_count(&self, selector: &str) -> usize {
        self.state()
            .query_counts
            .get(selector)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `query_all` calls for a selector.
    pub fn query_all_count(&self, selector: &str) -> usize {
        self.state()
            .query_all_counts
            .get(selector)
            .copied()
            .unwrap_or(0)
    }

    /// Number of live mutation observers.
    pub fn active_observers(&self) -> usize {
        self.inner.active_observers.load(Ordering::SeqCst)
    }

    /// Page-side uploads performed.
    pub fn uploads(&self) -> Vec<PageUpload> {
        self.state().uploads.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    fn ensure_open(state: &MockState) -> Result<(), SurfaceError> {
        if state.closed {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }

    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        f: impl FnOnce(&mut MockElement) -> T,
    ) -> Result<T, SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        let el = state
            .elements
            .iter_mut()
            .find(|e| &e.handle == handle && !e.removed)
            .ok_or_else(|| SurfaceError::StaleElement(handle.id().to_string()))?;
        Ok(f(el))
    }

    fn run_reaction(&self, reaction: MockReaction) {
        let surface = self.clone();
        tokio::spawn(async move {
            match reaction {
                MockReaction::AddElement {
                    selector,
                    text,
                    attributes,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    if surface.is_closed() {
                        return;
                    }
                    let attrs: Vec<(&str, &str)> = attributes
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    surface
                        .add_element_with(&[selector.as_str()], &text, &attrs)
                        .await;
                }
                MockReaction::Navigate { url, delay } => {
                    tokio::time::sleep(delay).await;
                    let mut state = surface.state();
                    if state.closed {
                        return;
                    }
                    state.url = url;
                    Self::notify_locked(&state);
                }
            }
        });
    }
}

#[async_trait]
impl Surface for MockSurface {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        *state.query_counts.entry(selector.to_string()).or_default() += 1;
        Ok(state
            .elements
            .iter()
            .find(|e| e.matches(selector))
            .map(|e| e.handle.clone()))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        *state
            .query_all_counts
            .entry(selector.to_string())
            .or_default() += 1;
        Ok(state
            .elements
            .iter()
            .filter(|e| e.matches(selector))
            .map(|e| e.handle.clone())
            .collect())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError> {
        self.with_element(element, |el| el.text.clone())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        self.with_element(element, |el| el.attributes.get(name).cloned())
    }

    async fn observe(&self) -> Result<MutationObserver, SurfaceError> {
        let (tx, rx) = mpsc::channel(1);
        let observer_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state();
            Self::ensure_open(&state)?;
            state.observers.insert(observer_id, tx);
        }
        self.inner.active_observers.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        Ok(MutationObserver::new(rx, move || {
            inner.active_observers.fetch_sub(1, Ordering::SeqCst);
            inner
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .observers
                .remove(&observer_id);
        }))
    }

    async fn set_property(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Value,
    ) -> Result<(), SurfaceError> {
        self.with_element(element, |el| {
            el.properties.insert(name.to_string(), value.clone());
        })?;
        self.state().ops.push(MockOp::SetProperty {
            element: element.clone(),
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    async fn dispatch_event(
        &self,
        element: &ElementHandle,
        event: &str,
    ) -> Result<(), SurfaceError> {
        self.with_element(element, |_| ())?;
        self.state().ops.push(MockOp::DispatchEvent {
            element: element.clone(),
            event: event.to_string(),
        });
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        let selectors = self.with_element(element, |el| el.selectors.clone())?;
        let reactions: Vec<MockReaction> = {
            let mut state = self.state();
            state.ops.push(MockOp::Click {
                element: element.clone(),
            });
            state
                .reactions
                .iter()
                .filter(|(selector, _)| selectors.contains(selector))
                .map(|(_, reaction)| reaction.clone())
                .collect()
        };
        for reaction in reactions {
            self.run_reaction(reaction);
        }
        Ok(())
    }

    async fn set_files(
        &self,
        element: &ElementHandle,
        files: Vec<NativeFile>,
    ) -> Result<(), SurfaceError> {
        if self.state().fail_set_files {
            return Err(SurfaceError::Script("input rejected files".to_string()));
        }
        let names = files.iter().map(|f| f.name.clone()).collect();
        self.with_element(element, |el| el.files = files)?;
        self.state().ops.push(MockOp::SetFiles {
            element: element.clone(),
            names,
        });
        Ok(())
    }

    async fn upload(&self, request: PageUpload) -> Result<Value, SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.ops.push(MockOp::Upload {
            endpoint: request.endpoint.clone(),
            file_name: request.file.name.clone(),
        });
        let default = json!({ "data": { "url": format!("https://cdn.mock/{}", request.file.name) } });
        state.uploads.push(request);
        state.upload_response.clone().unwrap_or(Ok(default))
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        let state = self.state();
        Self::ensure_open(&state)?;
        Ok(state.url.clone())
    }

    async fn activate(&self) -> Result<(), SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.ops.push(MockOp::Activate);
        Ok(())
    }

    async fn reload(&self) -> Result<(), SurfaceError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.ops.push(MockOp::Reload);
        Self::notify_locked(&state);
        Ok(())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let mut state = self.state();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.ops.push(MockOp::Close);
        // Dropping the senders ends every pending observer.
        state.observers.clear();
        drop(state);
        self.inner.cancel.cancel();
        Ok(())
    }
}
