// ── Test fake ─────────────────────────────────────────────────────────────────
//
// Scripted stand-in for the automation object.  It never fires events by
// itself; tests drive navigation progress explicitly through `World`, the
// way the real control delivers callbacks on the owning thread.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    automation::{Automation, Document, KeyMessage, Rect, ScriptEngine, WindowId},
    config::HostConfig,
    content::{strip_bom, ContentSource},
    error::{BrowserError, Result},
    events::{DocumentEvent, DocumentEventSink, EventSink, TopLevelEvent},
    host::{ActivationContext, AutomationHost, ExternalRouter, HostDelegate},
};

pub(crate) const BINDING: &str = "window.__bindings = true;";

// ── Delegate ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    Finish,
    Close,
    Title,
    DocumentEvent,
    ScriptMessage,
}

#[derive(Default)]
pub(crate) struct RecordingDelegate {
    events: RefCell<Vec<Recorded>>,
    handles_keys: Cell<bool>,
}

impl RecordingDelegate {
    pub(crate) fn count(&self, kind: Recorded) -> usize {
        self.events.borrow().iter().filter(|k| **k == kind).count()
    }

    pub(crate) fn set_handles_keys(&self, handles: bool) {
        self.handles_keys.set(handles);
    }
}

impl HostDelegate for RecordingDelegate {
    fn binding_script(&self) -> String {
        BINDING.to_owned()
    }

    fn on_key_event(&self, _key: &KeyMessage) -> bool {
        self.handles_keys.get()
    }

    fn on_finish_navigation(&self) {
        self.events.borrow_mut().push(Recorded::Finish);
    }

    fn on_close(&self) {
        self.events.borrow_mut().push(Recorded::Close);
    }

    fn on_title_changed(&self, _title: &str) {
        self.events.borrow_mut().push(Recorded::Title);
    }

    fn on_document_event(&self, _event: DocumentEvent) {
        self.events.borrow_mut().push(Recorded::DocumentEvent);
    }

    fn on_script_message(&self, _message: &str) {
        self.events.borrow_mut().push(Recorded::ScriptMessage);
    }
}

// ── World ─────────────────────────────────────────────────────────────────────

/// Everything the fake control knows and every call it received.
#[derive(Default)]
pub(crate) struct World {
    sink: RefCell<Option<EventSink>>,
    external: RefCell<Option<ExternalRouter>>,
    navigations: RefCell<Vec<String>>,
    html: RefCell<Option<String>>,
    doc_sinks: RefCell<Vec<DocumentEventSink>>,
    evals: RefCell<Vec<String>>,
    script_unavailable: Cell<bool>,
    content_load_fails: Cell<bool>,
    control_window: Cell<Option<WindowId>>,
    top_window: Cell<Option<WindowId>>,
    subclass_calls: Cell<usize>,
    unsubclass_calls: RefCell<Vec<(WindowId, isize)>>,
    close_calls: Cell<usize>,
    activations: Cell<usize>,
    accelerator_calls: Cell<usize>,
    translates: Cell<bool>,
    focused: Cell<Option<WindowId>>,
    bounds: Cell<Option<Rect>>,
    next_eval_hook: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl World {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn dispatch(&self, event: TopLevelEvent) {
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink.dispatch(event);
        }
    }

    /// Fire the full top-level sequence for a completed navigation.
    pub(crate) fn complete(&self, url: &str) {
        self.dispatch(TopLevelEvent::BeforeNavigate { url: url.to_owned(), top_level: true });
        self.dispatch(TopLevelEvent::NavigateComplete { url: url.to_owned(), top_level: true });
        self.complete_without_before(url);
    }

    pub(crate) fn complete_without_before(&self, url: &str) {
        self.dispatch(TopLevelEvent::DocumentComplete { url: url.to_owned(), top_level: true });
    }

    /// A server redirect: the control lands on `url` without announcing it
    /// through `BeforeNavigate`.
    pub(crate) fn redirect(&self, url: &str) {
        self.dispatch(TopLevelEvent::NavigateComplete { url: url.to_owned(), top_level: true });
        self.complete_without_before(url);
    }

    pub(crate) fn complete_frame(&self, url: &str) {
        self.dispatch(TopLevelEvent::DocumentComplete { url: url.to_owned(), top_level: false });
    }

    pub(crate) fn progress(&self) {
        self.dispatch(TopLevelEvent::ProgressChange { progress: 50, max: 100 });
    }

    pub(crate) fn title(&self, title: &str) {
        self.dispatch(TopLevelEvent::TitleChange { title: title.to_owned() });
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.borrow().clone()
    }

    pub(crate) fn loaded_html(&self) -> Option<String> {
        self.html.borrow().clone()
    }

    pub(crate) fn evals(&self) -> Vec<String> {
        self.evals.borrow().clone()
    }

    pub(crate) fn advised_documents(&self) -> usize {
        self.doc_sinks.borrow().len()
    }

    pub(crate) fn last_document_sink(&self) -> DocumentEventSink {
        self.doc_sinks.borrow().last().cloned().expect("no document sink armed")
    }

    pub(crate) fn set_script_available(&self, available: bool) {
        self.script_unavailable.set(!available);
    }

    pub(crate) fn set_content_load_fails(&self, fails: bool) {
        self.content_load_fails.set(fails);
    }

    pub(crate) fn set_control_window(&self, window: Option<WindowId>) {
        self.control_window.set(window);
    }

    pub(crate) fn set_top_window(&self, window: Option<WindowId>) {
        self.top_window.set(window);
    }

    /// Call `window.external.postMessage(message)` from the page.
    pub(crate) fn post_message(&self, message: &str) -> bool {
        let external = self.external.borrow().clone();
        external.is_some_and(|e| e.post_message(message))
    }

    pub(crate) fn subclass_calls(&self) -> usize {
        self.subclass_calls.get()
    }

    pub(crate) fn unsubclass_calls(&self) -> Vec<(WindowId, isize)> {
        self.unsubclass_calls.borrow().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.get()
    }

    pub(crate) fn activations(&self) -> usize {
        self.activations.get()
    }

    pub(crate) fn accelerator_calls(&self) -> usize {
        self.accelerator_calls.get()
    }

    pub(crate) fn set_translates(&self, translates: bool) {
        self.translates.set(translates);
    }

    pub(crate) fn set_focused(&self, window: Option<WindowId>) {
        self.focused.set(window);
    }

    pub(crate) fn bounds(&self) -> Option<Rect> {
        self.bounds.get()
    }

    /// Run `hook` from inside the next `eval`, as a message pumped during
    /// the call would.
    pub(crate) fn on_next_eval(&self, hook: impl FnOnce() + 'static) {
        *self.next_eval_hook.borrow_mut() = Some(Box::new(hook));
    }
}

// ── Fake automation object ────────────────────────────────────────────────────

pub(crate) struct FakeAutomation {
    world: Rc<World>,
}

impl Automation for FakeAutomation {
    type Document = FakeDocument;
    type Proc = isize;

    fn navigate(&self, url: &str) -> Result<()> {
        self.world.navigations.borrow_mut().push(url.to_owned());
        Ok(())
    }

    fn document(&self) -> Result<FakeDocument> {
        Ok(FakeDocument { world: Rc::clone(&self.world) })
    }

    fn set_bounds(&self, bounds: Rect) -> Result<()> {
        self.world.bounds.set(Some(bounds));
        Ok(())
    }

    fn activate_for_focus(&self) -> Result<()> {
        self.world.activations.set(self.world.activations.get() + 1);
        Ok(())
    }

    fn translate_accelerator(&self, _key: &KeyMessage) -> bool {
        self.world.accelerator_calls.set(self.world.accelerator_calls.get() + 1);
        self.world.translates.get()
    }

    fn find_control_window(&self) -> Result<Option<WindowId>> {
        Ok(self.world.control_window.get())
    }

    fn is_control_hierarchy(&self, window: WindowId) -> bool {
        self.world.top_window.get() == Some(window)
    }

    fn subclass(&self, window: WindowId) -> Result<isize> {
        self.world.subclass_calls.set(self.world.subclass_calls.get() + 1);
        Ok(window * 10)
    }

    fn unsubclass(&self, window: WindowId, original: isize) {
        self.world.unsubclass_calls.borrow_mut().push((window, original));
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.world.focused.get()
    }

    fn close(&self) {
        self.world.close_calls.set(self.world.close_calls.get() + 1);
    }
}

pub(crate) struct FakeDocument {
    world: Rc<World>,
}

impl Document for FakeDocument {
    type Script = FakeScript;

    fn load_content(&self, mut source: ContentSource) -> Result<()> {
        if self.world.content_load_fails.get() {
            source.fail();
            return Err(BrowserError::Win32 { function: "IPersistMoniker::Load", code: 0x8000_4005 });
        }
        let mut bytes = Vec::new();
        source.drain_into(&mut bytes)?;
        *self.world.html.borrow_mut() = Some(String::from_utf8_lossy(strip_bom(&bytes)).into_owned());
        Ok(())
    }

    fn advise(&self, sink: DocumentEventSink) -> Result<()> {
        self.world.doc_sinks.borrow_mut().push(sink);
        Ok(())
    }

    fn script(&self) -> Result<FakeScript> {
        if self.world.script_unavailable.get() {
            return Err(BrowserError::NoDocument);
        }
        Ok(FakeScript { world: Rc::clone(&self.world) })
    }
}

pub(crate) enum FakeValue {
    Undefined,
    Str(String),
    Int(i64),
}

pub(crate) struct FakeScript {
    world: Rc<World>,
}

impl ScriptEngine for FakeScript {
    type Value = FakeValue;

    fn eval(&self, code: &str) -> Result<FakeValue> {
        self.world.evals.borrow_mut().push(code.to_owned());
        let hook = self.world.next_eval_hook.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }

        let html = self.world.html.borrow().clone().unwrap_or_default();
        match code.trim() {
            "document.documentElement.outerHTML" => Ok(FakeValue::Str(html)),
            "document.body.innerText" => Ok(FakeValue::Str(inner_text(&html))),
            c if c.starts_with("throw") => Err(BrowserError::EvalFailed("uncaught exception".into())),
            c => Ok(c.parse().map_or(FakeValue::Undefined, FakeValue::Int)),
        }
    }

    fn is_undefined(value: &FakeValue) -> bool {
        matches!(value, FakeValue::Undefined)
    }

    fn stringify(&self, value: &FakeValue) -> Result<String> {
        Ok(match value {
            FakeValue::Undefined => "undefined".to_owned(),
            FakeValue::Str(s) => serde_json::to_string(s).map_err(|e| BrowserError::EvalFailed(e.to_string()))?,
            FakeValue::Int(n) => n.to_string(),
        })
    }
}

/// Text content of `<body>` with tags removed.
fn inner_text(html: &str) -> String {
    let body = html
        .find("<body")
        .and_then(|start| html[start..].find('>').map(|gt| start + gt + 1))
        .map_or(html, |start| {
            let end = html[start..].find("</body>").map_or(html.len(), |e| start + e);
            &html[start..end]
        });
    let mut text = String::new();
    let mut in_tag = false;
    for ch in body.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub(crate) struct Harness {
    pub(crate) host: AutomationHost<FakeAutomation>,
    pub(crate) world: Rc<World>,
    pub(crate) delegate: Rc<RecordingDelegate>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::build(true)
    }

    /// A host whose activation failed.
    pub(crate) fn failing() -> Self {
        Self::build(false)
    }

    /// A host that already completed a navigation to `url`.
    pub(crate) fn navigated(url: &str) -> Self {
        let h = Self::new();
        h.host.load_url(url);
        h.world.complete(url);
        h
    }

    fn build(activates: bool) -> Self {
        let world = World::new();
        let delegate = Rc::new(RecordingDelegate::default());
        let factory = activate(&world);
        let host = AutomationHost::create(
            1,
            HostConfig::default(),
            Rc::clone(&delegate) as Rc<dyn HostDelegate>,
            move |ctx| {
                if !activates {
                    return Err(BrowserError::ActivationFailed("CoCreateInstance".into()));
                }
                factory(ctx)
            },
        );
        Self { host, world, delegate }
    }
}

/// Activation factory that wires the fake to `world`.
pub(crate) fn activate(world: &Rc<World>) -> impl FnOnce(ActivationContext) -> Result<FakeAutomation> {
    let world = Rc::clone(world);
    move |ctx| {
        *world.sink.borrow_mut() = Some(ctx.sink);
        *world.external.borrow_mut() = Some(ctx.external);
        Ok(FakeAutomation { world })
    }
}
