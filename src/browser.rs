// ── Browser handle ────────────────────────────────────────────────────────────
//
// `Browser` wraps one `AutomationHost` and turns its delegate callbacks into
// `Signal`s.  Script results and page messages are parsed with `serde_json`
// and handed to the application through the `TaskRunner`, never inline.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    automation::{Automation, KeyDisposition, KeyMessage, Rect, WindowId},
    config::HostConfig,
    error::Result,
    events::DocumentEvent,
    host::{ActivationContext, AutomationHost, HostDelegate},
    signal::Signal,
    task::TaskRunner,
};

/// Receives `(success, value)` for `execute_javascript`.
pub type EvalCallback = Box<dyn FnOnce(bool, Value)>;

type KeyHandler = Rc<dyn Fn(&KeyMessage) -> bool>;

struct BrowserInner<A: Automation> {
    host: AutomationHost<A>,
    tasks: Rc<dyn TaskRunner>,
    binding_script: RefCell<String>,
    key_handler: RefCell<Option<KeyHandler>>,
    finish_navigation: Signal<Browser<A>>,
    close: Signal<Browser<A>>,
    update_title: Signal<String>,
    document_event: Signal<DocumentEvent>,
    script_message: Signal<Value>,
}

/// One embedded browser.  Clones share the same instance.
pub struct Browser<A: Automation> {
    inner: Rc<BrowserInner<A>>,
}

impl<A: Automation> Clone for Browser<A> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

/// Non-owning handle, for signal slots that must not keep the browser alive.
pub struct WeakBrowser<A: Automation> {
    inner: Weak<BrowserInner<A>>,
}

impl<A: Automation> Clone for WeakBrowser<A> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<A: Automation> WeakBrowser<A> {
    pub fn upgrade(&self) -> Option<Browser<A>> {
        self.inner.upgrade().map(|inner| Browser { inner })
    }
}

impl<A: Automation> Browser<A> {
    /// Create the browser inside `parent`.  `factory` activates the
    /// automation object; if it fails the browser is inert.
    pub fn new(
        parent: WindowId,
        config: HostConfig,
        tasks: Rc<dyn TaskRunner>,
        factory: impl FnOnce(ActivationContext) -> Result<A>,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<BrowserInner<A>>| {
            let delegate = Rc::new(BrowserDelegate { browser: this.clone() });
            BrowserInner {
                host: AutomationHost::create(parent, config, delegate, factory),
                tasks,
                binding_script: RefCell::new(String::new()),
                key_handler: RefCell::new(None),
                finish_navigation: Signal::new(),
                close: Signal::new(),
                update_title: Signal::new(),
                document_event: Signal::new(),
                script_message: Signal::new(),
            }
        });
        Self { inner }
    }

    pub fn downgrade(&self) -> WeakBrowser<A> {
        WeakBrowser { inner: Rc::downgrade(&self.inner) }
    }

    pub fn host(&self) -> &AutomationHost<A> {
        &self.inner.host
    }

    pub fn is_active(&self) -> bool {
        self.inner.host.is_active()
    }

    pub fn load_url(&self, url: &str) {
        self.inner.host.load_url(url);
    }

    pub fn load_html(&self, html: &str, base_url: &str) {
        self.inner.host.load_html(html, base_url);
    }

    /// Run `code` in the current document.
    ///
    /// With a callback, the result is delivered later through the task
    /// runner as `(true, value)`; an empty result is `Null`, and any failure
    /// is `(false, Null)`.  Without one, the result is discarded.
    pub fn execute_javascript(&self, code: &str, callback: Option<EvalCallback>) {
        let Some(callback) = callback else {
            if let Err(e) = self.inner.host.exec(code) {
                debug!(error = %e, "fire-and-forget script failed");
            }
            return;
        };

        let (success, value) = match self.inner.host.eval(code) {
            Ok(json) => (true, parse_result(&json)),
            Err(e) => {
                debug!(error = %e, "script evaluation failed");
                (false, Value::Null)
            }
        };
        self.inner.tasks.post_task(Box::new(move || callback(success, value)));
    }

    /// Resize the control to `bounds` within the owning window.
    pub fn set_bounds(&self, bounds: Rect) {
        self.inner.host.resize(bounds);
    }

    pub fn has_focus(&self) -> bool {
        self.inner.host.has_focus()
    }

    pub fn on_set_focus(&self) -> bool {
        self.inner.host.on_set_focus()
    }

    /// `WM_PARENTNOTIFY` on the owning window; `child` is its lparam.
    pub fn on_parent_notify(&self, wparam: usize, child: WindowId) -> bool {
        self.inner.host.on_parent_notify(wparam, child)
    }

    pub fn handle_key_message(&self, key: &KeyMessage) -> KeyDisposition {
        self.inner.host.handle_key_message(key)
    }

    /// Script injected into every completed document.
    pub fn set_binding_script(&self, script: impl Into<String>) {
        *self.inner.binding_script.borrow_mut() = script.into();
    }

    pub fn binding_script(&self) -> String {
        self.inner.binding_script.borrow().clone()
    }

    /// Offered every keyboard message first.  Return `true` to consume it.
    pub fn set_key_event_handler(&self, handler: impl Fn(&KeyMessage) -> bool + 'static) {
        *self.inner.key_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn on_finish_navigation(&self) -> &Signal<Browser<A>> {
        &self.inner.finish_navigation
    }

    pub fn on_close(&self) -> &Signal<Browser<A>> {
        &self.inner.close
    }

    pub fn on_update_title(&self) -> &Signal<String> {
        &self.inner.update_title
    }

    pub fn on_document_event(&self) -> &Signal<DocumentEvent> {
        &self.inner.document_event
    }

    /// Messages the page sends with `window.external.postMessage`.  JSON
    /// text arrives parsed; anything else as a JSON string.
    pub fn on_script_message(&self) -> &Signal<Value> {
        &self.inner.script_message
    }

    /// Restore the subclass and close the automation object.
    pub fn close(&self) {
        self.inner.host.teardown();
    }
}

/// Map an `eval` result string to a JSON value.
fn parse_result(json: &str) -> Value {
    if json == "undefined" {
        return Value::Null;
    }
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!(error = %e, "script result is not valid JSON");
        Value::Null
    })
}

struct BrowserDelegate<A: Automation> {
    browser: Weak<BrowserInner<A>>,
}

impl<A: Automation> BrowserDelegate<A> {
    fn browser(&self) -> Option<Browser<A>> {
        self.browser.upgrade().map(|inner| Browser { inner })
    }
}

impl<A: Automation> HostDelegate for BrowserDelegate<A> {
    fn binding_script(&self) -> String {
        self.browser().map(|b| b.binding_script()).unwrap_or_default()
    }

    fn on_key_event(&self, key: &KeyMessage) -> bool {
        let Some(browser) = self.browser() else { return false };
        let handler = browser.inner.key_handler.borrow().clone();
        handler.is_some_and(|h| h(key))
    }

    fn on_finish_navigation(&self) {
        if let Some(browser) = self.browser() {
            browser.inner.finish_navigation.emit(&browser);
        }
    }

    fn on_close(&self) {
        if let Some(browser) = self.browser() {
            browser.inner.close.emit(&browser);
        }
    }

    fn on_title_changed(&self, title: &str) {
        if let Some(browser) = self.browser() {
            browser.inner.update_title.emit(&title.to_owned());
        }
    }

    fn on_document_event(&self, event: DocumentEvent) {
        if let Some(browser) = self.browser() {
            browser.inner.document_event.emit(&event);
        }
    }

    fn on_script_message(&self, message: &str) {
        let Some(browser) = self.browser() else { return };
        let value = serde_json::from_str(message).unwrap_or_else(|_| Value::from(message));
        let weak = browser.downgrade();
        browser.inner.tasks.post_task(Box::new(move || {
            if let Some(browser) = weak.upgrade() {
                browser.inner.script_message.emit(&value);
            }
        }));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
