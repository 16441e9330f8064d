// ── Automation host ───────────────────────────────────────────────────────────
//
// Owns one automation object and drives it: activation, navigation, HTML
// injection, script evaluation, resize, focus and subclass teardown.
//
// Re-entrancy contract: every call into the automation object, a document, a
// script engine or the delegate can pump messages and land back in this
// module (a sink callback, a window message).  No `RefCell` borrow of host
// state is ever held across such a call; state is read into locals, the
// borrow dropped, then the call made.  "Navigation in progress" is an explicit
// flag, never inferred from call depth.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use tracing::{debug, error, info, trace, warn};

use crate::{
    automation::{value_to_json, Automation, Document, KeyDisposition, KeyMessage, Rect, ScriptEngine, WindowId, WM_DESTROY},
    config::HostConfig,
    content::PendingLoad,
    error::{BrowserError, Result},
    events::{DocumentEvent, DocumentEventSink, EventSink, EventTarget, TopLevelEvent},
    site::HostSite,
    subclass::{route_key_message, HookTable, SubclassState},
};

/// The application-facing side of the host.
///
/// Methods are invoked from inside automation callbacks and may themselves
/// call back into the host.
pub trait HostDelegate {
    /// Script injected into every newly completed document.
    fn binding_script(&self) -> String;
    /// First refusal on keyboard messages.  `true` when handled.
    fn on_key_event(&self, key: &KeyMessage) -> bool;
    fn on_finish_navigation(&self);
    fn on_close(&self);
    fn on_title_changed(&self, _title: &str) {}
    fn on_document_event(&self, _event: DocumentEvent) {}
    /// A page called `window.external.postMessage(message)`.
    fn on_script_message(&self, _message: &str) {}
}

/// Everything an automation factory needs to activate the object.
pub struct ActivationContext {
    pub parent: WindowId,
    pub config: HostConfig,
    pub sink: EventSink,
    pub site: Rc<HostSite>,
    pub keys: KeyRouter,
    pub external: ExternalRouter,
}

/// Handle the subclassed window procedure uses to reach the host.
#[derive(Clone)]
pub struct KeyRouter {
    host: Weak<dyn RouteKeys>,
}

pub(crate) trait RouteKeys {
    fn route_key(&self, key: &KeyMessage) -> KeyDisposition;
}

impl KeyRouter {
    /// Route a keyboard message; after teardown everything is forwarded.
    pub fn route(&self, key: &KeyMessage) -> KeyDisposition {
        self.host
            .upgrade()
            .map_or(KeyDisposition::Forward, |host| host.route_key(key))
    }
}

/// Handle the page's `window.external` object uses to reach the host.
#[derive(Clone)]
pub struct ExternalRouter {
    host: Weak<dyn PostMessage>,
}

pub(crate) trait PostMessage {
    fn post_message(&self, message: &str) -> bool;
}

impl ExternalRouter {
    /// Hand a page message to the delegate.  `false` once the host is torn
    /// down.
    pub fn post_message(&self, message: &str) -> bool {
        self.host.upgrade().is_some_and(|host| host.post_message(message))
    }
}

struct HostState<D> {
    pending: Option<PendingLoad>,
    document: Option<Rc<D>>,
    /// Bumped whenever a new document object replaces the old one.
    document_generation: u64,
    control_window: Option<WindowId>,
    navigating: bool,
    current_target: Option<String>,
    closed: bool,
}

pub(crate) struct HostInner<A: Automation> {
    automation: RefCell<Option<Rc<A>>>,
    state: RefCell<HostState<A::Document>>,
    hooks: RefCell<HookTable<A::Proc>>,
    site: Rc<HostSite>,
    config: HostConfig,
    delegate: Rc<dyn HostDelegate>,
    this: Weak<HostInner<A>>,
}

/// One embedded browser instance.
///
/// Dropping the host tears it down: the subclass is restored and the
/// automation object closed.
pub struct AutomationHost<A: Automation> {
    inner: Rc<HostInner<A>>,
}

impl<A: Automation> AutomationHost<A> {
    /// Create the host and run `factory` to activate the automation object.
    ///
    /// Activation failure is logged, not returned: the host stays inert and
    /// every operation becomes a silent no-op.
    pub fn create(
        parent: WindowId,
        config: HostConfig,
        delegate: Rc<dyn HostDelegate>,
        factory: impl FnOnce(ActivationContext) -> Result<A>,
    ) -> Self {
        let site = Rc::new(HostSite::new(parent));
        let inner = Rc::new_cyclic(|this| HostInner {
            automation: RefCell::new(None),
            state: RefCell::new(HostState {
                pending: None,
                document: None,
                document_generation: 0,
                control_window: None,
                navigating: false,
                current_target: None,
                closed: false,
            }),
            hooks: RefCell::new(HookTable::new()),
            site: Rc::clone(&site),
            config: config.clone(),
            delegate,
            this: this.clone(),
        });

        let ctx = ActivationContext {
            parent,
            config,
            sink: EventSink::new(inner.this.clone() as Weak<dyn EventTarget>),
            site,
            keys: KeyRouter { host: inner.this.clone() as Weak<dyn RouteKeys> },
            external: ExternalRouter { host: inner.this.clone() as Weak<dyn PostMessage> },
        };
        match factory(ctx) {
            Ok(automation) => {
                info!(parent, "automation object activated");
                *inner.automation.borrow_mut() = Some(Rc::new(automation));
            }
            Err(e) => error!(parent, error = %e, "automation object activation failed; host is inert"),
        }
        Self { inner }
    }

    /// `false` when activation failed or the host was torn down.
    pub fn is_active(&self) -> bool {
        self.inner.automation().is_some()
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Navigate directly to `url`, dropping any pending HTML load.
    pub fn load_url(&self, url: &str) {
        let Some(automation) = self.inner.automation() else {
            warn!(url, "load_url on inert host ignored");
            return;
        };
        self.inner.begin_navigation(None, url);
        if let Err(e) = automation.navigate(url) {
            warn!(url, error = %e, "navigation request failed");
            self.inner.state.borrow_mut().navigating = false;
        }
    }

    /// Show `html` as if it were fetched from `base_url`.
    ///
    /// Navigates to the placeholder address; the stored HTML is delivered
    /// once the placeholder document is ready.
    pub fn load_html(&self, html: &str, base_url: &str) {
        let Some(automation) = self.inner.automation() else {
            warn!("load_html on inert host ignored");
            return;
        };
        let base = self.inner.config.base_url_or_default(base_url).to_owned();
        let placeholder = self.inner.config.placeholder_url.clone();
        debug!(base_url = %base, bytes = html.len(), "queueing HTML load");
        self.inner.begin_navigation(Some(PendingLoad::new(html, base)), &placeholder);
        if let Err(e) = automation.navigate(&placeholder) {
            warn!(error = %e, "placeholder navigation failed");
            let mut state = self.inner.state.borrow_mut();
            state.navigating = false;
            state.pending = None;
        }
    }

    /// Evaluate `code` and return the result as a JSON string (`undefined`
    /// for an empty result).
    pub fn eval(&self, code: &str) -> Result<String> {
        self.inner.run_script(code, true).map(Option::unwrap_or_default)
    }

    /// Evaluate `code`, discarding the result.
    pub fn exec(&self, code: &str) -> Result<()> {
        self.inner.run_script(code, false).map(|_| ())
    }

    /// Match the control's backing surface to the owning window's client area.
    pub fn resize(&self, bounds: Rect) {
        self.inner.site.set_bounds(bounds);
        if let Some(automation) = self.inner.automation() {
            if let Err(e) = automation.set_bounds(bounds.at_origin()) {
                debug!(error = %e, "SetObjectRects failed");
            }
        }
    }

    /// `true` when keyboard focus is on the control's rendering window.
    pub fn has_focus(&self) -> bool {
        let Some(automation) = self.inner.automation() else {
            return false;
        };
        let control = self.inner.state.borrow().control_window;
        control.is_some() && automation.focused_window() == control
    }

    /// The owning view received focus.  Forwards activation to the
    /// automation object and returns `false` ("unhandled") so the
    /// framework's own focus bookkeeping still runs.
    pub fn on_set_focus(&self) -> bool {
        if let Some(automation) = self.inner.automation() {
            if let Err(e) = automation.activate_for_focus() {
                debug!(error = %e, "focus activation failed");
            }
        }
        false
    }

    /// `WM_PARENTNOTIFY` on the owning window, `child` being the window
    /// named in its lparam.  A destroy notification from the control
    /// hierarchy means the page closed itself: the subclass is restored and
    /// `on_close` raised.  Returns `true` when handled.
    pub fn on_parent_notify(&self, wparam: usize, child: WindowId) -> bool {
        if (wparam & 0xFFFF) as u32 != WM_DESTROY {
            return false;
        }
        let Some(automation) = self.inner.automation() else {
            return false;
        };
        let control = self.inner.state.borrow().control_window;
        if control != Some(child) && !automation.is_control_hierarchy(child) {
            trace!(child, "unrelated child window destroyed");
            return false;
        }
        self.inner.restore_hooks();
        let first = {
            let mut state = self.inner.state.borrow_mut();
            !std::mem::replace(&mut state.closed, true)
        };
        if first {
            info!("page closed the browser window");
            self.inner.delegate.on_close();
        }
        true
    }

    /// Route a keyboard message that reached the hooked window.
    pub fn handle_key_message(&self, key: &KeyMessage) -> KeyDisposition {
        self.inner.route_key(key)
    }

    /// The resolved rendering sub-window, once discovered.
    pub fn control_window(&self) -> Option<WindowId> {
        self.inner.state.borrow().control_window
    }

    pub fn subclass_state(&self) -> SubclassState {
        match self.control_window() {
            Some(w) => self.inner.hooks.borrow().state(w),
            None => SubclassState::Unhooked,
        }
    }

    /// The procedure to chain to for a hooked window.
    #[cfg(test)]
    pub(crate) fn original_proc(&self, window: WindowId) -> Option<A::Proc> {
        self.inner.hooks.borrow().original(window)
    }

    /// `true` while a navigation has been started and not yet completed.
    pub fn is_navigating(&self) -> bool {
        self.inner.state.borrow().navigating
    }

    pub fn has_document(&self) -> bool {
        self.inner.state.borrow().document.is_some()
    }

    /// Restore the subclass and close the automation object.  Idempotent.
    pub fn teardown(&self) {
        self.inner.restore_hooks();
        let automation = self.inner.automation.borrow_mut().take();
        {
            let mut state = self.inner.state.borrow_mut();
            state.document = None;
            state.document_generation += 1;
            state.pending = None;
            state.navigating = false;
        }
        if let Some(automation) = automation {
            debug!("closing automation object");
            automation.close();
        }
    }
}

impl<A: Automation> Drop for AutomationHost<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<A: Automation> HostInner<A> {
    fn automation(&self) -> Option<Rc<A>> {
        self.automation.borrow().clone()
    }

    fn begin_navigation(&self, pending: Option<PendingLoad>, target: &str) {
        let mut state = self.state.borrow_mut();
        state.pending = pending;
        state.navigating = true;
        state.current_target = Some(target.to_owned());
    }

    fn run_script(&self, code: &str, want_result: bool) -> Result<Option<String>> {
        let document = self.state.borrow().document.clone().ok_or(BrowserError::NoDocument)?;
        let script = document.script().map_err(|e| {
            debug!(error = %e, "script engine unavailable");
            BrowserError::NoDocument
        })?;
        let value = script.eval(code).map_err(as_eval_failure)?;
        if !want_result {
            return Ok(None);
        }
        value_to_json(&script, &value).map(Some).map_err(as_eval_failure)
    }

    /// Find and hook the rendering sub-window.  Runs on every progress
    /// notification until it succeeds once.
    fn resolve_control_window(&self) {
        if self.state.borrow().control_window.is_some() {
            return;
        }
        let Some(automation) = self.automation() else { return };
        let window = match automation.find_control_window() {
            Ok(Some(window)) => window,
            Ok(None) => {
                trace!("control window not created yet");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to resolve control window");
                return;
            }
        };
        {
            let mut state = self.state.borrow_mut();
            if state.control_window.is_some() {
                return;
            }
            state.control_window = Some(window);
        }
        match automation.subclass(window) {
            Ok(original) => {
                self.hooks.borrow_mut().install(window, original);
            }
            Err(e) => warn!(window, error = %e, "failed to subclass control window"),
        }
    }

    fn restore_hooks(&self) {
        let restored = self.hooks.borrow_mut().restore_all();
        if restored.is_empty() {
            return;
        }
        let Some(automation) = self.automation() else { return };
        for (window, original) in restored {
            automation.unsubclass(window, original);
        }
    }

    /// The control settled on `url` for the navigation in progress.  Server
    /// redirects never raise `BeforeNavigate`, so this is where the target
    /// learns its final address.
    fn on_navigate_complete(&self, url: String) {
        let mut state = self.state.borrow_mut();
        let html_delivered = state.pending.as_ref().is_some_and(PendingLoad::is_delivered);
        if state.navigating && !html_delivered {
            trace!(url, "navigation target settled");
            state.current_target = Some(url);
        }
    }

    fn on_document_complete(&self, url: &str) {
        {
            let state = self.state.borrow();
            let delivered_html = state.pending.as_ref().is_some_and(PendingLoad::is_delivered);
            if state.navigating && !delivered_html {
                if let Some(target) = state.current_target.as_deref() {
                    if !same_target(target, url) {
                        debug!(url, target, "stale document completion ignored");
                        return;
                    }
                }
            }
        }

        let Some(automation) = self.automation() else { return };
        let document = match automation.document() {
            Ok(document) => Rc::new(document),
            Err(e) => {
                error!(url, error = %e, "failed to get document");
                return;
            }
        };

        let (delivery, generation) = {
            let mut state = self.state.borrow_mut();
            state.document = Some(Rc::clone(&document));
            state.document_generation += 1;
            let chunk_size = self.config.chunk_size;
            let delivery = state.pending.as_mut().and_then(|p| p.take_for_delivery(chunk_size));
            (delivery, state.document_generation)
        };

        // Placeholder completed: hand the stored HTML over and wait for the
        // real content to complete.
        if let Some(source) = delivery {
            debug!(base_url = source.base_url().unwrap_or_default(), "delivering HTML into placeholder document");
            if let Err(e) = document.load_content(source) {
                error!(error = %e, "failed to load HTML content");
                let mut state = self.state.borrow_mut();
                state.navigating = false;
                state.pending = None;
            }
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            state.navigating = false;
            state.current_target = None;
            state.pending = None;
        }

        let sink = DocumentEventSink::new(self.this.clone() as Weak<dyn EventTarget>, generation);
        match document.advise(sink) {
            Ok(()) => {
                let binding = self.delegate.binding_script();
                if !binding.is_empty() {
                    if let Err(e) = self.run_script(&binding, false) {
                        warn!(error = %e, "binding script failed");
                    }
                }
            }
            Err(e) => error!(error = %e, "failed to install document events"),
        }

        info!(url, "navigation finished");
        self.delegate.on_finish_navigation();
    }
}

impl<A: Automation> EventTarget for HostInner<A> {
    fn handle_top_level(&self, event: TopLevelEvent) {
        match event {
            TopLevelEvent::BeforeNavigate { url, top_level: true } => {
                let mut state = self.state.borrow_mut();
                let html_delivered = state.pending.as_ref().is_some_and(PendingLoad::is_delivered);
                if !html_delivered {
                    state.navigating = true;
                    state.current_target = Some(url);
                }
            }
            TopLevelEvent::NavigateComplete { url, top_level } => {
                if top_level {
                    self.on_navigate_complete(url);
                }
                self.resolve_control_window();
            }
            TopLevelEvent::ProgressChange { .. } => self.resolve_control_window(),
            TopLevelEvent::DocumentComplete { url, top_level } => {
                if top_level {
                    self.on_document_complete(&url);
                } else {
                    trace!(url, "sub-frame document complete");
                }
            }
            TopLevelEvent::TitleChange { title } => self.delegate.on_title_changed(&title),
            TopLevelEvent::NavigateError { url, status, top_level } => {
                warn!(url, status, top_level, "navigation error");
            }
            TopLevelEvent::WindowClosing { is_child } => debug!(is_child, "window closing requested"),
            TopLevelEvent::BeforeNavigate { .. } => {}
        }
    }

    fn handle_document_event(&self, generation: u64, event: DocumentEvent) {
        let current = self.state.borrow().document_generation;
        if generation != current {
            trace!(generation, current, ?event, "event from superseded document dropped");
            return;
        }
        self.delegate.on_document_event(event);
    }
}

impl<A: Automation> PostMessage for HostInner<A> {
    fn post_message(&self, message: &str) -> bool {
        if self.automation().is_none() {
            return false;
        }
        trace!(bytes = message.len(), "page message");
        self.delegate.on_script_message(message);
        true
    }
}

impl<A: Automation> RouteKeys for HostInner<A> {
    fn route_key(&self, key: &KeyMessage) -> KeyDisposition {
        let automation = self.automation();
        route_key_message(
            key,
            |k| self.delegate.on_key_event(k),
            |k| automation.as_ref().is_some_and(|a| a.translate_accelerator(k)),
        )
    }
}

fn as_eval_failure(e: BrowserError) -> BrowserError {
    match e {
        BrowserError::EvalFailed(_) => e,
        other => BrowserError::EvalFailed(other.to_string()),
    }
}

/// Compare navigation targets, ignoring a trailing slash.  Scheme and host
/// are case-insensitive; path, query and fragment are not.
fn same_target(a: &str, b: &str) -> bool {
    let (a_origin, a_rest) = split_origin(a.trim_end_matches('/'));
    let (b_origin, b_rest) = split_origin(b.trim_end_matches('/'));
    a_origin.eq_ignore_ascii_case(b_origin) && a_rest == b_rest
}

/// Split `url` after its authority.  A URL without `://` is all origin.
fn split_origin(url: &str) -> (&str, &str) {
    let start = url.find("://").map_or(0, |i| i + 3);
    let end = url[start..]
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .map_or(url.len(), |i| start + i);
    url.split_at(end)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        automation::WM_KEYDOWN,
        testing::{Harness, Recorded},
    };

    #[test]
    fn load_html_round_trips_through_the_content_source() {
        let h = Harness::new();
        let html = "<html><head></head><body><p>round trip</p></body></html>";
        h.host.load_html(html, "http://example.com/");
        assert_eq!(h.world.navigations(), vec!["about:blank"]);

        h.world.complete("about:blank");
        assert_eq!(h.delegate.count(Recorded::Finish), 0, "placeholder must not finish");
        assert_eq!(h.world.loaded_html().as_deref(), Some(html));

        h.world.complete("http://example.com/");
        assert_eq!(h.delegate.count(Recorded::Finish), 1);

        let json = h.host.eval("document.documentElement.outerHTML").unwrap();
        assert_eq!(serde_json::from_str::<String>(&json).unwrap(), html);
    }

    #[test]
    fn load_html_then_inner_text() {
        let h = Harness::new();
        h.host.load_html("<html><body>hi</body></html>", "");
        h.world.complete("about:blank");
        h.world.complete("about:blank");
        assert_eq!(h.host.eval("document.body.innerText").unwrap(), "\"hi\"");
    }

    #[test]
    fn binding_script_runs_only_on_real_content() {
        let h = Harness::new();
        h.host.load_html("<html><body>x</body></html>", "");
        h.world.complete("about:blank");
        assert!(h.world.evals().is_empty());
        assert_eq!(h.world.advised_documents(), 0);
        h.world.complete("about:blank");
        assert_eq!(h.world.evals(), vec![crate::testing::BINDING.to_owned()]);
        assert_eq!(h.world.advised_documents(), 1);
    }

    #[test]
    fn eval_before_any_navigation_fails() {
        let h = Harness::new();
        assert!(matches!(h.host.eval("1 + 1"), Err(BrowserError::NoDocument)));
    }

    #[test]
    fn empty_result_is_undefined() {
        let h = Harness::navigated("http://a/");
        assert_eq!(h.host.eval("void 0").unwrap(), "undefined");
    }

    #[test]
    fn eval_failure_maps_to_eval_failed() {
        let h = Harness::navigated("http://a/");
        assert!(matches!(h.host.eval("throw 1"), Err(BrowserError::EvalFailed(_))));
    }

    #[test]
    fn missing_script_engine_is_no_document() {
        let h = Harness::navigated("http://a/");
        h.world.set_script_available(false);
        assert!(matches!(h.host.eval("1"), Err(BrowserError::NoDocument)));
    }

    #[test]
    fn superseded_navigation_does_not_finish() {
        let h = Harness::new();
        h.host.load_url("http://first/");
        h.host.load_url("http://second/");
        h.world.complete_without_before("http://first/");
        assert_eq!(h.delegate.count(Recorded::Finish), 0);
        h.world.complete("http://second/");
        assert_eq!(h.delegate.count(Recorded::Finish), 1);
        assert!(!h.host.is_navigating());
    }

    #[test]
    fn server_redirect_still_finishes() {
        let h = Harness::new();
        h.host.load_url("http://example.com");
        h.world.redirect("https://www.example.com/");
        assert_eq!(h.delegate.count(Recorded::Finish), 1);
        assert!(h.host.has_document());
        assert!(!h.host.is_navigating());
        assert_eq!(h.host.eval("1").unwrap(), "1");
    }

    #[test]
    fn case_variant_path_is_a_different_target() {
        let h = Harness::new();
        h.host.load_url("http://a/Old");
        h.host.load_url("http://a/old");
        h.world.complete_without_before("http://a/Old");
        assert_eq!(h.delegate.count(Recorded::Finish), 0);
        h.world.complete_without_before("http://a/old");
        assert_eq!(h.delegate.count(Recorded::Finish), 1);
    }

    #[test]
    fn page_messages_reach_the_delegate_until_teardown() {
        let h = Harness::new();
        assert!(h.world.post_message("{\"kind\":\"ping\"}"));
        assert_eq!(h.delegate.count(Recorded::ScriptMessage), 1);
        h.host.teardown();
        assert!(!h.world.post_message("late"));
        assert_eq!(h.delegate.count(Recorded::ScriptMessage), 1);
    }

    #[test]
    fn each_completed_navigation_finishes_once() {
        let h = Harness::new();
        h.host.load_url("http://first/");
        h.world.complete("http://first/");
        h.host.load_url("http://second/");
        h.world.complete("http://second/");
        assert_eq!(h.delegate.count(Recorded::Finish), 2);
    }

    #[test]
    fn sub_frame_completion_is_ignored() {
        let h = Harness::new();
        h.host.load_url("http://a/");
        h.world.complete_frame("http://ads/");
        assert_eq!(h.delegate.count(Recorded::Finish), 0);
        assert!(!h.host.has_document());
    }

    #[test]
    fn load_url_drops_pending_html() {
        let h = Harness::new();
        h.host.load_html("<b>x</b>", "");
        h.host.load_url("http://a/");
        h.world.complete("http://a/");
        assert_eq!(h.world.loaded_html(), None);
        assert_eq!(h.delegate.count(Recorded::Finish), 1);
    }

    #[test]
    fn inert_host_ignores_everything() {
        let h = Harness::failing();
        assert!(!h.host.is_active());
        h.host.load_url("http://a/");
        h.host.load_html("<b>x</b>", "");
        h.host.resize(Rect::new(0, 0, 10, 10));
        assert!(!h.host.has_focus());
        assert!(matches!(h.host.eval("1"), Err(BrowserError::NoDocument)));
        assert!(h.world.navigations().is_empty());
    }

    #[test]
    fn control_window_is_hooked_once_on_progress() {
        let h = Harness::new();
        h.world.set_control_window(None);
        h.world.progress();
        assert_eq!(h.host.subclass_state(), SubclassState::Unhooked);
        h.world.set_control_window(Some(77));
        h.world.progress();
        h.world.set_control_window(Some(88));
        h.world.progress();
        assert_eq!(h.host.control_window(), Some(77));
        assert_eq!(h.host.subclass_state(), SubclassState::Hooked);
        assert_eq!(h.world.subclass_calls(), 1);
        assert_eq!(h.host.original_proc(77), Some(770));
    }

    #[test]
    fn teardown_twice_restores_once() {
        let h = Harness::new();
        h.world.set_control_window(Some(77));
        h.world.progress();
        h.host.teardown();
        h.host.teardown();
        assert_eq!(h.world.unsubclass_calls(), vec![(77, 770)]);
        assert_eq!(h.host.subclass_state(), SubclassState::Restored);
        assert_eq!(h.world.close_calls(), 1);
        assert!(!h.host.is_active());
    }

    #[test]
    fn page_close_restores_and_raises_close_once() {
        let h = Harness::new();
        h.world.set_control_window(Some(77));
        h.world.progress();
        assert!(h.host.on_parent_notify(WM_DESTROY as usize, 77));
        assert!(h.host.on_parent_notify(WM_DESTROY as usize, 77));
        assert_eq!(h.delegate.count(Recorded::Close), 1);
        assert_eq!(h.world.unsubclass_calls().len(), 1);
        h.host.teardown();
        assert_eq!(h.world.unsubclass_calls().len(), 1);
    }

    #[test]
    fn other_parent_notifications_are_unhandled() {
        let h = Harness::new();
        assert!(!h.host.on_parent_notify(0x0201, 77)); // WM_LBUTTONDOWN
        assert_eq!(h.delegate.count(Recorded::Close), 0);
    }

    #[test]
    fn destroying_an_unrelated_child_is_not_a_page_close() {
        let h = Harness::new();
        h.world.set_control_window(Some(77));
        h.world.progress();
        let wparam = WM_DESTROY as usize | (42 << 16);
        assert!(!h.host.on_parent_notify(wparam, 42));
        assert_eq!(h.delegate.count(Recorded::Close), 0);
        assert_eq!(h.host.subclass_state(), SubclassState::Hooked);
        assert!(h.world.unsubclass_calls().is_empty());
    }

    #[test]
    fn destroying_the_control_top_window_is_a_page_close() {
        let h = Harness::new();
        h.world.set_control_window(Some(77));
        h.world.set_top_window(Some(60));
        h.world.progress();
        assert!(h.host.on_parent_notify(WM_DESTROY as usize, 60));
        assert_eq!(h.delegate.count(Recorded::Close), 1);
        assert_eq!(h.host.subclass_state(), SubclassState::Restored);
    }

    #[test]
    fn inert_host_ignores_parent_notifications() {
        let h = Harness::failing();
        assert!(!h.host.on_parent_notify(WM_DESTROY as usize, 60));
        assert_eq!(h.delegate.count(Recorded::Close), 0);
    }

    #[test]
    fn handled_key_skips_accelerator_and_original() {
        let h = Harness::new();
        h.delegate.set_handles_keys(true);
        let key = KeyMessage::from_raw(77, WM_KEYDOWN, 0x74, 0).unwrap();
        assert_eq!(h.host.handle_key_message(&key), KeyDisposition::Handled);
        assert_eq!(h.world.accelerator_calls(), 0);
    }

    #[test]
    fn unhandled_key_is_offered_as_accelerator() {
        let h = Harness::new();
        let key = KeyMessage::from_raw(77, WM_KEYDOWN, 0x74, 0).unwrap();
        h.world.set_translates(true);
        assert_eq!(h.host.handle_key_message(&key), KeyDisposition::Accelerated);
        h.world.set_translates(false);
        assert_eq!(h.host.handle_key_message(&key), KeyDisposition::Forward);
        assert_eq!(h.world.accelerator_calls(), 2);
    }

    #[test]
    fn focus_activates_and_reports_unhandled() {
        let h = Harness::new();
        assert!(!h.host.on_set_focus());
        assert_eq!(h.world.activations(), 1);
        h.world.set_control_window(Some(77));
        h.world.progress();
        h.world.set_focused(Some(77));
        assert!(h.host.has_focus());
        h.world.set_focused(Some(5));
        assert!(!h.host.has_focus());
    }

    #[test]
    fn resize_forwards_origin_rect() {
        let h = Harness::new();
        h.host.resize(Rect::new(10, 20, 640, 480));
        assert_eq!(h.world.bounds(), Some(Rect::new(0, 0, 640, 480)));
    }

    #[test]
    fn document_events_from_superseded_document_are_dropped() {
        let h = Harness::navigated("http://a/");
        let old_sink = h.world.last_document_sink();
        old_sink.dispatch(DocumentEvent::Click);
        assert_eq!(h.delegate.count(Recorded::DocumentEvent), 1);

        h.host.load_url("http://b/");
        h.world.complete("http://b/");
        old_sink.dispatch(DocumentEvent::Click);
        assert_eq!(h.delegate.count(Recorded::DocumentEvent), 1);
        h.world.last_document_sink().dispatch(DocumentEvent::KeyDown);
        assert_eq!(h.delegate.count(Recorded::DocumentEvent), 2);
    }

    #[test]
    fn eval_tolerates_reentrant_callbacks() {
        let h = Harness::navigated("http://a/");
        let world = Rc::clone(&h.world);
        h.world.on_next_eval(move || {
            world.progress();
            world.title("nested");
            world.last_document_sink().dispatch(DocumentEvent::FocusIn);
        });
        assert_eq!(h.host.eval("1").unwrap(), "1");
        assert_eq!(h.delegate.count(Recorded::Title), 1);
        assert_eq!(h.delegate.count(Recorded::DocumentEvent), 1);
    }

    #[test]
    fn content_delivery_failure_clears_pending() {
        let h = Harness::new();
        h.world.set_content_load_fails(true);
        h.host.load_html("<b>x</b>", "");
        h.world.complete("about:blank");
        assert!(!h.host.is_navigating());
        assert_eq!(h.delegate.count(Recorded::Finish), 0);
    }

    #[test]
    fn only_scheme_and_host_ignore_case() {
        assert!(same_target("HTTP://A.com/", "http://a.com"));
        assert!(same_target("http://A.com/x/", "http://a.com/x"));
        assert!(!same_target("http://a.com/X", "http://a.com/x"));
        assert!(!same_target("http://a.com/?q=A", "http://a.com/?q=a"));
        assert!(same_target("About:Blank", "about:blank"));
    }
}
