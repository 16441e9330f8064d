// ── Automation protocol seam ──────────────────────────────────────────────────
//
// The minimal contract the host needs from the platform's automation object:
// create, set-site, activate, advise, navigate, query-document, eval, unadvise,
// deactivate.  `platform::win32` implements it over COM; tests implement it
// with a scripted fake.  No `unsafe` here.

use crate::{
    content::ContentSource,
    error::Result,
    events::DocumentEventSink,
};

/// Raw identity of a native window (the `HWND` value on Windows).
pub type WindowId = isize;

/// `WM_KEYDOWN`.
pub const WM_KEYDOWN: u32 = 0x0100;
/// `WM_KEYUP`.
pub const WM_KEYUP: u32 = 0x0101;
/// `WM_DESTROY`, as carried in the low word of a `WM_PARENTNOTIFY` wparam.
pub const WM_DESTROY: u32 = 0x0002;

/// A rectangle in the owning window's client coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// The same size anchored at the origin.  The hosted control always
    /// fills its own window, so its object rect starts at (0, 0).
    pub fn at_origin(self) -> Self {
        Self { x: 0, y: 0, ..self }
    }
}

/// A keyboard message delivered to the control's rendering window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMessage {
    pub window: WindowId,
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl KeyMessage {
    /// Build a key message, or `None` for anything that is not a
    /// keyboard-down/up message.
    pub fn from_raw(window: WindowId, message: u32, wparam: usize, lparam: isize) -> Option<Self> {
        matches!(message, WM_KEYDOWN | WM_KEYUP).then_some(Self { window, message, wparam, lparam })
    }

    pub fn is_key_down(&self) -> bool {
        self.message == WM_KEYDOWN
    }

    /// Virtual-key code.
    pub fn virtual_key(&self) -> u32 {
        (self.wparam & 0xFFFF) as u32
    }
}

/// What the subclassed window procedure should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// The owning view's key hook claimed it.
    Handled,
    /// The automation object translated it as an accelerator.
    Accelerated,
    /// Pass to the original window procedure unmodified.
    Forward,
}

impl KeyDisposition {
    /// `true` when the original procedure must not see the message.
    pub fn is_consumed(self) -> bool {
        !matches!(self, Self::Forward)
    }
}

/// One embedded automation object.
///
/// Every method may pump window messages and therefore re-enter the host;
/// callers must not hold borrows of host state across these calls.
pub trait Automation: 'static {
    type Document: Document;
    /// The saved original window procedure of a subclassed window.
    type Proc: Copy + std::fmt::Debug + 'static;

    /// Issue a direct navigation request.
    fn navigate(&self, url: &str) -> Result<()>;

    /// The current document object.
    fn document(&self) -> Result<Self::Document>;

    /// Resize the in-place object (`SetObjectRects`).
    fn set_bounds(&self, bounds: Rect) -> Result<()>;

    /// Forward frame/document window activation so the control's internal
    /// focus matches host-level focus.
    fn activate_for_focus(&self) -> Result<()>;

    /// Offer a key message as an accelerator.  `true` when translated.
    fn translate_accelerator(&self, key: &KeyMessage) -> bool;

    /// Walk the exposed hierarchy for the rendering sub-window.  `Ok(None)`
    /// while it does not exist yet.
    fn find_control_window(&self) -> Result<Option<WindowId>>;

    /// `true` when `window` is the control's own top-level window or one of
    /// its ancestors inside the owning window.
    fn is_control_hierarchy(&self, window: WindowId) -> bool;

    /// Install the host's window procedure on `window`, returning the
    /// original one.
    fn subclass(&self, window: WindowId) -> Result<Self::Proc>;

    /// Put `original` back on `window`.
    fn unsubclass(&self, window: WindowId, original: Self::Proc);

    /// The window that currently owns keyboard focus on this thread.
    fn focused_window(&self) -> Option<WindowId>;

    /// Unadvise the event sink, deactivate and release the client site.
    fn close(&self);
}

/// A live document of the automation object.
pub trait Document: 'static {
    type Script: ScriptEngine;

    /// Load content through the structured-storage "persist from moniker"
    /// path.
    fn load_content(&self, source: ContentSource) -> Result<()>;

    /// Subscribe `sink` to the document's event connection point.
    fn advise(&self, sink: DocumentEventSink) -> Result<()>;

    /// The document's script-engine entry point.
    fn script(&self) -> Result<Self::Script>;
}

/// The script engine of a live document.
pub trait ScriptEngine {
    type Value;

    /// Invoke the engine's `eval` intrinsic with `code`.
    fn eval(&self, code: &str) -> Result<Self::Value>;

    /// Empty / uninitialized result.
    fn is_undefined(value: &Self::Value) -> bool;

    /// Serialize through the engine's own `JSON.stringify`.
    fn stringify(&self, value: &Self::Value) -> Result<String>;
}

/// Convert an engine value to a JSON-compatible string.  An empty result is
/// the literal `undefined`.
pub(crate) fn value_to_json<S: ScriptEngine>(engine: &S, value: &S::Value) -> Result<String> {
    if S::is_undefined(value) {
        return Ok("undefined".to_owned());
    }
    engine.stringify(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_message_only_accepts_key_down_up() {
        assert!(KeyMessage::from_raw(1, WM_KEYDOWN, 0x41, 0).is_some());
        assert!(KeyMessage::from_raw(1, WM_KEYUP, 0x41, 0).is_some());
        assert!(KeyMessage::from_raw(1, 0x0102, 0x41, 0).is_none()); // WM_CHAR
    }

    #[test]
    fn virtual_key_is_low_word() {
        let key = KeyMessage::from_raw(1, WM_KEYDOWN, 0x1_0074, 0).unwrap();
        assert_eq!(key.virtual_key(), 0x74);
        assert!(key.is_key_down());
    }

    #[test]
    fn rect_at_origin_keeps_size() {
        assert_eq!(Rect::new(10, 20, 300, 200).at_origin(), Rect::new(0, 0, 300, 200));
    }

    #[test]
    fn forward_is_the_only_unconsumed_disposition() {
        assert!(KeyDisposition::Handled.is_consumed());
        assert!(KeyDisposition::Accelerated.is_consumed());
        assert!(!KeyDisposition::Forward.is_consumed());
    }
}
