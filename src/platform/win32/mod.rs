// ── Win32 platform implementation ─────────────────────────────────────────────
//
// The only module in the crate where `unsafe` code is permitted.  Every
// `unsafe` block MUST carry a `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Nothing in this module is `pub` beyond what callers genuinely need; keep the
// unsafe surface as small as possible.

#![allow(unsafe_code)]

use std::ffi::c_void;

use windows::Win32::Foundation::{GetLastError, HWND, RECT};

use crate::{
    automation::{Rect, WindowId},
    error::BrowserError,
};

// ── Sub-modules ───────────────────────────────────────────────────────────────

pub mod automation; // WebBrowser activation and the `Automation` impl
pub mod emulation; // FEATURE_BROWSER_EMULATION registry fix
pub mod window; // demo top-level window and message loop

pub(crate) mod dispatch; // IDispatch invoke helpers, document and script
pub(crate) mod moniker; // in-memory IMoniker for LoadHTML
pub(crate) mod sinks; // DWebBrowserEvents2 / HTMLDocumentEvents2 / window.external
pub(crate) mod site; // IOleClientSite / IOleInPlaceSite / IDocHostUIHandler / IOleInPlaceFrame
pub(crate) mod subclass; // window procedure of the rendering window

// ── Shared helpers ────────────────────────────────────────────────────────────

pub(crate) fn hwnd(window: WindowId) -> HWND {
    HWND(window as *mut c_void)
}

pub(crate) fn window_id(hwnd: HWND) -> WindowId {
    hwnd.0 as WindowId
}

pub(crate) fn to_rect(rect: Rect) -> RECT {
    RECT {
        left: rect.x,
        top: rect.y,
        right: rect.x + rect.width,
        bottom: rect.y + rect.height,
    }
}

/// NUL-terminated UTF-16 copy of `s`.
pub(crate) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Wrap a COM failure with the name of the call that produced it.
pub(crate) fn com_error(function: &'static str) -> impl Fn(windows::core::Error) -> BrowserError {
    move |e| BrowserError::Win32 {
        function,
        code: e.code().0 as u32,
    }
}

/// Capture the current Win32 last-error code.
///
/// Call immediately after the failing function; any later API call may
/// overwrite the thread-local value.
pub(crate) fn last_error(function: &'static str) -> BrowserError {
    // SAFETY: GetLastError reads thread-local state and never fails.
    let code = unsafe { GetLastError() };
    BrowserError::Win32 { function, code: code.0 }
}
