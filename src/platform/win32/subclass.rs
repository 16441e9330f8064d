// ── Rendering-window subclass ─────────────────────────────────────────────────
//
// The control's "Internet Explorer_Server" window gets `hooked_proc` as its
// window procedure.  The procedure finds its host through a window property
// holding a boxed `HookData` (one per hooked window, no global registry),
// offers keyboard messages to the host first and chains everything else to
// the saved original procedure.

use std::ffi::c_void;

use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::{HANDLE, HWND, LPARAM, LRESULT, WPARAM},
        UI::WindowsAndMessaging::{
            CallWindowProcW, DefWindowProcW, GetPropW, GetWindowLongPtrW, RemovePropW, SetPropW,
            SetWindowLongPtrW, GWLP_WNDPROC, WNDPROC,
        },
    },
};

use tracing::debug;

use super::{last_error, window_id};
use crate::{automation::KeyMessage, error::Result, host::KeyRouter};

const HOOK_PROP: PCWSTR = w!("TridentHostHook");

struct HookData {
    router: KeyRouter,
    original: isize,
}

/// Install `hooked_proc` on `window` and return the original procedure.
pub(crate) fn install(window: HWND, router: KeyRouter) -> Result<isize> {
    // SAFETY: `window` is a live window owned by this thread (resolved from
    // the control's hierarchy moments ago).
    let original = unsafe { GetWindowLongPtrW(window, GWLP_WNDPROC) };
    if original == 0 {
        return Err(last_error("GetWindowLongPtrW"));
    }

    let data = Box::into_raw(Box::new(HookData { router, original }));
    // SAFETY: the property owns `data` until `remove` (or the failure path
    // below) reclaims it with Box::from_raw.
    if let Err(e) = unsafe { SetPropW(window, HOOK_PROP, HANDLE(data as *mut c_void)) } {
        // SAFETY: `data` came from Box::into_raw above and was never shared.
        drop(unsafe { Box::from_raw(data) });
        return Err(e.into());
    }

    // SAFETY: `hooked_proc` has the WNDPROC signature and stays valid for the
    // life of the process; the property it reads is already in place.
    unsafe { SetWindowLongPtrW(window, GWLP_WNDPROC, hooked_proc as usize as isize) };
    debug!(window = window_id(window), "control window subclassed");
    Ok(original)
}

/// Put `original` back and free the hook data.
pub(crate) fn remove(window: HWND, original: isize) {
    // SAFETY: `original` is the procedure `install` read from this window.
    // The property, if still present, holds the Box leaked by `install`;
    // `hooked_proc` copies what it needs out of it before routing, so freeing
    // it here cannot invalidate a running call.
    unsafe {
        SetWindowLongPtrW(window, GWLP_WNDPROC, original);
        if let Ok(data) = RemovePropW(window, HOOK_PROP) {
            if !data.is_invalid() {
                drop(Box::from_raw(data.0 as *mut HookData));
            }
        }
    }
    debug!(window = window_id(window), "control window procedure restored");
}

// SAFETY: installed as a WNDPROC by `install`.  Windows guarantees that the
// arguments are valid for the duration of the call.
unsafe extern "system" fn hooked_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let data = GetPropW(hwnd, HOOK_PROP);
    if data.is_invalid() {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }
    let (router, original) = {
        let data = &*(data.0 as *const HookData);
        (data.router.clone(), data.original)
    };

    if let Some(key) = KeyMessage::from_raw(window_id(hwnd), msg, wparam.0, lparam.0) {
        if router.route(&key).is_consumed() {
            // Nonzero marks the key as eaten for callers that inspect it.
            return LRESULT(1);
        }
    }

    // SAFETY: `original` is a valid WNDPROC value read by GetWindowLongPtrW;
    // Option<fn> has the same layout as the raw pointer.
    let original: WNDPROC = std::mem::transmute::<isize, WNDPROC>(original);
    CallWindowProcW(original, hwnd, msg, wparam, lparam)
}
