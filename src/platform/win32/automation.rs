// ── WebBrowser automation object ──────────────────────────────────────────────
//
// Creates the WebBrowser control, connects its event sink, sets the client
// site and in-place activates it inside the parent window.  `ComAutomation`
// then implements the `Automation` seam the host drives.
//
// COM must be initialised for OLE (OleInitialize) on the calling thread, and
// every call here must come from that same thread.

use std::{cell::RefCell, ptr, rc::Rc};

use windows::{
    core::{w, Interface, BSTR, GUID, IUnknown, HRESULT, PCWSTR},
    Win32::{
        Foundation::{HWND, LPARAM, RECT, S_OK, TRUE, WPARAM},
        System::{
            Com::{CoCreateInstance, IServiceProvider, CLSCTX_INPROC_SERVER},
            Ole::{IOleClientSite, IOleInPlaceActiveObject, IOleInPlaceObject, IOleObject, IOleWindow, OLECLOSE_NOSAVE},
        },
        UI::{
            Input::KeyboardAndMouse::GetFocus,
            Shell::{DWebBrowserEvents2, IWebBrowser2},
            WindowsAndMessaging::{FindWindowExW, IsChild, MSG},
        },
    },
};

use tracing::{debug, info, warn};

use super::{
    com_error,
    dispatch::ComDocument,
    emulation, hwnd,
    sinks::{browser_sink, external_dispatch, Connection},
    site::client_site,
    subclass, to_rect, window_id,
};
use crate::{
    automation::{Automation, KeyMessage, Rect, WindowId},
    error::{BrowserError, Result},
    host::{ActivationContext, KeyRouter},
};

/// CLSID of the WebBrowser control.
const CLSID_WEB_BROWSER: GUID = GUID::from_u128(0x8856f961_340a_11d0_a96b_00c04fd705a2);

/// Service id of the shell browser, whose window hosts the document view.
const SID_SSHELL_BROWSER: GUID = GUID::from_u128(0x000214e2_0000_0000_c000_000000000046);

/// `OLEIVERB_INPLACEACTIVATE`.
const INPLACE_ACTIVATE: i32 = -5;

/// Window classes from the shell browser window down to the rendering window.
const CONTROL_WINDOW_PATH: [PCWSTR; 2] = [w!("Shell DocObject View"), w!("Internet Explorer_Server")];

pub struct ComAutomation {
    browser: IWebBrowser2,
    /// Kept alive for the control; released after `Close`.
    _site: IOleClientSite,
    events: RefCell<Option<Connection>>,
    document_events: Rc<RefCell<Option<Connection>>>,
    keys: KeyRouter,
}

/// Activation factory for `AutomationHost::create` / `Browser::new`.
pub fn activate(ctx: ActivationContext) -> Result<ComAutomation> {
    if ctx.config.fix_compat_mode {
        emulation::apply(ctx.config.emulation_version);
    }

    // SAFETY: COM is initialised on this thread (caller contract); the CLSID
    // is a valid constant.
    let browser: IWebBrowser2 = unsafe { CoCreateInstance(&CLSID_WEB_BROWSER, None, CLSCTX_INPROC_SERVER) }
        .map_err(|e| BrowserError::ActivationFailed(format!("CoCreateInstance(WebBrowser): {e}")))?;

    let identity = browser
        .cast::<IUnknown>()
        .map_err(|e| BrowserError::ActivationFailed(e.to_string()))?
        .as_raw() as usize;
    let sink = browser_sink(ctx.sink, identity).map_err(|e| BrowserError::ActivationFailed(e.to_string()))?;
    let events = Connection::connect(&browser, &DWebBrowserEvents2::IID, &sink)
        .map_err(|_| BrowserError::NoSink("DWebBrowserEvents2"))?;

    let site = client_site(ctx.site, external_dispatch(ctx.external));
    let ole: IOleObject = browser.cast().map_err(|e| BrowserError::ActivationFailed(e.to_string()))?;
    let rect = RECT::default();
    // SAFETY: `ole` and `site` are live; `rect` outlives the DoVerb call and
    // `ctx.parent` is the window the caller created on this thread.
    unsafe {
        ole.SetClientSite(&site)
            .map_err(|e| BrowserError::ActivationFailed(format!("SetClientSite: {e}")))?;
        ole.DoVerb(INPLACE_ACTIVATE, ptr::null(), &site, -1, hwnd(ctx.parent), &rect)
            .map_err(|e| BrowserError::ActivationFailed(format!("DoVerb(INPLACEACTIVATE): {e}")))?;
    }
    info!(parent = ctx.parent, "WebBrowser control in-place activated");

    Ok(ComAutomation {
        browser,
        _site: site,
        events: RefCell::new(Some(events)),
        document_events: Rc::new(RefCell::new(None)),
        keys: ctx.keys,
    })
}

impl ComAutomation {
    fn active_object(&self) -> Result<IOleInPlaceActiveObject> {
        self.browser.cast().map_err(com_error("IOleInPlaceActiveObject"))
    }
}

impl Automation for ComAutomation {
    type Document = ComDocument;
    type Proc = isize;

    fn navigate(&self, url: &str) -> Result<()> {
        // SAFETY: `browser` is live; the optional VARIANT arguments are null.
        unsafe {
            self.browser
                .Navigate(&BSTR::from(url), None, None, None, None)
        }
        .map_err(com_error("IWebBrowser2::Navigate"))
    }

    fn document(&self) -> Result<ComDocument> {
        // SAFETY: `browser` is live.
        let document = unsafe { self.browser.Document() }.map_err(|_| BrowserError::NoDocument)?;
        Ok(ComDocument::new(document, Rc::clone(&self.document_events)))
    }

    fn set_bounds(&self, bounds: Rect) -> Result<()> {
        let in_place: IOleInPlaceObject = self.browser.cast().map_err(com_error("IOleInPlaceObject"))?;
        let rect = to_rect(bounds);
        // SAFETY: `rect` outlives the call.
        unsafe { in_place.SetObjectRects(&rect, &rect) }.map_err(com_error("SetObjectRects"))
    }

    fn activate_for_focus(&self) -> Result<()> {
        let active = self.active_object()?;
        // SAFETY: `active` is a live in-place active object.
        unsafe {
            active.OnFrameWindowActivate(TRUE).map_err(com_error("OnFrameWindowActivate"))?;
            active.OnDocWindowActivate(TRUE).map_err(com_error("OnDocWindowActivate"))
        }
    }

    fn translate_accelerator(&self, key: &KeyMessage) -> bool {
        let Ok(active) = self.active_object() else {
            return false;
        };
        let msg = MSG {
            hwnd: hwnd(key.window),
            message: key.message,
            wParam: WPARAM(key.wparam),
            lParam: LPARAM(key.lparam),
            ..Default::default()
        };
        // The wrapper folds S_FALSE ("not translated") into Ok, so read the
        // raw HRESULT.
        // SAFETY: calling through the interface's own vtable with its own
        // `this` pointer; `msg` outlives the call.
        let hr: HRESULT = unsafe { (Interface::vtable(&active).TranslateAccelerator)(Interface::as_raw(&active), &msg) };
        hr == S_OK
    }

    fn find_control_window(&self) -> Result<Option<WindowId>> {
        let provider: IServiceProvider = self.browser.cast().map_err(com_error("IServiceProvider"))?;
        // SAFETY: `provider` is live; the service id is a valid constant.
        let shell: IOleWindow = unsafe { provider.QueryService(&SID_SSHELL_BROWSER) }
            .map_err(com_error("QueryService(SID_SShellBrowser)"))?;
        // SAFETY: `shell` is live.
        let mut window = unsafe { shell.GetWindow() }.map_err(com_error("IOleWindow::GetWindow"))?;
        for class in CONTROL_WINDOW_PATH {
            // SAFETY: `window` is a live window; `class` is a static
            // NUL-terminated string.
            match unsafe { FindWindowExW(window, HWND::default(), class, PCWSTR::null()) } {
                Ok(child) if !child.is_invalid() => window = child,
                _ => return Ok(None),
            }
        }
        Ok(Some(window_id(window)))
    }

    fn is_control_hierarchy(&self, window: WindowId) -> bool {
        let Ok(ole) = self.browser.cast::<IOleWindow>() else {
            return false;
        };
        // SAFETY: `ole` is live.
        let Ok(top) = (unsafe { ole.GetWindow() }) else {
            return false;
        };
        // SAFETY: IsChild tolerates stale handles and simply answers FALSE.
        window_id(top) == window || unsafe { IsChild(hwnd(window), top) }.as_bool()
    }

    fn subclass(&self, window: WindowId) -> Result<isize> {
        subclass::install(hwnd(window), self.keys.clone())
    }

    fn unsubclass(&self, window: WindowId, original: isize) {
        subclass::remove(hwnd(window), original);
    }

    fn focused_window(&self) -> Option<WindowId> {
        // SAFETY: GetFocus has no preconditions.
        let focused = unsafe { GetFocus() };
        (!focused.is_invalid()).then(|| window_id(focused))
    }

    fn close(&self) {
        let connections = [self.document_events.borrow_mut().take(), self.events.borrow_mut().take()];
        for connection in connections.into_iter().flatten() {
            connection.disconnect();
        }
        if let Ok(in_place) = self.browser.cast::<IOleInPlaceObject>() {
            // SAFETY: `in_place` is live.
            if let Err(e) = unsafe { in_place.InPlaceDeactivate() } {
                debug!(error = %e, "InPlaceDeactivate failed");
            }
        }
        if let Ok(ole) = self.browser.cast::<IOleObject>() {
            // SAFETY: `ole` is live; Close releases the client site.
            if let Err(e) = unsafe { ole.Close(OLECLOSE_NOSAVE) } {
                warn!(error = %e, "IOleObject::Close failed");
            }
        }
        debug!("WebBrowser control closed");
    }
}
