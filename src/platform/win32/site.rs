// ── OLE client site ───────────────────────────────────────────────────────────
//
// COM face of `HostSite`.  `OleSite` is handed to `SetClientSite` and answers
// the in-place activation queries; `OleFrame` is the frame object returned
// from `GetWindowContext`.  Every answer comes from the `HostSite` policy.
//
// `IDocHostUIHandler` is not part of the generated bindings, so it is
// declared here with its vtable in declaration order.

use std::{ffi::c_void, ptr, rc::Rc};

use windows::{
    core::{implement, interface, IUnknown, IUnknown_Vtbl, Interface, Result as WinResult, GUID, HRESULT, PCWSTR, PWSTR},
    Win32::{
        Foundation::{
            BOOL, E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL, FALSE, HWND, INPLACE_E_NOTOOLSPACE, POINT, RECT, SIZE,
            S_FALSE, S_OK,
        },
        System::Ole::{
            IOleClientSite, IOleClientSite_Impl, IOleContainer, IOleInPlaceActiveObject, IOleInPlaceFrame,
            IOleInPlaceFrame_Impl, IOleInPlaceSite, IOleInPlaceSite_Impl, IOleInPlaceUIWindow,
            IOleInPlaceUIWindow_Impl, IOleWindow_Impl, OLEINPLACEFRAMEINFO, OLEMENUGROUPWIDTHS,
        },
        System::Com::{IDispatch, IMoniker},
        UI::WindowsAndMessaging::{HACCEL, HMENU, MSG},
    },
};

use tracing::trace;

use super::{hwnd, to_rect};
use crate::site::{HostSite, SiteAnswer};

fn answer(answer: SiteAnswer) -> WinResult<()> {
    match answer {
        SiteAnswer::Accept => Ok(()),
        SiteAnswer::Deny => Err(INPLACE_E_NOTOOLSPACE.into()),
        SiteAnswer::NotImplemented => Err(E_NOTIMPL.into()),
    }
}

/// The `HRESULT` form of an answer, for interfaces where `S_FALSE` means
/// "use the control's default".
fn hresult(answer: SiteAnswer) -> HRESULT {
    match answer {
        SiteAnswer::Accept => S_OK,
        SiteAnswer::Deny => S_FALSE,
        SiteAnswer::NotImplemented => E_NOTIMPL,
    }
}

// ── IDocHostUIHandler ─────────────────────────────────────────────────────────

/// `DOCHOSTUIINFO`.
#[repr(C)]
pub(crate) struct DocHostUiInfo {
    size: u32,
    flags: u32,
    double_click: u32,
    host_css: PWSTR,
    host_ns: PWSTR,
}

#[interface("bd3f23c0-d43e-11cf-893b-00aa00bdce1a")]
pub(crate) unsafe trait IDocHostUIHandler: IUnknown {
    unsafe fn ShowContextMenu(&self, id: u32, point: *const POINT, target: *mut c_void, reserved: *mut c_void) -> HRESULT;
    unsafe fn GetHostInfo(&self, info: *mut DocHostUiInfo) -> HRESULT;
    unsafe fn ShowUI(
        &self,
        id: u32,
        active: *mut c_void,
        target: *mut c_void,
        frame: *mut c_void,
        document: *mut c_void,
    ) -> HRESULT;
    unsafe fn HideUI(&self) -> HRESULT;
    unsafe fn UpdateUI(&self) -> HRESULT;
    unsafe fn EnableModeless(&self, enable: BOOL) -> HRESULT;
    unsafe fn OnDocWindowActivate(&self, activate: BOOL) -> HRESULT;
    unsafe fn OnFrameWindowActivate(&self, activate: BOOL) -> HRESULT;
    unsafe fn ResizeBorder(&self, border: *const RECT, window: *mut c_void, frame_window: BOOL) -> HRESULT;
    unsafe fn TranslateAccelerator(&self, msg: *const MSG, group: *const GUID, command: u32) -> HRESULT;
    unsafe fn GetOptionKeyPath(&self, key: *mut PWSTR, reserved: u32) -> HRESULT;
    unsafe fn GetDropTarget(&self, target: *mut c_void, replacement: *mut *mut c_void) -> HRESULT;
    unsafe fn GetExternal(&self, dispatch: *mut *mut c_void) -> HRESULT;
    unsafe fn TranslateUrl(&self, translate: u32, url: PWSTR, translated: *mut PWSTR) -> HRESULT;
    unsafe fn FilterDataObject(&self, object: *mut c_void, replacement: *mut *mut c_void) -> HRESULT;
}

// ── Client / in-place site ────────────────────────────────────────────────────

#[implement(IOleClientSite, IOleInPlaceSite, IDocHostUIHandler)]
pub(crate) struct OleSite {
    site: Rc<HostSite>,
    /// `window.external` for page script.
    external: IDispatch,
}

impl OleSite {
    pub(crate) fn new(site: Rc<HostSite>, external: IDispatch) -> Self {
        Self { site, external }
    }
}

impl IOleClientSite_Impl for OleSite_Impl {
    fn SaveObject(&self) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn GetMoniker(
        &self,
        _dwassign: &windows::Win32::System::Ole::OLEGETMONIKER,
        _dwwhichmoniker: &windows::Win32::System::Ole::OLEWHICHMK,
    ) -> WinResult<IMoniker> {
        answer(self.site.moniker_or_container())?;
        Err(E_NOTIMPL.into())
    }

    fn GetContainer(&self) -> WinResult<IOleContainer> {
        answer(self.site.moniker_or_container())?;
        Err(E_NOINTERFACE.into())
    }

    fn ShowObject(&self) -> WinResult<()> {
        Ok(())
    }

    fn OnShowWindow(&self, _fshow: BOOL) -> WinResult<()> {
        Ok(())
    }

    fn RequestNewObjectLayout(&self) -> WinResult<()> {
        answer(self.site.frame_ui())
    }
}

impl IOleWindow_Impl for OleSite_Impl {
    fn GetWindow(&self) -> WinResult<HWND> {
        Ok(hwnd(self.site.window()))
    }

    fn ContextSensitiveHelp(&self, _fentermode: BOOL) -> WinResult<()> {
        answer(self.site.frame_ui())
    }
}

impl IOleInPlaceSite_Impl for OleSite_Impl {
    fn CanInPlaceActivate(&self) -> WinResult<()> {
        answer(self.site.can_in_place_activate())
    }

    fn OnInPlaceActivate(&self) -> WinResult<()> {
        trace!("in-place activated");
        Ok(())
    }

    fn OnUIActivate(&self) -> WinResult<()> {
        answer(self.site.can_ui_activate())
    }

    fn GetWindowContext(
        &self,
        ppframe: *mut Option<IOleInPlaceFrame>,
        ppdoc: *mut Option<IOleInPlaceUIWindow>,
        lprcposrect: *mut RECT,
        lprccliprect: *mut RECT,
        lpframeinfo: *mut OLEINPLACEFRAMEINFO,
    ) -> WinResult<()> {
        let (position, clip) = self.site.window_context();
        let frame: IOleInPlaceFrame = OleFrame::new(Rc::clone(&self.site)).into();
        // SAFETY: the control passes valid, writable out-pointers for every
        // argument.  The interface slots are uninitialised, so they are
        // written without dropping the previous contents.
        unsafe {
            ppframe.write(Some(frame));
            ppdoc.write(None);
            lprcposrect.write(to_rect(position));
            lprccliprect.write(to_rect(clip));
            if let Some(info) = lpframeinfo.as_mut() {
                info.fMDIApp = FALSE;
                info.hwndFrame = hwnd(self.site.window());
                info.haccel = HACCEL::default();
                info.cAccelEntries = 0;
            }
        }
        Ok(())
    }

    fn Scroll(&self, _scrollextant: &SIZE) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn OnUIDeactivate(&self, _fundoable: BOOL) -> WinResult<()> {
        Ok(())
    }

    fn OnInPlaceDeactivate(&self) -> WinResult<()> {
        trace!("in-place deactivated");
        Ok(())
    }

    fn DiscardUndoState(&self) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn DeactivateAndUndo(&self) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn OnPosRectChange(&self, _lprcposrect: *const RECT) -> WinResult<()> {
        Ok(())
    }
}

// Every out-pointer below is supplied by the control and valid for writes
// for the duration of the call; null ones are skipped.
impl IDocHostUIHandler_Impl for OleSite_Impl {
    unsafe fn ShowContextMenu(&self, id: u32, _point: *const POINT, _target: *mut c_void, _reserved: *mut c_void) -> HRESULT {
        trace!(id, "context menu suppressed");
        hresult(self.site.show_context_menu())
    }

    unsafe fn GetHostInfo(&self, info: *mut DocHostUiInfo) -> HRESULT {
        // SAFETY: see the impl comment.
        let Some(info) = (unsafe { info.as_mut() }) else {
            return E_INVALIDARG;
        };
        info.size = std::mem::size_of::<DocHostUiInfo>() as u32;
        info.flags = self.site.host_ui_flags();
        info.double_click = 0;
        info.host_css = PWSTR::null();
        info.host_ns = PWSTR::null();
        S_OK
    }

    unsafe fn ShowUI(
        &self,
        _id: u32,
        _active: *mut c_void,
        _target: *mut c_void,
        _frame: *mut c_void,
        _document: *mut c_void,
    ) -> HRESULT {
        hresult(self.site.show_ui())
    }

    unsafe fn HideUI(&self) -> HRESULT {
        S_OK
    }

    unsafe fn UpdateUI(&self) -> HRESULT {
        S_OK
    }

    unsafe fn EnableModeless(&self, _enable: BOOL) -> HRESULT {
        S_OK
    }

    unsafe fn OnDocWindowActivate(&self, _activate: BOOL) -> HRESULT {
        S_OK
    }

    unsafe fn OnFrameWindowActivate(&self, _activate: BOOL) -> HRESULT {
        S_OK
    }

    unsafe fn ResizeBorder(&self, _border: *const RECT, _window: *mut c_void, _frame_window: BOOL) -> HRESULT {
        hresult(self.site.frame_ui())
    }

    unsafe fn TranslateAccelerator(&self, _msg: *const MSG, _group: *const GUID, _command: u32) -> HRESULT {
        hresult(self.site.document_ui_override())
    }

    unsafe fn GetOptionKeyPath(&self, key: *mut PWSTR, _reserved: u32) -> HRESULT {
        if !key.is_null() {
            // SAFETY: see the impl comment.
            unsafe { key.write(PWSTR::null()) };
        }
        hresult(self.site.frame_ui())
    }

    unsafe fn GetDropTarget(&self, _target: *mut c_void, replacement: *mut *mut c_void) -> HRESULT {
        if !replacement.is_null() {
            // SAFETY: see the impl comment.
            unsafe { replacement.write(ptr::null_mut()) };
        }
        hresult(self.site.document_ui_override())
    }

    unsafe fn GetExternal(&self, dispatch: *mut *mut c_void) -> HRESULT {
        if dispatch.is_null() {
            return E_INVALIDARG;
        }
        // SAFETY: see the impl comment.  The caller owns the added reference.
        unsafe { dispatch.write(self.external.clone().into_raw()) };
        S_OK
    }

    unsafe fn TranslateUrl(&self, _translate: u32, _url: PWSTR, translated: *mut PWSTR) -> HRESULT {
        if !translated.is_null() {
            // SAFETY: see the impl comment.
            unsafe { translated.write(PWSTR::null()) };
        }
        hresult(self.site.document_ui_override())
    }

    unsafe fn FilterDataObject(&self, _object: *mut c_void, replacement: *mut *mut c_void) -> HRESULT {
        if !replacement.is_null() {
            // SAFETY: see the impl comment.
            unsafe { replacement.write(ptr::null_mut()) };
        }
        hresult(self.site.document_ui_override())
    }
}

// ── In-place frame ────────────────────────────────────────────────────────────

#[implement(IOleInPlaceFrame)]
pub(crate) struct OleFrame {
    site: Rc<HostSite>,
}

impl OleFrame {
    fn new(site: Rc<HostSite>) -> Self {
        Self { site }
    }
}

impl IOleWindow_Impl for OleFrame_Impl {
    fn GetWindow(&self) -> WinResult<HWND> {
        Ok(hwnd(self.site.window()))
    }

    fn ContextSensitiveHelp(&self, _fentermode: BOOL) -> WinResult<()> {
        answer(self.site.frame_ui())
    }
}

impl IOleInPlaceUIWindow_Impl for OleFrame_Impl {
    fn GetBorder(&self) -> WinResult<RECT> {
        answer(self.site.request_border_space())?;
        Err(INPLACE_E_NOTOOLSPACE.into())
    }

    fn RequestBorderSpace(&self, _pborderwidths: *const RECT) -> WinResult<()> {
        answer(self.site.request_border_space())
    }

    fn SetBorderSpace(&self, _pborderwidths: *const RECT) -> WinResult<()> {
        answer(self.site.request_border_space())
    }

    fn SetActiveObject(&self, _pactiveobject: Option<&IOleInPlaceActiveObject>, _pszobjname: &PCWSTR) -> WinResult<()> {
        Ok(())
    }
}

impl IOleInPlaceFrame_Impl for OleFrame_Impl {
    fn InsertMenus(&self, _hmenushared: HMENU, _lpmenuwidths: *mut OLEMENUGROUPWIDTHS) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn SetMenu(&self, _hmenushared: HMENU, _holemenu: isize, _hwndactiveobject: HWND) -> WinResult<()> {
        Ok(())
    }

    fn RemoveMenus(&self, _hmenushared: HMENU) -> WinResult<()> {
        answer(self.site.frame_ui())
    }

    fn SetStatusText(&self, _pszstatustext: &PCWSTR) -> WinResult<()> {
        Ok(())
    }

    fn EnableModeless(&self, _fenable: BOOL) -> WinResult<()> {
        Ok(())
    }

    fn TranslateAccelerator(&self, _lpmsg: *const MSG, _wid: u16) -> WinResult<()> {
        // Failure tells the control the key was not translated here.
        answer(self.site.frame_ui())
    }
}

/// `IOleClientSite` for `SetClientSite` / `DoVerb`.  The control finds the
/// UI handler by querying the same object.
pub(crate) fn client_site(site: Rc<HostSite>, external: IDispatch) -> IOleClientSite {
    OleSite::new(site, external).into()
}

