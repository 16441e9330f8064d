// ── COM event sinks ───────────────────────────────────────────────────────────
//
// Two dispinterface sinks: `DWebBrowserEvents2` on the WebBrowser object and
// `HTMLDocumentEvents2` on each document.  `Invoke` decodes the DISPID and
// arguments and hands a typed event to the platform-independent sink, which
// holds only a weak reference to the host.  The document sink is a plain
// `IDispatch` advised under the document-events DIID.
//
// `ExternalDispatch` is the late-bound object page script sees as
// `window.external`.

use windows::{
    core::{implement, Interface, BSTR, GUID, IUnknown, Result as WinResult, PCWSTR, VARIANT},
    Win32::{
        Foundation::{DISP_E_MEMBERNOTFOUND, DISP_E_UNKNOWNNAME, E_NOTIMPL, E_POINTER},
        System::{
            Com::{
                IConnectionPoint, IConnectionPointContainer, IDispatch, IDispatch_Impl, ITypeInfo,
                DISPATCH_FLAGS, DISPPARAMS, EXCEPINFO,
            },
            Variant::VariantCopyInd,
        },
        UI::Shell::{DWebBrowserEvents2, DWebBrowserEvents2_Impl},
    },
};

use tracing::{trace, warn};

use super::dispatch::to_dispatch;
use crate::{
    events::{DocumentEvent, DocumentEventSink, EventSink, TopLevelEvent, TopLevelKind},
    host::ExternalRouter,
};

// ── Connections ───────────────────────────────────────────────────────────────

/// An advised connection point, unadvised explicitly with `disconnect`.
pub(crate) struct Connection {
    point: IConnectionPoint,
    cookie: u32,
}

impl Connection {
    /// Subscribe `sink` to the `iid` connection point of `source`.
    pub(crate) fn connect(source: &impl Interface, iid: &GUID, sink: &IUnknown) -> WinResult<Self> {
        let container: IConnectionPointContainer = source.cast()?;
        // SAFETY: `container` and `sink` are live COM references; `iid`
        // points at a GUID that outlives the call.
        unsafe {
            let point = container.FindConnectionPoint(iid)?;
            let cookie = point.Advise(sink)?;
            Ok(Self { point, cookie })
        }
    }

    pub(crate) fn disconnect(self) {
        // SAFETY: `cookie` was returned by `Advise` on this same point.
        if let Err(e) = unsafe { self.point.Unadvise(self.cookie) } {
            warn!(cookie = self.cookie, error = %e, "Unadvise failed");
        }
    }
}

// ── Argument decoding ─────────────────────────────────────────────────────────

/// Positional argument `index`.  `DISPPARAMS` stores arguments last-first.
fn arg(params: &DISPPARAMS, index: usize) -> Option<VARIANT> {
    let count = params.cArgs as usize;
    if index >= count || params.rgvarg.is_null() {
        return None;
    }
    // SAFETY: the caller of Invoke guarantees `rgvarg` holds `cArgs`
    // initialised VARIANTs for the duration of the call.
    let raw = unsafe { &*params.rgvarg.add(count - 1 - index) };
    let mut value = VARIANT::default();
    // SAFETY: `raw` is a valid VARIANT (possibly VT_BYREF); `value` is an
    // empty VARIANT that receives a dereferenced copy.
    unsafe { VariantCopyInd(&mut value, raw) }.ok()?;
    Some(value)
}

fn string_arg(params: &DISPPARAMS, index: usize) -> String {
    arg(params, index)
        .and_then(|v| BSTR::try_from(&v).ok())
        .map(|b| b.to_string())
        .unwrap_or_default()
}

fn int_arg(params: &DISPPARAMS, index: usize) -> i32 {
    arg(params, index).and_then(|v| i32::try_from(&v).ok()).unwrap_or_default()
}

fn bool_arg(params: &DISPPARAMS, index: usize) -> bool {
    arg(params, index).and_then(|v| bool::try_from(&v).ok()).unwrap_or_default()
}

// ── DWebBrowserEvents2 ────────────────────────────────────────────────────────

#[implement(DWebBrowserEvents2)]
pub(crate) struct BrowserEvents {
    sink: EventSink,
    /// Identity (`IUnknown` pointer) of the top-level browser object; a
    /// `pDisp` argument with any other identity belongs to a sub-frame.
    identity: usize,
}

impl BrowserEvents {
    pub(crate) fn new(sink: EventSink, identity: usize) -> Self {
        Self { sink, identity }
    }

    fn is_top_level(&self, params: &DISPPARAMS) -> bool {
        arg(params, 0)
            .and_then(|v| to_dispatch(&v).ok())
            .and_then(|d| d.cast::<IUnknown>().ok())
            .is_some_and(|unknown| unknown.as_raw() as usize == self.identity)
    }

    fn decode(&self, kind: TopLevelKind, params: &DISPPARAMS) -> TopLevelEvent {
        match kind {
            TopLevelKind::BeforeNavigate => TopLevelEvent::BeforeNavigate {
                url: string_arg(params, 1),
                top_level: self.is_top_level(params),
            },
            TopLevelKind::NavigateComplete => TopLevelEvent::NavigateComplete {
                url: string_arg(params, 1),
                top_level: self.is_top_level(params),
            },
            TopLevelKind::DocumentComplete => TopLevelEvent::DocumentComplete {
                url: string_arg(params, 1),
                top_level: self.is_top_level(params),
            },
            TopLevelKind::ProgressChange => TopLevelEvent::ProgressChange {
                progress: int_arg(params, 0),
                max: int_arg(params, 1),
            },
            TopLevelKind::TitleChange => TopLevelEvent::TitleChange { title: string_arg(params, 0) },
            TopLevelKind::NavigateError => TopLevelEvent::NavigateError {
                url: string_arg(params, 1),
                status: int_arg(params, 3),
                top_level: self.is_top_level(params),
            },
            TopLevelKind::WindowClosing => TopLevelEvent::WindowClosing { is_child: bool_arg(params, 0) },
        }
    }
}

impl DWebBrowserEvents2_Impl for BrowserEvents_Impl {}

impl IDispatch_Impl for BrowserEvents_Impl {
    fn GetTypeInfoCount(&self) -> WinResult<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> WinResult<ITypeInfo> {
        Err(E_NOTIMPL.into())
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        _rgsznames: *const PCWSTR,
        _cnames: u32,
        _lcid: u32,
        _rgdispid: *mut i32,
    ) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        pdispparams: *const DISPPARAMS,
        _pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> WinResult<()> {
        let Some(kind) = TopLevelKind::from_dispid(dispidmember) else {
            return Ok(());
        };
        // SAFETY: the connection point passes a valid DISPPARAMS (or null)
        // that lives for the duration of Invoke.
        let Some(params) = (unsafe { pdispparams.as_ref() }) else {
            trace!(dispid = dispidmember, "event without parameters ignored");
            return Ok(());
        };
        let event = self.decode(kind, params);
        self.sink.dispatch(event);
        Ok(())
    }
}

// ── HTMLDocumentEvents2 ───────────────────────────────────────────────────────

#[implement(IDispatch)]
pub(crate) struct DocumentEvents {
    sink: DocumentEventSink,
}

impl DocumentEvents {
    pub(crate) fn new(sink: DocumentEventSink) -> Self {
        Self { sink }
    }
}

impl IDispatch_Impl for DocumentEvents_Impl {
    fn GetTypeInfoCount(&self) -> WinResult<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> WinResult<ITypeInfo> {
        Err(E_NOTIMPL.into())
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        _rgsznames: *const PCWSTR,
        _cnames: u32,
        _lcid: u32,
        _rgdispid: *mut i32,
    ) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        _pdispparams: *const DISPPARAMS,
        _pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> WinResult<()> {
        self.sink.dispatch(DocumentEvent::from_dispid(dispidmember));
        Ok(())
    }
}

/// `IUnknown` of a freshly created sink, ready for `Connection::connect`.
pub(crate) fn browser_sink(sink: EventSink, identity: usize) -> WinResult<IUnknown> {
    let events: DWebBrowserEvents2 = BrowserEvents::new(sink, identity).into();
    events.cast()
}

pub(crate) fn document_sink(sink: DocumentEventSink) -> WinResult<IUnknown> {
    let events: IDispatch = DocumentEvents::new(sink).into();
    events.cast()
}

// ── window.external ───────────────────────────────────────────────────────────

/// DISPID of `window.external.postMessage`.
const DISPID_POST_MESSAGE: i32 = 1;

#[implement(IDispatch)]
pub(crate) struct ExternalDispatch {
    router: ExternalRouter,
}

impl IDispatch_Impl for ExternalDispatch_Impl {
    fn GetTypeInfoCount(&self) -> WinResult<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> WinResult<ITypeInfo> {
        Err(E_NOTIMPL.into())
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        rgsznames: *const PCWSTR,
        cnames: u32,
        _lcid: u32,
        rgdispid: *mut i32,
    ) -> WinResult<()> {
        if cnames == 0 || rgsznames.is_null() || rgdispid.is_null() {
            return Err(E_POINTER.into());
        }
        // SAFETY: the caller passes `cnames` names and as many DISPID slots;
        // the first name is a NUL-terminated string.
        let name = unsafe { (*rgsznames).to_string() }.unwrap_or_default();
        if !name.eq_ignore_ascii_case("postMessage") {
            // SAFETY: `rgdispid` has at least one writable slot.
            unsafe { rgdispid.write(-1) };
            return Err(DISP_E_UNKNOWNNAME.into());
        }
        // SAFETY: as above.
        unsafe { rgdispid.write(DISPID_POST_MESSAGE) };
        Ok(())
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        pdispparams: *const DISPPARAMS,
        _pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> WinResult<()> {
        if dispidmember != DISPID_POST_MESSAGE {
            return Err(DISP_E_MEMBERNOTFOUND.into());
        }
        // SAFETY: the script engine passes a valid DISPPARAMS (or null) that
        // lives for the duration of Invoke.
        let message = unsafe { pdispparams.as_ref() }.map(|p| string_arg(p, 0)).unwrap_or_default();
        if !self.router.post_message(&message) {
            trace!("page message after teardown dropped");
        }
        Ok(())
    }
}

/// The object handed out from `IDocHostUIHandler::GetExternal`.
pub(crate) fn external_dispatch(router: ExternalRouter) -> IDispatch {
    ExternalDispatch { router }.into()
}
