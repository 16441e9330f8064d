// ── IDispatch plumbing, document and script engine ────────────────────────────
//
// `ComDocument` wraps the live document dispatch; `ComScript` wraps the
// document's script dispatch and calls its `eval` and `JSON.stringify`
// members late-bound, exactly as page script would.  The document's own
// members (`Script`) and its event dispinterface are reached the same way,
// so no MSHTML bindings are needed.

use std::{cell::RefCell, ptr, rc::Rc};

use windows::{
    core::{Interface, BSTR, GUID, IUnknown, PCWSTR, VARIANT},
    Win32::{
        Foundation::TRUE,
        System::{
            Com::{
                CreateBindCtx, IDispatch, IMoniker, Urlmon::IPersistMoniker, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPPARAMS, STGM_READ,
            },
            Variant::{VariantChangeType, VAR_CHANGE_FLAGS, VT_UNKNOWN},
        },
    },
};

use tracing::debug;

use super::{
    com_error,
    moniker::HtmlMoniker,
    sinks::{document_sink, Connection},
    wide,
};
use crate::{
    automation::{Document, ScriptEngine},
    content::ContentSource,
    error::{BrowserError, Result},
    events::DocumentEventSink,
};

const LOCALE_USER_DEFAULT: u32 = 0x0400;

/// `DIID_HTMLDocumentEvents2`, the document's outgoing event dispinterface.
pub(crate) const DIID_HTML_DOCUMENT_EVENTS2: GUID = GUID::from_u128(0x3050f613_98b5_11cf_bb82_00aa00bdce0b);

/// Call member `name` on `target`.  `args` are given first-to-last.
pub(crate) fn invoke(target: &IDispatch, name: &str, flags: DISPATCH_FLAGS, args: &[VARIANT]) -> Result<VARIANT> {
    let name_wide = wide(name);
    let names = [PCWSTR(name_wide.as_ptr())];
    let mut dispid = 0i32;
    // SAFETY: `names` holds one NUL-terminated string that outlives the
    // call; `dispid` receives exactly one DISPID.
    unsafe { target.GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE_USER_DEFAULT, &mut dispid) }
        .map_err(|e| BrowserError::EvalFailed(format!("{name} not found: {e}")))?;

    // DISPPARAMS takes arguments last-first.
    let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
    let params = DISPPARAMS {
        rgvarg: if reversed.is_empty() { ptr::null_mut() } else { reversed.as_mut_ptr() },
        rgdispidNamedArgs: ptr::null_mut(),
        cArgs: reversed.len() as u32,
        cNamedArgs: 0,
    };
    let mut result = VARIANT::default();
    // SAFETY: `params` points into `reversed`, which lives until after the
    // call; `result` is an initialised empty VARIANT.
    unsafe {
        target.Invoke(
            dispid,
            &GUID::zeroed(),
            LOCALE_USER_DEFAULT,
            flags,
            &params,
            Some(&mut result as *mut VARIANT),
            None,
            None,
        )
    }
    .map_err(|e| BrowserError::EvalFailed(format!("{name} failed: {e}")))?;
    Ok(result)
}

/// Extract the object reference of a `VT_DISPATCH` (or `VT_UNKNOWN`) value.
pub(crate) fn to_dispatch(value: &VARIANT) -> windows::core::Result<IDispatch> {
    let mut unknown = VARIANT::default();
    // SAFETY: both VARIANTs are initialised; coercion to VT_UNKNOWN only
    // AddRefs the contained object.
    unsafe { VariantChangeType(&mut unknown, value, VAR_CHANGE_FLAGS(0), VT_UNKNOWN) }?;
    IUnknown::try_from(&unknown)?.cast()
}

// ── Document ──────────────────────────────────────────────────────────────────

pub struct ComDocument {
    document: IDispatch,
    /// The one document-event subscription currently armed, shared with the
    /// owning `ComAutomation` so `close` can unadvise it.
    events: Rc<RefCell<Option<Connection>>>,
}

impl ComDocument {
    pub(crate) fn new(document: IDispatch, events: Rc<RefCell<Option<Connection>>>) -> Self {
        Self { document, events }
    }
}

impl Document for ComDocument {
    type Script = ComScript;

    fn load_content(&self, source: ContentSource) -> Result<()> {
        let persist: IPersistMoniker = self.document.cast().map_err(com_error("IPersistMoniker"))?;
        let moniker: IMoniker = HtmlMoniker::new(source).into();
        // SAFETY: CreateBindCtx has no preconditions; reserved must be 0.
        let bind = unsafe { CreateBindCtx(0) }.map_err(com_error("CreateBindCtx"))?;
        // SAFETY: `persist`, `moniker` and `bind` are live COM references
        // held for the duration of the call.
        unsafe { persist.Load(TRUE, &moniker, &bind, STGM_READ.0) }.map_err(com_error("IPersistMoniker::Load"))
    }

    fn advise(&self, sink: DocumentEventSink) -> Result<()> {
        let generation = sink.generation();
        let unknown = document_sink(sink).map_err(com_error("HTMLDocumentEvents2"))?;
        let connection = Connection::connect(&self.document, &DIID_HTML_DOCUMENT_EVENTS2, &unknown)
            .map_err(|_| BrowserError::NoSink("HTMLDocumentEvents2"))?;
        let previous = self.events.borrow_mut().replace(connection);
        if let Some(previous) = previous {
            previous.disconnect();
        }
        debug!(generation, "document events armed");
        Ok(())
    }

    fn script(&self) -> Result<ComScript> {
        let script = invoke(&self.document, "Script", DISPATCH_PROPERTYGET, &[])
            .and_then(|value| to_dispatch(&value).map_err(|e| BrowserError::EvalFailed(e.to_string())))
            .map_err(|_| BrowserError::NoDocument)?;
        Ok(ComScript { script })
    }
}

// ── Script engine ─────────────────────────────────────────────────────────────

pub struct ComScript {
    script: IDispatch,
}

impl ScriptEngine for ComScript {
    type Value = VARIANT;

    fn eval(&self, code: &str) -> Result<VARIANT> {
        invoke(&self.script, "eval", DISPATCH_METHOD, &[VARIANT::from(BSTR::from(code))])
    }

    fn is_undefined(value: &VARIANT) -> bool {
        value.is_empty()
    }

    fn stringify(&self, value: &VARIANT) -> Result<String> {
        let json = invoke(&self.script, "JSON", DISPATCH_PROPERTYGET, &[])?;
        let json = to_dispatch(&json).map_err(|e| BrowserError::EvalFailed(format!("JSON object unavailable: {e}")))?;
        let text = invoke(&json, "stringify", DISPATCH_METHOD, std::slice::from_ref(value))?;
        // Functions and symbols stringify to undefined.
        if text.is_empty() {
            return Ok("undefined".to_owned());
        }
        BSTR::try_from(&text)
            .map(|s| s.to_string())
            .map_err(|e| BrowserError::EvalFailed(format!("stringify returned a non-string: {e}")))
    }
}
