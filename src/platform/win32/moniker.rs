// ── In-memory HTML moniker ────────────────────────────────────────────────────
//
// `IPersistMoniker::Load` pulls the document through this moniker: the
// control asks for a stream (`BindToStorage`) and for the display name, which
// becomes the document's address and therefore the base for relative URLs.
// Everything a real moniker does beyond that is refused.

use std::cell::RefCell;

use windows::{
    core::{implement, Interface, Result as WinResult, GUID, HRESULT, PCWSTR, PWSTR},
    Win32::{
        Foundation::{BOOL, E_FAIL, E_NOTIMPL, FILETIME, MK_E_NOTBINDABLE, S_FALSE},
        System::Com::{
            CoTaskMemAlloc, IBindCtx, IEnumMoniker, IMoniker, IMoniker_Impl, IPersistStream_Impl, IPersist_Impl,
            IStream,
        },
        UI::Shell::SHCreateMemStream,
    },
};

use tracing::{debug, error};

use crate::content::ContentSource;

#[implement(IMoniker)]
pub(crate) struct HtmlMoniker {
    source: RefCell<ContentSource>,
    /// Bytes drained from `source` on the first bind; later binds reuse them.
    bytes: RefCell<Option<Vec<u8>>>,
    display_name: String,
}

impl HtmlMoniker {
    pub(crate) fn new(source: ContentSource) -> Self {
        let display_name = source.base_url().unwrap_or("about:blank").to_owned();
        Self {
            source: RefCell::new(source),
            bytes: RefCell::new(None),
            display_name,
        }
    }

    fn stream(&self) -> WinResult<IStream> {
        if self.bytes.borrow().is_none() {
            let mut bytes = Vec::new();
            let header = self.source.borrow_mut().drain_into(&mut bytes).map_err(|e| {
                error!(error = %e, "HTML content source failed");
                windows::core::Error::from(E_FAIL)
            })?;
            debug!(mime = header.mime, charset = header.charset, len = bytes.len(), "HTML content streamed");
            *self.bytes.borrow_mut() = Some(bytes);
        }
        let bytes = self.bytes.borrow();
        // SAFETY: the slice is valid for the call; SHCreateMemStream copies it.
        unsafe { SHCreateMemStream(bytes.as_deref()) }.ok_or_else(|| E_FAIL.into())
    }
}

impl IPersist_Impl for HtmlMoniker_Impl {
    fn GetClassID(&self) -> WinResult<GUID> {
        Err(E_NOTIMPL.into())
    }
}

impl IPersistStream_Impl for HtmlMoniker_Impl {
    fn IsDirty(&self) -> HRESULT {
        S_FALSE
    }

    fn Load(&self, _pstm: Option<&IStream>) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn Save(&self, _pstm: Option<&IStream>, _fcleardirty: BOOL) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn GetSizeMax(&self) -> WinResult<u64> {
        Err(E_NOTIMPL.into())
    }
}

impl IMoniker_Impl for HtmlMoniker_Impl {
    fn BindToObject(
        &self,
        _pbc: Option<&IBindCtx>,
        _pmktoleft: Option<&IMoniker>,
        _riidresult: *const GUID,
        _ppvresult: *mut *mut core::ffi::c_void,
    ) -> WinResult<()> {
        Err(MK_E_NOTBINDABLE.into())
    }

    fn BindToStorage(
        &self,
        _pbc: Option<&IBindCtx>,
        _pmktoleft: Option<&IMoniker>,
        riid: *const GUID,
        ppvobj: *mut *mut core::ffi::c_void,
    ) -> WinResult<()> {
        let stream = self.stream()?;
        // SAFETY: `riid` and `ppvobj` come from the control and are valid per
        // the BindToStorage contract; `query` writes an AddRef'd pointer.
        unsafe { stream.query(riid, ppvobj) }.ok()
    }

    fn Reduce(
        &self,
        _pbc: Option<&IBindCtx>,
        _dwreducehowfar: u32,
        _ppmktoleft: *mut Option<IMoniker>,
        _ppmkreduced: *mut Option<IMoniker>,
    ) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn ComposeWith(&self, _pmkright: Option<&IMoniker>, _fonlyifnotgeneric: BOOL) -> WinResult<IMoniker> {
        Err(E_NOTIMPL.into())
    }

    fn Enum(&self, _fforward: BOOL) -> WinResult<IEnumMoniker> {
        Err(E_NOTIMPL.into())
    }

    fn IsEqual(&self, _pmkothermoniker: Option<&IMoniker>) -> HRESULT {
        E_NOTIMPL
    }

    fn Hash(&self) -> WinResult<u32> {
        Err(E_NOTIMPL.into())
    }

    fn IsRunning(
        &self,
        _pbc: Option<&IBindCtx>,
        _pmktoleft: Option<&IMoniker>,
        _pmknewlyrunning: Option<&IMoniker>,
    ) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn GetTimeOfLastChange(&self, _pbc: Option<&IBindCtx>, _pmktoleft: Option<&IMoniker>) -> WinResult<FILETIME> {
        Err(E_NOTIMPL.into())
    }

    fn Inverse(&self) -> WinResult<IMoniker> {
        Err(E_NOTIMPL.into())
    }

    fn CommonPrefixWith(&self, _pmkother: Option<&IMoniker>) -> WinResult<IMoniker> {
        Err(E_NOTIMPL.into())
    }

    fn RelativePathTo(&self, _pmkother: Option<&IMoniker>) -> WinResult<IMoniker> {
        Err(E_NOTIMPL.into())
    }

    fn GetDisplayName(&self, _pbc: Option<&IBindCtx>, _pmktoleft: Option<&IMoniker>) -> WinResult<PWSTR> {
        let name: Vec<u16> = self.display_name.encode_utf16().chain(std::iter::once(0)).collect();
        let size = name.len() * std::mem::size_of::<u16>();
        // SAFETY: the caller frees the returned string with CoTaskMemFree;
        // the allocation is checked for null before `name` is copied in.
        unsafe {
            let buffer = CoTaskMemAlloc(size) as *mut u16;
            if buffer.is_null() {
                return Err(E_FAIL.into());
            }
            std::ptr::copy_nonoverlapping(name.as_ptr(), buffer, name.len());
            Ok(PWSTR(buffer))
        }
    }

    fn ParseDisplayName(
        &self,
        _pbc: Option<&IBindCtx>,
        _pmktoleft: Option<&IMoniker>,
        _pszdisplayname: &PCWSTR,
        _pcheaten: *mut u32,
        _ppmkout: *mut Option<IMoniker>,
    ) -> WinResult<()> {
        Err(E_NOTIMPL.into())
    }

    fn IsSystemMoniker(&self) -> WinResult<u32> {
        // MKSYS_NONE
        Ok(0)
    }
}
