// ── Central error type ────────────────────────────────────────────────────────
//
// All fallible operations in the host return `error::Result<T>`.  Activation
// failures are logged and absorbed by `AutomationHost` (the view stays inert);
// per-call failures (`eval`, HTML delivery) are returned to the caller.  Nothing
// here is ever thrown across the automation boundary.

/// Every error that the browser host can produce.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// Creating or in-place-activating the automation object failed.  The
    /// host stays inert afterwards.
    #[error("automation object activation failed: {0}")]
    ActivationFailed(String),

    /// An operation that needs a live document ran before one existed.
    #[error("no document is loaded")]
    NoDocument,

    /// A step of the script-evaluation call chain failed.
    #[error("script evaluation failed: {0}")]
    EvalFailed(String),

    /// An expected connection point was missing on the automation object.
    #[error("connection point {0} is not available")]
    NoSink(&'static str),

    /// A Win32 / COM call returned a failure code.
    #[error("{function} failed (error {code:#010x})")]
    Win32 {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw Win32 error code (`GetLastError()` value) or HRESULT.
        code: u32,
    },

    /// The host configuration could not be parsed.
    #[error("invalid host configuration: {0}")]
    Config(#[from] serde_json::Error),
}

// Convert a windows-crate error (HRESULT) directly into a BrowserError so that
// `?` can be used on `windows::core::Result<T>` throughout the platform module.
#[cfg(windows)]
impl From<windows::core::Error> for BrowserError {
    fn from(e: windows::core::Error) -> Self {
        // HRESULT.0 is i32; reinterpret bits as u32 for display purposes.
        Self::Win32 {
            function: "windows",
            code: e.code().0 as u32,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BrowserError>;

// ── Tests ─────────────────────────────────────────────────────────────────────
