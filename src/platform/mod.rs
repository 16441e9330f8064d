// ── Platform layer ────────────────────────────────────────────────────────────
//
// No `unsafe` lives here; all COM and Win32 FFI is confined to the `win32`
// sub-module and never leaks outward.

pub mod win32;
