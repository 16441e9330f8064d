// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except `platform::win32` (COM and Win32
// FFI).  Each unsafe block there MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

// Embeds the system WebBrowser automation object in an application window.
// The host state machine, content source, event sinks and subclass table are
// platform-independent and talk to the control only through the `automation`
// traits; `platform::win32` implements those traits over COM.

pub mod automation;
pub mod browser;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod host;
pub mod signal;
pub mod site;
pub mod subclass;
pub mod task;

#[cfg(windows)]
pub mod platform;

#[cfg(test)]
mod testing;

pub use browser::{Browser, EvalCallback, WeakBrowser};
pub use config::HostConfig;
pub use error::{BrowserError, Result};
pub use host::{AutomationHost, HostDelegate};
