// ── Safety policy ────────────────────────────────────────────────────────────
// The binary itself contains no unsafe code; all FFI lives in the library's
// `platform::win32` module.
#![deny(unsafe_code)]

// Release builds run as a GUI application (no console window).
// Debug builds keep the console so that tracing output is visible.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trident_host::HostConfig;

/// Points at a JSON `HostConfig` file.
const CONFIG_ENV: &str = "TRIDENT_CONFIG";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trident_host=info")))
        .init();

    let config = match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
        Some(path) => HostConfig::load(&path).unwrap_or_else(|e| {
            error!(path = %path.display(), error = %e, "invalid config, using defaults");
            HostConfig::default()
        }),
        None => HostConfig::default(),
    };
    let start_url = std::env::args().nth(1);
    info!(?start_url, "starting");

    #[cfg(windows)]
    if let Err(e) = trident_host::platform::win32::window::run(config, start_url) {
        // Startup failed before or during the message loop.  A modal dialog is
        // the only output a GUI-subsystem build can show.
        error!(error = %e, "demo failed");
        trident_host::platform::win32::window::show_error_dialog(&e.to_string());
        std::process::exit(1);
    }

    #[cfg(not(windows))]
    {
        let _ = (config, start_url);
        error!("the WebBrowser control is only available on Windows");
        std::process::exit(1);
    }
}
