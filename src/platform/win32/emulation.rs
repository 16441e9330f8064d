// ── Document-mode emulation ───────────────────────────────────────────────────
//
// Without a FEATURE_BROWSER_EMULATION entry for the executable the control
// renders in IE7 compatibility mode.  The entry lives under HKCU, so no
// elevation is needed.

use std::io;

use tracing::{debug, warn};
use winreg::{enums::HKEY_CURRENT_USER, RegKey};

const EMULATION_KEY: &str =
    "Software\\Microsoft\\Internet Explorer\\Main\\FeatureControl\\FEATURE_BROWSER_EMULATION";

/// Register the running executable for document mode `version`
/// (11000 = IE11 edge).
pub fn fix_compat_mode(version: u32) -> io::Result<()> {
    let exe = std::env::current_exe()?;
    let Some(name) = exe.file_name() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "executable path has no file name"));
    };
    let (key, _) = RegKey::predef(HKEY_CURRENT_USER).create_subkey(EMULATION_KEY)?;
    key.set_value(name, &version)?;
    debug!(exe = %name.to_string_lossy(), version, "browser emulation registered");
    Ok(())
}

/// `fix_compat_mode`, logging instead of failing.
pub(crate) fn apply(version: u32) {
    if let Err(e) = fix_compat_mode(version) {
        warn!(version, error = %e, "could not register browser emulation; control may use compatibility mode");
    }
}
