// ── Client / host site policy ─────────────────────────────────────────────────
//
// Answers the automation object's environment queries during in-place
// activation.  All answers are fixed policy; the only state is the parent
// window and the current bounds, which the host keeps up to date on resize.

use std::cell::Cell;

use crate::automation::{Rect, WindowId};

/// Outcome of a negotiation the control starts with the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAnswer {
    /// `S_OK`.
    Accept,
    /// Refused; the control must carry on without it.
    Deny,
    /// `E_NOTIMPL`: the site does not offer this at all.
    NotImplemented,
}

/// The hosting side of the activation contract.
#[derive(Debug)]
pub struct HostSite {
    parent: WindowId,
    bounds: Cell<Rect>,
}

impl HostSite {
    pub fn new(parent: WindowId) -> Self {
        Self {
            parent,
            bounds: Cell::new(Rect::default()),
        }
    }

    /// Window the control renders into.
    pub fn window(&self) -> WindowId {
        self.parent
    }

    pub fn set_bounds(&self, bounds: Rect) {
        self.bounds.set(bounds.at_origin());
    }

    /// `(position, clip)` rects for `GetWindowContext`.
    pub fn window_context(&self) -> (Rect, Rect) {
        let rc = self.bounds.get();
        (rc, rc)
    }

    pub fn can_in_place_activate(&self) -> SiteAnswer {
        SiteAnswer::Accept
    }

    pub fn can_ui_activate(&self) -> SiteAnswer {
        SiteAnswer::Accept
    }

    /// Toolbars and border space: the host's window chrome is the whole
    /// region, so the control never gets its own.
    pub fn request_border_space(&self) -> SiteAnswer {
        SiteAnswer::Deny
    }

    /// Shared menus, status text and context help are not offered.
    pub fn frame_ui(&self) -> SiteAnswer {
        SiteAnswer::NotImplemented
    }

    /// The site exposes neither a moniker nor a container.
    pub fn moniker_or_container(&self) -> SiteAnswer {
        SiteAnswer::NotImplemented
    }

    // ── Document host UI ──────────────────────────────────────────────────────

    /// `DOCHOSTUIINFO::dwFlags`: no 3D borders, themed controls, DPI aware.
    pub fn host_ui_flags(&self) -> u32 {
        UI_NO_3D_BORDER | UI_NO_3D_OUTER_BORDER | UI_THEME | UI_DPI_AWARE
    }

    /// `ShowUI`: accepting tells the control the host shows its own UI, so
    /// it must not merge menus or toolbars.
    pub fn show_ui(&self) -> SiteAnswer {
        SiteAnswer::Accept
    }

    /// The default context menu is suppressed.
    pub fn show_context_menu(&self) -> SiteAnswer {
        SiteAnswer::Accept
    }

    /// Host-level accelerators, URL translation, drop targets and data
    /// object filtering are left to the control.
    pub fn document_ui_override(&self) -> SiteAnswer {
        SiteAnswer::Deny
    }
}

/// `DOCHOSTUIFLAG_NO3DBORDER`.
pub const UI_NO_3D_BORDER: u32 = 0x0000_0004;
/// `DOCHOSTUIFLAG_THEME`.
pub const UI_THEME: u32 = 0x0004_0000;
/// `DOCHOSTUIFLAG_NO3DOUTERBORDER`.
pub const UI_NO_3D_OUTER_BORDER: u32 = 0x0020_0000;
/// `DOCHOSTUIFLAG_DPI_AWARE`.
pub const UI_DPI_AWARE: u32 = 0x4000_0000;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_is_always_denied() {
        let site = HostSite::new(5);
        assert_eq!(site.request_border_space(), SiteAnswer::Deny);
        assert_eq!(site.can_in_place_activate(), SiteAnswer::Accept);
        assert_eq!(site.moniker_or_container(), SiteAnswer::NotImplemented);
    }

    #[test]
    fn document_host_hides_borders_and_default_menus() {
        let site = HostSite::new(5);
        let flags = site.host_ui_flags();
        assert_ne!(flags & UI_NO_3D_BORDER, 0);
        assert_ne!(flags & UI_NO_3D_OUTER_BORDER, 0);
        assert_eq!(site.show_ui(), SiteAnswer::Accept);
        assert_eq!(site.show_context_menu(), SiteAnswer::Accept);
        assert_eq!(site.document_ui_override(), SiteAnswer::Deny);
    }

    #[test]
    fn window_context_tracks_bounds_at_origin() {
        let site = HostSite::new(5);
        site.set_bounds(Rect::new(40, 30, 800, 600));
        let (pos, clip) = site.window_context();
        assert_eq!(pos, Rect::new(0, 0, 800, 600));
        assert_eq!(pos, clip);
        assert_eq!(site.window(), 5);
    }
}
