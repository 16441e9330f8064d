// ── Window subclass bookkeeping ───────────────────────────────────────────────
//
// The rendering sub-window of the control is subclassed so the host can see
// keyboard messages before the control does.  This module owns the state
// machine and the per-host table of saved procedures; the actual
// `SetWindowLongPtrW` calls live behind `Automation::subclass`/`unsubclass`.
//
//   Unhooked ──install──▶ Hooked ──restore──▶ Restored
//
// `restore` is idempotent and `Restored` is terminal for a window.

use std::collections::HashMap;

use tracing::debug;

use crate::automation::{KeyDisposition, KeyMessage, WindowId};

/// Lifecycle of one subclassed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubclassState {
    Unhooked,
    Hooked,
    Restored,
}

/// The saved original procedure of a subclassed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubclassRecord<P> {
    pub window: WindowId,
    pub original: P,
    state: SubclassState,
}

impl<P: Copy> SubclassRecord<P> {
    pub fn state(&self) -> SubclassState {
        self.state
    }
}

/// Saved procedures keyed by window identity, owned by a single host.
#[derive(Debug)]
pub struct HookTable<P> {
    records: HashMap<WindowId, SubclassRecord<P>>,
}

impl<P: Copy> Default for HookTable<P> {
    fn default() -> Self {
        Self { records: HashMap::new() }
    }
}

impl<P: Copy> HookTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, window: WindowId) -> SubclassState {
        self.records
            .get(&window)
            .map_or(SubclassState::Unhooked, |r| r.state)
    }

    /// Record that `window` now runs the host's procedure.  Returns `false`
    /// (and records nothing) if the window was ever hooked before.
    pub fn install(&mut self, window: WindowId, original: P) -> bool {
        if self.records.contains_key(&window) {
            return false;
        }
        self.records.insert(
            window,
            SubclassRecord { window, original, state: SubclassState::Hooked },
        );
        debug!(window, "window subclassed");
        true
    }

    /// The procedure to chain to for a hooked window.
    pub fn original(&self, window: WindowId) -> Option<P> {
        self.records
            .get(&window)
            .filter(|r| r.state == SubclassState::Hooked)
            .map(|r| r.original)
    }

    /// Mark `window` restored and return the procedure to put back.  `None`
    /// if it is not currently hooked, so restoring twice is a no-op.
    pub fn restore(&mut self, window: WindowId) -> Option<P> {
        let record = self.records.get_mut(&window)?;
        if record.state != SubclassState::Hooked {
            return None;
        }
        record.state = SubclassState::Restored;
        debug!(window, "window subclass restored");
        Some(record.original)
    }

    /// Restore every hooked window, returning what must be put back.
    pub fn restore_all(&mut self) -> Vec<(WindowId, P)> {
        let hooked: Vec<WindowId> = self
            .records
            .values()
            .filter(|r| r.state == SubclassState::Hooked)
            .map(|r| r.window)
            .collect();
        hooked
            .into_iter()
            .filter_map(|w| self.restore(w).map(|p| (w, p)))
            .collect()
    }
}

/// Decide what happens to a keyboard message on the hooked window.
///
/// The owning view's key hook gets first refusal; if it declines, the
/// automation object may translate it as an accelerator; otherwise the
/// original procedure receives it unmodified.
pub fn route_key_message(
    key: &KeyMessage,
    key_hook: impl FnOnce(&KeyMessage) -> bool,
    translate_accelerator: impl FnOnce(&KeyMessage) -> bool,
) -> KeyDisposition {
    if key_hook(key) {
        return KeyDisposition::Handled;
    }
    if translate_accelerator(key) {
        return KeyDisposition::Accelerated;
    }
    KeyDisposition::Forward
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::automation::WM_KEYDOWN;

    fn key() -> KeyMessage {
        KeyMessage::from_raw(7, WM_KEYDOWN, 0x74, 0).unwrap()
    }

    #[test]
    fn state_machine_runs_unhooked_hooked_restored() {
        let mut table = HookTable::new();
        assert_eq!(table.state(7), SubclassState::Unhooked);
        assert!(table.install(7, 0xAAusize));
        assert_eq!(table.state(7), SubclassState::Hooked);
        assert_eq!(table.original(7), Some(0xAA));
        assert_eq!(table.restore(7), Some(0xAA));
        assert_eq!(table.state(7), SubclassState::Restored);
        assert_eq!(table.original(7), None);
    }

    #[test]
    fn restore_is_idempotent() {
        let mut table = HookTable::new();
        table.install(7, 1usize);
        assert_eq!(table.restore(7), Some(1));
        assert_eq!(table.restore(7), None);
        assert!(table.restore_all().is_empty());
    }

    #[test]
    fn restoring_an_unknown_window_is_a_no_op() {
        let mut table: HookTable<usize> = HookTable::new();
        assert_eq!(table.restore(99), None);
    }

    #[test]
    fn a_restored_window_is_never_rehooked() {
        let mut table = HookTable::new();
        table.install(7, 1usize);
        table.restore(7);
        assert!(!table.install(7, 2));
        assert_eq!(table.state(7), SubclassState::Restored);
    }

    #[test]
    fn handled_key_skips_accelerator() {
        let translated = Cell::new(false);
        let d = route_key_message(&key(), |_| true, |_| {
            translated.set(true);
            true
        });
        assert_eq!(d, KeyDisposition::Handled);
        assert!(!translated.get());
        assert!(d.is_consumed());
    }

    #[test]
    fn unhandled_key_goes_to_accelerator_then_original() {
        assert_eq!(route_key_message(&key(), |_| false, |_| true), KeyDisposition::Accelerated);
        assert_eq!(route_key_message(&key(), |_| false, |_| false), KeyDisposition::Forward);
    }
}
