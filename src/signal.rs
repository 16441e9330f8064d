// ── Signals ──────────────────────────────────────────────────────────────────
//
// Multi-slot notifications raised to the application layer.

use std::{cell::RefCell, rc::Rc};

type Slot<T> = Rc<dyn Fn(&T)>;

/// A list of callbacks identified by the id `connect` returned.
///
/// `emit` works on a snapshot of the slots, so a slot may connect or
/// disconnect (itself included) while the signal is being emitted.
pub struct Signal<T> {
    slots: RefCell<Vec<(u32, Slot<T>)>>,
    next_id: std::cell::Cell<u32>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: std::cell::Cell::new(1),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, slot: impl Fn(&T) + 'static) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push((id, Rc::new(slot)));
        id
    }

    pub fn disconnect(&self, id: u32) {
        self.slots.borrow_mut().retain(|(slot_id, _)| *slot_id != id);
    }

    pub fn disconnect_all(&self) {
        self.slots.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn emit(&self, args: &T) {
        let snapshot: Vec<Slot<T>> = self.slots.borrow().iter().map(|(_, s)| Rc::clone(s)).collect();
        for slot in snapshot {
            slot(args);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn connect_emit_disconnect() {
        let signal = Signal::<i32>::new();
        let total = Rc::new(Cell::new(0));
        let t = Rc::clone(&total);
        let id = signal.connect(move |v| t.set(t.get() + v));
        signal.emit(&5);
        signal.disconnect(id);
        signal.emit(&5);
        assert_eq!(total.get(), 5);
        assert!(signal.is_empty());
    }

    #[test]
    fn slot_may_disconnect_during_emit() {
        let signal = Rc::new(Signal::<()>::new());
        let hits = Rc::new(Cell::new(0));
        let (s, h) = (Rc::clone(&signal), Rc::clone(&hits));
        signal.connect(move |_| {
            h.set(h.get() + 1);
            s.disconnect_all();
        });
        signal.emit(&());
        signal.emit(&());
        assert_eq!(hits.get(), 1);
    }
}
