// ── Event sinks ──────────────────────────────────────────────────────────────
//
// Sinks subscribed to the automation object and its documents.  Both hold
// only a `Weak` back-reference to the host; the host never points back at
// them, so dropping the host ends every subscription without a reference
// cycle.  Handlers may run re-entrantly: the control pumps messages during
// `eval`, so a sink can be invoked from inside another callback.

use std::rc::Weak;

use tracing::trace;

/// Receiver side of the sinks, implemented by the host.
pub(crate) trait EventTarget {
    fn handle_top_level(&self, event: TopLevelEvent);
    fn handle_document_event(&self, generation: u64, event: DocumentEvent);
}

// ── Top-level events ──────────────────────────────────────────────────────────

/// `DWebBrowserEvents2` members the host reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelKind {
    BeforeNavigate,
    NavigateComplete,
    DocumentComplete,
    ProgressChange,
    TitleChange,
    NavigateError,
    WindowClosing,
}

impl TopLevelKind {
    pub fn from_dispid(dispid: i32) -> Option<Self> {
        Some(match dispid {
            250 => Self::BeforeNavigate,
            252 => Self::NavigateComplete,
            259 => Self::DocumentComplete,
            108 => Self::ProgressChange,
            113 => Self::TitleChange,
            271 => Self::NavigateError,
            263 => Self::WindowClosing,
            _ => return None,
        })
    }
}

/// A decoded top-level notification.
///
/// `top_level` is `false` when the event concerns a sub-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopLevelEvent {
    BeforeNavigate { url: String, top_level: bool },
    NavigateComplete { url: String, top_level: bool },
    DocumentComplete { url: String, top_level: bool },
    ProgressChange { progress: i32, max: i32 },
    TitleChange { title: String },
    NavigateError { url: String, status: i32, top_level: bool },
    WindowClosing { is_child: bool },
}

/// Subscription to the automation object's top-level events.
#[derive(Clone)]
pub struct EventSink {
    host: Weak<dyn EventTarget>,
}

impl EventSink {
    pub(crate) fn new(host: Weak<dyn EventTarget>) -> Self {
        Self { host }
    }

    /// Deliver one event.  A no-op once the host is gone.
    pub fn dispatch(&self, event: TopLevelEvent) {
        match self.host.upgrade() {
            Some(host) => host.handle_top_level(event),
            None => trace!(?event, "event after host teardown dropped"),
        }
    }
}

// ── Document events ───────────────────────────────────────────────────────────

/// `HTMLDocumentEvents2` members forwarded to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    Click,
    DblClick,
    KeyDown,
    KeyPress,
    KeyUp,
    MouseDown,
    MouseUp,
    ReadyStateChange,
    ContextMenu,
    SelectionChange,
    FocusIn,
    FocusOut,
    Other(i32),
}

impl DocumentEvent {
    pub fn from_dispid(dispid: i32) -> Self {
        match dispid {
            -600 => Self::Click,
            -601 => Self::DblClick,
            -602 => Self::KeyDown,
            -603 => Self::KeyPress,
            -604 => Self::KeyUp,
            -605 => Self::MouseDown,
            -607 => Self::MouseUp,
            -609 => Self::ReadyStateChange,
            1023 => Self::ContextMenu,
            1037 => Self::SelectionChange,
            1048 => Self::FocusIn,
            1049 => Self::FocusOut,
            other => Self::Other(other),
        }
    }
}

/// Subscription to one document's events.
///
/// Tagged with the generation of the document it was armed for; once a new
/// document replaces that one the host drops everything this sink delivers.
#[derive(Clone)]
pub struct DocumentEventSink {
    host: Weak<dyn EventTarget>,
    generation: u64,
}

impl DocumentEventSink {
    pub(crate) fn new(host: Weak<dyn EventTarget>, generation: u64) -> Self {
        Self { host, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dispatch(&self, event: DocumentEvent) {
        if let Some(host) = self.host.upgrade() {
            host.handle_document_event(self.generation, event);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        top: RefCell<Vec<TopLevelEvent>>,
        doc: RefCell<Vec<(u64, DocumentEvent)>>,
    }

    impl EventTarget for Recorder {
        fn handle_top_level(&self, event: TopLevelEvent) {
            self.top.borrow_mut().push(event);
        }
        fn handle_document_event(&self, generation: u64, event: DocumentEvent) {
            self.doc.borrow_mut().push((generation, event));
        }
    }

    #[test]
    fn known_dispids_map() {
        assert_eq!(TopLevelKind::from_dispid(259), Some(TopLevelKind::DocumentComplete));
        assert_eq!(TopLevelKind::from_dispid(250), Some(TopLevelKind::BeforeNavigate));
        assert_eq!(TopLevelKind::from_dispid(1), None);
        assert_eq!(DocumentEvent::from_dispid(-600), DocumentEvent::Click);
        assert_eq!(DocumentEvent::from_dispid(42), DocumentEvent::Other(42));
    }

    #[test]
    fn sinks_forward_while_host_lives() {
        let rec = Rc::new(Recorder::default());
        let weak: Weak<dyn EventTarget> = Rc::downgrade(&rec) as Weak<dyn EventTarget>;
        EventSink::new(weak.clone()).dispatch(TopLevelEvent::TitleChange { title: "t".into() });
        DocumentEventSink::new(weak, 3).dispatch(DocumentEvent::Click);
        assert_eq!(rec.top.borrow().len(), 1);
        assert_eq!(rec.doc.borrow()[0], (3, DocumentEvent::Click));
    }

    #[test]
    fn sinks_go_quiet_after_host_drop() {
        let rec = Rc::new(Recorder::default());
        let sink = EventSink::new(Rc::downgrade(&rec) as Weak<dyn EventTarget>);
        drop(rec);
        sink.dispatch(TopLevelEvent::WindowClosing { is_child: false });
    }
}
