//! Meeting state watcher.
//!
//! Watches a host document for the marker element that identifies an
//! active meeting and reports every change of that boolean to an injected
//! sender. Repeated reports of the same value are suppressed, so bursts of
//! unrelated DOM churn never reach the consumer.
//!
//! The watcher is single-threaded and callback-driven: the document calls
//! back on mutation, the watcher recomputes the signal from scratch and
//! emits only on change.

pub mod document;
pub mod sender;

pub use document::DocumentMarker;
pub use sender::{ChannelSender, FrameSender, JsonLineSender, MessageSender, SendError};

use crate::message::MeetingStateMessage;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;

/// Zero-argument query for the current meeting signal.
///
/// Absence of the marker is a valid `false`, never an error.
pub trait SignalSource {
    fn is_active(&self) -> bool;
}

impl<F: Fn() -> bool> SignalSource for F {
    fn is_active(&self) -> bool {
        self()
    }
}

/// Registration point for "the document changed" callbacks.
///
/// A single callback may stand for many changes delivered together.
pub trait MutationSource {
    type Handle;

    fn subscribe(&self, callback: Box<dyn FnMut()>) -> Self::Handle;
    fn unsubscribe(&self, handle: Self::Handle);
}

struct WatcherCore<S, T> {
    source: S,
    sender: T,
    last_active: Cell<Option<bool>>,
}

impl<S: SignalSource, T: MessageSender> WatcherCore<S, T> {
    fn check_and_emit(&self) -> Result<bool, SendError> {
        let active = self.source.is_active();
        if self.last_active.get() == Some(active) {
            return Ok(false);
        }

        // Recorded before sending: a failed delivery is not re-attempted.
        self.last_active.set(Some(active));
        debug!(active, "Meeting state changed");
        self.sender.send_message(MeetingStateMessage::new(active))?;
        Ok(true)
    }
}

pub struct MeetingStateWatcher<S, M: MutationSource, T> {
    core: Rc<WatcherCore<S, T>>,
    mutations: M,
    subscription: RefCell<Option<M::Handle>>,
}

impl<S, M, T> MeetingStateWatcher<S, M, T>
where
    S: SignalSource + 'static,
    M: MutationSource,
    T: MessageSender + 'static,
{
    pub fn new(source: S, mutations: M, sender: T) -> Self {
        Self {
            core: Rc::new(WatcherCore {
                source,
                sender,
                last_active: Cell::new(None),
            }),
            mutations,
            subscription: RefCell::new(None),
        }
    }

    /// Subscribe to document mutations and report the current state.
    ///
    /// Calling this again never adds a second subscription; it only
    /// re-checks the signal, which emits nothing unless it changed.
    pub fn initialize(&self) -> Result<(), SendError> {
        self.attach();
        self.check_and_emit().map(|_| ())
    }

    /// A new consumer connected: report the current state if it changed.
    pub fn on_external_trigger(&self) -> Result<(), SendError> {
        self.check_and_emit().map(|_| ())
    }

    /// Whether the meeting marker is currently present.
    pub fn compute_signal(&self) -> bool {
        self.core.source.is_active()
    }

    /// Last value handed to the sender, `None` before the first check.
    pub fn last_active(&self) -> Option<bool> {
        self.core.last_active.get()
    }

    fn attach(&self) {
        if self.subscription.borrow().is_some() {
            debug!("Mutation subscription already active");
            return;
        }

        let core = Rc::downgrade(&self.core);
        let handle = self.mutations.subscribe(Box::new(move || {
            if let Some(core) = core.upgrade() {
                // No caller to report to here; delivery failures stay with the sender.
                let _ = core.check_and_emit();
            }
        }));
        *self.subscription.borrow_mut() = Some(handle);
    }

    fn check_and_emit(&self) -> Result<bool, SendError> {
        self.core.check_and_emit()
    }
}

impl<S, M: MutationSource, T> MeetingStateWatcher<S, M, T> {
    pub fn is_attached(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Release the mutation subscription. Returns whether one was active.
    pub fn detach(&self) -> bool {
        let handle = self.subscription.borrow_mut().take();
        match handle {
            Some(handle) => {
                self.mutations.unsubscribe(handle);
                debug!("Mutation subscription released");
                true
            }
            None => false,
        }
    }
}

impl<S, M: MutationSource, T> Drop for MeetingStateWatcher<S, M, T> {
    fn drop(&mut self) {
        self.detach();
    }
}
