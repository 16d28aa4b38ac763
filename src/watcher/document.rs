//! Binds the watcher to an in-memory [`Document`].

use super::{MutationSource, SignalSource};
use crate::dom::{Document, ObserveOptions, ObserverId, Selector};

/// The meeting marker inside a host document.
///
/// Signal: the marker selector matches an attached element.
/// Mutations: element additions and removals anywhere under `<body>`.
#[derive(Clone)]
pub struct DocumentMarker {
    document: Document,
    selector: Selector,
}

impl DocumentMarker {
    pub fn new(document: Document, selector: Selector) -> Self {
        Self { document, selector }
    }
}

impl SignalSource for DocumentMarker {
    fn is_active(&self) -> bool {
        self.document.query_selector(&self.selector).is_some()
    }
}

impl MutationSource for DocumentMarker {
    type Handle = ObserverId;

    fn subscribe(&self, mut callback: Box<dyn FnMut()>) -> ObserverId {
        self.document.observe(
            self.document.body(),
            ObserveOptions::child_list_subtree(),
            move |_records| callback(),
        )
    }

    fn unsubscribe(&self, handle: ObserverId) {
        self.document.disconnect(handle);
    }
}
