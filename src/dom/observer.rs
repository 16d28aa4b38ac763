//! Mutation observation for the in-memory document.
//!
//! Mutations queue records per observer; nothing is delivered until
//! [`Document::deliver_mutations`](super::Document::deliver_mutations) runs,
//! at which point every observer with pending records gets exactly one
//! callback carrying the whole batch.

use super::NodeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Parent for child list changes, the element itself for attributes.
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute_name: Option<String>,
}

impl MutationRecord {
    pub(crate) fn child_added(parent: NodeId, child: NodeId) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target: parent,
            added: vec![child],
            removed: Vec::new(),
            attribute_name: None,
        }
    }

    pub(crate) fn child_removed(parent: NodeId, child: NodeId) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target: parent,
            added: Vec::new(),
            removed: vec![child],
            attribute_name: None,
        }
    }

    pub(crate) fn attribute_changed(target: NodeId, name: &str) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: Some(name.to_string()),
        }
    }
}

/// Which mutations an observer wants to hear about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
}

impl ObserveOptions {
    /// Element additions and removals at any depth below the target.
    pub fn child_list_subtree() -> Self {
        Self {
            child_list: true,
            attributes: false,
            subtree: true,
        }
    }

    pub(crate) fn wants(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => self.attributes,
        }
    }
}

pub type MutationCallback = Box<dyn FnMut(&[MutationRecord])>;

pub(crate) struct Observer {
    pub(crate) id: ObserverId,
    pub(crate) target: NodeId,
    pub(crate) options: ObserveOptions,
    pub(crate) queue: RefCell<Vec<MutationRecord>>,
    pub(crate) callback: RefCell<MutationCallback>,
    pub(crate) disconnected: Cell<bool>,
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: Cell<u64>,
    pub(crate) entries: RefCell<Vec<Rc<Observer>>>,
    pub(crate) delivering: Cell<bool>,
}

impl ObserverRegistry {
    pub(crate) fn register(
        &self,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.entries.borrow_mut().push(Rc::new(Observer {
            id,
            target,
            options,
            queue: RefCell::new(Vec::new()),
            callback: RefCell::new(callback),
            disconnected: Cell::new(false),
        }));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|o| o.id == id) {
            Some(index) => {
                let observer = entries.remove(index);
                observer.disconnected.set(true);
                observer.queue.borrow_mut().clear();
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Drain every observer's queue, keeping only those with records.
    pub(crate) fn take_pending(&self) -> Vec<(Rc<Observer>, Vec<MutationRecord>)> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|observer| {
                let records = std::mem::take(&mut *observer.queue.borrow_mut());
                (!records.is_empty()).then(|| (Rc::clone(observer), records))
            })
            .collect()
    }
}
