//! In-memory host document.
//!
//! A `scraper` HTML tree with the pieces the meeting watcher relies on:
//! selector queries over attached elements and batched mutation observers.
//! The document is single-threaded; `Document` is a cheap `Rc` handle and
//! clones share the same tree.
//!
//! Element handles ([`NodeId`]) are slots mapped onto nodes of the tree.
//! Slots of removed elements are reused, and the tree is rebuilt without
//! its detached nodes once enough of them pile up.

pub mod observer;
pub mod selector;

pub use observer::{
    MutationCallback, MutationKind, MutationRecord, ObserveOptions, ObserverId,
};
pub use selector::{Selector, SelectorError};

use ego_tree::NodeId as TreeId;
use observer::ObserverRegistry;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Detached tree nodes tolerated before the tree is rebuilt.
const COMPACT_AFTER: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeId),
    #[error("the document root cannot be moved or removed")]
    RootNode,
    #[error("cannot append {child:?} inside its own descendant {parent:?}")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("invalid tag or attribute name {0:?}")]
    InvalidName(String),
    #[error("<{0}> cannot be created as a standalone element")]
    InvalidElement(String),
}

struct Tree {
    html: Html,
    slots: Vec<Option<TreeId>>,
    free: Vec<usize>,
    handles: HashMap<TreeId, NodeId>,
    root: NodeId,
    body: NodeId,
    /// Nodes held by the arena, attached or not.
    allocated: usize,
    /// Removed nodes still held by the arena.
    garbage: usize,
}

impl Tree {
    fn new() -> Self {
        let mut html = Html::parse_document("<html><head></head><body></body></html>");
        let root_id = html.root_element().id();
        let named = |html: &Html, name: &str| {
            html.root_element()
                .children()
                .find(|child| child.value().as_element().is_some_and(|e| e.name() == name))
                .map(|child| child.id())
        };
        // The parser always creates <body>.
        let body_id = named(&html, "body").unwrap_or(root_id);
        let head_id = named(&html, "head");
        let allocated = html.tree.root().descendants().count();

        let mut garbage = 0;
        if let Some(mut head) = head_id.and_then(|id| html.tree.get_mut(id)) {
            head.detach();
            garbage += 1;
        }

        let mut tree = Self {
            html,
            slots: Vec::new(),
            free: Vec::new(),
            handles: HashMap::new(),
            root: NodeId(0),
            body: NodeId(0),
            allocated,
            garbage,
        };
        tree.root = tree.alloc(root_id);
        tree.body = tree.alloc(body_id);
        tree
    }

    fn alloc(&mut self, tree_id: TreeId) -> NodeId {
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(tree_id);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(tree_id));
                NodeId(self.slots.len() - 1)
            }
        };
        self.handles.insert(tree_id, id);
        id
    }

    fn resolve(&self, id: NodeId) -> Result<TreeId, DomError> {
        self.slots
            .get(id.0)
            .copied()
            .flatten()
            .ok_or(DomError::UnknownNode(id))
    }

    fn handle(&self, tree_id: TreeId) -> Option<NodeId> {
        self.handles.get(&tree_id).copied()
    }

    fn element(&self, tree_id: TreeId) -> Option<&Element> {
        self.html
            .tree
            .get(tree_id)
            .and_then(|node| node.value().as_element())
    }

    fn attributes(&self, tree_id: TreeId) -> Vec<(String, String)> {
        self.element(tree_id)
            .map(|e| {
                e.attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parent(&self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        let tree_id = self.resolve(id)?;
        Ok(self
            .html
            .tree
            .get(tree_id)
            .and_then(|node| node.parent())
            .and_then(|parent| self.handle(parent.id())))
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let (Ok(ancestor), Ok(node)) = (self.resolve(ancestor), self.resolve(node)) else {
            return false;
        };
        match self.html.tree.get(node) {
            Some(node) => node.id() == ancestor || node.ancestors().any(|a| a.id() == ancestor),
            None => false,
        }
    }

    fn create(&mut self, tag: &str, attributes: &[(String, String)]) -> Result<NodeId, DomError> {
        let node = element_node(&tag.to_ascii_lowercase(), attributes)?;
        let tree_id = self.html.tree.orphan(node).id();
        self.allocated += 1;
        Ok(self.alloc(tree_id))
    }

    /// Swap an element's attributes. The tree node and its handle stay put.
    fn replace_attributes(
        &mut self,
        tree_id: TreeId,
        attributes: &[(String, String)],
    ) -> Result<(), DomError> {
        let tag = match self.element(tree_id) {
            Some(element) => element.name().to_string(),
            None => return Ok(()),
        };
        let node = element_node(&tag, attributes)?;
        if let Some(mut target) = self.html.tree.get_mut(tree_id) {
            *target.value() = node;
        }
        Ok(())
    }

    fn detach_subtree(&mut self, tree_id: TreeId) {
        let subtree: Vec<TreeId> = match self.html.tree.get(tree_id) {
            Some(node) => node.descendants().map(|d| d.id()).collect(),
            None => return,
        };
        if let Some(mut node) = self.html.tree.get_mut(tree_id) {
            node.detach();
        }

        for id in &subtree {
            if let Some(handle) = self.handles.remove(id) {
                self.slots[handle.0] = None;
                self.free.push(handle.0);
            }
        }
        self.garbage += subtree.len();
        if self.garbage >= COMPACT_AFTER {
            self.compact();
        }
    }

    /// Rebuild the arena from the attached tree plus elements created but
    /// not yet appended, then point every live handle at its copy.
    fn compact(&mut self) {
        let source = &self.html.tree;
        let mut fresh = ego_tree::Tree::new(source.root().value().clone());
        let mut moved = HashMap::new();
        moved.insert(source.root().id(), fresh.root().id());
        let fresh_root = fresh.root().id();
        copy_children(source, source.root().id(), &mut fresh, fresh_root, &mut moved);

        for &tree_id in self.slots.iter().flatten() {
            if moved.contains_key(&tree_id) {
                continue;
            }
            let Some(node) = source.get(tree_id) else {
                continue;
            };
            if node.parent().is_some() {
                continue;
            }
            let copy = fresh.orphan(node.value().clone()).id();
            moved.insert(tree_id, copy);
            copy_children(source, tree_id, &mut fresh, copy, &mut moved);
        }

        for slot in self.slots.iter_mut().flatten() {
            if let Some(copy) = moved.get(slot) {
                *slot = *copy;
            }
        }
        self.handles = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|tree_id| (tree_id, NodeId(index))))
            .collect();
        self.allocated = moved.len();
        self.garbage = 0;
        self.html.tree = fresh;
    }

    fn find(&self, selector: &Selector) -> Option<NodeId> {
        // Document order, attached elements only.
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| selector.matches(element))
            .find_map(|element| self.handle(element.id()))
    }
}

fn copy_children(
    source: &ego_tree::Tree<Node>,
    from: TreeId,
    target: &mut ego_tree::Tree<Node>,
    to: TreeId,
    moved: &mut HashMap<TreeId, TreeId>,
) {
    let Some(node) = source.get(from) else {
        return;
    };
    for child in node.children() {
        let copy = match target.get_mut(to) {
            Some(mut parent) => parent.append(child.value().clone()).id(),
            None => return,
        };
        moved.insert(child.id(), copy);
        copy_children(source, child.id(), target, copy, moved);
    }
}

/// Build a standalone element node by letting the HTML parser create it.
fn element_node(tag: &str, attributes: &[(String, String)]) -> Result<Node, DomError> {
    if !is_valid_name(tag) {
        return Err(DomError::InvalidName(tag.to_string()));
    }

    let mut markup = format!("<{}", tag);
    for (name, value) in attributes {
        if !is_valid_name(name) {
            return Err(DomError::InvalidName(name.clone()));
        }
        markup.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
    }
    markup.push('>');

    let parsed = Html::parse_document(&markup);
    let node = parsed
        .tree
        .root()
        .descendants()
        .find(|node| node.value().as_element().is_some_and(|e| e.name() == tag))
        .map(|node| node.value().clone());
    node.ok_or_else(|| DomError::InvalidElement(tag.to_string()))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<Tree>>,
    observers: Rc<ObserverRegistry>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty `<html><body></body></html>` document.
    pub fn new() -> Self {
        Self {
            tree: Rc::new(RefCell::new(Tree::new())),
            observers: Rc::new(ObserverRegistry::default()),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.borrow().root
    }

    pub fn body(&self) -> NodeId {
        self.tree.borrow().body
    }

    /// Create a detached element. It becomes visible to queries once appended.
    pub fn create_element(&self, tag: &str) -> Result<NodeId, DomError> {
        self.tree.borrow_mut().create(tag, &[])
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        {
            let mut tree = self.tree.borrow_mut();
            let parent_id = tree.resolve(parent)?;
            if child == tree.root {
                return Err(DomError::RootNode);
            }
            let child_id = tree.resolve(child)?;
            if tree.parent(child)?.is_some() {
                return Err(DomError::AlreadyAttached(child));
            }
            if tree.is_inclusive_ancestor(child, parent) {
                return Err(DomError::Cycle { parent, child });
            }
            if let Some(mut node) = tree.html.tree.get_mut(parent_id) {
                node.append_id(child_id);
            }
        }

        self.queue_record(MutationRecord::child_added(parent, child));
        Ok(())
    }

    /// Create an element with attributes and append it in one step.
    pub fn append_element(
        &self,
        parent: NodeId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let attributes: Vec<(String, String)> = attributes
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        let child = {
            let mut tree = self.tree.borrow_mut();
            tree.resolve(parent)?;
            tree.create(tag, &attributes)?
        };
        self.append_child(parent, child)?;
        Ok(child)
    }

    /// Remove a node and its whole subtree. Their ids become invalid and may
    /// be handed out again by later appends.
    pub fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let (tree_id, parent) = {
            let tree = self.tree.borrow();
            if node == tree.root {
                return Err(DomError::RootNode);
            }
            (tree.resolve(node)?, tree.parent(node)?)
        };

        // Queue while the node is still linked so subtree observers match.
        if let Some(parent) = parent {
            self.queue_record(MutationRecord::child_removed(parent, node));
        }

        self.tree.borrow_mut().detach_subtree(tree_id);
        Ok(())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        {
            let mut tree = self.tree.borrow_mut();
            let tree_id = tree.resolve(node)?;
            let mut attributes = tree.attributes(tree_id);
            match attributes.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attributes.push((name.clone(), value.to_string())),
            }
            tree.replace_attributes(tree_id, &attributes)?;
        }
        self.queue_record(MutationRecord::attribute_changed(node, &name));
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        let removed = {
            let mut tree = self.tree.borrow_mut();
            let tree_id = tree.resolve(node)?;
            let mut attributes = tree.attributes(tree_id);
            let before = attributes.len();
            attributes.retain(|(existing, _)| *existing != name);
            let removed = attributes.len() != before;
            if removed {
                tree.replace_attributes(tree_id, &attributes)?;
            }
            removed
        };
        if removed {
            self.queue_record(MutationRecord::attribute_changed(node, &name));
        }
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let tree = self.tree.borrow();
        let value = tree
            .resolve(node)
            .ok()
            .and_then(|tree_id| tree.element(tree_id))
            .and_then(|e| e.attr(&name.to_ascii_lowercase()))
            .map(str::to_string);
        value
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError> {
        let tree = self.tree.borrow();
        let tree_id = tree.resolve(node)?;
        let children = match tree.html.tree.get(tree_id) {
            Some(node) => node
                .children()
                .filter_map(|child| tree.handle(child.id()))
                .collect(),
            None => Vec::new(),
        };
        Ok(children)
    }

    /// Whether the node is attached to the document.
    pub fn contains(&self, node: NodeId) -> bool {
        let tree = self.tree.borrow();
        tree.is_inclusive_ancestor(tree.root, node)
    }

    /// First attached element matching the selector, in document order.
    pub fn query_selector(&self, selector: &Selector) -> Option<NodeId> {
        self.tree.borrow().find(selector)
    }

    #[cfg(test)]
    fn allocated_nodes(&self) -> usize {
        self.tree.borrow().allocated
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.tree.borrow().slots.len()
    }

    pub fn observe<F>(&self, target: NodeId, options: ObserveOptions, callback: F) -> ObserverId
    where
        F: FnMut(&[MutationRecord]) + 'static,
    {
        self.observers.register(target, options, Box::new(callback))
    }

    /// Stop an observer. Queued records for it are discarded.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver queued mutation records, one callback per observer.
    ///
    /// Returns the number of callbacks invoked. Records produced by the
    /// callbacks themselves wait for the next call. Calling this from inside
    /// an observer callback delivers nothing.
    pub fn deliver_mutations(&self) -> usize {
        if self.observers.delivering.replace(true) {
            return 0;
        }

        let pending = self.observers.take_pending();
        let mut delivered = 0;
        for (observer, records) in &pending {
            if observer.disconnected.get() {
                continue;
            }
            let mut callback = observer.callback.borrow_mut();
            (*callback)(records);
            delivered += 1;
        }

        self.observers.delivering.set(false);
        delivered
    }

    fn queue_record(&self, record: MutationRecord) {
        let tree = self.tree.borrow();
        for observer in self.observers.entries.borrow().iter() {
            if !observer.options.wants(record.kind) {
                continue;
            }
            let in_scope = if observer.options.subtree {
                tree.is_inclusive_ancestor(observer.target, record.target)
            } else {
                observer.target == record.target
            };
            if in_scope {
                observer.queue.borrow_mut().push(record.clone());
            }
        }
    }
}
