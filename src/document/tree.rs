//! Arena-backed document tree with doubly-linked sibling order.
//!
//! The tree is the shared data model of the loader and builder: a flat arena of
//! nodes ([`Tree`]) in which every structural relationship is an index. A block
//! node owns its subtree exclusively through the `first_child` edge; siblings are
//! peers chained through `prev`/`next` with no ownership. Structural mutation
//! keeps three invariants at all times:
//!
//! - the sibling chain is acyclic and consistent (`a.next == b` iff `b.prev == a`),
//! - every attached node's `parent` is the nearest enclosing block,
//! - a parent's `first_child` is the head of exactly that chain.
//!
//! # Key Components
//!
//! - [`Tree`] - The arena: allocation, structural mutation, traversal, search
//! - [`crate::document::node::NodeId`] - Stable handle into the arena
//! - [`crate::document::node::NodeKind`] - Typed per-record payloads
//!
//! # Usage Examples
//!
//! ```rust
//! use bamlscope::{ElementFlags, IdRef, NodeKind, Tree};
//!
//! let mut tree = Tree::new();
//! let doc = tree.alloc(NodeKind::Document {
//!     load_async: false,
//!     max_async_records: 0,
//!     debug_baml: false,
//! });
//! let element = tree.alloc(NodeKind::Element {
//!     type_id: IdRef::Known(42),
//!     flags: ElementFlags::empty(),
//! });
//! tree.add(doc, element);
//! assert_eq!(tree.count(doc), 1);
//! ```

use crate::{
    document::node::{NodeId, NodeKind},
    records::RecordType,
    Error, Result,
};

/// One arena slot: a typed payload plus its structural links.
#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first_child: Option<NodeId>,
    closed: bool,
}

/// The node arena of one document.
///
/// All nodes of a document live in one `Tree`; handles from other trees are
/// meaningless here. Nodes are allocated detached ([`Tree::alloc`]) and wired
/// into place with the structural operations, all of which maintain the
/// sibling-list and parent invariants atomically.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Tree { nodes: Vec::new() }
    }

    /// Number of nodes ever allocated (detached nodes included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a new detached node and return its handle.
    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        self.nodes.push(Node {
            kind,
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            closed: false,
        });
        id
    }

    /// Borrow a node's payload.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.index()].kind
    }

    /// Mutably borrow a node's payload.
    pub fn kind_mut(&mut self, node: NodeId) -> &mut NodeKind {
        &mut self.nodes[node.index()].kind
    }

    /// Whether this node is a block (owns a child list).
    #[must_use]
    pub fn is_block(&self, node: NodeId) -> bool {
        self.kind(node).is_block()
    }

    /// The nearest enclosing block, `None` for detached nodes and the root.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    /// The next sibling.
    #[must_use]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].next
    }

    /// The previous sibling.
    #[must_use]
    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].prev
    }

    /// The first child of a block, `None` when empty or not a block.
    #[must_use]
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].first_child
    }

    /// The last child of a block, derived by walking the sibling chain.
    #[must_use]
    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = self.first_child(node)?;
        while let Some(next) = self.next(cur) {
            cur = next;
        }
        Some(cur)
    }

    /// Number of direct children, derived by walking.
    #[must_use]
    pub fn count(&self, node: NodeId) -> usize {
        self.children(node).count()
    }

    /// Whether a block has been closed (its end record was seen or will be written).
    #[must_use]
    pub fn is_closed(&self, node: NodeId) -> bool {
        self.nodes[node.index()].closed
    }

    /// Mark a block as closed or open. An open block is serialized without its
    /// end record.
    pub fn set_closed(&mut self, node: NodeId, closed: bool) {
        self.nodes[node.index()].closed = closed;
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// # Panics
    /// Panics if `parent` is not a block or `child` is already attached.
    pub fn add(&mut self, parent: NodeId, child: NodeId) {
        let tail = self.last_child(parent);
        self.attach_after(parent, tail, child);
    }

    /// Insert `child` at position `index` among `parent`'s children.
    ///
    /// # Panics
    /// Panics if `parent` is not a block, `child` is already attached, or
    /// `index` exceeds the current child count.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let anchor = if index == 0 {
            None
        } else {
            let anchor = self
                .children(parent)
                .nth(index - 1)
                .expect("insert index out of range");
            Some(anchor)
        };
        self.attach_after(parent, anchor, child);
    }

    /// Remove and return the child at position `index`.
    ///
    /// The removed node stays in the arena, detached, and keeps its subtree.
    ///
    /// # Panics
    /// Panics if `index` exceeds the current child count.
    pub fn remove_at(&mut self, parent: NodeId, index: usize) -> NodeId {
        let child = self
            .children(parent)
            .nth(index)
            .expect("remove index out of range");
        self.detach(child);
        child
    }

    /// Detach `node` from its parent and siblings. No-op for detached nodes.
    pub fn detach(&mut self, node: NodeId) {
        let (parent, prev, next) = {
            let n = &self.nodes[node.index()];
            (n.parent, n.prev, n.next)
        };

        match prev {
            Some(prev) => self.nodes[prev.index()].next = next,
            None => {
                if let Some(parent) = parent {
                    self.nodes[parent.index()].first_child = next;
                }
            }
        }
        if let Some(next) = next {
            self.nodes[next.index()].prev = prev;
        }

        let n = &mut self.nodes[node.index()];
        n.parent = None;
        n.prev = None;
        n.next = None;
    }

    /// Detach all children of `parent`.
    pub fn clear(&mut self, parent: NodeId) {
        while let Some(child) = self.first_child(parent) {
            self.detach(child);
        }
    }

    /// Iterate the direct children of `parent` in sibling order.
    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.first_child(parent);
        std::iter::from_fn(move || {
            let node = cur?;
            cur = self.next(node);
            Some(node)
        })
    }

    /// The successor of `node` in pre-order over the whole tree: a block's first
    /// child if present, otherwise the nearest ancestor-or-self next sibling.
    #[must_use]
    pub fn get_next(&self, node: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(node) {
            return Some(child);
        }
        let mut cur = node;
        loop {
            if let Some(next) = self.next(cur) {
                return Some(next);
            }
            cur = self.parent(cur)?;
        }
    }

    /// The predecessor of `node` in pre-order: the previous sibling's deepest
    /// last descendant if a previous sibling exists, otherwise the parent.
    #[must_use]
    pub fn get_previous(&self, node: NodeId) -> Option<NodeId> {
        match self.prev(node) {
            Some(mut cur) => {
                while let Some(last) = self.last_child(cur) {
                    cur = last;
                }
                Some(cur)
            }
            None => self.parent(node),
        }
    }

    /// Iterate the descendants of `root` (excluding `root` itself) in pre-order.
    pub fn descendants(&self, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.first_child(root);
        std::iter::from_fn(move || {
            let node = cur?;
            // Advance in pre-order without ever climbing past root.
            cur = self.first_child(node).or_else(|| {
                let mut climb = node;
                loop {
                    if climb == root {
                        break None;
                    }
                    if let Some(next) = self.next(climb) {
                        break Some(next);
                    }
                    climb = self.parent(climb)?;
                }
            });
            Some(node)
        })
    }

    /// Find the first node of record type `rt` under `parent`: among direct
    /// children when `direct_only`, otherwise anywhere in the subtree (pre-order).
    #[must_use]
    pub fn find_first_child(
        &self,
        parent: NodeId,
        rt: RecordType,
        direct_only: bool,
    ) -> Option<NodeId> {
        if direct_only {
            self.children(parent)
                .find(|&n| self.kind(n).record_type() == rt)
        } else {
            self.descendants(parent)
                .find(|&n| self.kind(n).record_type() == rt)
        }
    }

    /// Find the last node of record type `rt` under `parent`; see
    /// [`Tree::find_first_child`] for the `direct_only` semantics.
    #[must_use]
    pub fn find_last_child(
        &self,
        parent: NodeId,
        rt: RecordType,
        direct_only: bool,
    ) -> Option<NodeId> {
        if direct_only {
            self.children(parent)
                .filter(|&n| self.kind(n).record_type() == rt)
                .last()
        } else {
            self.descendants(parent)
                .filter(|&n| self.kind(n).record_type() == rt)
                .last()
        }
    }

    /// Find the next node of record type `rt` after `from`: among following
    /// siblings when `direct_only`, otherwise continuing the whole-tree pre-order.
    #[must_use]
    pub fn find_next(&self, from: NodeId, rt: RecordType, direct_only: bool) -> Option<NodeId> {
        let mut cur = if direct_only {
            self.next(from)
        } else {
            self.get_next(from)
        };
        while let Some(node) = cur {
            if self.kind(node).record_type() == rt {
                return Some(node);
            }
            cur = if direct_only {
                self.next(node)
            } else {
                self.get_next(node)
            };
        }
        None
    }

    /// Find the closest node of record type `rt` before `from`; mirror of
    /// [`Tree::find_next`].
    #[must_use]
    pub fn find_previous(&self, from: NodeId, rt: RecordType, direct_only: bool) -> Option<NodeId> {
        let mut cur = if direct_only {
            self.prev(from)
        } else {
            self.get_previous(from)
        };
        while let Some(node) = cur {
            if self.kind(node).record_type() == rt {
                return Some(node);
            }
            cur = if direct_only {
                self.prev(node)
            } else {
                self.get_previous(node)
            };
        }
        None
    }

    /// [`Tree::find_first_child`] that signals [`crate::Error::NotFound`] when no
    /// node matches.
    pub fn require_first_child(
        &self,
        parent: NodeId,
        rt: RecordType,
        direct_only: bool,
    ) -> Result<NodeId> {
        self.find_first_child(parent, rt, direct_only)
            .ok_or(Error::NotFound)
    }

    /// [`Tree::find_last_child`] that signals [`crate::Error::NotFound`] when no
    /// node matches.
    pub fn require_last_child(
        &self,
        parent: NodeId,
        rt: RecordType,
        direct_only: bool,
    ) -> Result<NodeId> {
        self.find_last_child(parent, rt, direct_only)
            .ok_or(Error::NotFound)
    }

    /// [`Tree::find_next`] that signals [`crate::Error::NotFound`] when no node
    /// matches.
    pub fn require_next(&self, from: NodeId, rt: RecordType, direct_only: bool) -> Result<NodeId> {
        self.find_next(from, rt, direct_only).ok_or(Error::NotFound)
    }

    /// [`Tree::find_previous`] that signals [`crate::Error::NotFound`] when no
    /// node matches.
    pub fn require_previous(
        &self,
        from: NodeId,
        rt: RecordType,
        direct_only: bool,
    ) -> Result<NodeId> {
        self.find_previous(from, rt, direct_only)
            .ok_or(Error::NotFound)
    }

    /// Attach `child` directly after `anchor` (or as first child when `anchor`
    /// is `None`) under `parent`. This is the single primitive every structural
    /// insertion goes through.
    pub(crate) fn attach_after(&mut self, parent: NodeId, anchor: Option<NodeId>, child: NodeId) {
        assert!(self.is_block(parent), "parent node is not a block");
        assert!(
            self.nodes[child.index()].parent.is_none()
                && self.nodes[child.index()].prev.is_none()
                && self.nodes[child.index()].next.is_none(),
            "child node is already attached"
        );

        let next = match anchor {
            Some(anchor) => {
                debug_assert_eq!(self.parent(anchor), Some(parent));
                let next = self.nodes[anchor.index()].next;
                self.nodes[anchor.index()].next = Some(child);
                next
            }
            None => {
                let next = self.nodes[parent.index()].first_child;
                self.nodes[parent.index()].first_child = Some(child);
                next
            }
        };

        if let Some(next) = next {
            self.nodes[next.index()].prev = Some(child);
        }

        let c = &mut self.nodes[child.index()];
        c.parent = Some(parent);
        c.prev = anchor;
        c.next = next;
    }
}
