//! Node reference fields.
//!
//! A reference field is a signed 32-bit node index followed, on first occurrence only,
//! by the referenced node itself:
//!
//! ```text
//! -1                          -> null
//! index bound to an external  -> External (no payload)
//! index already seen          -> back-reference to the shared node (no payload)
//! new index                   -> [class id u32][chunks ... 0xFACADE01]
//! ```
//!
//! Back-references resolve to clones of the same [`NodeHandle`], so every field that
//! points at one index observes the same node.

use std::collections::{HashMap, HashSet};
use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::codec::{Codec, Direction, Field};
use crate::error::{GbxError, Result};
use crate::graph::{ClassId, Node, NodeHandle};

/// Class id word that stands for "no node" in direct node fields.
const NULL_CLASS: u32 = 0xFFFF_FFFF;

/// The value of one node reference field.
#[derive(Debug, Clone, Default)]
pub enum NodeRef {
    /// No node.
    #[default]
    Null,
    /// A node stored in this container, possibly shared with other fields.
    Node(NodeHandle),
    /// A node stored in another file, listed in the reference table.
    External(ExternalRef),
}

impl NodeRef {
    /// Wraps a fresh node.
    pub fn new(node: Node) -> Self {
        Self::Node(node.into_handle())
    }

    /// Returns true for [`NodeRef::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The in-container node, if any.
    pub fn as_node(&self) -> Option<&NodeHandle> {
        match self {
            Self::Node(handle) => Some(handle),
            _ => None,
        }
    }

    /// The external binding, if any.
    pub fn as_external(&self) -> Option<ExternalRef> {
        match self {
            Self::External(ext) => Some(*ext),
            _ => None,
        }
    }
}

/// Structural equality. Two node slots are equal when they hold the same handle or
/// nodes that compare equal.
impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::External(a), Self::External(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                match (a.try_borrow(), b.try_borrow()) {
                    (Ok(a), Ok(b)) => *a == *b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl Field for NodeRef {
    fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
        ctx.node_ref(self)
    }
}

/// A reference field bound to an entry of the container's external file table.
///
/// Only the node index is stored; [`Gbx::resolve`](crate::Gbx::resolve) turns it into
/// a node on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalRef {
    node_index: u32,
}

impl ExternalRef {
    /// Binds a field to the external entry registered under `node_index`.
    pub fn new(node_index: u32) -> Self {
        Self { node_index }
    }

    /// The node index shared with the external file table entry.
    pub fn node_index(&self) -> u32 {
        self.node_index
    }
}

/// The in-body node table of one pass.
///
/// Reading maps stream indices to handles. Writing maps handle identities to the
/// indices assigned on first sight. Indices reserved by external entries are never
/// handed out to in-body nodes.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeTable {
    by_index: HashMap<u32, NodeHandle>,
    read_order: Vec<u32>,
    by_ptr: HashMap<*const RefCell<Node>, u32>,
    externals: HashSet<u32>,
    limit: Option<u32>,
    next_free: u32,
}

/// Position in the read order, taken before a skippable chunk is decoded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeMark(usize);

impl NodeTable {
    /// Caps valid indices at the `num_nodes` declared by the container.
    pub(crate) fn set_limit(&mut self, limit: u32) {
        self.limit = Some(limit);
    }

    pub(crate) fn reserve_external(&mut self, index: u32) {
        self.externals.insert(index);
    }

    pub(crate) fn is_external(&self, index: u32) -> bool {
        self.externals.contains(&index)
    }

    pub(crate) fn get(&self, index: u32) -> Option<&NodeHandle> {
        self.by_index.get(&index)
    }

    /// Number of nodes registered so far.
    pub(crate) fn len(&self) -> usize {
        self.by_index.len()
    }

    /// One past the highest index in use, externals included.
    pub(crate) fn count(&self) -> u32 {
        self.by_index
            .keys()
            .chain(self.externals.iter())
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Every registered node, by ascending index.
    pub(crate) fn nodes(&self) -> Vec<(u32, NodeHandle)> {
        let mut nodes: Vec<_> = self
            .by_index
            .iter()
            .map(|(index, handle)| (*index, Rc::clone(handle)))
            .collect();
        nodes.sort_by_key(|(index, _)| *index);
        nodes
    }

    pub(crate) fn mark(&self) -> NodeMark {
        NodeMark(self.read_order.len())
    }

    /// Nodes read after `mark` was taken, in read order.
    pub(crate) fn read_since(&self, mark: NodeMark) -> Vec<(u32, NodeHandle)> {
        self.read_order
            .get(mark.0..)
            .unwrap_or_default()
            .iter()
            .filter_map(|index| self.by_index.get(index).map(|h| (*index, Rc::clone(h))))
            .collect()
    }

    /// Registers, while writing, a node that is emitted inside raw chunk bytes.
    ///
    /// Later fields referencing the handle then write a back-reference, as the
    /// original stream did.
    pub(crate) fn claim(&mut self, index: u32, handle: &NodeHandle) {
        if self.is_taken(index) || self.index_of(handle).is_some() {
            return;
        }
        self.by_index.insert(index, Rc::clone(handle));
        self.by_ptr.insert(Rc::as_ptr(handle), index);
    }

    fn insert_read(&mut self, index: u32, handle: NodeHandle) {
        self.by_index.insert(index, handle);
        self.read_order.push(index);
    }

    fn index_of(&self, handle: &NodeHandle) -> Option<u32> {
        self.by_ptr.get(&Rc::as_ptr(handle)).copied()
    }

    fn is_taken(&self, index: u32) -> bool {
        self.by_index.contains_key(&index) || self.externals.contains(&index)
    }

    /// Assigns an index to a handle seen for the first time while writing.
    ///
    /// The node's original index is reused when still free, so an unmodified graph is
    /// written with the indices it was read with.
    fn assign(&mut self, handle: &NodeHandle, preferred: Option<u32>) -> u32 {
        let index = match preferred {
            Some(index) if !self.is_taken(index) => index,
            _ => {
                while self.is_taken(self.next_free) {
                    self.next_free += 1;
                }
                self.next_free
            }
        };
        self.by_index.insert(index, Rc::clone(handle));
        self.by_ptr.insert(Rc::as_ptr(handle), index);
        index
    }
}

impl Codec<'_> {
    /// A node reference field.
    pub fn node_ref(&mut self, slot: &mut NodeRef) -> Result<()> {
        match self.direction() {
            Direction::Read => {
                *slot = self.read_node_ref()?;
                Ok(())
            }
            Direction::Write => self.write_node_ref(slot),
        }
    }

    /// A node embedded directly, without an index: `[class id u32][chunks]`, where
    /// class id `0xFFFFFFFF` stands for no node.
    ///
    /// Direct nodes are never registered in the node table and cannot be
    /// back-referenced.
    pub fn node(&mut self, slot: &mut Option<NodeHandle>) -> Result<()> {
        match self.direction() {
            Direction::Read => {
                let class = self.reader_mut()?.read_u32()?;
                *slot = if class == NULL_CLASS {
                    None
                } else {
                    Some(self.read_node(ClassId::new(class))?.into_handle())
                };
                Ok(())
            }
            Direction::Write => match slot {
                None => {
                    self.writer_mut()?.write_u32(NULL_CLASS);
                    Ok(())
                }
                Some(handle) => {
                    let mut node = handle
                        .try_borrow_mut()
                        .map_err(|_| GbxError::reference("direct node is already borrowed"))?;
                    self.writer_mut()?.write_u32(node.class_id().as_u32());
                    self.write_node(&mut node)
                }
            },
        }
    }

    fn read_node_ref(&mut self) -> Result<NodeRef> {
        let raw = self.reader_mut()?.read_i32()?;
        if raw == -1 {
            return Ok(NodeRef::Null);
        }
        let index = u32::try_from(raw)
            .map_err(|_| GbxError::Reference(format!("negative node index {raw}")))?;

        if self.nodes.is_external(index) {
            return Ok(NodeRef::External(ExternalRef::new(index)));
        }
        if let Some(handle) = self.nodes.get(index) {
            trace!(index, "node back-reference");
            return Ok(NodeRef::Node(Rc::clone(handle)));
        }
        if let Some(limit) = self.nodes.limit
            && index >= limit
        {
            return Err(GbxError::Reference(format!(
                "node index {index} outside the {limit} declared nodes"
            )));
        }

        let class = self.reader_mut()?.read_u32()?;
        let mut node = self.read_node(ClassId::new(class))?;
        node.set_source_index(index);
        let handle = node.into_handle();
        self.nodes.insert_read(index, Rc::clone(&handle));
        Ok(NodeRef::Node(handle))
    }

    fn write_node_ref(&mut self, slot: &NodeRef) -> Result<()> {
        let handle = match slot {
            NodeRef::Null => {
                self.writer_mut()?.write_i32(-1);
                return Ok(());
            }
            NodeRef::External(ext) => {
                if !self.nodes.is_external(ext.node_index) {
                    return Err(GbxError::Reference(format!(
                        "node index {} is not bound to an external file",
                        ext.node_index
                    )));
                }
                self.writer_mut()?.write_u32(ext.node_index);
                return Ok(());
            }
            NodeRef::Node(handle) => handle,
        };

        if let Some(index) = self.nodes.index_of(handle) {
            if handle.try_borrow_mut().is_err() {
                return Err(GbxError::Reference(format!(
                    "node {index} references itself through its own chunks"
                )));
            }
            self.writer_mut()?.write_u32(index);
            return Ok(());
        }

        let mut node = handle
            .try_borrow_mut()
            .map_err(|_| GbxError::reference("node is already borrowed"))?;
        let index = self.nodes.assign(handle, node.source_index());
        let w = self.writer_mut()?;
        w.write_u32(index);
        w.write_u32(node.class_id().as_u32());
        self.write_node(&mut node)
    }
}
