//! Arena-backed scene graph with per-subtree ownership.
//!
//! Ownership contract:
//! - A node may be claimed by at most one owner (a mount id). The claim
//!   covers the node's whole subtree.
//! - Mutation through [`SceneGraph::node_mut`] names the caller; a caller
//!   that is not the subtree's owner gets [`SceneError::NotOwner`].
//! - The root is structural only: content is attached to and detached from
//!   it, never mutated through it.
//!
//! Ordering contract:
//! - Children are kept in attach order.
//! - [`SceneGraph::collect`] walks depth-first in that order.

use std::fmt;

use foundation::Id;
use foundation::arena::Arena;
use foundation::handles::Handle;

use crate::components::{Drawable, Transform};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub Handle);

impl NodeId {
    pub fn index(&self) -> u32 {
        self.0.index()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.0.index(), self.0.generation())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    UnknownNode(NodeId),
    /// `caller` touched a subtree owned by someone else (or by nobody).
    NotOwner {
        node: NodeId,
        owner: Option<Id>,
        caller: Id,
    },
    AlreadyOwned {
        node: NodeId,
        owner: Id,
    },
    AlreadyAttached(NodeId),
    Cycle(NodeId),
    Root,
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::UnknownNode(n) => write!(f, "unknown scene node {n:?}"),
            SceneError::NotOwner {
                node,
                owner: Some(owner),
                caller,
            } => write!(f, "{caller} may not mutate {node:?}: owned by {owner}"),
            SceneError::NotOwner {
                node,
                owner: None,
                caller,
            } => write!(f, "{caller} may not mutate unowned node {node:?}"),
            SceneError::AlreadyOwned { node, owner } => {
                write!(f, "{node:?} is already owned by {owner}")
            }
            SceneError::AlreadyAttached(n) => write!(f, "{n:?} already has a parent"),
            SceneError::Cycle(n) => write!(f, "attaching {n:?} would create a cycle"),
            SceneError::Root => write!(f, "the scene root cannot be claimed, detached or removed"),
        }
    }
}

impl std::error::Error for SceneError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub transform: Transform,
    pub visible: bool,
    pub drawable: Drawable,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    owner: Option<Id>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn owner(&self) -> Option<&Id> {
        self.owner.as_ref()
    }
}

/// Detached content, built by a mounting block and moved into the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub drawable: Drawable,
    pub transform: Transform,
    pub visible: bool,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(drawable: Drawable) -> Self {
        Self {
            drawable,
            transform: Transform::identity(),
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn group() -> Self {
        Self::new(Drawable::Group)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

/// A node reached by [`SceneGraph::collect`], with its world transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Visited<'a> {
    pub node: NodeId,
    pub world: Transform,
    pub drawable: &'a Drawable,
    pub owner: Option<&'a Id>,
}

#[derive(Debug)]
pub struct SceneGraph {
    nodes: Arena<Node>,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = NodeId(nodes.insert(Node {
            transform: Transform::identity(),
            visible: true,
            drawable: Drawable::Group,
            parent: None,
            children: Vec::new(),
            owner: None,
        }));
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node.0)
    }

    /// Creates a detached, unowned node.
    pub fn spawn(&mut self, drawable: Drawable, transform: Transform) -> NodeId {
        NodeId(self.nodes.insert(Node {
            transform,
            visible: true,
            drawable,
            parent: None,
            children: Vec::new(),
            owner: None,
        }))
    }

    /// Spawns `content` and its children as a detached subtree.
    pub fn instantiate(&mut self, content: SceneNode) -> NodeId {
        let SceneNode {
            drawable,
            transform,
            visible,
            children,
        } = content;
        let id = self.spawn(drawable, transform);
        if let Some(n) = self.nodes.get_mut(id.0) {
            n.visible = visible;
        }
        for child in children {
            let child_id = self.instantiate(child);
            if let Some(c) = self.nodes.get_mut(child_id.0) {
                c.parent = Some(id);
            }
            if let Some(n) = self.nodes.get_mut(id.0) {
                n.children.push(child_id);
            }
        }
        id
    }

    pub fn get(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.0)
    }

    /// Owner of the subtree `node` belongs to (nearest claimed ancestor).
    pub fn owner_of(&self, node: NodeId) -> Option<&Id> {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let n = self.nodes.get(id.0)?;
            if let Some(owner) = &n.owner {
                return Some(owner);
            }
            cursor = n.parent;
        }
        None
    }

    /// Claims `node`'s subtree for `owner`.
    pub fn claim(&mut self, node: NodeId, owner: &Id) -> Result<(), SceneError> {
        if node == self.root {
            return Err(SceneError::Root);
        }
        if let Some(existing) = self.owner_of(node) {
            return Err(SceneError::AlreadyOwned {
                node,
                owner: existing.clone(),
            });
        }
        let n = self
            .nodes
            .get_mut(node.0)
            .ok_or(SceneError::UnknownNode(node))?;
        n.owner = Some(owner.clone());
        Ok(())
    }

    /// Mutable access for `caller`, who must own the node's subtree.
    pub fn node_mut(&mut self, node: NodeId, caller: &Id) -> Result<&mut Node, SceneError> {
        if !self.contains(node) {
            return Err(SceneError::UnknownNode(node));
        }
        let owner = self.owner_of(node);
        if owner != Some(caller) {
            return Err(SceneError::NotOwner {
                node,
                owner: owner.cloned(),
                caller: caller.clone(),
            });
        }
        self.nodes
            .get_mut(node.0)
            .ok_or(SceneError::UnknownNode(node))
    }

    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if child == self.root {
            return Err(SceneError::Root);
        }
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        let c = self.nodes.get(child.0).ok_or(SceneError::UnknownNode(child))?;
        if c.parent.is_some() {
            return Err(SceneError::AlreadyAttached(child));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(SceneError::Cycle(child));
            }
            cursor = self.nodes.get(id.0).and_then(|n| n.parent);
        }

        if let Some(c) = self.nodes.get_mut(child.0) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(child);
        }
        Ok(())
    }

    /// Unlinks `node` from its parent. The subtree stays alive.
    pub fn detach(&mut self, node: NodeId) -> Result<(), SceneError> {
        if node == self.root {
            return Err(SceneError::Root);
        }
        let n = self.nodes.get_mut(node.0).ok_or(SceneError::UnknownNode(node))?;
        let Some(parent) = n.parent.take() else {
            return Ok(());
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != node);
        }
        Ok(())
    }

    /// Detaches and frees `node` and all of its descendants, returning the
    /// freed nodes (parents before children).
    pub fn remove_subtree(&mut self, node: NodeId) -> Result<Vec<Node>, SceneError> {
        self.detach(node)?;
        let mut removed = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(id.0) {
                stack.extend(n.children.iter().rev().copied());
                removed.push(n);
            }
        }
        Ok(removed)
    }

    /// Ids of `node` and every descendant, depth-first.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get(id.0) {
                out.push(id);
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    /// Visible, non-group nodes reachable from the root, depth-first in attach
    /// order. Hidden nodes hide their whole subtree.
    pub fn collect(&self) -> Vec<Visited<'_>> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, Transform::identity(), None::<&Id>)];
        while let Some((id, parent_world, inherited)) = stack.pop() {
            let Some(n) = self.nodes.get(id.0) else {
                continue;
            };
            if !n.visible {
                continue;
            }
            let world = parent_world.then(&n.transform);
            let owner = n.owner.as_ref().or(inherited);
            if !n.drawable.is_group() {
                out.push(Visited {
                    node: id,
                    world,
                    drawable: &n.drawable,
                    owner,
                });
            }
            for child in n.children.iter().rev() {
                stack.push((*child, world, owner));
            }
        }
        out
    }
}
