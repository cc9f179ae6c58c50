//! Content mount protocol.
//!
//! A block mounts a detached [`SceneNode`] under an id and receives a
//! [`MountHandle`], the exclusive owner token for that subtree. The handle is
//! the only mutation path into the mounted nodes, and dropping it unmounts:
//! the subtree is detached, the owner's GPU resources are released through
//! the backend and the unmount hooks run, all before the call returns.
//!
//! A duplicate id is a programming error. With `strict_mounts` it panics;
//! otherwise the newer mount replaces the older one with a warning, and the
//! older handle goes stale (its calls fail with [`MountError::NotOwner`]).

use std::fmt;
use std::rc::{Rc, Weak};

use foundation::Id;
use scene::components::{ResourceId, UniformError, UniformSet};
use scene::graph::{Node, NodeId, SceneError, SceneNode};
use tracing::{debug, trace, warn};

use crate::resources::{ResourceKind, TextureState};
use crate::surface::{SharedSurface, SurfaceEvent, SurfaceInner};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountOptions {
    /// Higher draws later (on top).
    pub z_order: i32,
    /// View whose visibility gates drawing this content.
    pub view: Option<Id>,
}

impl MountOptions {
    pub fn z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn view(mut self, view: impl Into<Id>) -> Self {
        self.view = Some(view.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MountError {
    DuplicateId(Id),
    /// The handle no longer owns the mount (it was replaced), or the node it
    /// touched belongs to someone else.
    NotOwner(Id),
    Unmounted(Id),
    /// The mounted root has no uniforms to update.
    NoUniforms(Id),
    Scene(SceneError),
    Uniform(UniformError),
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::DuplicateId(id) => write!(f, "mount id `{id}` is already in use"),
            MountError::NotOwner(id) => write!(f, "handle for `{id}` does not own this content"),
            MountError::Unmounted(id) => write!(f, "`{id}` is no longer mounted"),
            MountError::NoUniforms(id) => write!(f, "`{id}` has no uniform set on its root"),
            MountError::Scene(err) => write!(f, "scene: {err}"),
            MountError::Uniform(err) => write!(f, "uniforms: {err}"),
        }
    }
}

impl std::error::Error for MountError {}

impl From<SceneError> for MountError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::NotOwner { caller, .. } => MountError::NotOwner(caller),
            other => MountError::Scene(other),
        }
    }
}

impl From<UniformError> for MountError {
    fn from(err: UniformError) -> Self {
        MountError::Uniform(err)
    }
}

type UnmountHook = Box<dyn FnOnce(&Id)>;

pub(crate) struct MountRecord {
    pub(crate) node: NodeId,
    pub(crate) z_order: i32,
    pub(crate) view: Option<Id>,
    pub(crate) seq: u64,
    pub(crate) generation: u64,
    hooks: Vec<UnmountHook>,
}

impl SharedSurface {
    /// Mounts `content` under `id` at the scene root and requests a draw.
    ///
    /// # Panics
    ///
    /// On a duplicate `id` when `strict_mounts` is set.
    pub fn mount(
        &self,
        id: impl Into<Id>,
        content: SceneNode,
        opts: MountOptions,
    ) -> Result<MountHandle, MountError> {
        let id = id.into();
        let (strict, duplicate) = {
            let s = self.inner.state.borrow();
            (s.config.strict_mounts, s.mounts.contains_key(&id))
        };
        if duplicate {
            if strict {
                panic!("duplicate mount id `{id}`");
            }
            warn!(mount = %id, "duplicate mount id; replacing the earlier content");
            self.detach(&id, None, true);
        }
        self.insert(id, content, opts)
    }

    /// Like [`SharedSurface::mount`], but a duplicate id is an error in every
    /// mode and leaves the existing mount untouched.
    pub fn try_mount(
        &self,
        id: impl Into<Id>,
        content: SceneNode,
        opts: MountOptions,
    ) -> Result<MountHandle, MountError> {
        let id = id.into();
        if self.is_mounted(&id) {
            return Err(MountError::DuplicateId(id));
        }
        self.insert(id, content, opts)
    }

    fn insert(&self, id: Id, content: SceneNode, opts: MountOptions) -> Result<MountHandle, MountError> {
        let (node, generation) = {
            let mut guard = self.inner.state.borrow_mut();
            let s = &mut *guard;
            let node = s.graph.instantiate(content);
            let root = s.graph.root();
            let attached = s
                .graph
                .claim(node, &id)
                .and_then(|()| s.graph.attach(root, node));
            if let Err(err) = attached {
                let orphans = s.graph.remove_subtree(node);
                drop(guard);
                drop(orphans);
                return Err(err.into());
            }
            let generation = s.next_generation;
            s.next_generation += 1;
            let seq = s.next_seq;
            s.next_seq += 1;
            s.mounts.insert(
                id.clone(),
                MountRecord {
                    node,
                    z_order: opts.z_order,
                    view: opts.view,
                    seq,
                    generation,
                    hooks: Vec::new(),
                },
            );
            let index = s.frame_index;
            s.events.emit(index, SurfaceEvent::Mounted(id.clone()));
            (node, generation)
        };
        trace!(mount = %id, "mounted");
        self.invalidate();
        Ok(MountHandle {
            surface: Rc::downgrade(&self.inner),
            id,
            node,
            generation,
            active: true,
        })
    }

    /// Unmounts `id`. Unknown ids are ignored with a debug log.
    pub fn unmount(&self, id: &Id) -> bool {
        self.unmount_generation(id, None)
    }

    pub(crate) fn unmount_generation(&self, id: &Id, generation: Option<u64>) -> bool {
        let known = self
            .inner
            .state
            .borrow()
            .mounts
            .get(id)
            .is_some_and(|r| generation.is_none_or(|g| r.generation == g));
        if !known {
            debug!(mount = %id, "unmount of unknown or already unmounted id");
            return false;
        }
        self.detach(id, generation, false)
    }

    pub fn is_mounted(&self, id: &Id) -> bool {
        self.inner.state.borrow().mounts.contains_key(id)
    }

    pub fn mounted_ids(&self) -> Vec<Id> {
        self.inner.state.borrow().mounts.keys().cloned().collect()
    }

    /// Scene nodes currently in the graph, root included.
    pub fn node_count(&self) -> usize {
        self.inner.state.borrow().graph.len()
    }

    /// Removes the record, subtree and resources of `id`, then runs its
    /// hooks once the state is no longer borrowed.
    fn detach(&self, id: &Id, generation: Option<u64>, replaced: bool) -> bool {
        let (record, nodes) = {
            let mut guard = self.inner.state.borrow_mut();
            let s = &mut *guard;
            let matches = s
                .mounts
                .get(id)
                .is_some_and(|r| generation.is_none_or(|g| r.generation == g));
            if !matches {
                return false;
            }
            let Some(record) = s.mounts.remove(id) else {
                return false;
            };
            let nodes = s.graph.remove_subtree(record.node).unwrap_or_default();
            for resource in s.resources.release_owner(id) {
                s.backend.release(resource);
            }
            s.pending_loads.retain(|(res, _)| s.resources.get(*res).is_some());
            let index = s.frame_index;
            let event = if replaced {
                SurfaceEvent::Replaced(id.clone())
            } else {
                SurfaceEvent::Unmounted(id.clone())
            };
            s.events.emit(index, event);
            (record, nodes)
        };
        drop(nodes);
        for hook in record.hooks {
            hook(id);
        }
        trace!(mount = %id, replaced, "unmounted");
        self.invalidate();
        true
    }
}

/// Exclusive owner token for one mounted subtree. Dropping it unmounts.
#[must_use = "dropping a MountHandle unmounts its content"]
pub struct MountHandle {
    surface: Weak<SurfaceInner>,
    id: Id,
    node: NodeId,
    generation: u64,
    active: bool,
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("generation", &self.generation)
            .finish()
    }
}

impl MountHandle {
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Root node of the mounted subtree.
    pub fn node(&self) -> NodeId {
        self.node
    }

    fn surface(&self) -> Result<SharedSurface, MountError> {
        self.surface
            .upgrade()
            .map(|inner| SharedSurface { inner })
            .ok_or_else(|| MountError::Unmounted(self.id.clone()))
    }

    /// Checks that this handle still owns its mount.
    fn check(&self, surface: &SharedSurface) -> Result<(), MountError> {
        match surface.inner.state.borrow().mounts.get(&self.id) {
            None => Err(MountError::Unmounted(self.id.clone())),
            Some(r) if r.generation != self.generation => Err(MountError::NotOwner(self.id.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Fails with [`MountError::Unmounted`] or [`MountError::NotOwner`] once
    /// this handle no longer owns its mount.
    pub fn ensure_owned(&self) -> Result<(), MountError> {
        self.surface().and_then(|s| self.check(&s))
    }

    pub fn is_mounted(&self) -> bool {
        self.ensure_owned().is_ok()
    }

    /// Mutates the mounted root node and requests a draw. `f` must not call
    /// back into the surface.
    pub fn update<R>(&self, f: impl FnOnce(&mut Node) -> R) -> Result<R, MountError> {
        self.update_node(self.node, f)
    }

    /// Mutates `node`, which must belong to this mount's subtree.
    pub fn update_node<R>(&self, node: NodeId, f: impl FnOnce(&mut Node) -> R) -> Result<R, MountError> {
        let surface = self.surface()?;
        self.check(&surface)?;
        let out = {
            let mut s = surface.inner.state.borrow_mut();
            let target = s.graph.node_mut(node, &self.id)?;
            f(target)
        };
        surface.invalidate();
        Ok(out)
    }

    /// Writes the root quad's uniforms. A failed write leaves the set as the
    /// closure left it up to the failing call.
    pub fn update_uniforms(
        &self,
        f: impl FnOnce(&mut UniformSet) -> Result<(), UniformError>,
    ) -> Result<(), MountError> {
        let id = self.id.clone();
        self.update(|node| match node.drawable.as_quad_mut() {
            Some(quad) => f(&mut quad.uniforms).map_err(MountError::from),
            None => Err(MountError::NoUniforms(id)),
        })?
    }

    /// Reads the root quad's uniforms.
    pub fn uniforms(&self) -> Result<UniformSet, MountError> {
        let surface = self.surface()?;
        self.check(&surface)?;
        let s = surface.inner.state.borrow();
        s.graph
            .get(self.node)
            .and_then(|n| n.drawable.as_quad())
            .map(|q| q.uniforms.clone())
            .ok_or_else(|| MountError::NoUniforms(self.id.clone()))
    }

    /// Runs `hook` right after this content unmounts, for any reason.
    pub fn on_unmount(&self, hook: impl FnOnce(&Id) + 'static) -> Result<(), MountError> {
        let surface = self.surface()?;
        self.check(&surface)?;
        let mut s = surface.inner.state.borrow_mut();
        if let Some(record) = s.mounts.get_mut(&self.id) {
            record.hooks.push(Box::new(hook));
        }
        Ok(())
    }

    /// Registers a GPU resource owned by this mount.
    pub fn register_resource(&self, kind: ResourceKind, label: impl Into<String>) -> Result<ResourceId, MountError> {
        let surface = self.surface()?;
        self.check(&surface)?;
        let id = surface
            .inner
            .state
            .borrow_mut()
            .resources
            .register(kind, &self.id, label);
        Ok(id)
    }

    /// Registers a texture and queues `src` for the host to fetch. The
    /// texture stays [`TextureState::Loading`] until
    /// [`SharedSurface::complete_texture`] is called.
    pub fn load_texture(&self, src: &str) -> Result<ResourceId, MountError> {
        let id = self.register_resource(ResourceKind::Texture, src)?;
        let surface = self.surface()?;
        surface
            .inner
            .state
            .borrow_mut()
            .pending_loads
            .push((id, src.to_string()));
        Ok(id)
    }

    pub fn texture_state(&self, id: ResourceId) -> Option<TextureState> {
        self.surface().ok()?.texture_state(id)
    }

    /// Unmounts now. Returns whether this handle still owned the mount.
    pub fn release(mut self) -> bool {
        self.release_inner()
    }

    fn release_inner(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        let Some(inner) = self.surface.upgrade() else {
            return false;
        };
        let surface = SharedSurface { inner };
        if surface.inner.state.try_borrow_mut().is_err() {
            // Dropped while the surface is busy (e.g. inside an update
            // closure): unmount on the next render tick.
            surface
                .inner
                .deferred_unmounts
                .borrow_mut()
                .push((self.id.clone(), self.generation));
            surface.invalidate();
            return true;
        }
        surface.unmount_generation(&self.id, Some(self.generation))
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}
