use super::change_log::EntityKind;
use super::entity_set::EntitySet;
use crate::fields::group::GroupCore;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

/// Reference-counted change-notification bracket shared by an entire region tree
///
/// While the bracket is open, entity set and group field notifications are queued;
/// the outermost close flushes them so each field reports at most one aggregate
/// change per cycle. Queue order is mutation order: entity sets are delivered
/// before group propagation so pruning lands in the same cycle.
pub(crate) struct ChangeCache {
    depth: Cell<usize>,
    flushing: Cell<bool>,
    pending_sets: RefCell<VecDeque<EntitySet>>,
    pending_fields: RefCell<VecDeque<Weak<GroupCore>>>,
}

impl ChangeCache {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            depth: Cell::new(0),
            flushing: Cell::new(false),
            pending_sets: RefCell::new(VecDeque::new()),
            pending_fields: RefCell::new(VecDeque::new()),
        })
    }

    fn begin(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    fn end(&self) -> Result<(), String> {
        if self.depth.get() == 0 {
            return Err(String::from(
                "end_change called without a matching begin_change; Cannot close change bracket!",
            ));
        }
        self.depth.set(self.depth.get() - 1);
        if self.depth.get() == 0 {
            self.flush();
        }
        Ok(())
    }

    pub(crate) fn queue_set(&self, set: EntitySet) {
        self.pending_sets.borrow_mut().push_back(set);
    }

    pub(crate) fn queue_field(&self, field: Weak<GroupCore>) {
        self.pending_fields.borrow_mut().push_back(field);
    }

    /// Flush immediately when no bracket is open (single-mutation notification)
    pub(crate) fn flush_if_idle(&self) {
        if self.depth.get() == 0 {
            self.flush();
        }
    }

    fn flush(&self) {
        if self.flushing.get() {
            return;
        }
        self.flushing.set(true);

        let mut propagated: Vec<Rc<GroupCore>> = Vec::new();
        loop {
            let set = self.pending_sets.borrow_mut().pop_front();
            if let Some(set) = set {
                set.deliver_changes();
                continue;
            }
            let field = self.pending_fields.borrow_mut().pop_front();
            if let Some(field) = field {
                if let Some(core) = field.upgrade() {
                    core.propagate_changes();
                    propagated.push(core);
                }
                continue;
            }
            break;
        }

        for core in propagated {
            core.finish_change_cycle();
        }
        self.flushing.set(false);
    }
}

/// Closes a change bracket when dropped, guaranteeing begin/end pairing on all
/// exit paths
pub struct RegionChangeGuard {
    cache: Rc<ChangeCache>,
}

impl Drop for RegionChangeGuard {
    fn drop(&mut self) {
        // cannot underflow: the guard opened the bracket it closes
        let _ = self.cache.end();
    }
}

pub(crate) struct RegionData {
    id: usize,
    name: String,
    parent: RefCell<Weak<RegionData>>,
    children: RefCell<Vec<Region>>,
    nodes: EntitySet,
    datapoints: EntitySet,
    meshes: [EntitySet; 3],
    group_fields: RefCell<BTreeMap<String, Weak<GroupCore>>>,
    cache: Rc<ChangeCache>,
    next_region_id: Rc<Cell<usize>>,
}

/// A shared handle to one node of a region tree
///
/// Each region owns a nodeset, a datapoint set, and one element mesh per
/// topological dimension. Handles are reference counted; cloning shares the
/// underlying region. Change brackets opened through any region of a tree share
/// one counter for the whole tree.
#[derive(Clone)]
pub struct Region {
    data: Rc<RegionData>,
}

impl Region {
    /// Create the root of a new region tree
    pub fn create_root(name: impl Into<String>) -> Region {
        let cache = ChangeCache::new();
        let next_region_id = Rc::new(Cell::new(0));
        Self::build(name.into(), Weak::new(), cache, next_region_id)
    }

    fn build(
        name: String,
        parent: Weak<RegionData>,
        cache: Rc<ChangeCache>,
        next_region_id: Rc<Cell<usize>>,
    ) -> Region {
        let id = next_region_id.get();
        next_region_id.set(id + 1);

        Region {
            data: Rc::new(RegionData {
                id,
                name,
                parent: RefCell::new(parent),
                children: RefCell::new(Vec::new()),
                nodes: EntitySet::new(EntityKind::NodePoint, "nodes", cache.clone()),
                datapoints: EntitySet::new(EntityKind::DataPoint, "datapoints", cache.clone()),
                meshes: [
                    EntitySet::new(EntityKind::Element(1), "mesh1d", cache.clone()),
                    EntitySet::new(EntityKind::Element(2), "mesh2d", cache.clone()),
                    EntitySet::new(EntityKind::Element(3), "mesh3d", cache.clone()),
                ],
                group_fields: RefCell::new(BTreeMap::new()),
                cache,
                next_region_id,
            }),
        }
    }

    /// Create a child region with a name unique among this region's children
    pub fn create_child(&self, name: impl AsRef<str>) -> Result<Region, String> {
        if self.find_child(name.as_ref()).is_some() {
            return Err(format!(
                "Region '{}' already has a child named '{}'; Cannot create another!",
                self.data.name,
                name.as_ref()
            ));
        }
        let child = Self::build(
            String::from(name.as_ref()),
            Rc::downgrade(&self.data),
            self.data.cache.clone(),
            self.data.next_region_id.clone(),
        );
        self.data.children.borrow_mut().push(child.clone());
        Ok(child)
    }

    pub fn find_child(&self, name: &str) -> Option<Region> {
        self.data
            .children
            .borrow()
            .iter()
            .find(|child| child.data.name == name)
            .cloned()
    }

    pub fn parent(&self) -> Option<Region> {
        self.data.parent.borrow().upgrade().map(|data| Region { data })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Identifier unique within this region's tree
    pub fn id(&self) -> usize {
        self.data.id
    }

    /// True if both handles refer to the same region
    pub fn is_same(&self, other: &Region) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// True if `other` is this region or one of its descendants
    pub fn contains(&self, other: &Region) -> bool {
        let mut current = Some(other.clone());
        while let Some(region) = current {
            if self.is_same(&region) {
                return true;
            }
            current = region.parent();
        }
        false
    }

    /// The master nodeset for node points
    pub fn nodeset(&self) -> EntitySet {
        self.data.nodes.clone()
    }

    /// The master nodeset for data points
    pub fn datapoints(&self) -> EntitySet {
        self.data.datapoints.clone()
    }

    /// The master element mesh of the given topological dimension (1..=3)
    pub fn mesh(&self, dimension: u8) -> Result<EntitySet, String> {
        match dimension {
            1..=3 => Ok(self.data.meshes[dimension as usize - 1].clone()),
            _ => Err(format!(
                "Region '{}' has no mesh of dimension {}; Cannot retrieve it!",
                self.data.name, dimension
            )),
        }
    }

    /// Open a change bracket; notifications are deferred until the matching
    /// [end_change](Self::end_change)
    pub fn begin_change(&self) {
        self.data.cache.begin();
    }

    /// Close a change bracket; the outermost close flushes deferred notifications
    pub fn end_change(&self) -> Result<(), String> {
        self.data.cache.end()
    }

    /// Open a change bracket that closes itself when the guard is dropped
    pub fn change_guard(&self) -> RegionChangeGuard {
        self.data.cache.begin();
        RegionChangeGuard {
            cache: self.data.cache.clone(),
        }
    }

    pub(crate) fn change_cache(&self) -> Rc<ChangeCache> {
        self.data.cache.clone()
    }

    /// Register a group field under its name; fails if a live field of that name
    /// already exists on this region
    pub(crate) fn register_group_field(&self, name: &str, core: Weak<GroupCore>) -> bool {
        let mut fields = self.data.group_fields.borrow_mut();
        if let Some(existing) = fields.get(name) {
            if existing.strong_count() > 0 {
                return false;
            }
        }
        fields.insert(String::from(name), core);
        true
    }

    pub(crate) fn find_group_field_core(&self, name: &str) -> Option<Rc<GroupCore>> {
        self.data
            .group_fields
            .borrow()
            .get(name)
            .and_then(|weak| weak.upgrade())
    }

    /// Drop the registry entry for `name` if its field has been destroyed
    pub(crate) fn sweep_group_field_entry(&self, name: &str) {
        let mut fields = self.data.group_fields.borrow_mut();
        if let Some(entry) = fields.get(name) {
            if entry.strong_count() == 0 {
                fields.remove(name);
            }
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.data.id)
            .field("name", &self.data.name)
            .finish()
    }
}
