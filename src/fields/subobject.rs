use super::change::{ChangeDetail, GroupChange};
use super::group::GroupCore;
use super::location::FieldLocation;
use crate::fe::change_log::ChangeLog;
use crate::fe::entity_set::{EntitySet, SetObserver};

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::rc::{Rc, Weak};

/// Capabilities every subobject group variant exposes to its owning group field
///
/// Group fields hold their local subgroups through this trait instead of
/// downcasting between field cores: clearing, emptiness and change reporting are
/// all the owner ever needs, and typed retrieval goes through [as_any_rc](Self::as_any_rc)
/// with an explicit error path when the stored variant is not the expected one.
pub trait SubgroupField {
    /// Remove all members; records a clear change unless already empty
    fn clear(&self);
    fn is_empty(&self) -> bool;
    /// Change accumulated for consumers since the last extraction
    fn change_detail(&self) -> GroupChange;
    /// Destructive read of the accumulated change; `None` if nothing happened.
    /// Call at most once per notification cycle per observer.
    fn extract_change_detail(&self) -> Option<GroupChange>;
    /// Destructive read of the change pending for the owning field's
    /// propagation pass
    fn take_pending_change(&self) -> GroupChange;
    fn evaluate(&self, location: &FieldLocation) -> bool;
    /// Sever the link to the owning field; further mutations notify nobody
    fn detach_owner(&self);
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Shared bookkeeping for the two change consumers of a subobject group: the
/// owning field (drained each propagation pass) and external observers
/// (drained by `extract_change_detail`)
#[derive(Default)]
struct ChangeSlots {
    accumulated: ChangeDetail,
    pending: ChangeDetail,
}

impl ChangeSlots {
    fn change_add(&mut self) {
        self.accumulated.change_add();
        self.pending.change_add();
    }

    fn change_remove(&mut self) {
        self.accumulated.change_remove();
        self.pending.change_remove();
    }

    fn change_clear(&mut self) {
        self.accumulated.change_clear();
        self.pending.change_clear();
    }
}

// ----------------------------------------------------------------------------------------------------
// FE-backed groups (nodes, data points, elements)
// ----------------------------------------------------------------------------------------------------

pub(crate) struct EntityGroupCore {
    master: EntitySet,
    members: RefCell<BTreeSet<usize>>,
    changes: RefCell<ChangeSlots>,
    owner: RefCell<Weak<GroupCore>>,
}

/// A membership set over the entities of one master nodeset or mesh
///
/// Identifiers iterate in ascending order. The group observes its master set and
/// prunes identifiers whose entities are destroyed externally, so it never refers
/// to a deleted entity. Handles are reference counted.
#[derive(Clone)]
pub struct EntityGroup {
    core: Rc<EntityGroupCore>,
}

impl EntityGroup {
    /// Bind a new group to `set`'s master. A subset handle may be passed; the
    /// master is substituted automatically since membership is always defined
    /// relative to it.
    pub(crate) fn attach(set: &EntitySet, owner: Weak<GroupCore>) -> EntityGroup {
        let master = set.master();
        let core = Rc::new(EntityGroupCore {
            master: master.clone(),
            members: RefCell::new(BTreeSet::new()),
            changes: RefCell::new(ChangeSlots::default()),
            owner: RefCell::new(owner),
        });
        master.add_observer(Rc::downgrade(&core) as Weak<dyn SetObserver>);
        EntityGroup { core }
    }

    pub fn master(&self) -> EntitySet {
        self.core.master.clone()
    }

    /// Add the entity with the given identifier
    ///
    /// Fails without a state change if the identifier is already a member or the
    /// master set holds no such entity.
    pub fn add(&self, identifier: usize) -> Result<(), String> {
        if !self.core.master.contains(identifier) {
            return Err(format!(
                "{} {} is not in '{}'; Cannot add it to the group!",
                self.core.master.kind(),
                identifier,
                self.core.master.name()
            ));
        }
        if !self.core.members.borrow_mut().insert(identifier) {
            return Err(format!(
                "{} {} is already in the group; Cannot add it again!",
                self.core.master.kind(),
                identifier
            ));
        }
        self.core.changes.borrow_mut().change_add();
        self.core.notify_owner();
        Ok(())
    }

    /// Remove the entity with the given identifier
    ///
    /// A removal that empties the group is classified as a clear.
    pub fn remove(&self, identifier: usize) -> Result<(), String> {
        let mut members = self.core.members.borrow_mut();
        if !members.remove(&identifier) {
            return Err(format!(
                "{} {} is not in the group; Cannot remove it!",
                self.core.master.kind(),
                identifier
            ));
        }
        let now_empty = members.is_empty();
        drop(members);

        let mut changes = self.core.changes.borrow_mut();
        if now_empty {
            changes.change_clear();
        } else {
            changes.change_remove();
        }
        drop(changes);
        self.core.notify_owner();
        Ok(())
    }

    pub fn contains(&self, identifier: usize) -> bool {
        self.core.members.borrow().contains(&identifier)
    }

    pub fn size(&self) -> usize {
        self.core.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.members.borrow().is_empty()
    }

    /// Iterate member identifiers in ascending order
    ///
    /// The iterator reads the group lazily, one identifier per step, so it
    /// stays valid across membership changes and pruning; call again to
    /// restart.
    pub fn member_ids(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cursor: Option<usize> = None;
        std::iter::from_fn(move || {
            let members = self.core.members.borrow();
            let next = match cursor {
                None => members.iter().next().copied(),
                Some(last) => members
                    .range((Bound::Excluded(last), Bound::Unbounded))
                    .next()
                    .copied(),
            };
            cursor = next;
            next
        })
    }

    pub fn clear(&self) {
        SubgroupField::clear(&*self.core);
    }

    pub fn change_detail(&self) -> GroupChange {
        self.core.changes.borrow().accumulated.change()
    }

    pub fn extract_change_detail(&self) -> Option<GroupChange> {
        SubgroupField::extract_change_detail(&*self.core)
    }

    pub fn evaluate(&self, location: &FieldLocation) -> bool {
        SubgroupField::evaluate(&*self.core, location)
    }

    pub(crate) fn core(&self) -> Rc<EntityGroupCore> {
        self.core.clone()
    }
}

impl EntityGroupCore {
    fn notify_owner(&self) {
        if let Some(owner) = self.owner.borrow().upgrade() {
            owner.note_subgroup_change();
        }
    }
}

impl SubgroupField for EntityGroupCore {
    fn clear(&self) {
        let mut members = self.members.borrow_mut();
        if members.is_empty() {
            return;
        }
        members.clear();
        drop(members);
        self.changes.borrow_mut().change_clear();
        self.notify_owner();
    }

    fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    fn change_detail(&self) -> GroupChange {
        self.changes.borrow().accumulated.change()
    }

    fn extract_change_detail(&self) -> Option<GroupChange> {
        let mut changes = self.changes.borrow_mut();
        let change = changes.accumulated.change();
        changes.accumulated.reset();
        match change {
            GroupChange::None => None,
            reported => Some(reported),
        }
    }

    fn take_pending_change(&self) -> GroupChange {
        let mut changes = self.changes.borrow_mut();
        let change = changes.pending.change();
        changes.pending.reset();
        change
    }

    fn detach_owner(&self) {
        *self.owner.borrow_mut() = Weak::new();
    }

    fn evaluate(&self, location: &FieldLocation) -> bool {
        match location {
            FieldLocation::Node { nodeset, node_id } => {
                !self.master.kind().is_element()
                    && self.master.same_set(&nodeset.master())
                    && self.members.borrow().contains(node_id)
            }
            FieldLocation::Element {
                mesh, element_id, ..
            } => {
                self.master.kind() == mesh.kind()
                    && self.master.same_set(&mesh.master())
                    && self.members.borrow().contains(element_id)
            }
        }
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl SetObserver for EntityGroupCore {
    fn entity_set_changed(&self, set: &EntitySet, log: &ChangeLog) {
        // only a removal can invalidate held identifiers
        if !log.summary().removed {
            return;
        }
        let mut members = self.members.borrow_mut();
        let held = members.len();
        members.retain(|identifier| set.contains(*identifier));
        if members.len() == held {
            return;
        }
        let now_empty = members.is_empty();
        drop(members);

        let mut changes = self.changes.borrow_mut();
        if now_empty {
            changes.change_clear();
        } else {
            changes.change_remove();
        }
        drop(changes);
        self.notify_owner();
    }
}

// ----------------------------------------------------------------------------------------------------
// Generic domain-object groups
// ----------------------------------------------------------------------------------------------------

/// An object that belongs to exactly one domain (an [EntitySet]) and carries a
/// stable identifier unique within it
pub trait DomainObject: Clone + 'static {
    fn identifier(&self) -> usize;
    fn domain(&self) -> &EntitySet;
}

pub(crate) struct ObjectGroupCore<T: DomainObject> {
    master: EntitySet,
    members: RefCell<Vec<T>>,
    index: RefCell<HashMap<usize, usize>>,
    changes: RefCell<ChangeSlots>,
    owner: RefCell<Weak<GroupCore>>,
}

/// The generic subobject group: an identifier-keyed membership set over objects
/// of an arbitrary non-mesh domain, iterating in insertion order
///
/// An object is rejected unless its owning domain is exactly this group's
/// configured master.
#[derive(Clone)]
pub struct ObjectGroup<T: DomainObject> {
    core: Rc<ObjectGroupCore<T>>,
}

impl<T: DomainObject> ObjectGroup<T> {
    pub(crate) fn attach(domain: &EntitySet, owner: Weak<GroupCore>) -> ObjectGroup<T> {
        ObjectGroup {
            core: Rc::new(ObjectGroupCore {
                master: domain.master(),
                members: RefCell::new(Vec::new()),
                index: RefCell::new(HashMap::new()),
                changes: RefCell::new(ChangeSlots::default()),
                owner: RefCell::new(owner),
            }),
        }
    }

    pub(crate) fn from_core(core: Rc<ObjectGroupCore<T>>) -> ObjectGroup<T> {
        ObjectGroup { core }
    }

    pub fn master(&self) -> EntitySet {
        self.core.master.clone()
    }

    /// Add an object; fails if its identifier is already present or its owning
    /// domain is not this group's master
    pub fn add(&self, object: T) -> Result<(), String> {
        if !object.domain().master().same_set(&self.core.master) {
            return Err(format!(
                "object {} belongs to domain '{}', not '{}'; Cannot add it to the group!",
                object.identifier(),
                object.domain().name(),
                self.core.master.name()
            ));
        }
        let identifier = object.identifier();
        let mut index = self.core.index.borrow_mut();
        if index.contains_key(&identifier) {
            return Err(format!(
                "object {} is already in the group; Cannot add it again!",
                identifier
            ));
        }
        let mut members = self.core.members.borrow_mut();
        index.insert(identifier, members.len());
        members.push(object);
        drop(members);
        drop(index);

        self.core.changes.borrow_mut().change_add();
        self.core.notify_owner();
        Ok(())
    }

    /// Remove the object with the given identifier; a removal that empties the
    /// group is classified as a clear
    pub fn remove(&self, identifier: usize) -> Result<(), String> {
        let mut index = self.core.index.borrow_mut();
        let position = match index.remove(&identifier) {
            Some(position) => position,
            None => {
                return Err(format!(
                    "object {} is not in the group; Cannot remove it!",
                    identifier
                ));
            }
        };
        let mut members = self.core.members.borrow_mut();
        members.remove(position);
        for shifted in index.values_mut() {
            if *shifted > position {
                *shifted -= 1;
            }
        }
        let now_empty = members.is_empty();
        drop(members);
        drop(index);

        let mut changes = self.core.changes.borrow_mut();
        if now_empty {
            changes.change_clear();
        } else {
            changes.change_remove();
        }
        drop(changes);
        self.core.notify_owner();
        Ok(())
    }

    pub fn contains(&self, identifier: usize) -> bool {
        self.core.index.borrow().contains_key(&identifier)
    }

    pub fn get(&self, identifier: usize) -> Option<T> {
        let index = self.core.index.borrow();
        index
            .get(&identifier)
            .map(|position| self.core.members.borrow()[*position].clone())
    }

    pub fn size(&self) -> usize {
        self.core.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.members.borrow().is_empty()
    }

    /// Members in insertion order; a fresh snapshot each call
    pub fn members(&self) -> Vec<T> {
        self.core.members.borrow().clone()
    }

    pub fn clear(&self) {
        SubgroupField::clear(&*self.core);
    }

    pub fn change_detail(&self) -> GroupChange {
        self.core.changes.borrow().accumulated.change()
    }

    pub fn extract_change_detail(&self) -> Option<GroupChange> {
        SubgroupField::extract_change_detail(&*self.core)
    }

    pub(crate) fn core(&self) -> Rc<ObjectGroupCore<T>> {
        self.core.clone()
    }
}

impl<T: DomainObject> ObjectGroupCore<T> {
    fn notify_owner(&self) {
        if let Some(owner) = self.owner.borrow().upgrade() {
            owner.note_subgroup_change();
        }
    }
}

impl<T: DomainObject> SubgroupField for ObjectGroupCore<T> {
    fn clear(&self) {
        let mut members = self.members.borrow_mut();
        if members.is_empty() {
            return;
        }
        members.clear();
        self.index.borrow_mut().clear();
        drop(members);
        self.changes.borrow_mut().change_clear();
        self.notify_owner();
    }

    fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    fn change_detail(&self) -> GroupChange {
        self.changes.borrow().accumulated.change()
    }

    fn extract_change_detail(&self) -> Option<GroupChange> {
        let mut changes = self.changes.borrow_mut();
        let change = changes.accumulated.change();
        changes.accumulated.reset();
        match change {
            GroupChange::None => None,
            reported => Some(reported),
        }
    }

    fn take_pending_change(&self) -> GroupChange {
        let mut changes = self.changes.borrow_mut();
        let change = changes.pending.change();
        changes.pending.reset();
        change
    }

    fn detach_owner(&self) {
        *self.owner.borrow_mut() = Weak::new();
    }

    fn evaluate(&self, _location: &FieldLocation) -> bool {
        // generic domain objects have no node or element locations
        false
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
