use super::change_log::{ChangeLog, EntityKind};
use super::region::ChangeCache;

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::rc::{Rc, Weak};

/// Receives entity set change notifications at the close of a change bracket
///
/// The relationship is non-owning in both directions: the set holds weak
/// references and drops observers that have gone away.
pub(crate) trait SetObserver {
    fn entity_set_changed(&self, set: &EntitySet, log: &ChangeLog);
}

/// A shared handle to an identifier-keyed store of finite element entities
///
/// One generic store stands in for nodesets and per-dimension element meshes; the
/// [EntityKind] tag says which namespace the identifiers live in. Handles are
/// reference counted: cloning a handle shares the same underlying set.
///
/// A set is either a *master* (the canonical region-owning store) or a *subset*
/// view defined relative to a master. Group membership is always defined against
/// the master, whichever handle was used to create the group.
#[derive(Clone)]
pub struct EntitySet {
    data: Rc<SetData>,
}

struct SetData {
    kind: EntityKind,
    name: String,
    master: Option<EntitySet>,
    entities: RefCell<BTreeSet<usize>>,
    log: RefCell<ChangeLog>,
    observers: RefCell<Vec<Weak<dyn SetObserver>>>,
    cache: Rc<ChangeCache>,
    queued: Cell<bool>,
}

impl EntitySet {
    pub(crate) fn new(kind: EntityKind, name: impl Into<String>, cache: Rc<ChangeCache>) -> Self {
        Self {
            data: Rc::new(SetData {
                kind,
                name: name.into(),
                master: None,
                entities: RefCell::new(BTreeSet::new()),
                log: RefCell::new(ChangeLog::new(kind)),
                observers: RefCell::new(Vec::new()),
                cache,
                queued: Cell::new(false),
            }),
        }
    }

    /// Create a named subset view of this set
    ///
    /// Subsets carry their own membership but share the master's identifier
    /// namespace; entity creation and destruction go through the master only.
    pub fn create_subset(&self, name: impl Into<String>) -> EntitySet {
        let master = self.master();
        Self {
            data: Rc::new(SetData {
                kind: master.data.kind,
                name: name.into(),
                master: Some(master.clone()),
                entities: RefCell::new(BTreeSet::new()),
                log: RefCell::new(ChangeLog::new(master.data.kind)),
                observers: RefCell::new(Vec::new()),
                cache: master.data.cache.clone(),
                queued: Cell::new(false),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.data.kind
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Stable identity of the underlying store, usable as a map key while any
    /// handle keeps the set alive
    pub(crate) fn identity_key(&self) -> usize {
        Rc::as_ptr(&self.data) as *const () as usize
    }

    pub fn is_master(&self) -> bool {
        self.data.master.is_none()
    }

    /// The canonical region-owning store this set is defined relative to
    /// (a new handle to self if this set is already the master)
    pub fn master(&self) -> EntitySet {
        match &self.data.master {
            Some(master) => master.clone(),
            None => self.clone(),
        }
    }

    /// True if both handles refer to the same underlying set
    pub fn same_set(&self, other: &EntitySet) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub fn contains(&self, identifier: usize) -> bool {
        self.data.entities.borrow().contains(&identifier)
    }

    pub fn size(&self) -> usize {
        self.data.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entities.borrow().is_empty()
    }

    /// Iterate entity identifiers in ascending order
    ///
    /// The iterator reads the set lazily, one identifier per step, so it stays
    /// valid across entity creation and destruction; call again to restart.
    pub fn entity_ids(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cursor: Option<usize> = None;
        std::iter::from_fn(move || {
            let entities = self.data.entities.borrow();
            let next = match cursor {
                None => entities.iter().next().copied(),
                Some(last) => entities
                    .range((Bound::Excluded(last), Bound::Unbounded))
                    .next()
                    .copied(),
            };
            cursor = next;
            next
        })
    }

    /// Add an entity with the given identifier to a master set
    pub fn create_entity(&self, identifier: usize) -> Result<(), String> {
        if !self.is_master() {
            return Err(format!(
                "'{}' is a subset; Cannot create {} {}!",
                self.data.name, self.data.kind, identifier
            ));
        }
        if !self.data.entities.borrow_mut().insert(identifier) {
            return Err(format!(
                "{} {} already exists in '{}'; Cannot create it again!",
                self.data.kind, identifier, self.data.name
            ));
        }
        self.data.log.borrow_mut().record_added();
        self.note_changed();
        Ok(())
    }

    /// Destroy an entity; groups observing this set prune the identifier when the
    /// enclosing change bracket closes
    pub fn destroy_entity(&self, identifier: usize) -> Result<(), String> {
        if !self.is_master() {
            return Err(format!(
                "'{}' is a subset; Cannot destroy {} {}!",
                self.data.name, self.data.kind, identifier
            ));
        }
        if !self.data.entities.borrow_mut().remove(&identifier) {
            return Err(format!(
                "{} {} does not exist in '{}'; Cannot destroy it!",
                self.data.kind, identifier, self.data.name
            ));
        }
        self.data.log.borrow_mut().record_removed();
        self.note_changed();
        Ok(())
    }

    pub(crate) fn add_observer(&self, observer: Weak<dyn SetObserver>) {
        self.data.observers.borrow_mut().push(observer);
    }

    fn note_changed(&self) {
        if !self.data.queued.replace(true) {
            self.data.cache.queue_set(self.clone());
        }
        self.data.cache.flush_if_idle();
    }

    /// Deliver the accumulated change log to live observers and reset it.
    /// Called by the change cache when the outermost bracket closes.
    pub(crate) fn deliver_changes(&self) {
        self.data.queued.set(false);
        let log = self.data.log.borrow_mut().take();
        let observers: Vec<Rc<dyn SetObserver>> = {
            let mut held = self.data.observers.borrow_mut();
            held.retain(|weak| weak.strong_count() > 0);
            held.iter().filter_map(|weak| weak.upgrade()).collect()
        };
        for observer in observers {
            observer.entity_set_changed(self, &log);
        }
    }
}

impl std::fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EntitySet")
            .field("kind", &self.data.kind)
            .field("name", &self.data.name)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fe::region::Region;

    #[test]
    fn entity_ids_are_ascending() {
        let region = Region::create_root("root");
        let nodes = region.nodeset();
        for id in [9, 2, 5, 1] {
            nodes.create_entity(id).unwrap();
        }
        assert_eq!(nodes.entity_ids().collect::<Vec<_>>(), vec![1, 2, 5, 9]);
        assert_eq!(nodes.size(), 4);
    }

    #[test]
    fn entity_id_iteration_is_lazy() {
        let region = Region::create_root("root");
        let nodes = region.nodeset();
        for id in [1, 5] {
            nodes.create_entity(id).unwrap();
        }

        let mut ids = nodes.entity_ids();
        assert_eq!(ids.next(), Some(1));

        // mutations between steps are picked up, in ascending order
        nodes.create_entity(3).unwrap();
        assert_eq!(ids.collect::<Vec<_>>(), vec![3, 5]);

        // a fresh call restarts from the beginning
        assert_eq!(nodes.entity_ids().next(), Some(1));
    }

    #[test]
    fn duplicate_creation_fails() {
        let region = Region::create_root("root");
        let nodes = region.nodeset();
        nodes.create_entity(4).unwrap();
        assert!(nodes.create_entity(4).is_err());
        assert!(nodes.destroy_entity(7).is_err());
    }

    #[test]
    fn subsets_defer_to_their_master() {
        let region = Region::create_root("root");
        let mesh = region.mesh(2).unwrap();
        let subset = mesh.create_subset("front faces");

        assert!(!subset.is_master());
        assert!(subset.master().same_set(&mesh));
        assert!(subset.create_entity(1).is_err());
        mesh.create_entity(1).unwrap();
        assert!(mesh.contains(1));
        assert!(!subset.contains(1));
    }
}
