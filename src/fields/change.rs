use std::fmt;

/// Classification of a change to a group's membership since it was last reported
///
/// The variants are ordered from "nothing happened" to "everything may have happened":
/// a single classification summarizes an arbitrary sequence of mutations well enough
/// for a consumer to decide between an incremental update and a full rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupChange {
    /// No members were added or removed
    #[default]
    None,
    /// Members were added; none were removed
    Add,
    /// Members were removed; none were added
    Remove,
    /// All members were removed
    Clear,
    /// Members were both added and removed; treat the membership as rewritten
    Replace,
}

impl GroupChange {
    /// Combine two independently observed changes into one classification
    ///
    /// Used both to coalesce multiple mutations on the same group and to roll a
    /// descendant group's change up into an ancestor's non-local slot. A `Clear`
    /// observed elsewhere degrades to `Remove` from the combined point of view,
    /// since this group may still hold members of its own.
    pub fn merged_with(self, other: Self) -> Self {
        match (self, other) {
            (a, Self::None) => a,
            (Self::None, Self::Clear) => Self::Remove,
            (Self::Add, Self::Clear) => Self::Replace,
            (a, Self::Clear) => a,
            (Self::None, b) => b,
            _ => Self::Replace,
        }
    }
}

impl fmt::Display for GroupChange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Add => write!(f, "ADD"),
            Self::Remove => write!(f, "REMOVE"),
            Self::Clear => write!(f, "CLEAR"),
            Self::Replace => write!(f, "REPLACE"),
        }
    }
}

/// Accumulates a [GroupChange] across a sequence of mutations
///
/// The transition table trusts the caller to classify emptiness: call
/// [change_clear](Self::change_clear) when the underlying collection becomes empty and
/// [change_add](Self::change_add)/[change_remove](Self::change_remove) otherwise. The
/// detail itself never inspects the collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeDetail {
    change: GroupChange,
}

impl ChangeDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change(&self) -> GroupChange {
        self.change
    }

    /// Reset to `None`; called after the accumulated change has been reported
    pub fn reset(&mut self) {
        self.change = GroupChange::None;
    }

    /// Record that one or more members were added
    pub fn change_add(&mut self) {
        self.change = match self.change {
            GroupChange::None => GroupChange::Add,
            GroupChange::Clear | GroupChange::Remove => GroupChange::Replace,
            unchanged => unchanged,
        };
    }

    /// Record that one or more members were removed (but some remain)
    pub fn change_remove(&mut self) {
        self.change = match self.change {
            GroupChange::None => GroupChange::Remove,
            GroupChange::Add => GroupChange::Replace,
            unchanged => unchanged,
        };
    }

    /// Record that all members were removed
    pub fn change_clear(&mut self) {
        self.change = GroupChange::Clear;
    }

    /// Fold an independently observed change into this detail
    pub fn merge(&mut self, other: GroupChange) {
        self.change = self.change.merged_with(other);
    }

    pub fn set(&mut self, change: GroupChange) {
        self.change = change;
    }
}

/// Change detail for a hierarchical group: a **local** slot for changes to this
/// region's own direct members and a **non-local** slot for changes aggregated
/// from descendant regions
///
/// Keeping the slots separate lets a consumer distinguish "this exact region
/// changed" from "something in a descendant changed", so it can re-render just
/// one level instead of rebuilding the whole subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HierarchicalChangeDetail {
    local: ChangeDetail,
    non_local: ChangeDetail,
}

impl HierarchicalChangeDetail {
    pub fn new() -> Self {
        Self::default()
    }

    /// The combined classification: `merge(local, non_local)`
    pub fn change(&self) -> GroupChange {
        self.local.change().merged_with(self.non_local.change())
    }

    pub fn local_change(&self) -> GroupChange {
        self.local.change()
    }

    pub fn non_local_change(&self) -> GroupChange {
        self.non_local.change()
    }

    pub fn local_mut(&mut self) -> &mut ChangeDetail {
        &mut self.local
    }

    pub fn non_local_mut(&mut self) -> &mut ChangeDetail {
        &mut self.non_local
    }

    pub fn reset(&mut self) {
        self.local.reset();
        self.non_local.reset();
    }
}
