use std::fmt;

/// The kind of finite element entity an [EntitySet](super::entity_set::EntitySet) stores
///
/// One tagged kind replaces a family of near-identical per-kind change-log types:
/// every entity namespace (node points, data points, elements of each topological
/// dimension) shares the same identifier, enumeration, and change-summary machinery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    /// Node points carrying interpolated field parameters
    NodePoint,
    /// Data points: sparse sample locations not used for interpolation
    DataPoint,
    /// Elements of the given topological dimension (1..=3)
    Element(u8),
}

impl EntityKind {
    /// The topological dimension for element kinds; `None` for point kinds
    pub fn dimension(&self) -> Option<u8> {
        match self {
            Self::Element(dimension) => Some(*dimension),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element(_))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NodePoint => write!(f, "node"),
            Self::DataPoint => write!(f, "datapoint"),
            Self::Element(dimension) => write!(f, "{}d element", dimension),
        }
    }
}

/// Per-cycle summary of what happened to an entity set, queryable before iterating
///
/// Group pruning uses this as a gate: a membership scan is only worthwhile when at
/// least one entity of the relevant kind was removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub added: bool,
    pub removed: bool,
    pub modified: bool,
}

impl ChangeSummary {
    pub fn any(&self) -> bool {
        self.added || self.removed || self.modified
    }
}

/// Accumulated change information for one entity set over one update cycle
#[derive(Clone, Debug)]
pub struct ChangeLog {
    kind: EntityKind,
    summary: ChangeSummary,
}

impl ChangeLog {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            summary: ChangeSummary::default(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn summary(&self) -> ChangeSummary {
        self.summary
    }

    pub fn record_added(&mut self) {
        self.summary.added = true;
    }

    pub fn record_removed(&mut self) {
        self.summary.removed = true;
    }

    pub fn record_modified(&mut self) {
        self.summary.modified = true;
    }

    /// Take the accumulated log for delivery, leaving an empty one in place
    pub fn take(&mut self) -> ChangeLog {
        let taken = self.clone();
        self.summary = ChangeSummary::default();
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_accumulates_and_take_resets() {
        let mut log = ChangeLog::new(EntityKind::Element(2));
        assert!(!log.summary().any());

        log.record_added();
        log.record_removed();
        assert!(log.summary().added);
        assert!(log.summary().removed);
        assert!(!log.summary().modified);

        let taken = log.take();
        assert!(taken.summary().removed);
        assert_eq!(taken.kind(), EntityKind::Element(2));
        assert!(!log.summary().any());
    }

    #[test]
    fn kind_dimensions() {
        assert_eq!(EntityKind::NodePoint.dimension(), None);
        assert_eq!(EntityKind::Element(3).dimension(), Some(3));
        assert!(EntityKind::Element(1).is_element());
        assert!(!EntityKind::DataPoint.is_element());
    }
}
