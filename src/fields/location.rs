use crate::fe::entity_set::EntitySet;

/// A domain location at which a field can be evaluated
///
/// Group fields are boolean-valued: they evaluate to `true` exactly at locations
/// considered "in" the group, and to `false` at any location kind they do not
/// recognize (which is not an error).
#[derive(Clone, Debug)]
pub enum FieldLocation {
    /// A node or data point, identified within its owning set
    Node { nodeset: EntitySet, node_id: usize },
    /// A point inside an element, at local coordinate `xi`
    Element {
        mesh: EntitySet,
        element_id: usize,
        xi: [f64; 3],
    },
}

impl FieldLocation {
    pub fn node(nodeset: &EntitySet, node_id: usize) -> Self {
        Self::Node {
            nodeset: nodeset.clone(),
            node_id,
        }
    }

    pub fn element(mesh: &EntitySet, element_id: usize, xi: [f64; 3]) -> Self {
        Self::Element {
            mesh: mesh.clone(),
            element_id,
            xi,
        }
    }
}
