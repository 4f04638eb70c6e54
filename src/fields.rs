/// The change-detail algebra shared by all group variants
pub mod change;
/// Hierarchical region groups implementing the boolean field contract
pub mod group;
/// Domain locations at which fields are evaluated
pub mod location;
/// Membership sets over nodes, elements and generic domain objects
pub mod subobject;
