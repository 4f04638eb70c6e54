/// The generic change-log abstraction shared by every entity kind
pub mod change_log;
/// Identifier-keyed entity stores standing in for nodesets and element meshes
pub mod entity_set;
/// Region trees with change-notification brackets and the group-field registry
pub mod region;
