//! Core structures for finite element visualization: hierarchical domain
//! groups over region trees, and a texture-tiling engine that splits
//! tessellated surfaces at texture-coordinate tile boundaries.
//!
//! The group side centers on [GroupField], a boolean-valued field whose
//! membership is built from whole regions, node and element subgroups, and
//! generic domain-object subgroups, with coalesced change notification through
//! reference-counted begin/end change brackets on the owning [Region] tree.
//!
//! The graphics side takes a [TileableSurface] of uniform polygon type and a
//! validated [TextureTiling] descriptor, cuts every polygon at integer tile
//! boundaries in tile-fractional texture space, and bins the pieces into one
//! output surface per non-empty tile.

/// Structures for region trees, entity stores and change logging
pub mod fe;
/// Structures implementing the group-field contract and its change algebra
pub mod fields;
/// Structures and functions for surface tessellation and texture tiling
pub mod graphics;

pub use fe::change_log::{ChangeLog, ChangeSummary, EntityKind};
pub use fe::entity_set::EntitySet;
pub use fe::region::{Region, RegionChangeGuard};
pub use fields::change::{ChangeDetail, GroupChange, HierarchicalChangeDetail};
pub use fields::group::{GroupError, GroupField};
pub use fields::location::FieldLocation;
pub use fields::subobject::{DomainObject, EntityGroup, ObjectGroup, SubgroupField};
pub use graphics::surface::{PolygonType, TileableSurface, Vertex};
pub use graphics::tiling::{tile_surface, tile_surface_parallel, TextureTiling, TilingError};

#[cfg(feature = "json_export")]
pub use graphics::surface::export_surfaces_to_json;
