/// Tessellated surfaces with per-corner attribute storage
pub mod surface;
/// The texture-tiling engine: boundary splitting and per-tile binning
pub mod tiling;
