use super::surface::{PolygonType, TileableSurface, Vertex};

use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Corners of one polygon in winding order
type Corners = SmallVec<[Vertex; 4]>;

/// Two texture coordinates within this distance of each other (in
/// tile-fractional units) lie on the same cut boundary
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Rescaled texture coordinates this close to the period are clamped strictly
/// below it so per-tile lookups stay inside [0, period)
const CLAMP_TOLERANCE: f64 = 1e-7;

#[derive(Clone, Debug, PartialEq)]
pub enum TilingError {
    BadDimension(u8),
    BadTileCount(usize, usize),
    BadPeriod(usize, f64),
    BadTileSize(usize, usize),
    BadOverlapFraction(f64),
    OverlapConsumesTile(usize),
    Surface(String),
}

impl fmt::Display for TilingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadDimension(dimension) => {
                write!(f, "Texture tilings have 1 to 3 axes, not {}; Cannot construct tiling!", dimension)
            }
            Self::BadTileCount(axis, count) => {
                write!(f, "Tile count {} on axis {} is not positive; Cannot construct tiling!", count, axis)
            }
            Self::BadPeriod(axis, period) => {
                write!(f, "Period {} on axis {} is not positive; Cannot construct tiling!", period, axis)
            }
            Self::BadTileSize(axis, size) => {
                write!(f, "Tile size {} texels on axis {} is not positive; Cannot construct tiling!", size, axis)
            }
            Self::BadOverlapFraction(fraction) => {
                write!(f, "Overlap fraction {} is outside [0, 1); Cannot construct tiling!", fraction)
            }
            Self::OverlapConsumesTile(axis) => {
                write!(f, "The overlap range consumes the whole period on axis {}; Cannot construct tiling!", axis)
            }
            Self::Surface(message) => write!(f, "{}", message),
        }
    }
}

/// A validated texture-tiling descriptor
///
/// `period` is the texture-coordinate span of one tile before overlap;
/// `tile_size` is the tile's extent in texels and affects overlap-range scaling
/// only. Entries for axes beyond `dimension` are ignored.
#[derive(Clone, Debug)]
pub struct TextureTiling {
    dimension: u8,
    tile_counts: [usize; 3],
    periods: [f64; 3],
    tile_sizes: [usize; 3],
    overlap_fraction: f64,
}

impl TextureTiling {
    pub fn new(
        dimension: u8,
        tile_counts: [usize; 3],
        periods: [f64; 3],
        tile_sizes: [usize; 3],
        overlap_fraction: f64,
    ) -> Result<Self, TilingError> {
        if !(1..=3).contains(&dimension) {
            return Err(TilingError::BadDimension(dimension));
        }
        if !(0.0..1.0).contains(&overlap_fraction) {
            return Err(TilingError::BadOverlapFraction(overlap_fraction));
        }
        let tiling = Self {
            dimension,
            tile_counts,
            periods,
            tile_sizes,
            overlap_fraction,
        };
        for axis in 0..dimension as usize {
            if tile_counts[axis] == 0 {
                return Err(TilingError::BadTileCount(axis, tile_counts[axis]));
            }
            if periods[axis] <= 0.0 {
                return Err(TilingError::BadPeriod(axis, periods[axis]));
            }
            if tile_sizes[axis] == 0 {
                return Err(TilingError::BadTileSize(axis, tile_sizes[axis]));
            }
            if tiling.effective_period(axis) <= 0.0 {
                return Err(TilingError::OverlapConsumesTile(axis));
            }
        }
        Ok(tiling)
    }

    pub fn dimension(&self) -> u8 {
        self.dimension
    }

    pub fn tile_count(&self, axis: usize) -> usize {
        self.tile_counts[axis]
    }

    pub fn period(&self, axis: usize) -> f64 {
        self.periods[axis]
    }

    /// The coordinate span reserved for blending with the adjacent tile
    pub fn overlap_range(&self, axis: usize) -> f64 {
        2.0 * self.overlap_fraction * self.periods[axis] / self.tile_sizes[axis] as f64
    }

    /// The period with the overlap range subtracted; one unit of
    /// tile-fractional coordinate spans this much texture coordinate
    pub fn effective_period(&self, axis: usize) -> f64 {
        self.periods[axis] - self.overlap_range(axis)
    }
}

/// Split a surface at texture-coordinate tile boundaries and bin the pieces
/// into per-tile surfaces
///
/// Axes are processed sequentially, each pass consuming the previous pass's
/// output. Quads whose texture coordinates are axis-aligned are split with a
/// shared-parameter leg interpolation; a surface containing any non-aligned
/// quad on a cutting axis is triangulated (corners 0-1-2 and 1-3-2) before that
/// pass so every output surface stays uniform in polygon type. Every resulting
/// polygon is assigned to exactly one tile by its centroid's tile-fractional
/// coordinates, wrapped per axis by the tile count, and its texture coordinates
/// are rescaled into [0, period) for that tile. Empty tiles are never
/// materialized.
pub fn tile_surface(
    tiling: &TextureTiling,
    surface: TileableSurface,
) -> Result<Vec<TileableSurface>, TilingError> {
    run_tiling(tiling, surface, false)
}

/// Identical to [tile_surface], with each cutting pass splitting its polygons
/// in parallel; output ordering matches the serial version
pub fn tile_surface_parallel(
    tiling: &TextureTiling,
    surface: TileableSurface,
) -> Result<Vec<TileableSurface>, TilingError> {
    run_tiling(tiling, surface, true)
}

fn run_tiling(
    tiling: &TextureTiling,
    surface: TileableSurface,
    parallel: bool,
) -> Result<Vec<TileableSurface>, TilingError> {
    let mut current = surface;
    for axis in 0..tiling.dimension as usize {
        current = split_surface_along_axis(tiling, &current, axis, parallel)?;
    }
    bin_and_rescale(tiling, &current)
}

// ----------------------------------------------------------------------------------------------------
// Per-axis cutting passes
// ----------------------------------------------------------------------------------------------------

fn split_surface_along_axis(
    tiling: &TextureTiling,
    surface: &TileableSurface,
    axis: usize,
    parallel: bool,
) -> Result<TileableSurface, TilingError> {
    let inv_period = 1.0 / tiling.effective_period(axis);

    let triangulated;
    let working = if surface.polygon_type() == PolygonType::Quad
        && !all_quads_aligned(surface, axis, inv_period)
    {
        triangulated = triangulate(surface)?;
        &triangulated
    } else {
        surface
    };

    let polygon_type = working.polygon_type();
    let polygons: Vec<Corners> = working.polygons().collect();
    let split_one = |corners: &Corners| match polygon_type {
        PolygonType::Quad => split_aligned_quad(corners, axis, inv_period),
        PolygonType::Triangle => split_triangle(corners, axis, inv_period),
    };
    let pieces: Vec<Vec<Corners>> = if parallel {
        polygons.par_iter().map(split_one).collect()
    } else {
        polygons.iter().map(split_one).collect()
    };

    let mut output = working.empty_like(polygon_type);
    for polygon_pieces in pieces {
        for piece in polygon_pieces {
            output.push_polygon(&piece).map_err(TilingError::Surface)?;
        }
    }
    Ok(output)
}

fn fractional(corner: &Vertex, axis: usize, inv_period: f64) -> f64 {
    corner.texture[axis] * inv_period
}

/// True if the quad's texture coordinates pair up along this axis: the cut can
/// then run with one shared parameter on both legs
fn quad_is_aligned(corners: &Corners, axis: usize, inv_period: f64) -> bool {
    let close = |a: usize, b: usize| {
        (fractional(&corners[a], axis, inv_period) - fractional(&corners[b], axis, inv_period)).abs()
            < BOUNDARY_TOLERANCE
    };
    (close(0, 1) && close(2, 3)) || (close(0, 2) && close(1, 3))
}

fn all_quads_aligned(surface: &TileableSurface, axis: usize, inv_period: f64) -> bool {
    surface
        .polygons()
        .all(|corners| quad_is_aligned(&corners, axis, inv_period))
}

fn triangulate(surface: &TileableSurface) -> Result<TileableSurface, TilingError> {
    let mut output = surface.empty_like(PolygonType::Triangle);
    for quad in surface.polygons() {
        // grid corner order: 0 bottom-left, 1 bottom-right, 2 top-left, 3 top-right
        output
            .push_polygon(&[quad[0].clone(), quad[1].clone(), quad[2].clone()])
            .map_err(TilingError::Surface)?;
        output
            .push_polygon(&[quad[1].clone(), quad[3].clone(), quad[2].clone()])
            .map_err(TilingError::Surface)?;
    }
    Ok(output)
}

/// Integer boundaries strictly between `start` and `end`, as interpolation
/// parameters in (0, 1) ordered from `start` toward `end`
fn cut_parameters(start: f64, end: f64) -> Vec<f64> {
    let span = end - start;
    if span.abs() < BOUNDARY_TOLERANCE {
        return Vec::new();
    }
    let lo = start.min(end);
    let hi = start.max(end);
    let mut parameters = Vec::new();
    let mut boundary = lo.floor() + 1.0;
    while boundary < hi - BOUNDARY_TOLERANCE {
        parameters.push((boundary - start) / span);
        boundary += 1.0;
    }
    parameters.sort_by(f64::total_cmp);
    parameters
}

/// Split an axis-aligned quad into strips with one shared cut parameter on both
/// legs, preserving grid corner order
fn split_aligned_quad(corners: &Corners, axis: usize, inv_period: f64) -> Vec<Corners> {
    let f: Vec<f64> = corners
        .iter()
        .map(|corner| fractional(corner, axis, inv_period))
        .collect();

    // legs run across the axis: bottom-to-top when the rows pair up,
    // left-to-right when the columns do
    let rows_aligned = (f[0] - f[1]).abs() < BOUNDARY_TOLERANCE;
    let (leg_a, leg_b, start, end) = if rows_aligned {
        ((0usize, 2usize), (1usize, 3usize), f[0], f[2])
    } else {
        ((0, 1), (2, 3), f[0], f[1])
    };

    let parameters = cut_parameters(start, end);
    if parameters.is_empty() {
        return vec![corners.clone()];
    }

    let mut cut_points = Vec::with_capacity(parameters.len() + 2);
    cut_points.push(0.0);
    cut_points.extend(parameters);
    cut_points.push(1.0);

    let leg_point = |leg: (usize, usize), t: f64| {
        corners[leg.0].interpolated_toward(&corners[leg.1], t)
    };
    cut_points
        .windows(2)
        .map(|window| {
            let (p, q) = (window[0], window[1]);
            if rows_aligned {
                SmallVec::from_vec(vec![
                    leg_point(leg_a, p),
                    leg_point(leg_b, p),
                    leg_point(leg_a, q),
                    leg_point(leg_b, q),
                ])
            } else {
                SmallVec::from_vec(vec![
                    leg_point(leg_a, p),
                    leg_point(leg_a, q),
                    leg_point(leg_b, p),
                    leg_point(leg_b, q),
                ])
            }
        })
        .collect()
}

/// Split a triangle by clipping it against each tile-fractional slab it spans,
/// fan-triangulating the convex clipped pieces; winding order is preserved
fn split_triangle(corners: &Corners, axis: usize, inv_period: f64) -> Vec<Corners> {
    let ring: Vec<(Vertex, f64)> = corners
        .iter()
        .map(|corner| (corner.clone(), fractional(corner, axis, inv_period)))
        .collect();
    let lo = ring.iter().map(|(_, f)| *f).fold(f64::INFINITY, f64::min);
    let hi = ring.iter().map(|(_, f)| *f).fold(f64::NEG_INFINITY, f64::max);

    let first_boundary = lo.floor() + 1.0;
    if first_boundary >= hi - BOUNDARY_TOLERANCE {
        return vec![corners.clone()];
    }

    let mut edges = vec![f64::NEG_INFINITY];
    let mut boundary = first_boundary;
    while boundary < hi - BOUNDARY_TOLERANCE {
        edges.push(boundary);
        boundary += 1.0;
    }
    edges.push(f64::INFINITY);

    let mut pieces = Vec::new();
    for window in edges.windows(2) {
        let mut piece = clip_to_half_plane(ring.clone(), window[0], true);
        piece = clip_to_half_plane(piece, window[1], false);
        dedup_ring(&mut piece);
        if piece.len() < 3 {
            continue;
        }
        for i in 1..piece.len() - 1 {
            pieces.push(SmallVec::from_vec(vec![
                piece[0].0.clone(),
                piece[i].0.clone(),
                piece[i + 1].0.clone(),
            ]));
        }
    }
    pieces
}

fn clip_to_half_plane(
    ring: Vec<(Vertex, f64)>,
    boundary: f64,
    keep_above: bool,
) -> Vec<(Vertex, f64)> {
    if !boundary.is_finite() {
        return ring;
    }
    let inside = |f: f64| {
        if keep_above {
            f >= boundary
        } else {
            f <= boundary
        }
    };
    let mut clipped = Vec::with_capacity(ring.len() + 1);
    for i in 0..ring.len() {
        let (current, f_current) = &ring[i];
        let (next, f_next) = &ring[(i + 1) % ring.len()];
        if inside(*f_current) {
            clipped.push((current.clone(), *f_current));
        }
        if inside(*f_current) != inside(*f_next) {
            let t = (boundary - f_current) / (f_next - f_current);
            clipped.push((current.interpolated_toward(next, t), boundary));
        }
    }
    clipped
}

/// Drop repeated ring vertices introduced by clipping exactly through a corner
fn dedup_ring(ring: &mut Vec<(Vertex, f64)>) {
    ring.dedup_by(|a, b| (a.0.position - b.0.position).norm_squared() < 1e-24);
    while ring.len() > 1 {
        let wrapped_duplicate = {
            let first = &ring[0].0.position;
            let last = &ring[ring.len() - 1].0.position;
            (first - last).norm_squared() < 1e-24
        };
        if wrapped_duplicate {
            ring.pop();
        } else {
            break;
        }
    }
}

// ----------------------------------------------------------------------------------------------------
// Binning and per-tile rescale
// ----------------------------------------------------------------------------------------------------

/// Assign each polygon to one tile by its centroid's tile-fractional
/// coordinates (wrapped per axis) and rescale its texture coordinates into
/// [0, period) for that tile
fn bin_and_rescale(
    tiling: &TextureTiling,
    surface: &TileableSurface,
) -> Result<Vec<TileableSurface>, TilingError> {
    let dimension = tiling.dimension as usize;
    let mut bins: BTreeMap<usize, TileableSurface> = BTreeMap::new();

    for polygon in surface.polygons() {
        let mut tile_index = 0;
        let mut stride = 1;
        let mut cells = [0.0_f64; 3];
        for axis in 0..dimension {
            let inv_period = 1.0 / tiling.effective_period(axis);
            let centroid = polygon
                .iter()
                .map(|corner| fractional(corner, axis, inv_period))
                .sum::<f64>()
                / polygon.len() as f64;
            let cell = centroid.floor();
            cells[axis] = cell;
            let wrapped = (cell as i64).rem_euclid(tiling.tile_counts[axis] as i64) as usize;
            tile_index += stride * wrapped;
            stride *= tiling.tile_counts[axis];
        }

        let mut corners = polygon;
        for corner in corners.iter_mut() {
            for axis in 0..dimension {
                let rescaled = corner.texture[axis] - cells[axis] * tiling.effective_period(axis);
                let limit = tiling.periods[axis] - CLAMP_TOLERANCE;
                corner.texture[axis] = rescaled.min(limit);
            }
        }

        let bin = bins.entry(tile_index).or_insert_with(|| {
            let mut tile = surface.empty_like(surface.polygon_type());
            tile.set_tile_number(tile_index);
            tile
        });
        bin.push_polygon(&corners).map_err(TilingError::Surface)?;
    }

    Ok(bins.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn unit_tiling(dimension: u8, tile_counts: [usize; 3]) -> TextureTiling {
        TextureTiling::new(dimension, tile_counts, [1.0; 3], [64; 3], 0.0).unwrap()
    }

    /// A quad in grid corner order whose positions equal its texture coordinates
    fn flat_quad(x0: f64, x1: f64, y0: f64, y1: f64) -> TileableSurface {
        let mut surface = TileableSurface::new(PolygonType::Quad, false, false, 0);
        let v = |x: f64, y: f64| Vertex::new(Vector3::new(x, y, 0.0), Vector3::new(x, y, 0.0));
        surface
            .push_polygon(&[v(x0, y0), v(x1, y0), v(x0, y1), v(x1, y1)])
            .unwrap();
        surface
    }

    fn triangle_area(corners: &Corners) -> f64 {
        let a = corners[1].position - corners[0].position;
        let b = corners[2].position - corners[0].position;
        a.cross(&b).norm() / 2.0
    }

    #[test]
    fn descriptor_validation() {
        assert_eq!(
            TextureTiling::new(0, [1; 3], [1.0; 3], [64; 3], 0.0).err(),
            Some(TilingError::BadDimension(0))
        );
        assert_eq!(
            TextureTiling::new(1, [0; 3], [1.0; 3], [64; 3], 0.0).err(),
            Some(TilingError::BadTileCount(0, 0))
        );
        assert_eq!(
            TextureTiling::new(1, [1; 3], [-2.0; 3], [64; 3], 0.0).err(),
            Some(TilingError::BadPeriod(0, -2.0))
        );
        assert_eq!(
            TextureTiling::new(1, [1; 3], [1.0; 3], [64; 3], 1.0).err(),
            Some(TilingError::BadOverlapFraction(1.0))
        );
        // a half-texel overlap on a one-texel tile leaves no effective period
        assert_eq!(
            TextureTiling::new(1, [1; 3], [1.0; 3], [1; 3], 0.5).err(),
            Some(TilingError::OverlapConsumesTile(0))
        );
        assert!(TextureTiling::new(3, [4, 4, 2], [1.0; 3], [64; 3], 0.25).is_ok());
    }

    #[test]
    fn overlap_shrinks_the_effective_period() {
        let tiling = TextureTiling::new(1, [4; 3], [2.0; 3], [8; 3], 0.25).unwrap();
        assert!((tiling.overlap_range(0) - 0.125).abs() < 1e-12);
        assert!((tiling.effective_period(0) - 1.875).abs() < 1e-12);
    }

    #[test]
    fn polygon_inside_one_tile_passes_through() {
        let tiling = unit_tiling(2, [2, 2, 1]);
        let tiles = tile_surface(&tiling, flat_quad(0.2, 0.8, 0.2, 0.8)).unwrap();

        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_number(), 0);
        assert_eq!(tiles[0].polygon_count(), 1);
        let corners = tiles[0].polygon(0).unwrap();
        let expected = flat_quad(0.2, 0.8, 0.2, 0.8);
        for (output, input) in corners.iter().zip(expected.polygon(0).unwrap().iter()) {
            assert!((output.position - input.position).norm() < 1e-12);
            assert!((output.texture - input.texture).norm() < 1e-12);
        }
    }

    #[test]
    fn quad_spanning_k_boundaries_yields_k_plus_one_quads() {
        let tiling = unit_tiling(1, [4, 1, 1]);
        let tiles = tile_surface(&tiling, flat_quad(0.25, 2.75, 0.0, 1.0)).unwrap();

        let total: usize = tiles.iter().map(|tile| tile.polygon_count()).sum();
        assert_eq!(total, 3, "two boundaries produce three quads");
        assert_eq!(tiles.len(), 3);
        let tile_numbers: Vec<usize> = tiles.iter().map(|tile| tile.tile_number()).collect();
        assert_eq!(tile_numbers, vec![0, 1, 2]);

        // the pieces' unscaled spans reconstruct the original with no gap
        let mut spans: Vec<(f64, f64)> = tiles
            .iter()
            .map(|tile| {
                let corners = tile.polygon(0).unwrap();
                let offset = tile.tile_number() as f64;
                let xs: Vec<f64> = corners.iter().map(|c| c.texture.x + offset).collect();
                (
                    xs.iter().cloned().fold(f64::INFINITY, f64::min),
                    xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                )
            })
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert!((spans[0].0 - 0.25).abs() < 1e-6);
        assert!((spans[2].1 - 2.75).abs() < 1e-6);
        for pair in spans.windows(2) {
            assert!((pair[0].1 - pair[1].0).abs() < 1e-6, "no gap or overlap between pieces");
        }
    }

    #[test]
    fn negative_centroid_wraps_to_the_last_tile() {
        let tiling = unit_tiling(1, [4, 1, 1]);
        // centroid tile-fractional coordinate is -0.3
        let tiles = tile_surface(&tiling, flat_quad(-0.4, -0.2, 0.0, 1.0)).unwrap();

        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_number(), 3);
        for corners in tiles[0].polygons() {
            for corner in corners.iter() {
                assert!((0.0..1.0).contains(&corner.texture.x), "texture rescaled into [0, period)");
            }
        }
    }

    #[test]
    fn triangles_are_clipped_against_each_slab() {
        let tiling = unit_tiling(1, [4, 1, 1]);
        let mut surface = TileableSurface::new(PolygonType::Triangle, false, false, 0);
        let v = |x: f64, y: f64| Vertex::new(Vector3::new(x, y, 0.0), Vector3::new(x, y, 0.0));
        surface
            .push_polygon(&[v(0.5, 0.0), v(2.5, 0.0), v(0.5, 1.0)])
            .unwrap();

        let tiles = tile_surface(&tiling, surface).unwrap();
        let total: usize = tiles.iter().map(|tile| tile.polygon_count()).sum();
        assert_eq!(total, 5, "triangle + two quads fanned into five triangles");
        assert_eq!(tiles.len(), 3);

        let area: f64 = tiles
            .iter()
            .flat_map(|tile| tile.polygons())
            .map(|corners| triangle_area(&corners))
            .sum();
        assert!((area - 1.0).abs() < 1e-9, "clipping preserves total area");
    }

    #[test]
    fn non_aligned_quads_are_triangulated() {
        let tiling = unit_tiling(1, [4, 1, 1]);
        let mut surface = TileableSurface::new(PolygonType::Quad, false, false, 0);
        let v = |x: f64, y: f64| Vertex::new(Vector3::new(x, y, 0.0), Vector3::new(x, y, 0.0));
        // sheared texture coordinates: no pairwise alignment on the x axis
        surface
            .push_polygon(&[v(0.2, 0.0), v(1.6, 0.2), v(0.4, 1.0), v(1.8, 1.2)])
            .unwrap();

        let tiles = tile_surface(&tiling, surface).unwrap();
        for tile in &tiles {
            assert_eq!(tile.polygon_type(), PolygonType::Triangle);
        }
        assert!(tiles.iter().map(|tile| tile.polygon_count()).sum::<usize>() > 2);
    }

    #[test]
    fn composite_tile_index_is_row_major() {
        let tiling = unit_tiling(2, [4, 4, 1]);
        // centroid cell (1, 2)
        let tiles = tile_surface(&tiling, flat_quad(1.2, 1.8, 2.2, 2.8)).unwrap();

        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_number(), 1 + 4 * 2);
    }

    #[test]
    fn empty_surfaces_produce_no_tiles() {
        let tiling = unit_tiling(2, [2, 2, 1]);
        let surface = TileableSurface::new(PolygonType::Quad, false, false, 0);
        assert!(tile_surface(&tiling, surface).unwrap().is_empty());
    }

    #[test]
    fn parallel_tiling_matches_serial() {
        let tiling = unit_tiling(2, [4, 4, 1]);
        let build = || {
            let mut surface = flat_quad(0.25, 2.75, 0.0, 1.0);
            let v = |x: f64, y: f64| Vertex::new(Vector3::new(x, y, 0.0), Vector3::new(x, y, 0.0));
            surface
                .push_polygon(&[v(-0.5, 1.5), v(1.5, 1.5), v(-0.5, 3.5), v(1.5, 3.5)])
                .unwrap();
            surface
        };

        let serial = tile_surface(&tiling, build()).unwrap();
        let parallel = tile_surface_parallel(&tiling, build()).unwrap();

        assert_eq!(serial.len(), parallel.len());
        for (a, b) in serial.iter().zip(parallel.iter()) {
            assert_eq!(a.tile_number(), b.tile_number());
            assert_eq!(a.polygon_count(), b.polygon_count());
            for (pa, pb) in a.polygons().zip(b.polygons()) {
                for (ca, cb) in pa.iter().zip(pb.iter()) {
                    assert!((ca.position - cb.position).norm() < 1e-12);
                    assert!((ca.texture - cb.texture).norm() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn attributes_are_interpolated_at_cuts() {
        let tiling = unit_tiling(1, [2, 1, 1]);
        let mut surface = TileableSurface::new(PolygonType::Quad, true, false, 1);
        let v = |x: f64, value: f64| {
            let mut vertex = Vertex::new(Vector3::new(x, 0.0, 0.0), Vector3::new(x, 0.0, 0.0));
            vertex.normal = Some(Vector3::z());
            vertex.data = smallvec::smallvec![value];
            vertex
        };
        let w = |x: f64, value: f64| {
            let mut vertex = Vertex::new(Vector3::new(x, 1.0, 0.0), Vector3::new(x, 0.0, 0.0));
            vertex.normal = Some(Vector3::z());
            vertex.data = smallvec::smallvec![value];
            vertex
        };
        // x spans 0.5..1.5 with data 0..10: the cut at x = 1 carries data 5
        surface
            .push_polygon(&[v(0.5, 0.0), v(1.5, 10.0), w(0.5, 0.0), w(1.5, 10.0)])
            .unwrap();

        let tiles = tile_surface(&tiling, surface).unwrap();
        assert_eq!(tiles.len(), 2);
        let first = tiles[0].polygon(0).unwrap();
        assert!((first[1].data[0] - 5.0).abs() < 1e-9);
        assert_eq!(first[1].normal, Some(Vector3::z()));
    }
}
