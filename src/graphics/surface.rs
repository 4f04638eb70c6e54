use nalgebra::Vector3;
use smallvec::SmallVec;

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
#[cfg(feature = "json_export")]
use std::fs::File;
#[cfg(feature = "json_export")]
use std::io::BufWriter;

/// The polygon kind a [TileableSurface] is built from; every polygon in one
/// surface has the same kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolygonType {
    Triangle,
    Quad,
}

impl PolygonType {
    pub const fn corner_count(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Quad => 4,
        }
    }
}

impl std::fmt::Display for PolygonType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Triangle => write!(f, "triangle"),
            Self::Quad => write!(f, "quad"),
        }
    }
}

/// One polygon corner with the full attribute bundle carried through splitting
///
/// Normals and tangents are optional per surface (present on every corner or on
/// none); texture coordinates use all three components only for 3-axis tilings.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub position: Vector3<f64>,
    pub normal: Option<Vector3<f64>>,
    pub tangent: Option<Vector3<f64>>,
    pub texture: Vector3<f64>,
    pub data: SmallVec<[f64; 4]>,
}

impl Vertex {
    pub fn new(position: Vector3<f64>, texture: Vector3<f64>) -> Self {
        Self {
            position,
            normal: None,
            tangent: None,
            texture,
            data: SmallVec::new(),
        }
    }

    /// Interpolate every attribute toward `other` at parameter `t` in [0, 1]
    pub(crate) fn interpolated_toward(&self, other: &Vertex, t: f64) -> Vertex {
        let lerp_option = |a: &Option<Vector3<f64>>, b: &Option<Vector3<f64>>| match (a, b) {
            (Some(a), Some(b)) => Some(a.lerp(b, t)),
            _ => None,
        };
        Vertex {
            position: self.position.lerp(&other.position, t),
            normal: lerp_option(&self.normal, &other.normal),
            tangent: lerp_option(&self.tangent, &other.tangent),
            texture: self.texture.lerp(&other.texture, t),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + t * (b - a))
                .collect(),
        }
    }
}

/// A tessellated surface of uniform polygon type with parallel per-corner
/// attribute arrays
///
/// Corners are stored flat, `corner_count` per polygon, in winding order.
/// Splitting never aliases storage: every output polygon is written into a fresh
/// surface, including pass-through polygons.
#[derive(Clone, Debug)]
pub struct TileableSurface {
    polygon_type: PolygonType,
    tile_number: usize,
    has_normals: bool,
    has_tangents: bool,
    data_per_vertex: usize,
    positions: Vec<Vector3<f64>>,
    normals: Vec<Vector3<f64>>,
    tangents: Vec<Vector3<f64>>,
    textures: Vec<Vector3<f64>>,
    data: Vec<f64>,
}

impl TileableSurface {
    pub fn new(
        polygon_type: PolygonType,
        has_normals: bool,
        has_tangents: bool,
        data_per_vertex: usize,
    ) -> Self {
        Self {
            polygon_type,
            tile_number: 0,
            has_normals,
            has_tangents,
            data_per_vertex,
            positions: Vec::new(),
            normals: Vec::new(),
            tangents: Vec::new(),
            textures: Vec::new(),
            data: Vec::new(),
        }
    }

    /// An empty surface carrying this surface's attribute configuration, with a
    /// possibly different polygon type
    pub(crate) fn empty_like(&self, polygon_type: PolygonType) -> Self {
        Self::new(
            polygon_type,
            self.has_normals,
            self.has_tangents,
            self.data_per_vertex,
        )
    }

    pub fn polygon_type(&self) -> PolygonType {
        self.polygon_type
    }

    /// The texture tile this surface was binned into; 0 until assigned by the
    /// tiling engine
    pub fn tile_number(&self) -> usize {
        self.tile_number
    }

    pub(crate) fn set_tile_number(&mut self, tile_number: usize) {
        self.tile_number = tile_number;
    }

    pub fn polygon_count(&self) -> usize {
        self.positions.len() / self.polygon_type.corner_count()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        self.has_normals
    }

    pub fn has_tangents(&self) -> bool {
        self.has_tangents
    }

    pub fn data_per_vertex(&self) -> usize {
        self.data_per_vertex
    }

    /// Append one polygon given its corners in winding order
    ///
    /// Fails without a state change if the corner count does not match the
    /// surface's polygon type or any corner's attribute shape does not match the
    /// surface's configuration.
    pub fn push_polygon(&mut self, corners: &[Vertex]) -> Result<(), String> {
        let expected = self.polygon_type.corner_count();
        if corners.len() != expected {
            return Err(format!(
                "A {} has {} corners, not {}; Cannot push polygon!",
                self.polygon_type,
                expected,
                corners.len()
            ));
        }
        for corner in corners {
            if corner.normal.is_some() != self.has_normals
                || corner.tangent.is_some() != self.has_tangents
                || corner.data.len() != self.data_per_vertex
            {
                return Err(String::from(
                    "Corner attributes do not match the surface's configuration; Cannot push polygon!",
                ));
            }
        }
        for corner in corners {
            self.positions.push(corner.position);
            if let Some(normal) = corner.normal {
                self.normals.push(normal);
            }
            if let Some(tangent) = corner.tangent {
                self.tangents.push(tangent);
            }
            self.textures.push(corner.texture);
            self.data.extend_from_slice(&corner.data);
        }
        Ok(())
    }

    fn corner(&self, flat_index: usize) -> Vertex {
        Vertex {
            position: self.positions[flat_index],
            normal: self.has_normals.then(|| self.normals[flat_index]),
            tangent: self.has_tangents.then(|| self.tangents[flat_index]),
            texture: self.textures[flat_index],
            data: SmallVec::from_slice(
                &self.data[flat_index * self.data_per_vertex..(flat_index + 1) * self.data_per_vertex],
            ),
        }
    }

    /// The corners of one polygon in winding order
    pub fn polygon(&self, index: usize) -> Option<SmallVec<[Vertex; 4]>> {
        let corner_count = self.polygon_type.corner_count();
        if index >= self.polygon_count() {
            return None;
        }
        Some(
            (0..corner_count)
                .map(|corner| self.corner(index * corner_count + corner))
                .collect(),
        )
    }

    pub fn polygons(&self) -> impl Iterator<Item = SmallVec<[Vertex; 4]>> + '_ {
        (0..self.polygon_count()).map(move |index| {
            self.polygon(index)
                .expect("index is bounded by polygon_count")
        })
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        let vector_array = |v: &Vector3<f64>| json::array![v.x, v.y, v.z];
        object! {
            "polygon_type": self.polygon_type.to_string(),
            "tile_number": self.tile_number,
            "polygon_count": self.polygon_count(),
            "positions": JsonValue::from(self.positions.iter().map(vector_array).collect::<Vec<_>>()),
            "normals": JsonValue::from(self.normals.iter().map(vector_array).collect::<Vec<_>>()),
            "tangents": JsonValue::from(self.tangents.iter().map(vector_array).collect::<Vec<_>>()),
            "textures": JsonValue::from(self.textures.iter().map(vector_array).collect::<Vec<_>>()),
            "data": JsonValue::from(self.data.clone()),
        }
    }
}

/// Print a collection of tile surfaces to a JSON file specified by path.
#[cfg(feature = "json_export")]
pub fn export_surfaces_to_json(
    surfaces: &[TileableSurface],
    path: impl AsRef<str>,
) -> std::io::Result<()> {
    let f = File::create(path.as_ref())?;
    let mut w = BufWriter::new(&f);

    let surfaces_object = object! {
        "Tiles": JsonValue::from(surfaces.iter().map(|surface| surface.to_json()).collect::<Vec<_>>()),
    };

    surfaces_object.write_pretty(&mut w, 4)?;

    Ok(())
}
