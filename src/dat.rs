//DAT world reader
//
//a world file is read strictly front to back: header, quadtree, the world
//models (each followed by a terrain visibility payload we skip by seeking to
//the next model offset), then the placed objects. render data is not read

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use cgmath::{Quaternion, Vector3};

use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};

//
// Flags
//

/// Generates one predicate per named bit.
macro_rules! flag_predicates {
    ($flags:ident { $($(#[$doc:meta])* $name:ident = $bit:expr;)* }) => {
        impl $flags {
            $(
                $(#[$doc])*
                pub fn $name(self) -> bool {
                    self.0 & (1 << $bit) != 0
                }
            )*
        }
    };
}

/// Surface flag word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceFlags(pub u32);

flag_predicates!(SurfaceFlags {
    is_solid = 0;
    is_non_existent = 1;
    is_invisible = 2;
    is_sky = 4;
    is_bright = 5;
    is_flat_shaded = 6;
    is_lightmapped = 7;
    is_no_subdivide = 8;
    is_hull_maker = 9;
    /// Lit by directional lights only.
    is_directional_light = 11;
    is_gouraud_shaded = 12;
    is_portal = 13;
    is_panning_sky = 15;
    is_physics_blocker = 17;
    is_terrain_occluder = 18;
    is_additive = 19;
    is_vis_blocker = 21;
    is_not_a_step = 22;
    is_mirror = 23;
});

/// World model info flag word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldModelFlags(pub u32);

flag_predicates!(WorldModelFlags {
    is_movable = 1;
    is_main_world = 2;
    is_physics_bsp = 4;
    is_vis_bsp = 5;
});

//
// Header
//

#[derive(Debug, Clone, PartialEq)]
pub struct WorldHeader {
    pub version: u32,
    pub object_data_pos: u32,
    pub render_data_pos: u32,
    pub reserved: [u32; 8],
    /// Free-form world properties, as edited in the level editor.
    pub info_string: String,
    pub lightmap_grid_size: f32,
    pub boundary_min: Vector3<f32>,
    pub boundary_max: Vector3<f32>,
}

impl WorldHeader {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let version = cursor.read()?;
        let object_data_pos = cursor.read()?;
        let render_data_pos = cursor.read()?;
        let mut reserved = [0u32; 8];
        for value in &mut reserved {
            *value = cursor.read()?;
        }
        Ok(Self {
            version,
            object_data_pos,
            render_data_pos,
            reserved,
            info_string: cursor.read_long_string()?,
            lightmap_grid_size: cursor.read()?,
            boundary_min: cursor.read_vector3()?,
            boundary_max: cursor.read_vector3()?,
        })
    }
}

//
// QuadTree
//

/// Culling tree. The subdivision bits are kept as read, not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTree {
    pub box_min: Vector3<f32>,
    pub box_max: Vector3<f32>,
    pub node_count: i32,
    pub terrain_depth: i32,
    /// Every byte of the subdivision bitstream.
    pub bitstream: Vec<u8>,
    /// Number of set bits, i.e. nodes that split into four.
    pub subdivisions: usize,
}

impl QuadTree {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let mut tree = Self {
            box_min: cursor.read_vector3()?,
            box_max: cursor.read_vector3()?,
            node_count: cursor.read()?,
            terrain_depth: cursor.read()?,
            bitstream: Vec::new(),
            subdivisions: 0,
        };

        // one bit per pending node, least significant bit first
        let mut pending = 1usize;
        let mut current = 0u8;
        let mut bit = 8;
        while pending > 0 {
            pending -= 1;
            if bit == 8 {
                current = cursor.read()?;
                tree.bitstream.push(current);
                bit = 0;
            }
            let subdivide = current & (1 << bit) != 0;
            bit += 1;
            if subdivide {
                tree.subdivisions += 1;
                pending += 4;
            }
        }
        Ok(tree)
    }
}

//
// World Model geometry
//

/// Disk vertex count of the poly at the same position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vertex {
    pub count: u8,
    pub extra: u8,
}

impl Vertex {
    pub fn disk_vertex_count(&self) -> usize {
        self.count as usize + self.extra as usize
    }

    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        Ok(Self {
            count: cursor.read()?,
            extra: cursor.read()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafPortal {
    pub portal_id: u16,
    pub contents: Vec<u8>,
}

/// BSP leaf with its visibility data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaf {
    /// Set when the leaf only stores an index instead of portal data.
    pub index: Option<u16>,
    pub portals: Vec<LeafPortal>,
    /// Four bytes per polygon.
    pub polygon_data: Vec<u8>,
    pub unknown: u32,
}

impl Leaf {
    const NO_PORTALS: u16 = 0xFFFF;

    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let mut leaf = Self::default();
        let portal_count = cursor.read::<u16>()?;
        if portal_count == Self::NO_PORTALS {
            leaf.index = Some(cursor.read()?);
        } else {
            leaf.portals.reserve(cursor.capacity_hint(portal_count as usize, 4));
            for _ in 0..portal_count {
                let portal_id = cursor.read()?;
                let size = cursor.read::<u16>()?;
                leaf.portals.push(LeafPortal {
                    portal_id,
                    contents: cursor.read_bytes(size as usize)?,
                });
            }
        }
        let polygon_count = cursor.read::<u32>()? as usize;
        let polygon_bytes = polygon_count
            .checked_mul(4)
            .ok_or_else(|| Error::mismatch(format!("leaf polygon count {polygon_count}")))?;
        leaf.polygon_data = cursor.read_bytes(polygon_bytes)?;
        leaf.unknown = cursor.read()?;
        Ok(leaf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f32>,
    pub distance: f32,
}

impl Plane {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        Ok(Self {
            normal: cursor.read_vector3()?,
            distance: cursor.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    /// Texture mapping basis: origin, U direction, V direction.
    pub uv: [Vector3<f32>; 3],
    pub texture_index: u16,
    pub plane_index: u32,
    pub flags: SurfaceFlags,
    pub unknown: u32,
    /// Shader effect name and parameter, present when the surface uses one.
    pub effect: Option<(String, String)>,
    pub texture_flags: u16,
}

impl Surface {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let uv = [
            cursor.read_vector3()?,
            cursor.read_vector3()?,
            cursor.read_vector3()?,
        ];
        let texture_index = cursor.read()?;
        let plane_index = cursor.read()?;
        let flags = SurfaceFlags(cursor.read()?);
        let unknown = cursor.read()?;
        let use_effects = cursor.read::<u8>()?;
        let effect = if use_effects != 0 {
            Some((cursor.read_short_string()?, cursor.read_short_string()?))
        } else {
            None
        };
        Ok(Self {
            uv,
            texture_index,
            plane_index,
            flags,
            unknown,
            effect,
            texture_flags: cursor.read()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskVert {
    /// Index into the world model's points.
    pub point_index: u16,
    pub color: [u8; 3],
}

/// Triangle fan around `center`.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    pub center: Vector3<f32>,
    pub lightmap_width: u16,
    pub lightmap_height: u16,
    pub unknown: Vec<u16>,
    pub surface_index: u16,
    pub plane_index: u16,
    pub disk_vertices: Vec<DiskVert>,
}

impl Poly {
    /// The fan size is not stored with the poly but in the parallel vertex list.
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, vertex: &Vertex) -> Result<Self> {
        let center = cursor.read_vector3()?;
        let lightmap_width = cursor.read()?;
        let lightmap_height = cursor.read()?;

        let pairs = cursor.read::<u16>()? as usize;
        let mut unknown = Vec::with_capacity(cursor.capacity_hint(pairs * 2, 2));
        for _ in 0..pairs * 2 {
            unknown.push(cursor.read()?);
        }

        let surface_index = cursor.read()?;
        let plane_index = cursor.read()?;

        let count = vertex.disk_vertex_count();
        let mut disk_vertices = Vec::with_capacity(cursor.capacity_hint(count, 5));
        for _ in 0..count {
            disk_vertices.push(DiskVert {
                point_index: cursor.read()?,
                color: cursor.read_array()?,
            });
        }

        Ok(Self {
            center,
            lightmap_width,
            lightmap_height,
            unknown,
            surface_index,
            plane_index,
            disk_vertices,
        })
    }
}

/// BSP node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub poly_index: u32,
    pub leaf_index: u16,
    /// Front and back child node indices.
    pub children: [i32; 2],
}

impl Node {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        Ok(Self {
            poly_index: cursor.read()?,
            leaf_index: cursor.read()?,
            children: [cursor.read()?, cursor.read()?],
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPortal {
    pub name: String,
    pub unknown: [u32; 2],
    pub unknown_short: u16,
    pub center: Vector3<f32>,
    pub unknown_dims: [f32; 2],
}

impl UserPortal {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        Ok(Self {
            name: cursor.read_short_string()?,
            unknown: [cursor.read()?, cursor.read()?],
            unknown_short: cursor.read()?,
            center: cursor.read_vector3()?,
            unknown_dims: [cursor.read()?, cursor.read()?],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl Point {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        Ok(Self {
            position: cursor.read_vector3()?,
            normal: cursor.read_vector3()?,
        })
    }
}

//
// World Model
//

#[derive(Debug, Clone, PartialEq)]
pub struct WorldModel {
    pub info_flags: WorldModelFlags,
    pub unknown: u32,
    pub name: String,

    pub point_count: u32,
    pub plane_count: u32,
    pub surface_count: u32,
    pub user_portal_count: u32,
    pub poly_count: u32,
    pub leaf_count: u32,
    pub vertex_count: u32,
    pub total_vis_list_size: u32,
    pub leaf_list_count: u32,
    pub node_count: u32,
    pub reserved: [u32; 2],

    pub min_box: Vector3<f32>,
    pub max_box: Vector3<f32>,
    pub world_offset: Vector3<f32>,

    /// Texture names, indexed by `Surface::texture_index`.
    pub textures: Vec<String>,
    /// One entry per poly.
    pub vertices: Vec<Vertex>,
    pub leaves: Vec<Leaf>,
    pub planes: Vec<Plane>,
    pub surfaces: Vec<Surface>,
    pub polys: Vec<Poly>,
    pub nodes: Vec<Node>,
    pub user_portals: Vec<UserPortal>,
    pub points: Vec<Point>,

    pub root_node_index: u32,
    pub sections: u32,
}

/// Read `count` records of at least `min_size` bytes each.
fn read_list<R, T>(
    cursor: &mut BinaryCursor<R>,
    count: u32,
    min_size: usize,
    mut read: impl FnMut(&mut BinaryCursor<R>) -> Result<T>,
) -> Result<Vec<T>>
where
    R: Read + Seek,
{
    let mut items = Vec::with_capacity(cursor.capacity_hint(count as usize, min_size));
    for _ in 0..count {
        items.push(read(cursor)?);
    }
    Ok(items)
}

/// Split the texture name blob on its terminators; bytes after the last one
/// do not form a name.
fn split_texture_names(blob: &[u8]) -> Vec<String> {
    let mut names: Vec<String> = blob
        .split(|&b| b == 0)
        .map(|name| name.iter().map(|&b| b as char).collect())
        .collect();
    // the piece after the final terminator (or the whole unterminated blob)
    names.pop();
    names
}

impl WorldModel {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let info_flags = WorldModelFlags(cursor.read()?);
        let unknown = cursor.read()?;
        let name = cursor.read_short_string()?;

        let point_count = cursor.read()?;
        let plane_count = cursor.read()?;
        let surface_count = cursor.read()?;
        let user_portal_count = cursor.read()?;
        let poly_count = cursor.read()?;
        let leaf_count = cursor.read()?;
        let vertex_count = cursor.read()?;
        let total_vis_list_size = cursor.read()?;
        let leaf_list_count = cursor.read()?;
        let node_count = cursor.read()?;
        let reserved = [cursor.read()?, cursor.read()?];

        let min_box = cursor.read_vector3()?;
        let max_box = cursor.read_vector3()?;
        let world_offset = cursor.read_vector3()?;

        let texture_name_len = cursor.read::<u32>()? as usize;
        let texture_count = cursor.read::<u32>()?;
        let textures = split_texture_names(&cursor.read_bytes(texture_name_len)?);
        if textures.len() != texture_count as usize {
            return Err(Error::mismatch(format!(
                "world model '{}' declares {} textures, name blob holds {}",
                name,
                texture_count,
                textures.len()
            )));
        }

        let vertices = read_list(cursor, poly_count, 2, Vertex::read)?;
        let leaves = read_list(cursor, leaf_count, 10, Leaf::read)?;
        let planes = read_list(cursor, plane_count, 16, Plane::read)?;
        let surfaces = read_list(cursor, surface_count, 53, Surface::read)?;
        let mut polys = Vec::with_capacity(vertices.len());
        for vertex in &vertices {
            polys.push(Poly::read(cursor, vertex)?);
        }
        let nodes = read_list(cursor, node_count, 14, Node::read)?;
        let user_portals = read_list(cursor, user_portal_count, 32, UserPortal::read)?;
        let points = read_list(cursor, point_count, 24, Point::read)?;

        skip_physics_blocks(cursor)?;

        Ok(Self {
            info_flags,
            unknown,
            name,
            point_count,
            plane_count,
            surface_count,
            user_portal_count,
            poly_count,
            leaf_count,
            vertex_count,
            total_vis_list_size,
            leaf_list_count,
            node_count,
            reserved,
            min_box,
            max_box,
            world_offset,
            textures,
            vertices,
            leaves,
            planes,
            surfaces,
            polys,
            nodes,
            user_portals,
            points,
            root_node_index: cursor.read()?,
            sections: cursor.read()?,
        })
    }
}

/// Walk the physics block table without keeping it. Returns the cell count.
fn skip_physics_blocks<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<u64> {
    let dims = [cursor.read::<u32>()?, cursor.read::<u32>()?, cursor.read::<u32>()?];
    let cells = dims
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d as u64))
        .ok_or_else(|| Error::mismatch(format!("physics block grid {dims:?}")))?;
    let _min = cursor.read_vector3()?;
    let _max = cursor.read_vector3()?;

    for _ in 0..cells {
        let size = cursor.read::<u16>()?;
        let _unknown = cursor.read::<u16>()?;
        // u16 vertex index + 4 packed quaternion bytes each
        cursor.skip(size as u64 * 6)?;
    }
    Ok(cells)
}

//
// World Objects
//

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    /// Codes 1 (vector) and 2 (color).
    Vector(Vector3<f32>),
    Float(f32),
    Bool(bool),
    /// Codes 4 (flags) and 6 (long int).
    Int(u32),
    Rotation(Quaternion<f32>),
}

impl PropertyValue {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, code: i8, name: &str) -> Result<Self> {
        Ok(match code {
            0 => PropertyValue::String(cursor.read_short_string()?),
            1 | 2 => PropertyValue::Vector(cursor.read_vector3()?),
            3 => PropertyValue::Float(cursor.read()?),
            5 => PropertyValue::Bool(cursor.read::<u8>()? != 0),
            4 | 6 => PropertyValue::Int(cursor.read()?),
            7 => PropertyValue::Rotation(cursor.read_quaternion()?),
            _ => {
                return Err(Error::unsupported(format!(
                    "world property type {code} on '{name}'"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub code: i8,
    pub flags: u32,
    /// Payload length as declared; the payload itself is sized by `code`.
    pub data_length: u16,
    pub value: PropertyValue,
}

impl Property {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let name = cursor.read_short_string()?;
        let code = cursor.read()?;
        let flags = cursor.read()?;
        let data_length = cursor.read()?;
        let value = PropertyValue::read(cursor, code, &name)?;
        Ok(Self {
            name,
            code,
            flags,
            data_length,
            value,
        })
    }
}

/// A property value remembered with its position in the object.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub index: usize,
    pub value: T,
}

/// An entity placed in the world (light, trigger, spawn point, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldObject {
    pub data_length: u16,
    pub type_name: String,
    pub properties: Vec<Property>,
    pub name: Option<Cached<String>>,
    pub position: Option<Cached<Vector3<f32>>>,
    pub rotation: Option<Cached<Quaternion<f32>>>,
}

impl WorldObject {
    fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let mut object = Self {
            data_length: cursor.read()?,
            type_name: cursor.read_short_string()?,
            ..Default::default()
        };
        let property_count = cursor.read::<u32>()?;
        object.properties.reserve(cursor.capacity_hint(property_count as usize, 9));

        for index in 0..property_count as usize {
            let property = Property::read(cursor)?;
            match (property.name.as_str(), &property.value) {
                ("Name", PropertyValue::String(value)) => {
                    object.name = Some(Cached {
                        index,
                        value: value.clone(),
                    })
                }
                ("Pos", PropertyValue::Vector(value)) => {
                    object.position = Some(Cached {
                        index,
                        value: *value,
                    })
                }
                ("Rotation", PropertyValue::Rotation(value)) => {
                    object.rotation = Some(Cached {
                        index,
                        value: *value,
                    })
                }
                _ => {}
            }
            object.properties.push(property);
        }
        Ok(object)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|cached| cached.value.as_str())
    }
}

//
// World
//

#[derive(Debug, Clone, PartialEq)]
pub struct World {
    /// File name, empty when decoded from memory.
    pub name: String,
    pub header: WorldHeader,
    pub quad_tree: QuadTree,
    pub world_models: Vec<WorldModel>,
    pub objects: Vec<WorldObject>,
}

impl World {
    /// The model flagged as main world, else the first one.
    pub fn main_world(&self) -> Option<&WorldModel> {
        self.world_models
            .iter()
            .find(|model| model.info_flags.is_main_world())
            .or_else(|| self.world_models.first())
    }

    pub fn objects_by_type(&self, type_name: &str) -> Vec<&WorldObject> {
        self.objects
            .iter()
            .filter(|o| o.type_name == type_name)
            .collect()
    }
}

//
// Reading Implementation
//

pub struct DatReader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> DatReader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    pub fn read_from_file<P: AsRef<Path>>(&self, path: P) -> Result<World> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::from(e).in_file(path, 0))?;
        let mut cursor =
            BinaryCursor::new(BufReader::new(file)).map_err(|e| e.in_file(path, 0))?;
        match self.read(&mut cursor) {
            Ok(mut world) => {
                world.name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(world)
            }
            Err(source) => {
                diag!(
                    self.diag,
                    Error,
                    "Failed to read {} at 0x{:08X}: {}",
                    path.display(),
                    cursor.tell(),
                    source
                );
                Err(source.in_file(path, cursor.tell()))
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<World> {
        self.read(&mut BinaryCursor::from_bytes(bytes))
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<World> {
        diag!(self.diag, Debug, "Reading header");
        let header = WorldHeader::read(cursor)?;
        diag!(self.diag, Info, "DAT Version: {}", header.version);
        diag!(
            self.diag,
            Debug,
            "Object Data Position: 0x{:08X}",
            header.object_data_pos
        );
        diag!(
            self.diag,
            Debug,
            "Render Data Position: 0x{:08X}",
            header.render_data_pos
        );

        diag!(self.diag, Debug, "Reading quadtree at 0x{:08X}", cursor.tell());
        let quad_tree = QuadTree::read(cursor)?;
        diag!(
            self.diag,
            Debug,
            "Quadtree: {} subdivisions in {} bytes",
            quad_tree.subdivisions,
            quad_tree.bitstream.len()
        );

        let world_models = self.read_world_models(cursor)?;
        let objects = self.read_objects(cursor)?;
        diag!(self.diag, Debug, "Skipping render data");

        Ok(World {
            name: String::new(),
            header,
            quad_tree,
            world_models,
            objects,
        })
    }

    fn read_world_models<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
    ) -> Result<Vec<WorldModel>> {
        let count = cursor.read::<u32>()?;
        diag!(self.diag, Info, "World Model Count: {}", count);

        // next offset + padding before the smallest possible block
        let mut models = Vec::with_capacity(cursor.capacity_hint(count as usize, 36));
        for i in 0..count {
            let next_pos = cursor.read::<u32>()? as u64;
            cursor.skip(32)?;
            diag!(self.diag, Debug, "Reading world model {} at 0x{:08X}", i, cursor.tell());
            let model = WorldModel::read(cursor).map_err(|e| {
                diag!(
                    self.diag,
                    Error,
                    "Error reading world model {} at 0x{:08X}: {}",
                    i,
                    cursor.tell(),
                    e
                );
                e
            })?;
            if next_pos < cursor.tell() {
                diag!(
                    self.diag,
                    Warn,
                    "World model '{}' ends at 0x{:08X}, past its successor at 0x{:08X}",
                    model.name,
                    cursor.tell(),
                    next_pos
                );
            }
            // terrain visibility data sits between the block and the next model
            cursor.seek(next_pos)?;
            models.push(model);
        }
        diag!(self.diag, Info, "Successfully read {} world models", models.len());
        Ok(models)
    }

    fn read_objects<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
    ) -> Result<Vec<WorldObject>> {
        let count = cursor.read::<u32>()?;
        diag!(self.diag, Info, "Object Count: {}", count);

        let mut objects = Vec::with_capacity(cursor.capacity_hint(count as usize, 8));
        for i in 0..count {
            let start = cursor.tell();
            let object = WorldObject::read(cursor).map_err(|e| {
                diag!(
                    self.diag,
                    Error,
                    "Error reading object {} at 0x{:08X}: {}",
                    i,
                    start,
                    e
                );
                e
            })?;
            objects.push(object);
        }
        diag!(self.diag, Info, "Successfully read {} objects", objects.len());
        Ok(objects)
    }
}
