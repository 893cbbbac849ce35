//LTB model reader (PC, LithTech 2.x model versions 23 to 25)
//
//unlike ABC there is no section chain: header, OBBs, pieces, nodes, weight
//sets, child models, animations, sockets and anim bindings follow each other
//in a fixed order

use std::io::{Read, Seek};

use cgmath::{vec2, vec3, Quaternion, Vector3};

use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{
    self, AnimBinding, Animation, ChildModel, Face, FaceVertex, Keyframe, Lod, Model,
    ModelFormat, Node, OrientedBox, Piece, Socket, Vertex, Weight, WeightSet,
};

const FILE_TYPE_MODEL: u16 = 1;
const FILE_VERSION: u16 = 9;
const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 23..=25;

// vertex stream masks
const VTX_POSITION: u32 = 0x1;
const VTX_NORMAL: u32 = 0x2;
const VTX_COLOR: u32 = 0x4;
const VTX_UV_SETS: [u32; 4] = [0x10, 0x20, 0x40, 0x80];
const VTX_BASIS: u32 = 0x100;

const LOCATION_SCALE_16: f32 = 16.0;
const ROTATION_SCALE_16: f32 = 0x7FFF as f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshType {
    Rigid,
    Skeletal,
    VertexAnimated,
    Null,
}

impl MeshType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            4 => Some(MeshType::Rigid),
            5 => Some(MeshType::Skeletal),
            6 => Some(MeshType::VertexAnimated),
            7 => Some(MeshType::Null),
            _ => None,
        }
    }
}

/// How an animation stores its node tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCompression {
    None,
    Relevant,
    Relevant16,
    RelevantRot16,
}

impl TrackCompression {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(TrackCompression::None),
            1 => Some(TrackCompression::Relevant),
            2 => Some(TrackCompression::Relevant16),
            3 => Some(TrackCompression::RelevantRot16),
            _ => None,
        }
    }
}

struct Counts {
    keyframe: u32,
    animation: u32,
    node: u32,
    piece: u32,
    lod: u32,
    socket: u32,
}

/// Mesh data decoded before the LOD's used-node list is known.
struct MeshData {
    vertices: Vec<Vertex>,
    faces: Vec<Face>,
}

pub struct LtbReader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> LtbReader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Model> {
        let mut model = Model::new(ModelFormat::LtbPc);
        let counts = self.read_header(cursor, &mut model)?;

        self.read_obbs(cursor, &mut model)?;
        self.read_pieces(cursor, &counts, &mut model)?;
        self.read_nodes(cursor, &counts, &mut model)?;
        self.read_weight_sets(cursor, &mut model)?;
        self.read_child_models(cursor, &mut model)?;
        self.read_animations(cursor, &counts, &mut model)?;
        self.read_sockets(cursor, &counts, &mut model)?;
        self.read_anim_bindings(cursor, &mut model)?;

        model.check_faces()?;
        model.check_animations()?;

        diag!(
            self.diag,
            Info,
            "LTB v{}: {} nodes, {} pieces, {} animations, {} sockets",
            model.version,
            model.nodes.len(),
            model.pieces.len(),
            model.animations.len(),
            model.sockets.len()
        );
        Ok(model)
    }

    //
    // Header
    //

    fn read_header<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<Counts> {
        let file_type = cursor.read::<u16>()?;
        let file_version = cursor.read::<u16>()?;
        if file_type != FILE_TYPE_MODEL || file_version != FILE_VERSION {
            return Err(Error::mismatch(format!(
                "not a PC LTB model (file type {file_type}, file version {file_version})"
            )));
        }
        cursor.skip(16)?;

        let version = cursor.read::<u32>()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::unsupported(format!("LTB version {version}")));
        }
        model.version = version;

        let mut raw = [0u32; 15];
        for value in &mut raw {
            *value = cursor.read()?;
        }
        // keyframe, animation, node, piece, child model, face, vertex,
        // vertex weight, LOD, socket, weight set, string, string length,
        // vertex animation data size, animation data size
        let counts = Counts {
            keyframe: raw[0],
            animation: raw[1],
            node: raw[2],
            piece: raw[3],
            lod: raw[8],
            socket: raw[9],
        };

        model.command_string = cursor.read_short_string()?;
        model.internal_radius = cursor.read()?;

        diag!(
            self.diag,
            Debug,
            "Header: version {}, {} keyframes, {} nodes, {} pieces, {} LODs",
            version,
            counts.keyframe,
            counts.node,
            counts.piece,
            counts.lod
        );
        Ok(counts)
    }

    fn read_obbs<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u32>()? as usize;
        model.obbs = Vec::with_capacity(cursor.capacity_hint(count, 44));
        for _ in 0..count {
            model.obbs.push(OrientedBox {
                position: cursor.read_vector3()?,
                size: cursor.read_vector3()?,
                rotation: cursor.read_quaternion()?,
                node_index: cursor.read()?,
            });
        }
        Ok(())
    }

    //
    // Pieces
    //

    fn read_pieces<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        counts: &Counts,
        model: &mut Model,
    ) -> Result<()> {
        let piece_count = cursor.read::<u32>()? as usize;
        if piece_count != counts.piece as usize {
            return Err(Error::mismatch(format!(
                "header declares {} pieces, found {}",
                counts.piece, piece_count
            )));
        }

        model.pieces = Vec::with_capacity(cursor.capacity_hint(piece_count, 14));
        for _ in 0..piece_count {
            let mut piece = Piece::new(cursor.read_short_string()?);
            let lod_count = cursor.read::<u32>()? as usize;
            let mut distances = Vec::with_capacity(cursor.capacity_hint(lod_count, 4));
            for _ in 0..lod_count {
                distances.push(cursor.read::<f32>()?);
            }
            let _lod_min = cursor.read::<u32>()?;
            let _lod_max = cursor.read::<u32>()?;

            for (lod_index, distance) in distances.into_iter().enumerate() {
                let (mut lod, textures) = self.read_lod(cursor)?;
                lod.distance = distance;
                if lod_index == 0 {
                    piece.material_index = textures[0] as u16;
                }
                piece.lods.push(lod);
            }

            diag!(self.diag, Trace, "Piece '{}': {} LODs", piece.name, piece.lods.len());
            model.pieces.push(piece);
        }
        Ok(())
    }

    fn read_lod<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<(Lod, [u32; 4])> {
        let _texture_count = cursor.read::<u32>()?;
        let mut textures = [0u32; 4];
        for texture in &mut textures {
            *texture = cursor.read()?;
        }
        let _render_style = cursor.read::<u32>()?;
        let _render_priority = cursor.read::<u8>()?;

        let raw_type = cursor.read::<u32>()?;
        let mesh_type = MeshType::from_u32(raw_type)
            .ok_or_else(|| Error::unsupported(format!("LTB mesh type {raw_type}")))?;
        let mesh_size = cursor.read::<u32>()? as u64;
        let mesh_start = cursor.tell();

        let mut mesh = match mesh_type {
            MeshType::Rigid => self.read_rigid_mesh(cursor)?,
            MeshType::Skeletal => self.read_skeletal_mesh(cursor)?,
            MeshType::VertexAnimated => {
                return Err(Error::unsupported("vertex animated LTB mesh"));
            }
            MeshType::Null => MeshData {
                vertices: Vec::new(),
                faces: Vec::new(),
            },
        };

        let consumed = cursor.tell() - mesh_start;
        if consumed != mesh_size {
            return Err(Error::mismatch(format!(
                "{mesh_type:?} mesh declares {mesh_size} bytes, read {consumed}"
            )));
        }

        // bone indices in skeletal meshes address this list
        let used_count = cursor.read::<u8>()? as usize;
        let used_nodes = cursor.read_bytes(used_count)?;
        if mesh_type == MeshType::Skeletal {
            for weight in mesh.vertices.iter_mut().flat_map(|v| v.weights.iter_mut()) {
                if let Some(&node) = used_nodes.get(weight.node_index as usize) {
                    weight.node_index = node as u32;
                }
            }
        }

        Ok((
            Lod {
                distance: 0.0,
                vertices: mesh.vertices,
                faces: mesh.faces,
            },
            textures,
        ))
    }

    fn read_rigid_mesh<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<MeshData> {
        let vertex_count = cursor.read::<u32>()? as usize;
        let face_count = cursor.read::<u32>()? as usize;
        let node_index = cursor.read::<u32>()?;
        let masks = read_masks(cursor)?;

        let (mut vertices, _) = read_vertex_streams(cursor, &masks, vertex_count, None)?;
        for vertex in &mut vertices {
            vertex.weights = vec![Weight::rigid(node_index)];
        }
        let faces = read_faces(cursor, face_count, &vertices)?;
        Ok(MeshData { vertices, faces })
    }

    fn read_skeletal_mesh<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<MeshData> {
        let vertex_count = cursor.read::<u32>()? as usize;
        let face_count = cursor.read::<u32>()? as usize;
        let _max_bones_per_face = cursor.read::<u32>()?;
        let max_bones_per_vertex = cursor.read::<u32>()?;
        let masks = read_masks(cursor)?;
        let matrix_palette = cursor.read::<u8>()?;
        if matrix_palette == 0 {
            return Err(Error::unsupported(
                "skeletal LTB mesh without a matrix palette",
            ));
        }
        if !(1..=4).contains(&max_bones_per_vertex) {
            return Err(Error::mismatch(format!(
                "{max_bones_per_vertex} bones per vertex"
            )));
        }

        let (mut vertices, skin) =
            read_vertex_streams(cursor, &masks, vertex_count, Some(max_bones_per_vertex))?;
        for (vertex, (biases, bones)) in vertices.iter_mut().zip(skin) {
            vertex.weights = skin_weights(&biases, bones, max_bones_per_vertex as usize);
        }
        let faces = read_faces(cursor, face_count, &vertices)?;

        // first index u16, index count u16, bone list 4×u8, index buffer u32
        let bone_set_count = cursor.read::<u32>()? as u64;
        cursor.skip(bone_set_count * 12)?;

        Ok(MeshData { vertices, faces })
    }

    //
    // Nodes
    //

    fn read_nodes<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        counts: &Counts,
        model: &mut Model,
    ) -> Result<()> {
        let node_count = counts.node as usize;
        model.nodes = Vec::with_capacity(cursor.capacity_hint(node_count, 73));
        for _ in 0..node_count {
            let mut node = Node::new(cursor.read_short_string()?);
            node.index = cursor.read()?;
            node.flags = cursor.read()?;
            node.bind_matrix = cursor.read_matrix()?;
            node.child_count = cursor.read()?;
            model.nodes.push(node);
        }
        model::link_nodes(&mut model.nodes)?;
        diag!(self.diag, Debug, "Read {} nodes", model.nodes.len());
        Ok(())
    }

    fn read_weight_sets<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u32>()? as usize;
        model.weight_sets = Vec::with_capacity(cursor.capacity_hint(count, 6));
        for _ in 0..count {
            let name = cursor.read_short_string()?;
            let weight_count = cursor.read::<u32>()? as usize;
            let mut weights = Vec::with_capacity(cursor.capacity_hint(weight_count, 4));
            for _ in 0..weight_count {
                weights.push(cursor.read()?);
            }
            model.weight_sets.push(WeightSet { name, weights });
        }
        Ok(())
    }

    // the first child model is the model itself and has no name on disk
    fn read_child_models<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u32>()? as usize;
        for _ in 1..count {
            model.child_models.push(ChildModel {
                name: cursor.read_short_string()?,
                build_number: 0,
                transforms: Vec::new(),
            });
        }
        Ok(())
    }

    //
    // Animations
    //

    fn read_animations<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        counts: &Counts,
        model: &mut Model,
    ) -> Result<()> {
        let node_count = model.nodes.len();
        let animation_count = cursor.read::<u32>()? as usize;
        if animation_count != counts.animation as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} animations, found {}",
                counts.animation,
                animation_count
            );
        }

        model.animations = Vec::with_capacity(cursor.capacity_hint(animation_count, 26));
        for _ in 0..animation_count {
            let extents = cursor.read_vector3()?;
            let name = cursor.read_short_string()?;
            let raw_compression = cursor.read::<i32>()?;
            let compression = TrackCompression::from_i32(raw_compression).ok_or_else(|| {
                Error::unsupported(format!("animation compression {raw_compression}"))
            })?;
            let interpolation_time = cursor.read::<u32>()?;

            let keyframe_count = cursor.read::<u32>()? as usize;
            let mut keyframes = Vec::with_capacity(cursor.capacity_hint(keyframe_count, 6));
            for _ in 0..keyframe_count {
                let time = cursor.read::<u32>()?;
                let command = cursor.read_short_string()?;
                keyframes.push(Keyframe::new(time, command, node_count));
            }

            for node_index in 0..node_count {
                self.read_track(cursor, compression, node_index, &mut keyframes)?;
            }

            diag!(
                self.diag,
                Debug,
                "Animation '{}': {} keyframes, {:?}",
                name,
                keyframes.len(),
                compression
            );
            model.animations.push(Animation {
                name,
                extents,
                interpolation_time,
                keyframes,
            });
        }
        Ok(())
    }

    fn read_track<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        compression: TrackCompression,
        node_index: usize,
        keyframes: &mut [Keyframe],
    ) -> Result<()> {
        let keyframe_count = keyframes.len();

        let (locations, rotations) = match compression {
            TrackCompression::None => {
                for keyframe in keyframes.iter_mut() {
                    let transform = &mut keyframe.transforms[node_index];
                    transform.location = cursor.read_vector3()?;
                    transform.rotation = cursor.read_quaternion()?;
                }
                return Ok(());
            }
            TrackCompression::Relevant => (
                read_keyed(cursor, keyframe_count, |c| c.read_vector3())?,
                read_keyed(cursor, keyframe_count, |c| c.read_quaternion())?,
            ),
            TrackCompression::Relevant16 => (
                read_keyed(cursor, keyframe_count, read_location16)?,
                read_keyed(cursor, keyframe_count, read_rotation16)?,
            ),
            TrackCompression::RelevantRot16 => (
                read_keyed(cursor, keyframe_count, |c| c.read_vector3())?,
                read_keyed(cursor, keyframe_count, read_rotation16)?,
            ),
        };

        for (k, keyframe) in keyframes.iter_mut().enumerate() {
            let transform = &mut keyframe.transforms[node_index];
            if let Some(&location) = keyed_value(&locations, k) {
                transform.location = location;
            }
            if let Some(&rotation) = keyed_value(&rotations, k) {
                transform.rotation = rotation;
            }
        }
        Ok(())
    }

    //
    // Sockets
    //

    fn read_sockets<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        counts: &Counts,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u32>()? as usize;
        if count != counts.socket as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} sockets, found {}",
                counts.socket,
                count
            );
        }
        model.sockets = Vec::with_capacity(cursor.capacity_hint(count, 46));
        for _ in 0..count {
            let node_index = cursor.read::<u32>()?;
            model.sockets.push(Socket {
                name: cursor.read_short_string()?,
                node_index,
                rotation: cursor.read_quaternion()?,
                location: cursor.read_vector3()?,
                scale: cursor.read_vector3()?,
            });
        }
        Ok(())
    }

    fn read_anim_bindings<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u32>()? as usize;
        model.anim_bindings = Vec::with_capacity(cursor.capacity_hint(count, 26));
        for _ in 0..count {
            model.anim_bindings.push(AnimBinding {
                name: cursor.read_short_string()?,
                extents: cursor.read_vector3()?,
                origin: cursor.read_vector3()?,
            });
        }
        Ok(())
    }
}

fn read_masks<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<[u32; 4]> {
    let mut masks = [0u32; 4];
    for mask in &mut masks {
        *mask = cursor.read()?;
    }
    Ok(masks)
}

/// Bytes one vertex occupies in a stream with this mask.
fn stream_stride(mask: u32, bones_per_vertex: Option<u32>) -> u64 {
    let mut stride = 0;
    if mask & VTX_POSITION != 0 {
        stride += 12;
        if let Some(bones) = bones_per_vertex {
            // blend weights (the last one is implied) plus packed indices
            stride += (bones as u64 - 1) * 4 + 4;
        }
    }
    if mask & VTX_NORMAL != 0 {
        stride += 12;
    }
    if mask & VTX_COLOR != 0 {
        stride += 4;
    }
    stride += VTX_UV_SETS.iter().filter(|&&uv| mask & uv != 0).count() as u64 * 8;
    if mask & VTX_BASIS != 0 {
        stride += 24;
    }
    stride
}

type SkinData = (Vec<f32>, [u8; 4]);

/// Read the four vertex streams. Each stream stores, vertex by vertex, the
/// fields its mask selects.
fn read_vertex_streams<R: Read + Seek>(
    cursor: &mut BinaryCursor<R>,
    masks: &[u32; 4],
    vertex_count: usize,
    bones_per_vertex: Option<u32>,
) -> Result<(Vec<Vertex>, Vec<SkinData>)> {
    let stride: u64 = masks
        .iter()
        .map(|&mask| stream_stride(mask, bones_per_vertex))
        .sum();
    // vertices with no stored fields would be unbounded by the data
    if stride == 0 && vertex_count > 0 {
        return Err(Error::mismatch(format!(
            "{vertex_count} vertices with empty stream masks"
        )));
    }
    let total = stride * vertex_count as u64;
    if total > cursor.remaining() {
        return Err(Error::Truncated {
            offset: cursor.tell(),
            needed: total,
            available: cursor.remaining(),
        });
    }

    let mut vertices = vec![Vertex::default(); vertex_count];
    let mut skin = vec![(Vec::new(), [0u8; 4]); vertex_count];

    for &mask in masks {
        if mask == 0 {
            continue;
        }
        for (vertex, (biases, bones)) in vertices.iter_mut().zip(skin.iter_mut()) {
            if mask & VTX_POSITION != 0 {
                vertex.position = cursor.read_vector3()?;
                if let Some(count) = bones_per_vertex {
                    for _ in 1..count {
                        biases.push(cursor.read::<f32>()?);
                    }
                    *bones = cursor.read_array::<4>()?;
                }
            }
            if mask & VTX_NORMAL != 0 {
                vertex.normal = cursor.read_vector3()?;
            }
            if mask & VTX_COLOR != 0 {
                let [b, g, r, a] = cursor.read_array::<4>()?;
                vertex.color = Some([r, g, b, a]);
            }
            for (set, &uv_mask) in VTX_UV_SETS.iter().enumerate() {
                if mask & uv_mask != 0 {
                    let uv = cursor.read_vector2()?;
                    // only the first set is kept
                    if set == 0 {
                        vertex.texcoord = uv;
                    }
                }
            }
            if mask & VTX_BASIS != 0 {
                let _s = cursor.read_vector3()?;
                let _t = cursor.read_vector3()?;
            }
        }
    }
    Ok((vertices, skin))
}

fn skin_weights(biases: &[f32], bones: [u8; 4], bone_count: usize) -> Vec<Weight> {
    let mut remaining = 1.0;
    let mut weights = Vec::with_capacity(bone_count);
    for (slot, &bone) in bones.iter().enumerate().take(bone_count) {
        let bias = biases.get(slot).copied().unwrap_or(remaining);
        remaining -= bias;
        if bias > 0.0 {
            weights.push(Weight {
                node_index: bone as u32,
                location: vec3(0.0, 0.0, 0.0),
                bias,
            });
        }
    }
    weights
}

fn read_faces<R: Read + Seek>(
    cursor: &mut BinaryCursor<R>,
    face_count: usize,
    vertices: &[Vertex],
) -> Result<Vec<Face>> {
    let mut faces = Vec::with_capacity(cursor.capacity_hint(face_count, 6));
    for _ in 0..face_count {
        let mut corners = [FaceVertex::new(0, vec2(0.0, 0.0)); 3];
        for corner in &mut corners {
            let index = cursor.read::<u16>()? as u32;
            let texcoord = vertices
                .get(index as usize)
                .map_or(vec2(0.0, 0.0), |v| v.texcoord);
            *corner = FaceVertex::new(index, texcoord);
        }
        faces.push(Face { vertices: corners });
    }
    Ok(faces)
}

/// A keyed track holds no value (identity), one value for every keyframe,
/// or one value per keyframe.
fn read_keyed<R, T, F>(
    cursor: &mut BinaryCursor<R>,
    keyframe_count: usize,
    mut read_value: F,
) -> Result<Vec<T>>
where
    R: Read + Seek,
    F: FnMut(&mut BinaryCursor<R>) -> Result<T>,
{
    let count = cursor.read::<u32>()? as usize;
    if count > 1 && count != keyframe_count {
        return Err(Error::mismatch(format!(
            "track has {count} keys for {keyframe_count} keyframes"
        )));
    }
    (0..count).map(|_| read_value(cursor)).collect()
}

fn keyed_value<T>(values: &[T], keyframe: usize) -> Option<&T> {
    match values.len() {
        0 => None,
        1 => values.first(),
        _ => values.get(keyframe),
    }
}

fn read_location16<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Vector3<f32>> {
    let x = cursor.read::<i16>()? as f32;
    let y = cursor.read::<i16>()? as f32;
    let z = cursor.read::<i16>()? as f32;
    Ok(vec3(x, y, z) / LOCATION_SCALE_16)
}

fn read_rotation16<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Quaternion<f32>> {
    let x = cursor.read::<i16>()? as f32 / ROTATION_SCALE_16;
    let y = cursor.read::<i16>()? as f32 / ROTATION_SCALE_16;
    let z = cursor.read::<i16>()? as f32 / ROTATION_SCALE_16;
    let w = cursor.read::<i16>()? as f32 / ROTATION_SCALE_16;
    Ok(Quaternion::new(w, x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{decode_model, ModelFamily};
    use crate::testutil::ByteWriter;

    fn rigid_mesh() -> Vec<u8> {
        let mut w = ByteWriter::new()
            .u32(3)
            .u32(1)
            .u32(1)
            .u32(VTX_POSITION | VTX_NORMAL | 0x10)
            .u32(0)
            .u32(0)
            .u32(0);
        for i in 0..3 {
            w = w
                .vec3([i as f32, 0.0, 0.0])
                .vec3([0.0, 0.0, 1.0])
                .vec2([i as f32 * 0.5, 1.0]);
        }
        w.u16(0).u16(1).u16(2).finish()
    }

    fn skeletal_mesh() -> Vec<u8> {
        // two streams: positions with two-bone skinning, then normals
        let mut w = ByteWriter::new()
            .u32(3)
            .u32(1)
            .u32(2)
            .u32(2)
            .u32(VTX_POSITION)
            .u32(VTX_NORMAL)
            .u32(0)
            .u32(0)
            .u8(1);
        for i in 0..3u8 {
            w = w.vec3([0.0, i as f32, 0.0]).f32(0.75).raw(&[0, 1, 0, 0]);
        }
        for _ in 0..3 {
            w = w.vec3([1.0, 0.0, 0.0]);
        }
        w.u16(2).u16(1).u16(0).u32(1).zeros(12).finish()
    }

    fn ltb_file(mesh_type: u32, mesh: &[u8], size_delta: i64, used_nodes: &[u8]) -> Vec<u8> {
        // root: identity; arm: two locations, one broadcast rotation
        let tracks = ByteWriter::new()
            .u32(0)
            .u32(0)
            .u32(2)
            .i16(16)
            .i16(0)
            .i16(0)
            .i16(32)
            .i16(-16)
            .i16(0)
            .u32(1)
            .i16(0)
            .i16(0)
            .i16(0)
            .i16(0x7FFF)
            .finish();
        ltb_file_with_tracks(mesh_type, mesh, size_delta, used_nodes, 2, &tracks)
    }

    fn ltb_file_with_tracks(
        mesh_type: u32,
        mesh: &[u8],
        size_delta: i64,
        used_nodes: &[u8],
        compression: i32,
        tracks: &[u8],
    ) -> Vec<u8> {
        let mut w = ByteWriter::new()
            .u16(1)
            .u16(9)
            .zeros(16)
            .u32(25);
        // keyframe, animation, node, piece, child model counts then the rest
        for count in [2, 1, 2, 1, 1, 1, 3, 0, 1, 1, 0, 0, 0, 0, 0] {
            w = w.u32(count);
        }
        w = w
            .str16("cmd")
            .f32(3.0)
            .u32(1)
            .vec3([0.0; 3])
            .vec3([1.0; 3])
            .quat([0.0, 0.0, 0.0, 1.0])
            .u32(0)
            // pieces
            .u32(1)
            .str16("body")
            .u32(1)
            .f32(0.0)
            .u32(0)
            .u32(0)
            .u32(1)
            .u32(5)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u8(0)
            .u32(mesh_type)
            .u32((mesh.len() as i64 + size_delta) as u32)
            .raw(mesh)
            .u8(used_nodes.len() as u8)
            .raw(used_nodes)
            // nodes
            .str16("root")
            .u16(0)
            .u8(0)
            .identity()
            .u32(1)
            .str16("arm")
            .u16(1)
            .u8(0)
            .translation([0.0, 2.0, 0.0])
            .u32(0)
            // weight sets, child models
            .u32(0)
            .u32(2)
            .str16("ATTACH")
            // animations
            .u32(1)
            .vec3([1.0; 3])
            .str16("walk")
            .i32(compression)
            .u32(150)
            .u32(2)
            .u32(0)
            .str16("")
            .u32(50)
            .str16("step")
            .raw(tracks)
            // sockets
            .u32(1)
            .u32(1)
            .str16("hand")
            .quat([0.0, 0.0, 0.0, 1.0])
            .vec3([0.0, 1.0, 0.0])
            .vec3([2.0, 2.0, 2.0])
            // anim bindings
            .u32(0);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Model> {
        LtbReader::new(Diagnostics::silent()).read(&mut BinaryCursor::from_bytes(bytes))
    }

    #[test]
    fn test_rigid_model() {
        let model = decode(&ltb_file(4, &rigid_mesh(), 0, &[1])).unwrap();
        assert_eq!(model.format, ModelFormat::LtbPc);
        assert_eq!(model.version, 25);
        assert_eq!(model.command_string, "cmd");
        assert_eq!(model.obbs.len(), 1);

        let piece = &model.pieces[0];
        assert_eq!(piece.name, "body");
        assert_eq!(piece.material_index, 5);
        let lod = &piece.lods[0];
        assert_eq!(lod.vertices.len(), 3);
        assert_eq!(lod.vertices[1].texcoord, vec2(0.5, 1.0));
        assert_eq!(lod.faces[0].vertices[2].texcoord, vec2(1.0, 1.0));
        assert_eq!(lod.vertices[0].weights, vec![Weight::rigid(1)]);

        assert_eq!(model.nodes[1].parent, Some(0));
        assert_eq!(model.nodes[1].bind_matrix.w.y, 2.0);
        assert_eq!(model.child_models[0].name, "ATTACH");
        assert_eq!(model.sockets[0].scale, vec3(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_relevant16_tracks() {
        let model = decode(&ltb_file(4, &rigid_mesh(), 0, &[1])).unwrap();
        let animation = &model.animations[0];
        assert_eq!(animation.interpolation_time, 150);
        assert_eq!(animation.keyframes[1].command, "step");

        // root has no keys
        let root = animation.keyframes[1].transforms[0];
        assert_eq!(root.location, vec3(0.0, 0.0, 0.0));
        assert_eq!(root.rotation.s, 1.0);

        let arm0 = animation.keyframes[0].transforms[1];
        let arm1 = animation.keyframes[1].transforms[1];
        assert_eq!(arm0.location, vec3(1.0, 0.0, 0.0));
        assert_eq!(arm1.location, vec3(2.0, -1.0, 0.0));
        assert_eq!(arm1.rotation.s, 1.0);
    }

    #[test]
    fn test_skeletal_weights_use_node_list() {
        // palette slot 0 is node 1, slot 1 is node 0
        let model = decode(&ltb_file(5, &skeletal_mesh(), 0, &[1, 0])).unwrap();
        let lod = &model.pieces[0].lods[0];
        let weights = &lod.vertices[2].weights;
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].node_index, 1);
        assert_eq!(weights[0].bias, 0.75);
        assert_eq!(weights[1].node_index, 0);
        assert_eq!(weights[1].bias, 0.25);
        assert_eq!(lod.vertices[2].position.y, 2.0);
        assert_eq!(lod.vertices[2].normal.x, 1.0);
        assert_eq!(lod.faces[0].vertices[0].vertex_index, 2);
    }

    #[test]
    fn test_mesh_size_must_match() {
        let err = decode(&ltb_file(4, &rigid_mesh(), 4, &[1])).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn test_vertex_animated_mesh_is_unsupported() {
        let err = decode(&ltb_file(6, &[], 0, &[])).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_null_mesh() {
        let model = decode(&ltb_file(7, &[], 0, &[])).unwrap();
        assert!(model.pieces[0].lods[0].vertices.is_empty());
    }

    #[test]
    fn test_rejects_other_file_types() {
        let mut bytes = ltb_file(4, &rigid_mesh(), 0, &[1]);
        bytes[0] = 7;
        assert!(matches!(decode(&bytes), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_hostile_vertex_count_fails_fast() {
        let mesh = ByteWriter::new()
            .u32(u32::MAX)
            .u32(0)
            .u32(0)
            .u32(VTX_POSITION)
            .u32(0)
            .u32(0)
            .u32(0)
            .finish();
        let err = decode(&ltb_file(4, &mesh, 0, &[])).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_empty_masks_with_vertices_rejected() {
        let mesh = ByteWriter::new()
            .u32(u32::MAX)
            .u32(0)
            .u32(0)
            .zeros(16)
            .finish();
        let err = decode(&ltb_file(4, &mesh, 0, &[])).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn test_empty_masks_fall_through_every_candidate() {
        let mesh = ByteWriter::new()
            .u32(u32::MAX)
            .u32(0)
            .u32(0)
            .zeros(16)
            .finish();
        let bytes = ltb_file(4, &mesh, 0, &[]);
        let err = decode_model(ModelFamily::Ltb, &bytes, Diagnostics::silent()).unwrap_err();
        match err {
            Error::NoMatchingReader { family, failures } => {
                assert_eq!(family, "LTB");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].format, ModelFormat::LtbPc);
                assert!(matches!(failures[0].error, Error::FormatMismatch(_)));
                assert_eq!(failures[1].format, ModelFormat::LtbPs2);
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
    }

    #[test]
    fn test_uncompressed_tracks() {
        let tracks = ByteWriter::new()
            // root, per keyframe
            .vec3([0.0; 3])
            .quat([0.0, 0.0, 0.0, 1.0])
            .vec3([0.0; 3])
            .quat([0.0, 0.0, 0.0, 1.0])
            // arm
            .vec3([1.0, 2.0, 3.0])
            .quat([0.0, 0.0, 1.0, 0.0])
            .vec3([4.0, 5.0, 6.0])
            .quat([0.0, 0.0, 0.0, 1.0])
            .finish();
        let bytes = ltb_file_with_tracks(4, &rigid_mesh(), 0, &[1], 0, &tracks);
        let model = decode(&bytes).unwrap();
        let keyframes = &model.animations[0].keyframes;

        let arm0 = keyframes[0].transforms[1];
        assert_eq!(arm0.location, vec3(1.0, 2.0, 3.0));
        assert_eq!(arm0.rotation, Quaternion::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(keyframes[1].transforms[1].location, vec3(4.0, 5.0, 6.0));
        assert_eq!(keyframes[1].transforms[0].rotation.s, 1.0);
    }

    #[test]
    fn test_relevant_float_tracks() {
        let tracks = ByteWriter::new()
            // root: one broadcast location, no rotation
            .u32(1)
            .vec3([7.0, 0.0, 0.0])
            .u32(0)
            // arm: per-keyframe locations and rotations
            .u32(2)
            .vec3([1.0, 0.0, 0.0])
            .vec3([0.0, 1.0, 0.0])
            .u32(2)
            .quat([0.0, 0.0, 0.0, 1.0])
            .quat([1.0, 0.0, 0.0, 0.0])
            .finish();
        let bytes = ltb_file_with_tracks(4, &rigid_mesh(), 0, &[1], 1, &tracks);
        let model = decode(&bytes).unwrap();
        let keyframes = &model.animations[0].keyframes;

        assert_eq!(keyframes[0].transforms[0].location, vec3(7.0, 0.0, 0.0));
        assert_eq!(keyframes[1].transforms[0].location, vec3(7.0, 0.0, 0.0));
        assert_eq!(keyframes[1].transforms[0].rotation.s, 1.0);
        assert_eq!(keyframes[0].transforms[1].location, vec3(1.0, 0.0, 0.0));
        assert_eq!(keyframes[1].transforms[1].location, vec3(0.0, 1.0, 0.0));
        assert_eq!(
            keyframes[1].transforms[1].rotation,
            Quaternion::new(0.0, 1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_relevant_rot16_tracks() {
        let tracks = ByteWriter::new()
            // root: no keys
            .u32(0)
            .u32(0)
            // arm: float location, packed rotation per keyframe
            .u32(1)
            .vec3([0.5, 0.0, 0.0])
            .u32(2)
            .i16(0)
            .i16(0)
            .i16(0)
            .i16(0x7FFF)
            .i16(0)
            .i16(0x7FFF)
            .i16(0)
            .i16(0)
            .finish();
        let bytes = ltb_file_with_tracks(4, &rigid_mesh(), 0, &[1], 3, &tracks);
        let model = decode(&bytes).unwrap();
        let keyframes = &model.animations[0].keyframes;

        let arm0 = keyframes[0].transforms[1];
        let arm1 = keyframes[1].transforms[1];
        assert_eq!(arm0.location, vec3(0.5, 0.0, 0.0));
        assert_eq!(arm1.location, vec3(0.5, 0.0, 0.0));
        assert_eq!(arm0.rotation, Quaternion::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(arm1.rotation, Quaternion::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_track_key_count_must_match() {
        let tracks = ByteWriter::new().u32(3).finish();
        let bytes = ltb_file_with_tracks(4, &rigid_mesh(), 0, &[1], 1, &tracks);
        assert!(matches!(decode(&bytes), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_stream_strides() {
        assert_eq!(stream_stride(VTX_POSITION | VTX_NORMAL | 0x10, None), 32);
        assert_eq!(stream_stride(VTX_POSITION, Some(2)), 20);
        assert_eq!(stream_stride(VTX_COLOR | VTX_BASIS, None), 28);
    }
}
