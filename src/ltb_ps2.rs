//LTB model reader (PS2 layout)
//
//a fixed 0x40 byte header holds the counts and the offset of every section.
//geometry is stored as GS triangle strips: a vertex with the ADC bit set
//does not kick a triangle, which is how strips are separated

use std::io::{Read, Seek};

use cgmath::{vec2, vec3, Quaternion};

use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{
    self, Animation, Face, FaceVertex, Keyframe, Lod, Model, ModelFormat, Node, Piece, Socket,
    Transform, Vertex, Weight,
};

pub const PS2_VERSION: u32 = 7;
const HEADER_SIZE: u64 = 0x40;
const VERTEX_SIZE: usize = 32;
const VERTEX_FLAG_ADC: u16 = 0x8000;
const UNUSED_NODE: u8 = 0xFF;
const FIXED_12: f32 = 4096.0;
const LOCATION_SCALE: f32 = 16.0;
const ROTATION_SCALE: f32 = 0x7FFF as f32;

struct Header {
    node_count: u32,
    piece_count: u32,
    lod_count: u32,
    animation_count: u32,
    socket_count: u32,
    keyframe_count: u32,
    node_offset: u32,
    piece_offset: u32,
    animation_offset: u32,
    socket_offset: u32,
}

/// One stored strip vertex.
struct StripVertex {
    vertex: Vertex,
    adc: bool,
}

pub struct LtbPs2Reader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> LtbPs2Reader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Model> {
        let mut model = Model::new(ModelFormat::LtbPs2);
        let header = self.read_header(cursor, &mut model)?;

        cursor.seek(header.node_offset as u64)?;
        self.read_nodes(cursor, &header, &mut model)?;

        cursor.seek(header.piece_offset as u64)?;
        self.read_pieces(cursor, &header, &mut model)?;

        if header.animation_offset != 0 {
            cursor.seek(header.animation_offset as u64)?;
            self.read_animations(cursor, &header, &mut model)?;
        }
        if header.socket_offset != 0 {
            cursor.seek(header.socket_offset as u64)?;
            self.read_sockets(cursor, &header, &mut model)?;
        }

        model.check_faces()?;
        model.check_animations()?;

        diag!(
            self.diag,
            Info,
            "PS2 LTB: {} nodes, {} pieces, {} animations, {} sockets",
            model.nodes.len(),
            model.pieces.len(),
            model.animations.len(),
            model.sockets.len()
        );
        Ok(model)
    }

    fn read_header<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<Header> {
        let version = cursor.read::<u32>()?;
        if version != PS2_VERSION {
            return Err(Error::mismatch(format!("not a PS2 LTB (version {version})")));
        }
        model.version = version;

        let node_count = cursor.read()?;
        let piece_count = cursor.read()?;
        let lod_count = cursor.read()?;
        let animation_count = cursor.read()?;
        let socket_count = cursor.read()?;
        let keyframe_count = cursor.read()?;
        let _reserved = cursor.read::<u32>()?;
        let header = Header {
            node_count,
            piece_count,
            lod_count,
            animation_count,
            socket_count,
            keyframe_count,
            node_offset: cursor.read()?,
            piece_offset: cursor.read()?,
            animation_offset: cursor.read()?,
            socket_offset: cursor.read()?,
        };
        model.internal_radius = cursor.read()?;
        cursor.skip(12)?;

        for (name, offset) in [
            ("node", header.node_offset),
            ("piece", header.piece_offset),
        ] {
            if (offset as u64) < HEADER_SIZE {
                return Err(Error::mismatch(format!(
                    "{name} section offset 0x{offset:X} inside the header"
                )));
            }
        }

        diag!(
            self.diag,
            Debug,
            "Header: {} nodes, {} pieces, {} LODs, {} animations, {} keyframes",
            header.node_count,
            header.piece_count,
            header.lod_count,
            header.animation_count,
            header.keyframe_count
        );
        Ok(header)
    }

    fn read_nodes<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let node_count = header.node_count as usize;
        model.nodes = Vec::with_capacity(cursor.capacity_hint(node_count, 74));
        for _ in 0..node_count {
            let mut node = Node::new(cursor.read_short_string()?);
            node.index = cursor.read()?;
            node.flags = cursor.read()?;
            let _pad = cursor.read::<u8>()?;
            node.bind_matrix = cursor.read_matrix()?;
            node.child_count = cursor.read()?;
            model.nodes.push(node);
        }
        model::link_nodes(&mut model.nodes)
    }

    fn read_pieces<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let piece_count = header.piece_count as usize;
        model.pieces = Vec::with_capacity(cursor.capacity_hint(piece_count, 10));
        for _ in 0..piece_count {
            let mut piece = Piece::new(cursor.read_short_string()?);
            piece.material_index = cursor.read()?;
            let _pad = cursor.read::<u16>()?;
            piece.specular_power = cursor.read()?;

            for _ in 0..header.lod_count {
                piece.lods.push(self.read_lod(cursor)?);
            }
            diag!(
                self.diag,
                Trace,
                "Piece '{}': {} strip vertices in LOD 0",
                piece.name,
                piece.lods.first().map_or(0, |lod| lod.vertices.len())
            );
            model.pieces.push(piece);
        }
        Ok(())
    }

    fn read_lod<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Lod> {
        let vertex_count = cursor.read::<u32>()? as usize;
        cursor.skip(12)?;

        let mut strip = Vec::with_capacity(cursor.capacity_hint(vertex_count, VERTEX_SIZE));
        for _ in 0..vertex_count {
            strip.push(read_strip_vertex(cursor)?);
        }

        let faces = strip_faces(&strip);
        Ok(Lod {
            distance: 0.0,
            vertices: strip.into_iter().map(|s| s.vertex).collect(),
            faces,
        })
    }

    fn read_animations<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let node_count = model.nodes.len();
        let animation_count = header.animation_count as usize;
        model.animations = Vec::with_capacity(cursor.capacity_hint(animation_count, 10));
        for _ in 0..animation_count {
            let name = cursor.read_short_string()?;
            let interpolation_time = cursor.read::<u32>()?;
            let keyframe_count = cursor.read::<u32>()? as usize;

            let mut keyframes = Vec::with_capacity(cursor.capacity_hint(keyframe_count, 4));
            for _ in 0..keyframe_count {
                keyframes.push(Keyframe::new(cursor.read()?, String::new(), node_count));
            }
            for node_index in 0..node_count {
                for keyframe in &mut keyframes {
                    keyframe.transforms[node_index] = read_packed_transform(cursor)?;
                }
            }

            diag!(
                self.diag,
                Debug,
                "Animation '{}': {} keyframes",
                name,
                keyframes.len()
            );
            model.animations.push(Animation {
                name,
                extents: vec3(0.0, 0.0, 0.0),
                interpolation_time,
                keyframes,
            });
        }
        Ok(())
    }

    fn read_sockets<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let count = header.socket_count as usize;
        model.sockets = Vec::with_capacity(cursor.capacity_hint(count, 34));
        for _ in 0..count {
            let node_index = cursor.read::<u32>()?;
            model.sockets.push(Socket {
                name: cursor.read_short_string()?,
                node_index,
                rotation: cursor.read_quaternion()?,
                location: cursor.read_vector3()?,
                scale: vec3(1.0, 1.0, 1.0),
            });
        }
        Ok(())
    }
}

fn read_fixed12<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<f32> {
    Ok(cursor.read::<i16>()? as f32 / FIXED_12)
}

fn read_strip_vertex<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<StripVertex> {
    let position = cursor.read_vector3()?;
    let flags = cursor.read::<u16>()?;
    let _pad = cursor.read::<u16>()?;
    let normal = vec3(
        read_fixed12(cursor)?,
        read_fixed12(cursor)?,
        read_fixed12(cursor)?,
    );
    let texcoord = vec2(read_fixed12(cursor)?, read_fixed12(cursor)?);
    let nodes = cursor.read_array::<3>()?;
    let biases = cursor.read_array::<3>()?;

    let weights = nodes
        .iter()
        .zip(biases.iter())
        .filter(|&(&node, &bias)| node != UNUSED_NODE && bias != 0)
        .map(|(&node, &bias)| Weight {
            node_index: node as u32,
            location: vec3(0.0, 0.0, 0.0),
            bias: bias as f32 / 255.0,
        })
        .collect();

    Ok(StripVertex {
        vertex: Vertex {
            position,
            normal,
            texcoord,
            weights,
            ..Vertex::default()
        },
        adc: flags & VERTEX_FLAG_ADC != 0,
    })
}

/// Triangles kicked by a strip. Winding alternates within a strip and
/// restarts at every ADC vertex.
fn strip_faces(strip: &[StripVertex]) -> Vec<Face> {
    let corner = |i: usize| FaceVertex::new(i as u32, strip[i].vertex.texcoord);
    let mut faces = Vec::new();
    let mut flip = false;

    for i in 0..strip.len() {
        if strip[i].adc {
            flip = false;
            continue;
        }
        if i < 2 {
            continue;
        }
        let vertices = if flip {
            [corner(i - 1), corner(i - 2), corner(i)]
        } else {
            [corner(i - 2), corner(i - 1), corner(i)]
        };
        faces.push(Face { vertices });
        flip = !flip;
    }
    faces
}

fn read_packed_transform<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Transform> {
    let mut location = [0f32; 3];
    for value in &mut location {
        *value = cursor.read::<i16>()? as f32 / LOCATION_SCALE;
    }
    let mut rotation = [0f32; 4];
    for value in &mut rotation {
        *value = cursor.read::<i16>()? as f32 / ROTATION_SCALE;
    }
    let _pad = cursor.read::<u16>()?;

    let [x, y, z, w] = rotation;
    Ok(Transform {
        location: location.into(),
        rotation: Quaternion::new(w, x, y, z),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{HEADER_SIZE, PS2_VERSION, VERTEX_FLAG_ADC};
    use crate::testutil::ByteWriter;

    fn vertex(w: ByteWriter, x: f32, adc: bool) -> ByteWriter {
        w.vec3([x, 0.0, 0.0])
            .u16(if adc { VERTEX_FLAG_ADC } else { 0 })
            .u16(0)
            .i16(0)
            .i16(4096)
            .i16(0)
            .i16(2048)
            .i16(0)
            .raw(&[0, 0xFF, 0xFF])
            .raw(&[255, 0, 0])
    }

    /// One node, one piece whose single LOD holds two strips (4 and 3
    /// vertices), one animation and one socket.
    pub fn sample_ps2() -> Vec<u8> {
        let header_end = HEADER_SIZE as usize;
        let mut w = ByteWriter::new()
            .u32(PS2_VERSION)
            .u32(1) // nodes
            .u32(1) // pieces
            .u32(1) // LODs
            .u32(1) // animations
            .u32(1) // sockets
            .u32(2) // keyframes
            .u32(0)
            .u32(0) // node offset, patched below
            .u32(0)
            .u32(0)
            .u32(0)
            .f32(4.0)
            .zeros(12);
        assert_eq!(w.len(), header_end);

        let node_offset = w.len() as u32;
        w = w
            .str16("root")
            .u16(0)
            .u8(0)
            .u8(0)
            .translation([0.0, 0.0, 3.0])
            .u32(0);

        let piece_offset = w.len() as u32;
        w = w
            .str16("mesh")
            .u16(2)
            .u16(0)
            .f32(0.5)
            .u32(7)
            .zeros(12);
        for (x, adc) in [
            (0.0, true),
            (1.0, true),
            (2.0, false),
            (3.0, false),
            (4.0, true),
            (5.0, true),
            (6.0, false),
        ] {
            w = vertex(w, x, adc);
        }

        let animation_offset = w.len() as u32;
        w = w.str16("idle").u32(200).u32(2).u32(0).u32(500);
        for key in 0..2i16 {
            w = w
                .i16(16 * key)
                .i16(0)
                .i16(0)
                .i16(0)
                .i16(0)
                .i16(0)
                .i16(0x7FFF)
                .u16(0);
        }

        let socket_offset = w.len() as u32;
        w = w
            .u32(0)
            .str16("muzzle")
            .quat([0.0, 0.0, 0.0, 1.0])
            .vec3([0.0, 0.0, 1.0]);

        w.patch_u32(32, node_offset)
            .patch_u32(36, piece_offset)
            .patch_u32(40, animation_offset)
            .patch_u32(44, socket_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_ps2;
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Model> {
        LtbPs2Reader::new(Diagnostics::silent()).read(&mut BinaryCursor::from_bytes(bytes))
    }

    fn indices(face: &Face) -> [u32; 3] {
        face.vertices.map(|fv| fv.vertex_index)
    }

    #[test]
    fn test_sample_model() {
        let model = decode(&sample_ps2()).unwrap();
        assert_eq!(model.format, ModelFormat::LtbPs2);
        assert_eq!(model.internal_radius, 4.0);
        assert_eq!(model.nodes[0].name, "root");
        assert_eq!(model.nodes[0].bind_matrix.w.z, 3.0);

        let piece = &model.pieces[0];
        assert_eq!(piece.material_index, 2);
        assert_eq!(piece.specular_power, 0.5);
        let vertex = &piece.lods[0].vertices[2];
        assert_eq!(vertex.position.x, 2.0);
        assert_eq!(vertex.normal.y, 1.0);
        assert_eq!(vertex.texcoord.x, 0.5);
        assert_eq!(vertex.weights, vec![Weight::rigid(0)]);

        assert_eq!(model.sockets[0].name, "muzzle");
    }

    #[test]
    fn test_strips_alternate_winding() {
        let model = decode(&sample_ps2()).unwrap();
        let faces = &model.pieces[0].lods[0].faces;
        assert_eq!(faces.len(), 3);
        assert_eq!(indices(&faces[0]), [0, 1, 2]);
        assert_eq!(indices(&faces[1]), [2, 1, 3]);
        // new strip starts with normal winding again
        assert_eq!(indices(&faces[2]), [4, 5, 6]);
    }

    #[test]
    fn test_packed_animation() {
        let model = decode(&sample_ps2()).unwrap();
        let animation = &model.animations[0];
        assert_eq!(animation.interpolation_time, 200);
        assert_eq!(animation.keyframes[1].time, 500);
        let transform = animation.keyframes[1].transforms[0];
        assert_eq!(transform.location, vec3(1.0, 0.0, 0.0));
        assert_eq!(transform.rotation.s, 1.0);
    }

    #[test]
    fn test_rejects_other_versions() {
        let mut bytes = sample_ps2();
        bytes[0] = 8;
        assert!(matches!(decode(&bytes), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_section_offset_past_end() {
        let mut bytes = sample_ps2();
        let len = bytes.len() as u32;
        bytes[36..40].copy_from_slice(&(len + 100).to_le_bytes());
        assert!(decode(&bytes).unwrap_err().is_truncated());
    }
}
