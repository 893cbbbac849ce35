//ABC model reader (PC, versions 9 to 13)
//
//the file is a chain of named sections, each carrying the offset of the
//next one; the Header section must come first

use std::io::{Read, Seek};

use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{
    self, AnimBinding, Animation, ChildModel, Face, FaceVertex, Keyframe, Lod, Model,
    ModelFormat, Node, Piece, Socket, Transform, Vertex, Weight, WeightSet,
};

const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 9..=13;
const RESERVED_HEADER_BYTES: u64 = 64;
const DEFAULT_INTERPOLATION_MS: u32 = 200;

/// Walk a section chain, handing each section to `visit`. `visit` returns
/// false for sections it does not know; those are skipped.
pub(crate) fn read_sections<R, F>(
    cursor: &mut BinaryCursor<R>,
    diag: &Diagnostics<'_>,
    mut visit: F,
) -> Result<()>
where
    R: Read + Seek,
    F: FnMut(&str, &mut BinaryCursor<R>) -> Result<bool>,
{
    loop {
        let start = cursor.tell();
        let name = cursor.read_short_string()?;
        let next = cursor.read::<i32>()?;
        diag!(diag, Debug, "Section '{}' at 0x{:08X}", name, start);

        if !visit(&name, cursor)? {
            diag!(diag, Debug, "Skipping unknown section '{}'", name);
        }

        if next == -1 {
            return Ok(());
        }
        let next = u64::try_from(next)
            .ok()
            .filter(|&next| next > start)
            .ok_or_else(|| {
                Error::mismatch(format!("section '{name}' points back to offset {next}"))
            })?;
        cursor.seek(next)?;
    }
}

/// Transform stored as location then rotation.
pub(crate) fn read_transform<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Transform> {
    Ok(Transform {
        location: cursor.read_vector3()?,
        rotation: cursor.read_quaternion()?,
    })
}

struct Header {
    version: u32,
    keyframe_count: u32,
    animation_count: u32,
    node_count: u32,
    piece_count: u32,
    child_model_count: u32,
    lod_count: u32,
    socket_count: u32,
    weight_set_count: u32,
}

pub struct AbcReader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> AbcReader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Model> {
        let mut model = Model::new(ModelFormat::Abc);
        let mut header: Option<Header> = None;

        read_sections(cursor, &self.diag, |name, cursor| {
            match name {
                "Header" => {
                    header = Some(self.read_header(cursor, &mut model)?);
                    return Ok(true);
                }
                "Pieces" | "Nodes" | "ChildModels" | "Animation" | "Sockets" | "AnimBindings" => {}
                _ => return Ok(false),
            }
            let Some(header) = header.as_ref() else {
                return Err(Error::mismatch(format!("section '{name}' before Header")));
            };
            match name {
                "Pieces" => self.read_pieces(cursor, header, &mut model)?,
                "Nodes" => self.read_nodes(cursor, header, &mut model)?,
                "ChildModels" => self.read_child_models(cursor, header, &mut model)?,
                "Animation" => self.read_animations(cursor, header, &mut model)?,
                "Sockets" => self.read_sockets(cursor, header, &mut model)?,
                _ => self.read_anim_bindings(cursor, &mut model)?,
            }
            Ok(true)
        })?;

        let header = header.ok_or_else(|| Error::mismatch("no Header section"))?;
        if model.nodes.len() != header.node_count as usize {
            return Err(Error::mismatch(format!(
                "header declares {} nodes, read {}",
                header.node_count,
                model.nodes.len()
            )));
        }
        model.check_faces()?;
        model.check_animations()?;

        diag!(
            self.diag,
            Info,
            "ABC v{}: {} nodes, {} pieces, {} animations, {} sockets",
            model.version,
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
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::unsupported(format!("ABC version {version}")));
        }

        let header = Header {
            version,
            keyframe_count: cursor.read()?,
            animation_count: cursor.read()?,
            node_count: cursor.read()?,
            piece_count: cursor.read()?,
            child_model_count: cursor.read()?,
            lod_count: {
                let _face_count = cursor.read::<u32>()?;
                let _vertex_count = cursor.read::<u32>()?;
                let _vertex_weight_count = cursor.read::<u32>()?;
                cursor.read()?
            },
            socket_count: cursor.read()?,
            weight_set_count: cursor.read()?,
        };
        let _string_count = cursor.read::<u32>()?;
        let _string_length = cursor.read::<u32>()?;
        if version >= 13 {
            let _vertex_animation_data_size = cursor.read::<u32>()?;
        }

        model.version = version;
        model.command_string = cursor.read_short_string()?;
        model.internal_radius = cursor.read()?;
        cursor.skip(RESERVED_HEADER_BYTES)?;

        let lod_count = header.lod_count as usize;
        model.lod_distances = Vec::with_capacity(cursor.capacity_hint(lod_count, 4));
        for _ in 0..lod_count {
            model.lod_distances.push(cursor.read()?);
        }

        diag!(
            self.diag,
            Debug,
            "Header: version {}, {} keyframes, {} nodes, {} pieces, {} LODs",
            version,
            header.keyframe_count,
            header.node_count,
            header.piece_count,
            header.lod_count
        );
        Ok(header)
    }

    fn read_pieces<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let _weight_count = cursor.read::<u32>()?;
        let piece_count = cursor.read::<u32>()? as usize;

        model.pieces = Vec::with_capacity(cursor.capacity_hint(piece_count, 16));
        for _ in 0..piece_count {
            let material_index = cursor.read::<u16>()?;
            let specular_power = cursor.read::<f32>()?;
            let specular_scale = cursor.read::<f32>()?;
            let lod_weight = if header.version > 9 {
                cursor.read::<f32>()?
            } else {
                1.0
            };
            let _padding = cursor.read::<u16>()?;

            let mut piece = Piece::new(cursor.read_short_string()?);
            piece.material_index = material_index;
            piece.specular_power = specular_power;
            piece.specular_scale = specular_scale;
            piece.lod_weight = lod_weight;

            for lod_index in 0..header.lod_count as usize {
                let mut lod = self.read_lod(cursor)?;
                lod.distance = model.lod_distances.get(lod_index).copied().unwrap_or(0.0);
                piece.lods.push(lod);
            }
            diag!(self.diag, Trace, "Piece '{}': {} LODs", piece.name, piece.lods.len());
            model.pieces.push(piece);
        }
        Ok(())
    }

    fn read_lod<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Lod> {
        let face_count = cursor.read::<u32>()? as usize;
        let mut faces = Vec::with_capacity(cursor.capacity_hint(face_count, 30));
        for _ in 0..face_count {
            let mut vertices = [FaceVertex::new(0, cgmath::vec2(0.0, 0.0)); 3];
            for fv in &mut vertices {
                let texcoord = cursor.read_vector2()?;
                *fv = FaceVertex::new(cursor.read::<u16>()? as u32, texcoord);
            }
            faces.push(Face { vertices });
        }

        let vertex_count = cursor.read::<u32>()? as usize;
        let mut vertices = Vec::with_capacity(cursor.capacity_hint(vertex_count, 28));
        for _ in 0..vertex_count {
            let weight_count = cursor.read::<u16>()? as usize;
            let sublod_vertex_index = cursor.read::<u16>()?;
            let mut weights = Vec::with_capacity(cursor.capacity_hint(weight_count, 20));
            for _ in 0..weight_count {
                weights.push(Weight {
                    node_index: cursor.read()?,
                    location: cursor.read_vector3()?,
                    bias: cursor.read()?,
                });
            }
            vertices.push(Vertex {
                position: cursor.read_vector3()?,
                normal: cursor.read_vector3()?,
                weights,
                sublod_vertex_index,
                ..Vertex::default()
            });
        }

        Ok(Lod {
            distance: 0.0,
            vertices,
            faces,
        })
    }

    fn read_nodes<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let node_count = header.node_count as usize;
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

        let weight_set_count = cursor.read::<u32>()? as usize;
        if weight_set_count != header.weight_set_count as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} weight sets, section has {}",
                header.weight_set_count,
                weight_set_count
            );
        }
        model.weight_sets = Vec::with_capacity(cursor.capacity_hint(weight_set_count, 6));
        for _ in 0..weight_set_count {
            let name = cursor.read_short_string()?;
            let count = cursor.read::<u32>()? as usize;
            let mut weights = Vec::with_capacity(cursor.capacity_hint(count, 4));
            for _ in 0..count {
                weights.push(cursor.read()?);
            }
            model.weight_sets.push(WeightSet { name, weights });
        }
        diag!(self.diag, Debug, "Read {} nodes", model.nodes.len());
        Ok(())
    }

    fn read_child_models<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        let count = cursor.read::<u16>()? as usize;
        if count != header.child_model_count as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} child models, section has {}",
                header.child_model_count,
                count
            );
        }
        for _ in 0..count {
            let name = cursor.read_short_string()?;
            let build_number = cursor.read::<u32>()?;
            let node_count = header.node_count as usize;
            let mut transforms = Vec::with_capacity(cursor.capacity_hint(node_count, 28));
            for _ in 0..header.node_count {
                transforms.push(read_transform(cursor)?);
            }
            model.child_models.push(ChildModel {
                name,
                build_number,
                transforms,
            });
        }
        Ok(())
    }

    fn read_animations<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        header: &Header,
        model: &mut Model,
    ) -> Result<()> {
        // keyframes hold one transform per node read so far
        if model.nodes.is_empty() {
            return Err(Error::mismatch("Animation section before Nodes"));
        }
        let node_count = model.nodes.len();
        let animation_count = cursor.read::<u32>()? as usize;
        if animation_count != header.animation_count as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} animations, section has {}",
                header.animation_count,
                animation_count
            );
        }

        model.animations = Vec::with_capacity(cursor.capacity_hint(animation_count, 24));
        for _ in 0..animation_count {
            let extents = cursor.read_vector3()?;
            let name = cursor.read_short_string()?;
            let _unknown = cursor.read::<i32>()?;
            let interpolation_time = if header.version >= 12 {
                cursor.read::<u32>()?
            } else {
                DEFAULT_INTERPOLATION_MS
            };

            let keyframe_count = cursor.read::<u32>()? as usize;
            let mut keyframes = Vec::with_capacity(cursor.capacity_hint(keyframe_count, 6));
            for _ in 0..keyframe_count {
                let time = cursor.read::<u32>()?;
                let command = cursor.read_short_string()?;
                keyframes.push(Keyframe::new(time, command, node_count));
            }

            // node major
            for node_index in 0..node_count {
                for keyframe in &mut keyframes {
                    keyframe.transforms[node_index] = read_transform(cursor)?;
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
                extents,
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
        let count = cursor.read::<u32>()? as usize;
        if count != header.socket_count as usize {
            diag!(
                self.diag,
                Warn,
                "Header declares {} sockets, section has {}",
                header.socket_count,
                count
            );
        }
        model.sockets = Vec::with_capacity(cursor.capacity_hint(count, 34));
        for _ in 0..count {
            let node_index = cursor.read::<u32>()?;
            let name = cursor.read_short_string()?;
            model.sockets.push(Socket {
                name,
                node_index,
                rotation: cursor.read_quaternion()?,
                location: cursor.read_vector3()?,
                scale: cgmath::vec3(1.0, 1.0, 1.0),
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

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::testutil::ByteWriter;

    /// Two-node ABC v10 model: a root with one child, one triangle piece,
    /// one two-keyframe animation and one socket.
    pub fn sample_abc() -> Vec<u8> {
        ByteWriter::new()
            .section("Header", false, |w| {
                w.u32(10) // version
                    .u32(2) // keyframes
                    .u32(1) // animations
                    .u32(2) // nodes
                    .u32(1) // pieces
                    .u32(1) // child models
                    .u32(1) // faces
                    .u32(3) // vertices
                    .u32(3) // vertex weights
                    .u32(1) // LODs
                    .u32(1) // sockets
                    .u32(0) // weight sets
                    .u32(0) // strings
                    .u32(0) // string length
                    .str16("")
                    .f32(2.5)
                    .zeros(64)
                    .f32(0.0)
            })
            .section("Pieces", false, |w| {
                let mut w = w
                    .u32(3)
                    .u32(1)
                    .u16(0)
                    .f32(0.0)
                    .f32(1.0)
                    .f32(1.0)
                    .u16(0)
                    .str16("body")
                    .u32(1);
                for i in 0..3u16 {
                    w = w.vec2([i as f32, 0.0]).u16(i);
                }
                w = w.u32(3);
                for i in 0..3 {
                    w = w
                        .u16(1)
                        .u16(0)
                        .u32(1)
                        .vec3([0.0, i as f32, 0.0])
                        .f32(1.0)
                        .vec3([i as f32, 0.0, 0.0])
                        .vec3([0.0, 0.0, 1.0]);
                }
                w
            })
            .section("Nodes", false, |w| {
                w.str16("root")
                    .u16(0)
                    .u8(0)
                    .identity()
                    .u32(1)
                    .str16("spine")
                    .u16(1)
                    .u8(0)
                    .translation([0.0, 1.0, 0.0])
                    .u32(0)
                    .u32(0)
            })
            .section("Animation", false, |w| {
                let mut w = w
                    .u32(1)
                    .vec3([1.0, 2.0, 3.0])
                    .str16("idle")
                    .i32(0)
                    .u32(2)
                    .u32(0)
                    .str16("")
                    .u32(100)
                    .str16("sound");
                for node in 0..2 {
                    for key in 0..2 {
                        w = w
                            .vec3([node as f32, key as f32, 0.0])
                            .quat([0.0, 0.0, 0.0, 1.0]);
                    }
                }
                w
            })
            .section("Sockets", false, |w| {
                w.u32(1)
                    .u32(1)
                    .str16("head")
                    .quat([0.0, 0.0, 0.0, 1.0])
                    .vec3([0.0, 0.5, 0.0])
            })
            .section("AnimBindings", true, |w| {
                w.u32(1)
                    .str16("idle")
                    .vec3([1.0, 1.0, 1.0])
                    .vec3([0.0, 0.0, 0.0])
            })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_abc;
    use super::*;
    use crate::loader::{decode_model, ModelFamily};
    use crate::testutil::ByteWriter;

    fn decode(bytes: &[u8]) -> Result<Model> {
        AbcReader::new(Diagnostics::silent()).read(&mut BinaryCursor::from_bytes(bytes))
    }

    #[test]
    fn test_sample_model() {
        let model = decode(&sample_abc()).unwrap();
        assert_eq!(model.format, ModelFormat::Abc);
        assert_eq!(model.version, 10);
        assert_eq!(model.internal_radius, 2.5);

        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.nodes[0].parent, None);
        assert_eq!(model.nodes[1].parent, Some(0));
        assert_eq!(model.nodes[1].bind_matrix.w.y, 1.0);

        let lod = &model.pieces[0].lods[0];
        assert_eq!(model.pieces[0].name, "body");
        assert_eq!(lod.vertices.len(), 3);
        assert_eq!(lod.faces[0].vertices[2].vertex_index, 2);
        assert_eq!(lod.faces[0].vertices[1].texcoord.x, 1.0);
        assert_eq!(lod.vertices[2].weights[0].node_index, 1);
        assert_eq!(lod.vertices[2].position.x, 2.0);

        let animation = &model.animations[0];
        assert_eq!(animation.name, "idle");
        assert_eq!(animation.interpolation_time, 200);
        assert_eq!(animation.keyframes[1].time, 100);
        assert_eq!(animation.keyframes[1].command, "sound");
        // node major on disk: node 1, keyframe 1
        assert_eq!(animation.keyframes[1].transforms[1].location.x, 1.0);
        assert_eq!(animation.keyframes[1].transforms[1].location.y, 1.0);
        assert_eq!(animation.keyframes[0].transforms[1].location.y, 0.0);

        assert_eq!(model.sockets[0].name, "head");
        assert_eq!(model.sockets[0].node_index, 1);
        assert_eq!(model.anim_bindings[0].extents.x, 1.0);
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let bytes = sample_abc();
        let a = decode(&bytes).unwrap();
        let b = decode(&bytes).unwrap();
        assert_eq!(a.nodes.len(), b.nodes.len());
        assert_eq!(
            a.animations[0].keyframes[1].transforms,
            b.animations[0].keyframes[1].transforms
        );
        assert_eq!(a.pieces[0].lods[0].faces, b.pieces[0].lods[0].faces);
    }

    #[test]
    fn test_unsupported_version() {
        let bytes = ByteWriter::new()
            .section("Header", true, |w| w.u32(4).zeros(128))
            .finish();
        assert!(matches!(decode(&bytes), Err(Error::UnsupportedFeature(_))));
    }

    #[test]
    fn test_section_before_header_is_mismatch() {
        let bytes = ByteWriter::new()
            .section("Nodes", true, |w| w.u32(0))
            .finish();
        assert!(matches!(decode(&bytes), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_unknown_sections_are_skipped() {
        let mut bytes = sample_abc();
        // splice an unknown section in front of everything else
        let unknown = ByteWriter::new()
            .section("Mystery", false, |w| w.u32(0xDEAD_BEEF))
            .finish();
        let shift = unknown.len() as i32;
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        // shift every next pointer after the splice point
        let mut fixups = Vec::new();
        loop {
            cursor.read_short_string().unwrap();
            let at = cursor.tell() as usize;
            let next = cursor.read::<i32>().unwrap();
            if next == -1 {
                break;
            }
            fixups.push((at, next + shift));
            cursor.seek(next as u64).unwrap();
        }
        for (at, next) in fixups {
            bytes[at..at + 4].copy_from_slice(&next.to_le_bytes());
        }
        let spliced = [unknown, bytes].concat();

        let model = decode(&spliced).unwrap();
        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.sockets.len(), 1);
    }

    fn animation_before_nodes(node_count: u32) -> Vec<u8> {
        ByteWriter::new()
            .section("Header", false, |w| {
                w.u32(10)
                    .u32(1)
                    .u32(1)
                    .u32(node_count)
                    .zeros(40)
                    .str16("")
                    .f32(0.0)
                    .zeros(64)
            })
            .section("Animation", true, |w| {
                w.u32(1)
                    .vec3([0.0; 3])
                    .str16("idle")
                    .i32(0)
                    .u32(1)
                    .u32(0)
                    .str16("")
            })
            .finish()
    }

    #[test]
    fn test_animation_before_nodes_is_mismatch() {
        let err = decode(&animation_before_nodes(u32::MAX)).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn test_animation_before_nodes_fails_every_candidate() {
        let bytes = animation_before_nodes(u32::MAX);
        let err = decode_model(ModelFamily::Abc, &bytes, Diagnostics::silent()).unwrap_err();
        match err {
            Error::NoMatchingReader { family, failures } => {
                assert_eq!(family, "ABC");
                let formats: Vec<_> = failures.iter().map(|f| f.format).collect();
                assert_eq!(formats, vec![ModelFormat::AbcV6, ModelFormat::Abc]);
                assert!(matches!(failures[1].error, Error::FormatMismatch(_)));
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_file() {
        let bytes = sample_abc();
        let err = decode(&bytes[..bytes.len() - 10]).unwrap_err();
        assert!(err.is_truncated());
    }
}
