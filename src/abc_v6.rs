//ABC v6 model reader (LithTech 1.0)
//
//same section chain as later ABC files, but geometry is a single rigid mesh
//and nodes may carry per-keyframe vertex deformation. bind poses are not
//stored: they come from the first frame of the first animation

use std::io::{Read, Seek};

use cgmath::{vec3, Matrix4, SquareMatrix, Vector2, Vector3};

use crate::abc::{read_sections, read_transform};
use crate::cursor::BinaryCursor;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{
    Animation, DepthFirstLinker, Face, FaceVertex, Keyframe, Lod, Model, ModelFormat, Node,
    Piece, Vertex, Weight,
};

pub const VERSION_STRING: &str = "MonolithExport Model File v6";

pub struct AbcV6Reader<'a> {
    diag: Diagnostics<'a>,
}

impl<'a> AbcV6Reader<'a> {
    pub fn new(diag: Diagnostics<'a>) -> Self {
        Self { diag }
    }

    pub fn read<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Model> {
        let mut model = Model::new(ModelFormat::AbcV6);
        model.version = 6;
        let mut seen_header = false;

        read_sections(cursor, &self.diag, |name, cursor| {
            if name != "Header" && !seen_header {
                return Err(Error::mismatch(format!("section '{name}' before Header")));
            }
            match name {
                "Header" => {
                    self.read_header(cursor, &mut model)?;
                    seen_header = true;
                }
                "Geometry" => self.read_geometry(cursor, &mut model)?,
                "Nodes" => self.read_nodes(cursor, &mut model)?,
                "Animation" => self.read_animations(cursor, &mut model)?,
                "AnimDims" => {
                    for animation in &mut model.animations {
                        animation.extents = cursor.read_vector3()?;
                    }
                }
                "TransformInfo" => {
                    model.flip_geometry = cursor.read::<i32>()? != 0;
                    model.flip_animation = cursor.read::<i32>()? != 0;
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        if !seen_header {
            return Err(Error::mismatch("no Header section"));
        }
        if model.nodes.is_empty() {
            return Err(Error::mismatch("no Nodes section"));
        }

        if model.flip_animation {
            diag!(self.diag, Debug, "Conjugating keyframe rotations");
            for animation in &mut model.animations {
                for keyframe in &mut animation.keyframes {
                    for transform in &mut keyframe.transforms {
                        transform.rotation = transform.rotation.conjugate();
                    }
                }
            }
        }
        compose_bind_matrices(&mut model);

        model.check_faces()?;
        model.check_animations()?;

        diag!(
            self.diag,
            Info,
            "ABC v6: {} nodes, {} vertices, {} animations",
            model.nodes.len(),
            model.pieces.first().map_or(0, |p| p.lods[0].vertices.len()),
            model.animations.len()
        );
        Ok(model)
    }

    fn read_header<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let version = cursor.read_short_string()?;
        if version != VERSION_STRING {
            return Err(Error::mismatch(format!("not an ABC v6 header: {version:?}")));
        }
        model.command_string = cursor.read_short_string()?;
        Ok(())
    }

    fn read_geometry<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let _bounds_min = cursor.read_vector3()?;
        let _bounds_max = cursor.read_vector3()?;
        let lod_count = cursor.read::<u32>()? as usize;
        // vertex start of every LOD plus the end marker
        cursor.skip((lod_count as u64 + 1) * 2)?;

        let face_count = cursor.read::<u32>()? as usize;
        let mut faces = Vec::with_capacity(cursor.capacity_hint(face_count, 33));
        for _ in 0..face_count {
            let mut vertices = [FaceVertex::new(0, Vector2::new(0.0, 0.0)); 3];
            for fv in &mut vertices {
                let texcoord = cursor.read_vector2()?;
                *fv = FaceVertex::new(cursor.read::<u16>()? as u32, texcoord);
            }
            let _face_normal = read_packed_normal(cursor)?;
            faces.push(Face { vertices });
        }

        let vertex_count = cursor.read::<u32>()? as usize;
        let _normal_vertex_count = cursor.read::<u32>()?;
        let mut vertices = Vec::with_capacity(cursor.capacity_hint(vertex_count, 20));
        for _ in 0..vertex_count {
            let position = cursor.read_vector3()?;
            let normal = read_packed_normal(cursor)?;
            let node = cursor.read::<u8>()?;
            let _lod_replacements = cursor.read_array::<4>()?;
            vertices.push(Vertex {
                position,
                normal,
                weights: vec![Weight::rigid(node as u32)],
                ..Vertex::default()
            });
        }

        diag!(
            self.diag,
            Debug,
            "Geometry: {} faces, {} vertices, {} LODs",
            faces.len(),
            vertices.len(),
            lod_count
        );

        let mut piece = Piece::new(String::from("Piece"));
        piece.lods.push(Lod {
            distance: 0.0,
            vertices,
            faces,
        });
        model.pieces = vec![piece];
        Ok(())
    }

    fn read_nodes<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        let mut linker = DepthFirstLinker::new();
        model.nodes.clear();

        // no count: the hierarchy ends when no children are pending
        loop {
            let _bounds_min = cursor.read_vector3()?;
            let _bounds_max = cursor.read_vector3()?;
            let mut node = Node::new(cursor.read_short_string()?);
            node.index = cursor.read()?;
            node.flags = cursor.read()?;

            let morph_count = cursor.read::<u32>()? as usize;
            node.morph_vertices = Vec::with_capacity(cursor.capacity_hint(morph_count, 2));
            for _ in 0..morph_count {
                node.morph_vertices.push(cursor.read()?);
            }
            node.child_count = cursor.read()?;
            node.parent = linker.link(model.nodes.len(), node.child_count)?;
            model.nodes.push(node);

            if linker.is_complete() {
                break;
            }
        }

        diag!(self.diag, Debug, "Read {} nodes", model.nodes.len());
        Ok(())
    }

    fn read_animations<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        model: &mut Model,
    ) -> Result<()> {
        if model.nodes.is_empty() {
            return Err(Error::mismatch("Animation section before Nodes"));
        }
        let node_count = model.nodes.len();
        let animation_count = cursor.read::<u32>()? as usize;

        model.animations = Vec::with_capacity(cursor.capacity_hint(animation_count, 34));
        for _ in 0..animation_count {
            let name = cursor.read_short_string()?;
            let _length = cursor.read::<u32>()?;
            let _bounds_min = cursor.read_vector3()?;
            let _bounds_max = cursor.read_vector3()?;

            let keyframe_count = cursor.read::<u32>()? as usize;
            let mut keyframes = Vec::with_capacity(cursor.capacity_hint(keyframe_count, 30));
            for _ in 0..keyframe_count {
                let time = cursor.read::<u32>()?;
                let _bounds_min = cursor.read_vector3()?;
                let _bounds_max = cursor.read_vector3()?;
                let mut keyframe = Keyframe::new(time, cursor.read_short_string()?, node_count);
                keyframe.deformations = vec![Vec::new(); node_count];
                keyframes.push(keyframe);
            }

            for (node_index, node) in model.nodes.iter().enumerate() {
                for keyframe in &mut keyframes {
                    keyframe.transforms[node_index] = read_transform(cursor)?;
                }
                if node.morph_vertices.is_empty() {
                    continue;
                }
                let morph_count = node.morph_vertices.len();
                self.read_deformations(cursor, node_index, morph_count, &mut keyframes)?;
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
                extents: Vector3::new(0.0, 0.0, 0.0),
                interpolation_time: 0,
                keyframes,
            });
        }
        Ok(())
    }

    /// Packed offsets for every keyframe, then the scale and translation
    /// that unpack them.
    fn read_deformations<R: Read + Seek>(
        &self,
        cursor: &mut BinaryCursor<R>,
        node_index: usize,
        morph_count: usize,
        keyframes: &mut [Keyframe],
    ) -> Result<()> {
        let mut packed = Vec::with_capacity(keyframes.len());
        for _ in 0..keyframes.len() {
            let bytes = cursor.read_bytes(morph_count * 3)?;
            packed.push(bytes);
        }
        let scale = cursor.read_vector3()?;
        let translation = cursor.read_vector3()?;

        for (keyframe, bytes) in keyframes.iter_mut().zip(packed) {
            keyframe.deformations[node_index] = bytes
                .chunks_exact(3)
                .map(|c| {
                    vec3(
                        c[0] as f32 * scale.x + translation.x,
                        c[1] as f32 * scale.y + translation.y,
                        c[2] as f32 * scale.z + translation.z,
                    )
                })
                .collect();
        }
        Ok(())
    }
}

fn read_packed_normal<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Vector3<f32>> {
    let x = cursor.read::<i8>()?;
    let y = cursor.read::<i8>()?;
    let z = cursor.read::<i8>()?;
    Ok(vec3(x as f32, y as f32, z as f32) / 127.0)
}

// frame 0 of the first animation, parent first
fn compose_bind_matrices(model: &mut Model) {
    let first_frame = model
        .animations
        .first()
        .and_then(|animation| animation.keyframes.first())
        .map(|keyframe| keyframe.transforms.clone());

    let mut binds: Vec<Matrix4<f32>> = Vec::with_capacity(model.nodes.len());
    for (index, node) in model.nodes.iter_mut().enumerate() {
        let local = first_frame
            .as_ref()
            .and_then(|transforms| transforms.get(index))
            .map_or_else(Matrix4::identity, |t| t.matrix());
        let bind = match node.parent {
            Some(parent) => binds[parent] * local,
            None => local,
        };
        node.bind_matrix = bind;
        binds.push(bind);
    }
}
