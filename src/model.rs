//unified model entity produced by every ABC and LTB reader
//
//nodes are stored depth first: a parent always precedes its children, so
//parent links are indices into the same list and never point forward

use std::fmt;

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector2, Vector3, Zero};

use crate::error::{Error, Result};

/// On-disk layout a model was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    AbcV6,
    Abc,
    LtbPc,
    LtbPs2,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::AbcV6 => "ABC v6",
            ModelFormat::Abc => "ABC",
            ModelFormat::LtbPc => "LTB (PC)",
            ModelFormat::LtbPs2 => "LTB (PS2)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    /// File stem when loaded from disk, empty otherwise
    pub name: String,
    pub format: ModelFormat,
    pub version: u32,
    pub command_string: String,
    pub internal_radius: f32,
    pub lod_distances: Vec<f32>,
    pub nodes: Vec<Node>,
    pub pieces: Vec<Piece>,
    pub weight_sets: Vec<WeightSet>,
    pub child_models: Vec<ChildModel>,
    pub animations: Vec<Animation>,
    pub sockets: Vec<Socket>,
    pub anim_bindings: Vec<AnimBinding>,
    pub obbs: Vec<OrientedBox>,
    pub flip_geometry: bool,
    pub flip_animation: bool,
}

impl Model {
    pub fn new(format: ModelFormat) -> Self {
        Self {
            name: String::new(),
            format,
            version: 0,
            command_string: String::new(),
            internal_radius: 0.0,
            lod_distances: Vec::new(),
            nodes: Vec::new(),
            pieces: Vec::new(),
            weight_sets: Vec::new(),
            child_models: Vec::new(),
            animations: Vec::new(),
            sockets: Vec::new(),
            anim_bindings: Vec::new(),
            obbs: Vec::new(),
            flip_geometry: false,
            flip_animation: false,
        }
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Every face must address vertices of its own LOD.
    pub(crate) fn check_faces(&self) -> Result<()> {
        for piece in &self.pieces {
            for (lod_index, lod) in piece.lods.iter().enumerate() {
                let count = lod.vertices.len();
                let bad = lod
                    .faces
                    .iter()
                    .flat_map(|face| face.vertices.iter())
                    .find(|fv| fv.vertex_index as usize >= count);
                if let Some(fv) = bad {
                    return Err(Error::mismatch(format!(
                        "piece '{}' LOD {} face references vertex {} of {}",
                        piece.name, lod_index, fv.vertex_index, count
                    )));
                }
            }
        }
        Ok(())
    }

    /// Keyframe transforms must cover every node.
    pub(crate) fn check_animations(&self) -> Result<()> {
        for animation in &self.animations {
            for keyframe in &animation.keyframes {
                if keyframe.transforms.len() != self.nodes.len() {
                    return Err(Error::mismatch(format!(
                        "animation '{}' has {} transforms for {} nodes",
                        animation.name,
                        keyframe.transforms.len(),
                        self.nodes.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub index: u16,
    pub flags: u8,
    /// Model-space bind transform
    pub bind_matrix: Matrix4<f32>,
    /// Index of the parent in `Model::nodes`, always smaller than this node's
    pub parent: Option<usize>,
    pub child_count: u32,
    /// Vertices animated by per-keyframe deformation (ABC v6 only)
    pub morph_vertices: Vec<u16>,
}

impl Node {
    pub fn new(name: String) -> Self {
        Self {
            name,
            index: 0,
            flags: 0,
            bind_matrix: Matrix4::identity(),
            parent: None,
            child_count: 0,
            morph_vertices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Piece {
    pub name: String,
    pub material_index: u16,
    pub specular_power: f32,
    pub specular_scale: f32,
    pub lod_weight: f32,
    pub lods: Vec<Lod>,
}

impl Piece {
    pub fn new(name: String) -> Self {
        Self {
            name,
            material_index: 0,
            specular_power: 0.0,
            specular_scale: 0.0,
            lod_weight: 1.0,
            lods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lod {
    pub distance: f32,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub texcoord: Vector2<f32>,
    /// At most four influences
    pub weights: Vec<Weight>,
    pub sublod_vertex_index: u16,
    pub color: Option<[u8; 4]>,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vector3::zero(),
            normal: Vector3::zero(),
            texcoord: Vector2::zero(),
            weights: Vec::new(),
            sublod_vertex_index: 0,
            color: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    pub node_index: u32,
    /// Vertex position in the node's space (ABC only)
    pub location: Vector3<f32>,
    pub bias: f32,
}

impl Weight {
    pub fn rigid(node_index: u32) -> Self {
        Self {
            node_index,
            location: Vector3::zero(),
            bias: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceVertex {
    pub vertex_index: u32,
    pub texcoord: Vector2<f32>,
}

impl FaceVertex {
    pub fn new(vertex_index: u32, texcoord: Vector2<f32>) -> Self {
        Self {
            vertex_index,
            texcoord,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    pub vertices: [FaceVertex; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub location: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            location: Vector3::zero(),
            rotation: Quaternion::one(),
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.location) * Matrix4::from(self.rotation)
    }
}

#[derive(Debug, Clone)]
pub struct Keyframe {
    /// Milliseconds from the start of the animation
    pub time: u32,
    pub command: String,
    /// One per node, parent-relative
    pub transforms: Vec<Transform>,
    /// Per node, one offset per morph vertex (empty for nodes without any)
    pub deformations: Vec<Vec<Vector3<f32>>>,
}

impl Keyframe {
    pub fn new(time: u32, command: String, node_count: usize) -> Self {
        Self {
            time,
            command,
            transforms: vec![Transform::identity(); node_count],
            deformations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Animation {
    pub name: String,
    pub extents: Vector3<f32>,
    pub interpolation_time: u32,
    pub keyframes: Vec<Keyframe>,
}

impl Animation {
    pub fn duration(&self) -> u32 {
        self.keyframes.last().map_or(0, |k| k.time)
    }
}

#[derive(Debug, Clone)]
pub struct Socket {
    pub name: String,
    pub node_index: u32,
    pub rotation: Quaternion<f32>,
    pub location: Vector3<f32>,
    pub scale: Vector3<f32>,
}

#[derive(Debug, Clone)]
pub struct WeightSet {
    pub name: String,
    pub weights: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ChildModel {
    pub name: String,
    pub build_number: u32,
    pub transforms: Vec<Transform>,
}

#[derive(Debug, Clone)]
pub struct AnimBinding {
    pub name: String,
    pub extents: Vector3<f32>,
    pub origin: Vector3<f32>,
}

#[derive(Debug, Clone)]
pub struct OrientedBox {
    pub position: Vector3<f32>,
    pub size: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub node_index: u32,
}

/// Rebuilds parent links of a depth-first node list from child counts.
#[derive(Debug, Default)]
pub(crate) struct DepthFirstLinker {
    // (node, children still expected)
    pending: Vec<(usize, u32)>,
}

impl DepthFirstLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next node and return its parent.
    pub fn link(&mut self, index: usize, child_count: u32) -> Result<Option<usize>> {
        let parent = match self.pending.last_mut() {
            Some((parent, remaining)) => {
                *remaining -= 1;
                Some(*parent)
            }
            None if index == 0 => None,
            None => {
                return Err(Error::mismatch(format!(
                    "node {index} follows a completed hierarchy"
                )))
            }
        };

        while matches!(self.pending.last(), Some((_, 0))) {
            self.pending.pop();
        }
        if child_count > 0 {
            self.pending.push((index, child_count));
        }
        Ok(parent)
    }

    /// True once every declared child has been seen.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        match self.pending.last() {
            None => Ok(()),
            Some((node, remaining)) => Err(Error::mismatch(format!(
                "node {node} still expects {remaining} children"
            ))),
        }
    }
}

/// Fill `parent` for a depth-first list whose `child_count`s are known.
pub(crate) fn link_nodes(nodes: &mut [Node]) -> Result<()> {
    let mut linker = DepthFirstLinker::new();
    for (index, node) in nodes.iter_mut().enumerate() {
        node.parent = linker.link(index, node.child_count)?;
    }
    linker.finish()
}
