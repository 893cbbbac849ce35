//lithtech-dump: print what the decoders make of a LithTech asset

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::*;

use lithtech_decode::dat::{DatReader, PropertyValue};
use lithtech_decode::dtx::{self, DtxReader, Texture};
use lithtech_decode::{Diagnostics, Model, ModelFamily, read_model_file};

/// Inspect LithTech models, worlds and textures
#[derive(Parser)]
#[command(name = "lithtech-dump")]
#[command(about = "Print a summary of a LithTech .abc, .ltb, .dat or .dtx file")]
#[command(version)]
struct Cli {
    /// Asset to inspect
    path: PathBuf,

    /// Model family to try, overriding the file extension
    #[arg(long, value_enum)]
    family: Option<FamilyArg>,

    /// Also decode the model's skin from ../SKINS/<NAME>.DTX
    #[arg(long)]
    skins: bool,

    /// List every world object with its properties
    #[arg(long)]
    objects: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FamilyArg {
    Abc,
    Ltb,
}

impl From<FamilyArg> for ModelFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Abc => ModelFamily::Abc,
            FamilyArg::Ltb => ModelFamily::Ltb,
        }
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let extension = cli
        .path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match (extension.as_str(), cli.family) {
        ("dat", None) => print_dat_info(&cli.path, cli.objects),
        ("dtx", None) => print_dtx_info(&cli.path),
        (_, family) => {
            let family = family.map(ModelFamily::from);
            if family.is_none() && ModelFamily::from_path(&cli.path).is_none() {
                bail!("Don't know how to read {}", cli.path.display());
            }
            print_model_info(&cli.path, family, cli.skins)
        }
    }
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

/// Print summary information about a DAT file
fn print_dat_info(path: &Path, list_objects: bool) -> Result<()> {
    info!("Analyzing DAT file: {}", path.display());

    let world = DatReader::new(Diagnostics::global())
        .read_from_file(path)
        .with_context(|| format!("Failed to parse DAT file {}", path.display()))?;

    banner("DAT FILE SUMMARY");
    println!("\nVersion: {}", world.header.version);
    println!("World Properties: {}", world.header.info_string);
    println!("Lightmap Grid Size: {}", world.header.lightmap_grid_size);
    println!(
        "Quadtree: {} nodes, {} subdivisions",
        world.quad_tree.node_count, world.quad_tree.subdivisions
    );

    println!("\n--- WORLD MODELS ({}) ---", world.world_models.len());
    for (i, model) in world.world_models.iter().enumerate() {
        let mut kinds = Vec::new();
        if model.info_flags.is_main_world() {
            kinds.push("main");
        }
        if model.info_flags.is_movable() {
            kinds.push("movable");
        }
        if model.info_flags.is_physics_bsp() {
            kinds.push("physics");
        }
        if model.info_flags.is_vis_bsp() {
            kinds.push("vis");
        }
        println!("\n  [{}] {} ({})", i, model.name, kinds.join(", "));
        println!("      Points: {}", model.points.len());
        println!("      Polygons: {}", model.polys.len());
        println!("      Surfaces: {}", model.surfaces.len());
        println!("      Nodes: {}", model.nodes.len());
        println!("      Textures: {}", model.textures.len());
        println!(
            "      Bounds: ({:.1}, {:.1}, {:.1}) to ({:.1}, {:.1}, {:.1})",
            model.min_box.x,
            model.min_box.y,
            model.min_box.z,
            model.max_box.x,
            model.max_box.y,
            model.max_box.z
        );
        let invisible = model
            .surfaces
            .iter()
            .filter(|s| s.flags.is_invisible() || s.flags.is_sky())
            .count();
        println!("      Invisible/sky surfaces: {invisible}");
    }

    println!("\n--- WORLD OBJECTS ({}) ---", world.objects.len());
    let mut object_types: BTreeMap<&str, usize> = BTreeMap::new();
    for object in &world.objects {
        *object_types.entry(&object.type_name).or_insert(0) += 1;
    }
    for (type_name, count) in &object_types {
        println!("  {type_name}: {count}");
    }

    if list_objects {
        for object in &world.objects {
            println!("\n  {} '{}'", object.type_name, object.name().unwrap_or("?"));
            for property in &object.properties {
                println!("      {} = {}", property.name, describe(&property.value));
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    Ok(())
}

fn describe(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => format!("{s:?}"),
        PropertyValue::Vector(v) => format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z),
        PropertyValue::Float(f) => format!("{f}"),
        PropertyValue::Bool(b) => format!("{b}"),
        PropertyValue::Int(i) => format!("{i}"),
        PropertyValue::Rotation(q) => {
            format!("[{:.3}, {:.3}, {:.3}, {:.3}]", q.v.x, q.v.y, q.v.z, q.s)
        }
    }
}

fn print_texture(texture: &Texture) {
    println!("  Version: {:?}", texture.version);
    println!("  Size: {}x{}", texture.width, texture.height);
    println!("  Format: {:?}", texture.format);
    println!("  Mipmaps: {}", texture.mipmap_count);
    if !texture.command_string.is_empty() {
        println!("  Command String: {}", texture.command_string);
    }
}

fn print_dtx_info(path: &Path) -> Result<()> {
    let texture = DtxReader::new(Diagnostics::global())
        .read_from_file(path)
        .with_context(|| format!("Failed to parse DTX file {}", path.display()))?;

    banner("DTX FILE SUMMARY");
    print_texture(&texture);
    Ok(())
}

fn print_model_info(path: &Path, family: Option<ModelFamily>, skins: bool) -> Result<()> {
    info!("Analyzing model file: {}", path.display());

    let model = read_model_file(path, family, Diagnostics::global())
        .with_context(|| format!("Failed to parse model file {}", path.display()))?;

    banner("MODEL SUMMARY");
    print_model(&model);

    if skins {
        match dtx::find_skin(path) {
            Some(skin) => {
                println!("\n--- SKIN {} ---", skin.display());
                let texture = DtxReader::new(Diagnostics::global())
                    .read_from_file(&skin)
                    .with_context(|| format!("Failed to parse skin {}", skin.display()))?;
                print_texture(&texture);
            }
            None => warn!("No skin found for {}", path.display()),
        }
    }

    println!("\n{}", "=".repeat(60));
    Ok(())
}

fn print_model(model: &Model) {
    println!("\nName: {}", model.name);
    println!("Format: {} (version {})", model.format, model.version);
    if !model.command_string.is_empty() {
        println!("Command String: {}", model.command_string);
    }

    println!("\n--- NODES ({}) ---", model.nodes.len());
    for (i, node) in model.nodes.iter().enumerate() {
        let parent = node
            .parent
            .map(|p| model.nodes[p].name.as_str())
            .unwrap_or("-");
        println!("  [{i}] {} (parent {parent})", node.name);
    }

    println!("\n--- PIECES ({}) ---", model.pieces.len());
    for piece in &model.pieces {
        println!("  {} (material {})", piece.name, piece.material_index);
        for (i, lod) in piece.lods.iter().enumerate() {
            println!(
                "      LOD {i}: {} vertices, {} faces",
                lod.vertices.len(),
                lod.faces.len()
            );
        }
    }

    println!("\n--- ANIMATIONS ({}) ---", model.animations.len());
    for animation in &model.animations {
        println!(
            "  {}: {} keyframes, {} ms",
            animation.name,
            animation.keyframes.len(),
            animation.duration()
        );
    }

    if !model.sockets.is_empty() {
        println!("\n--- SOCKETS ({}) ---", model.sockets.len());
        for socket in &model.sockets {
            let node = model
                .nodes
                .get(socket.node_index as usize)
                .map_or("?", |n| n.name.as_str());
            println!("  {} on {}", socket.name, node);
        }
    }
}
