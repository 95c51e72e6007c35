use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use level_baker::{BakeConfig, MapVertex, Record, VERTEX_ATTRIBUTES};
use quake_reader::file::{open_game_dir, pak_paths, FileLoader};
use quake_reader::pak::Pak;
use quake_reader::Level;
use tracing::info;

use crate::bake_map::bake_map;

mod bake_map;
mod images;

#[derive(Parser)]
#[command(name = "quake-pack")]
#[command(about = "Bakes Quake levels into vertex streams and atlas pages")]
#[command(version)]
struct Cli {
    /// Game directory holding pak0.pak and loose files
    #[arg(long, global = true, default_value = "id1")]
    game_dir: PathBuf,

    /// Width and height of the texture and lightmap atlas pages
    #[arg(long, global = true, default_value_t = BakeConfig::default().atlas_size)]
    atlas_size: usize,

    /// Texels of edge padding around each texture
    #[arg(long, global = true, default_value_t = BakeConfig::default().texture_padding)]
    texture_padding: usize,

    /// Texels of edge padding around each lightmap
    #[arg(long, global = true, default_value_t = BakeConfig::default().lightmap_padding)]
    lightmap_padding: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bakes a map and writes its vertex streams and atlas pages
    BakeMap {
        /// Map name (example: e1m1), or a path to a file ending in ".bsp"
        map: String,

        /// Directory to write outputs to
        #[arg(long, default_value = ".")]
        dst: PathBuf,
    },

    /// Lists the entries of every archive in the game directory
    List,

    /// Prints a summary of a map
    DescribeMap {
        /// Map name (example: e1m1), or a path to a file ending in ".bsp"
        map: String,
    },

    /// Prints the layout of a baked vertex
    VertexLayout,
}

impl Cli {
    fn bake_config(&self) -> BakeConfig {
        BakeConfig {
            atlas_size: self.atlas_size,
            texture_padding: self.texture_padding,
            lightmap_padding: self.lightmap_padding,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::BakeMap { map, dst } => bake_map(&cli.game_dir, &cli.bake_config(), map, dst),
        Command::List => list(&cli.game_dir),
        Command::DescribeMap { map } => describe_map(&cli.game_dir, map),
        Command::VertexLayout => {
            vertex_layout();
            Ok(())
        }
    }
}

/// Where a map is read from: a file on disk or an entry in the game directory.
fn map_entry_name(map_name_or_path: &str) -> Option<String> {
    if map_name_or_path.ends_with(".bsp") {
        None
    } else {
        Some(format!("maps/{}.bsp", map_name_or_path))
    }
}

fn load_map(game_dir: &Path, map_name_or_path: &str) -> Result<Level> {
    let data = match map_entry_name(map_name_or_path) {
        Some(name) => match open_game_dir(game_dir)?.load_file(&name)? {
            Some(data) => data,
            None => bail!("map not found: {}", name),
        },
        None => std::fs::read(map_name_or_path)
            .with_context(|| format!("Opening map file {:?}", map_name_or_path))?,
    };
    let level = Level::decode(&data).with_context(|| format!("Decoding {}", map_name_or_path))?;
    info!("loaded {}", map_name_or_path);
    Ok(level)
}

/// The stem used for output file names: `maps/e1m1.bsp` and `e1m1` both give `e1m1`.
fn map_stem(map_name_or_path: &str) -> &str {
    Path::new(map_name_or_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(map_name_or_path)
}

fn list(game_dir: &Path) -> Result<()> {
    let paths = pak_paths(game_dir)?;
    if paths.is_empty() {
        bail!("no archives in {:?}", game_dir);
    }
    for path in paths {
        let pak = Pak::open(&path).with_context(|| format!("Opening {:?}", path))?;
        println!("{} ({} entries)", path.display(), pak.len());
        for name in pak.names() {
            println!("  {}", name);
        }
    }
    Ok(())
}

fn describe_map(game_dir: &Path, map_name_or_path: &str) -> Result<()> {
    let level = load_map(game_dir, map_name_or_path)?;

    if let Some(message) = level.worldspawn().and_then(|entity| entity.get("message")) {
        println!("message: {}", message);
    }
    println!("entities: {}", level.entities.len());
    println!("models: {}", level.models.len());
    println!("faces: {}", level.faces.len());
    println!("vertices: {}", level.vertices.len());
    println!("lightmap bytes: {}", level.lightmaps.len());
    println!("textures:");
    for (id, texture) in level.textures.iter().enumerate() {
        match texture {
            Some(texture) => println!(
                "  {:3} {:<16} {}x{}",
                id, texture.name, texture.width, texture.height,
            ),
            None => println!("  {:3} (missing)", id),
        }
    }
    Ok(())
}

fn vertex_layout() {
    println!("stride: {}", MapVertex::SIZE);
    for attribute in &VERTEX_ATTRIBUTES {
        println!(
            "{:<16} offset={:<2} components={} kind={:?}",
            attribute.name, attribute.offset, attribute.components, attribute.kind,
        );
    }
}
