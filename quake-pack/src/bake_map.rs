use std::fs::create_dir_all;
use std::path::Path;

use anyhow::{Context, Result};
use level_baker::{bake_level_with_config, BakeConfig, RecordBuffer};
use quake_reader::file::open_game_dir;
use tracing::info;

use crate::images::PageWriter;
use crate::{load_map, map_stem};

pub fn bake_map(
    game_dir: &Path,
    config: &BakeConfig,
    map_name_or_path: &str,
    dst: &Path,
) -> Result<()> {
    let level = load_map(game_dir, map_name_or_path)?;
    let baked = bake_level_with_config(&level, config)
        .with_context(|| format!("Baking {}", map_name_or_path))?;

    create_dir_all(dst).with_context(|| format!("Creating {:?}", dst))?;
    let stem = map_stem(map_name_or_path);
    let path = |suffix: &str| dst.join(format!("{}.{}", stem, suffix));

    write_records(&baked.world, &path("world.bin"))?;
    write_records(&baked.sky, &path("sky.bin"))?;
    write_records(&baked.sky_box, &path("sky_box.bin"))?;

    let pages = PageWriter::new(&open_game_dir(game_dir)?)?;
    pages.write_texture_page(&baked.textures, &path("textures.png"))?;
    for (index, mip) in baked.texture_mips.iter().enumerate() {
        pages.write_texture_page(mip, &path(&format!("textures_mip{}.png", index + 1)))?;
    }
    let lightmaps_path = path("lightmaps.png");
    baked
        .lightmaps
        .write_to_png(&lightmaps_path)
        .with_context(|| format!("Writing {:?}", lightmaps_path))?;

    info!(
        "wrote {} to {:?}: {} world, {} sky, {} sky box vertices",
        stem,
        dst,
        baked.world.count(),
        baked.sky.count(),
        baked.sky_box.count(),
    );
    Ok(())
}

fn write_records(records: &RecordBuffer, path: &Path) -> Result<()> {
    std::fs::write(path, records.data()).with_context(|| format!("Writing {:?}", path))
}
