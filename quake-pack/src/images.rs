use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use quake_reader::file::FileLoader;
use quake_reader::palette::{Colormap, Palette};
use texture_atlas::LumaU8Image;
use tracing::warn;

/// Turns palette indexed atlas pages into something viewable.
pub struct PageWriter {
    palette: Option<(Palette, Option<Colormap>)>,
}

impl PageWriter {
    /// Loads `gfx/palette.lmp` and `gfx/colormap.lmp`. Without a palette, pages are written as
    /// grayscale indices.
    pub fn new(loader: &dyn FileLoader) -> Result<Self> {
        let palette = match loader.load_file("gfx/palette.lmp")? {
            Some(data) => Some(Palette::from_lmp(&data)?),
            None => {
                warn!("no palette found, writing texture pages as indices");
                None
            }
        };
        let colormap = match loader.load_file("gfx/colormap.lmp")? {
            Some(data) => Some(Colormap::from_lmp(&data)?),
            None => None,
        };
        Ok(Self {
            palette: palette.map(|palette| (palette, colormap)),
        })
    }

    pub fn write_texture_page(&self, image: &LumaU8Image, path: &Path) -> Result<()> {
        match &self.palette {
            Some((palette, colormap)) => {
                let rgb = palette.expand(image.data(), colormap.as_ref());
                write_rgb_png(path, image.width(), image.height(), &rgb)
            }
            None => image.write_to_png(path),
        }
        .with_context(|| format!("Writing {:?}", path))
    }
}

fn write_rgb_png(path: &Path, width: usize, height: usize, rgb: &[u8]) -> Result<()> {
    let w = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(w, width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgb)?;
    Ok(())
}
