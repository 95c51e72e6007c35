use texture_atlas::Atlas;

/// Sizes of the atlas pages a level is baked into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BakeConfig {
    /// Width and height of both atlas pages. Mip pages are halved from this.
    pub atlas_size: usize,
    pub texture_padding: usize,
    pub lightmap_padding: usize,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            atlas_size: 1024,
            texture_padding: 0,
            lightmap_padding: 1,
        }
    }
}

impl BakeConfig {
    pub fn texture_atlas(&self) -> Atlas {
        Atlas::new(self.atlas_size, self.atlas_size, self.texture_padding)
    }

    pub fn lightmap_atlas(&self) -> Atlas {
        Atlas::new(self.atlas_size, self.atlas_size, self.lightmap_padding)
    }
}
