use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::pak::Pak;

pub trait FileLoader {
    fn load_file(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

pub struct FallbackFileLoader<'a> {
    loaders: Vec<Rc<dyn FileLoader + 'a>>,
}

impl<'a> FallbackFileLoader<'a> {
    pub fn new(loaders: Vec<Rc<dyn FileLoader + 'a>>) -> Self {
        Self { loaders }
    }
}

impl<'a> FileLoader for FallbackFileLoader<'a> {
    fn load_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for loader in &self.loaders {
            if let Some(data) = loader.load_file(name)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

pub struct DirectoryLoader {
    path: PathBuf,
}

impl DirectoryLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FileLoader for DirectoryLoader {
    fn load_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let combined_path = self.path.join(name);
        match std::fs::read(&combined_path) {
            Ok(data) => Ok(Some(data)),
            Err(e) => match e.kind() {
                ErrorKind::NotFound => Ok(None),
                _ => Err(e.into()),
            },
        }
    }
}

/// The consecutively numbered archives of a game directory, starting at `pak0.pak`. Names are
/// matched without regard to case, so `PAK0.PAK` counts. A missing directory has no archives.
pub fn pak_paths<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Reading {:?}", path)),
    };
    let mut by_name = HashMap::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Reading {:?}", path))?;
        if let Some(name) = entry.file_name().to_str() {
            by_name.insert(name.to_ascii_lowercase(), entry.path());
        }
    }
    Ok((0..)
        .map_while(|index| by_name.remove(&format!("pak{}.pak", index)))
        .collect())
}

/// Mounts a game directory the way the engine searches it: `pakN.pak` down to `pak0.pak`, then
/// loose files.
pub fn open_game_dir<P: AsRef<Path>>(path: P) -> Result<FallbackFileLoader<'static>> {
    let path = path.as_ref();
    let mut paks = Vec::new();
    for pak_path in pak_paths(path)? {
        let pak = Pak::open(&pak_path).with_context(|| format!("Opening {:?}", pak_path))?;
        debug!("mounted {:?} with {} entries", pak_path, pak.len());
        paks.push(Rc::new(pak) as Rc<dyn FileLoader>);
    }
    paks.reverse();
    paks.push(Rc::new(DirectoryLoader::new(path.to_path_buf())));
    Ok(FallbackFileLoader::new(paks))
}
