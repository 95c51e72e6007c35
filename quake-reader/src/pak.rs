use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use memmap::Mmap;

use crate::file::FileLoader;

const MAGIC: &[u8; 4] = b"PACK";
const HEADER_SIZE: usize = 12;
const ENTRY_SIZE: usize = 64;
const ENTRY_NAME_SIZE: usize = 56;

/// A `PACK` archive. Entry names are matched case-insensitively.
pub struct Pak<D = Mmap> {
    data: D,
    entries: HashMap<String, PakEntry>,
}

#[derive(Clone, Copy)]
struct PakEntry {
    offset: usize,
    len: usize,
}

impl Pak<Mmap> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: The archive is treated as read-only input for the life of the process.
        let data = unsafe { Mmap::map(&file) }?;
        Self::new(data)
    }
}

impl<D: Deref<Target = [u8]>> Pak<D> {
    pub fn new(data: D) -> Result<Self> {
        ensure!(data.len() >= HEADER_SIZE, "truncated PAK header");
        if &data[..4] != MAGIC {
            bail!("not a PAK file");
        }
        let mut r = &data[4..HEADER_SIZE];
        let dir_offset = r.read_i32::<LittleEndian>()? as usize;
        let dir_len = r.read_i32::<LittleEndian>()? as usize;
        let directory = dir_offset
            .checked_add(dir_len)
            .and_then(|end| data.get(dir_offset..end))
            .context("PAK directory out of range")?;

        let mut entries = HashMap::new();
        for entry in directory.chunks_exact(ENTRY_SIZE) {
            let name = &entry[..ENTRY_NAME_SIZE];
            let name_len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            let name = String::from_utf8_lossy(&name[..name_len]).to_lowercase();
            let mut r = &entry[ENTRY_NAME_SIZE..];
            let offset = r.read_i32::<LittleEndian>()? as usize;
            let len = r.read_i32::<LittleEndian>()? as usize;
            ensure!(
                offset.checked_add(len).map_or(false, |end| end <= data.len()),
                "PAK entry {} out of range",
                name,
            );
            entries.insert(name, PakEntry { offset, len });
        }

        Ok(Self { data, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .get(&name.to_lowercase())
            .map(|entry| &self.data[entry.offset..entry.offset + entry.len])
    }
}

impl<D: Deref<Target = [u8]>> FileLoader for Pak<D> {
    fn load_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(name).map(<[u8]>::to_vec))
    }
}
