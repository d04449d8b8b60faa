//! Display-ready directory entries.

use serde::Serialize;

use crate::engine::{EngineDirectory, EngineFile, Entry, EntryKind};

/// One row of a directory listing, detached from the engine handle it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Logical size for files, 0 otherwise.
    pub size: u64,
    pub size_on_disk: u64,
    pub encrypted: bool,
    pub owner: u32,
    pub group: u32,
    pub mode: u32,
    pub creation_time: u32,
    pub modification_time: u32,
}

impl ListedEntry {
    pub fn from_entry<F: EngineFile, D: EngineDirectory>(entry: &Entry<F, D>) -> Self {
        let meta = entry.metadata();
        let (size, size_on_disk, encrypted) = match entry {
            Entry::File(file) => (file.size(), file.size_on_disk(), file.is_encrypted()),
            Entry::Directory(_) | Entry::Link(_) => (0, 0, false),
        };
        Self {
            name: meta.name.clone(),
            kind: entry.kind(),
            size,
            size_on_disk,
            encrypted,
            owner: meta.owner,
            group: meta.group,
            mode: meta.mode,
            creation_time: meta.creation_time,
            modification_time: meta.modification_time,
        }
    }

    pub fn owner_hex(&self) -> String {
        format!("{:08x}", self.owner)
    }

    pub fn group_hex(&self) -> String {
        format!("{:08x}", self.group)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Directories first, then by name.
pub fn sort_entries(entries: &mut [ListedEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
}
