#![allow(dead_code)]

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use wfs_device::SectorDevice;
use wfs_host::engine::EngineResult;
use wfs_host::{
    Engine, EngineDirectory, EngineError, EngineErrorKind, EngineFile, EngineFileStream,
    EngineSession, Entry, EntryMetadata, QuotaUsage,
};

/// Image header the mock engine expects in sector 0.
pub const MAGIC: &[u8; 8] = b"MOCKWFS\0";

/// Suspends once, like an engine call waiting on sector I/O.
pub struct YieldNow(bool);

pub fn yield_now() -> YieldNow {
    YieldNow(false)
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

pub fn meta(name: &str) -> EntryMetadata {
    EntryMetadata {
        name: name.to_owned(),
        owner: 0x1000_0001,
        group: 0x400,
        mode: 0o666,
        creation_time: 1_600_000_000,
        modification_time: 1_600_000_100,
    }
}

#[derive(Debug, Default)]
pub struct StreamStats {
    pub opened: Cell<u32>,
    pub released: Cell<u32>,
    pub reads: Cell<u32>,
}

/// In-memory engine file.
#[derive(Debug, Clone)]
pub struct MemFile {
    pub meta: EntryMetadata,
    pub data: Rc<Vec<u8>>,
    /// Bytes past this offset are never delivered (simulates a truncated file).
    pub truncate_at: Option<usize>,
    pub fail_reads: bool,
    pub stats: Rc<StreamStats>,
}

impl MemFile {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            meta: meta(name),
            data: Rc::new(data),
            truncate_at: None,
            fail_reads: false,
            stats: Rc::default(),
        }
    }
}

impl EngineFile for MemFile {
    type Stream = MemStream;

    fn metadata(&self) -> &EntryMetadata {
        &self.meta
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn size_on_disk(&self) -> u64 {
        (self.data.len() as u64).div_ceil(8192) * 8192
    }

    fn is_encrypted(&self) -> bool {
        true
    }

    fn open_stream(&self) -> EngineResult<MemStream> {
        self.stats.opened.set(self.stats.opened.get() + 1);
        Ok(MemStream {
            data: Rc::clone(&self.data),
            limit: self.truncate_at.unwrap_or(self.data.len()).min(self.data.len()),
            pos: 0,
            fail_reads: self.fail_reads,
            stats: Rc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub struct MemStream {
    data: Rc<Vec<u8>>,
    limit: usize,
    pos: u64,
    fail_reads: bool,
    stats: Rc<StreamStats>,
}

impl EngineFileStream for MemStream {
    fn seek(&mut self, position: u64) -> impl Future<Output = EngineResult<()>> + '_ {
        async move {
            self.pos = position;
            Ok(())
        }
    }

    fn read<'a>(
        &'a mut self,
        len: usize,
        sink: &'a mut dyn FnMut(&[u8]),
    ) -> impl Future<Output = EngineResult<()>> + 'a {
        async move {
            yield_now().await;
            self.stats.reads.set(self.stats.reads.get() + 1);
            if self.fail_reads {
                return Err(EngineErrorKind::FileDataCorrupted.into());
            }
            let start = (self.pos as usize).min(self.limit);
            let end = start.saturating_add(len).min(self.limit);
            // Deliver in two callbacks; the engine is allowed to split a read.
            let mid = start + (end - start) / 2;
            sink(&self.data[start..mid]);
            sink(&self.data[mid..end]);
            self.pos = end as u64;
            Ok(())
        }
    }

    fn release(self) {
        self.stats.released.set(self.stats.released.get() + 1);
    }
}

#[derive(Debug, Clone)]
pub struct MemDir {
    pub meta: EntryMetadata,
    pub children: Vec<Entry<MemFile, MemDir>>,
    pub quota: Option<QuotaUsage>,
}

impl MemDir {
    pub fn new(name: &str, children: Vec<Entry<MemFile, MemDir>>) -> Self {
        Self {
            meta: meta(name),
            children,
            quota: None,
        }
    }
}

impl EngineDirectory for MemDir {
    type File = MemFile;

    fn metadata(&self) -> &EntryMetadata {
        &self.meta
    }

    fn entries(&mut self) -> impl Future<Output = EngineResult<Vec<Entry<MemFile, MemDir>>>> + '_ {
        async move {
            yield_now().await;
            Ok(self.children.clone())
        }
    }

    fn entry<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Future<Output = EngineResult<Entry<MemFile, MemDir>>> + 'a {
        async move {
            self.children
                .iter()
                .find(|child| child.name() == name)
                .cloned()
                .ok_or_else(|| {
                    EngineError::new(EngineErrorKind::EntryNotFound, format!("{name} not found"))
                })
        }
    }

    fn quota(&mut self) -> impl Future<Output = EngineResult<Option<QuotaUsage>>> + '_ {
        async move { Ok(self.quota) }
    }
}

#[derive(Debug, Default)]
pub struct EngineStats {
    pub opens: Cell<u32>,
    pub flushes: Cell<u32>,
    /// Engine calls currently in progress; must never exceed one.
    pub active: Cell<u32>,
    pub max_active: Cell<u32>,
    pub last_key: std::cell::RefCell<Vec<u8>>,
}

impl EngineStats {
    fn enter(&self) {
        self.active.set(self.active.get() + 1);
        self.max_active.set(self.max_active.get().max(self.active.get()));
    }

    fn exit(&self) {
        self.active.set(self.active.get() - 1);
    }
}

/// Engine over a fixed in-memory tree. Checks [`MAGIC`] in sector 0 of the device on open.
#[derive(Debug)]
pub struct MemEngine {
    pub root: MemDir,
    pub stats: Rc<EngineStats>,
}

impl MemEngine {
    pub fn new(root: MemDir) -> Self {
        Self {
            root,
            stats: Rc::default(),
        }
    }
}

impl Engine for MemEngine {
    type Session<D: SectorDevice + 'static> = MemSession<D>;

    fn open<D: SectorDevice + 'static>(
        &self,
        mut device: D,
        key: &[u8],
    ) -> impl Future<Output = EngineResult<MemSession<D>>> {
        let key = key.to_vec();
        async move {
            let mut header = vec![0u8; device.sector_size() as usize];
            self.stats.enter();
            let read = device.read_sectors(&mut header, 0, 1).await;
            self.stats.exit();
            let ok =
                read.map_err(|err| EngineError::new(EngineErrorKind::Other, err.to_string()))?;
            if !ok || !header.starts_with(MAGIC) {
                return Err(EngineErrorKind::InvalidVersion.into());
            }
            self.stats.opens.set(self.stats.opens.get() + 1);
            *self.stats.last_key.borrow_mut() = key;
            Ok(MemSession {
                device,
                root: self.root.clone(),
                stats: Rc::clone(&self.stats),
            })
        }
    }

    fn mlc_key_from_otp(&self, otp: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(otp.iter().rev().copied().collect())
    }

    fn usb_key(&self, otp: &[u8], seeprom: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(otp.iter().zip(seeprom).map(|(a, b)| a ^ b).collect())
    }
}

#[derive(Debug)]
pub struct MemSession<D> {
    pub device: D,
    pub root: MemDir,
    pub stats: Rc<EngineStats>,
}

impl<D: SectorDevice> EngineSession for MemSession<D> {
    type File = MemFile;
    type Directory = MemDir;

    fn root_directory(&mut self) -> impl Future<Output = EngineResult<MemDir>> + '_ {
        async move { Ok(self.root.clone()) }
    }

    fn entry<'a>(
        &'a mut self,
        path: &'a str,
    ) -> impl Future<Output = EngineResult<Entry<MemFile, MemDir>>> + 'a {
        async move {
            self.stats.enter();
            yield_now().await;
            self.stats.exit();

            let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
            let mut dir = self.root.clone();
            while let Some(name) = components.next() {
                let entry = dir.entry(name).await?;
                if components.peek().is_none() {
                    return Ok(entry);
                }
                match entry {
                    Entry::Directory(next) => dir = next,
                    _ => return Err(EngineErrorKind::NotDirectory.into()),
                }
            }
            Ok(Entry::Directory(dir))
        }
    }

    fn flush(&mut self) -> impl Future<Output = EngineResult<()>> + '_ {
        async move {
            self.stats.flushes.set(self.stats.flushes.get() + 1);
            Ok(())
        }
    }
}

/// A device image with the mock header in sector 0, `len` bytes long.
pub fn image_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len.max(MAGIC.len())];
    bytes[..MAGIC.len()].copy_from_slice(MAGIC);
    bytes
}

pub fn sample_tree() -> MemDir {
    let mut usr = MemDir::new(
        "usr",
        vec![Entry::File(MemFile::new("boot.bin", (0..=255u8).cycle().take(5000).collect()))],
    );
    usr.quota = Some(QuotaUsage {
        block_size: 8192,
        blocks_count: 100,
        free_blocks: 25,
    });
    MemDir::new(
        "",
        vec![
            Entry::File(MemFile::new("zeta.txt", b"zeta".to_vec())),
            Entry::Directory(usr),
            Entry::File(MemFile::new("alpha.txt", b"alpha".to_vec())),
            Entry::Directory(MemDir::new("sys", Vec::new())),
            Entry::Link(meta("shortcut")),
        ],
    )
}
