use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use wfs_device::{
    DeviceConfig, DeviceError, FileBackedSectorDevice, HostFile, HostIoError, HostIoErrorKind,
    HostWriter, SectorDevice,
};

#[derive(Default, Debug)]
struct Counters {
    size_calls: Cell<u32>,
    range_reads: Cell<u32>,
    writables_opened: Cell<u32>,
    closed: Cell<u32>,
    aborted: Cell<u32>,
}

/// Host handle that records every call and can be told to fail.
#[derive(Debug, Clone, Default)]
struct MockHandle {
    data: Rc<RefCell<Vec<u8>>>,
    counters: Rc<Counters>,
    fail_size: bool,
    fail_reads: bool,
    fail_writes: bool,
}

impl MockHandle {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            ..Default::default()
        }
    }
}

impl HostFile for MockHandle {
    type Writer = MockWriter;

    fn size(&mut self) -> impl Future<Output = Result<u64, HostIoError>> + '_ {
        async move {
            self.counters.size_calls.set(self.counters.size_calls.get() + 1);
            if self.fail_size {
                return Err(HostIoError::new(
                    "get file",
                    HostIoErrorKind::AccessDenied,
                    "permission revoked",
                ));
            }
            Ok(self.data.borrow().len() as u64)
        }
    }

    fn read_range(
        &mut self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = Result<Vec<u8>, HostIoError>> + '_ {
        async move {
            self.counters
                .range_reads
                .set(self.counters.range_reads.get() + 1);
            if self.fail_reads {
                return Err(HostIoError::new(
                    "slice read",
                    HostIoErrorKind::Invalidated,
                    "NotReadableError",
                ));
            }
            let data = self.data.borrow();
            let end = (end as usize).min(data.len());
            let start = (start as usize).min(end);
            Ok(data[start..end].to_vec())
        }
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn create_writable(&mut self) -> impl Future<Output = Result<MockWriter, HostIoError>> + '_ {
        async move {
            self.counters
                .writables_opened
                .set(self.counters.writables_opened.get() + 1);
            Ok(MockWriter {
                handle: self.clone(),
                staged: self.data.borrow().clone(),
                pos: 0,
            })
        }
    }
}

#[derive(Debug)]
struct MockWriter {
    handle: MockHandle,
    staged: Vec<u8>,
    pos: usize,
}

impl HostWriter for MockWriter {
    fn seek(&mut self, offset: u64) -> impl Future<Output = Result<(), HostIoError>> + '_ {
        async move {
            self.pos = offset as usize;
            Ok(())
        }
    }

    fn write<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> impl Future<Output = Result<(), HostIoError>> + 'a {
        async move {
            if self.handle.fail_writes {
                return Err(HostIoError::new(
                    "write",
                    HostIoErrorKind::Other,
                    "QuotaExceededError",
                ));
            }
            let end = self.pos + data.len();
            if end > self.staged.len() {
                self.staged.resize(end, 0);
            }
            self.staged[self.pos..end].copy_from_slice(data);
            self.pos = end;
            Ok(())
        }
    }

    fn truncate(&mut self, size: u64) -> impl Future<Output = Result<(), HostIoError>> + '_ {
        async move {
            self.staged.resize(size as usize, 0);
            self.pos = self.pos.min(size as usize);
            Ok(())
        }
    }

    fn close(self) -> impl Future<Output = Result<(), HostIoError>> {
        async move {
            let counters = &self.handle.counters;
            counters.closed.set(counters.closed.get() + 1);
            *self.handle.data.borrow_mut() = self.staged;
            Ok(())
        }
    }

    fn abort(self) {
        let counters = &self.handle.counters;
        counters.aborted.set(counters.aborted.get() + 1);
    }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn open_device(handle: MockHandle, config: DeviceConfig) -> FileBackedSectorDevice<MockHandle> {
    pollster::block_on(FileBackedSectorDevice::open(handle, config)).unwrap()
}

#[test]
fn multi_sector_read_is_one_bulk_slice() {
    let handle = MockHandle::new(patterned(4096));
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle, DeviceConfig::default());

    let mut buf = vec![0u8; 4 * 512];
    assert!(pollster::block_on(device.read_sectors(&mut buf, 2, 4)).unwrap());
    assert_eq!(buf, patterned(4096)[1024..3072]);
    assert_eq!(counters.range_reads.get(), 1);
}

#[test]
fn read_fills_only_the_front_of_a_larger_buffer() {
    let mut device = open_device(MockHandle::new(patterned(1024)), DeviceConfig::default());
    let mut buf = vec![0xEEu8; 1500];
    assert!(pollster::block_on(device.read_sectors(&mut buf, 0, 2)).unwrap());
    assert_eq!(&buf[..1024], &patterned(1024)[..]);
    assert!(buf[1024..].iter().all(|b| *b == 0xEE));
}

#[test]
fn out_of_range_read_and_write_do_no_io() {
    let handle = MockHandle::new(patterned(2048));
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle.clone(), DeviceConfig::new(9, false));

    let mut buf = vec![0u8; 1024];
    let err = pollster::block_on(device.read_sectors(&mut buf, 3, 2)).unwrap_err();
    assert!(matches!(
        err,
        DeviceError::OutOfRange {
            offset: 1536,
            len: 1024,
            capacity: 2048
        }
    ));

    let err = pollster::block_on(device.write_sectors(&buf, 4, 1)).unwrap_err();
    assert!(matches!(err, DeviceError::OutOfRange { .. }));

    assert_eq!(counters.range_reads.get(), 0);
    assert_eq!(counters.writables_opened.get(), 0);
    assert_eq!(*handle.data.borrow(), patterned(2048));
}

#[test]
fn write_on_read_only_device_is_rejected_without_io() {
    let handle = MockHandle::new(patterned(1024));
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle, DeviceConfig::default());
    assert!(device.is_read_only());

    let err = pollster::block_on(device.write_sectors(&[0u8; 512], 0, 1)).unwrap_err();
    assert!(matches!(err, DeviceError::ReadOnlyViolation));
    assert_eq!(counters.writables_opened.get(), 0);
}

#[test]
fn read_write_read_round_trip_is_idempotent() {
    let handle = MockHandle::new(patterned(8192));
    let mut device = open_device(handle.clone(), DeviceConfig::new(9, false));

    pollster::block_on(async {
        let mut first = vec![0u8; 3 * 512];
        assert!(device.read_sectors(&mut first, 5, 3).await.unwrap());
        assert!(device.write_sectors(&first, 5, 3).await.unwrap());

        let mut second = vec![0u8; 3 * 512];
        assert!(device.read_sectors(&mut second, 5, 3).await.unwrap());
        assert_eq!(first, second);
    });
    assert_eq!(*handle.data.borrow(), patterned(8192));
}

#[test]
fn write_lands_at_sector_offset_and_closes_writer() {
    let handle = MockHandle::new(vec![0u8; 2048]);
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle.clone(), DeviceConfig::new(9, false));

    // Extra bytes past the requested sectors must not be written.
    let mut buf = vec![0x11u8; 512];
    buf.extend_from_slice(&[0x22u8; 100]);
    assert!(pollster::block_on(device.write_sectors(&buf, 1, 1)).unwrap());

    let data = handle.data.borrow();
    assert!(data[..512].iter().all(|b| *b == 0));
    assert!(data[512..1024].iter().all(|b| *b == 0x11));
    assert!(data[1024..].iter().all(|b| *b == 0));
    assert_eq!(counters.closed.get(), 1);
    assert_eq!(counters.aborted.get(), 0);
}

#[test]
fn failed_size_resolution_leaves_device_not_ready() {
    let handle = MockHandle {
        fail_size: true,
        ..MockHandle::new(patterned(1024))
    };
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle, DeviceConfig::default());

    assert!(!device.is_ready());
    assert_eq!(device.sector_count(), 0);

    let mut buf = vec![0u8; 512];
    let err = pollster::block_on(device.read_sectors(&mut buf, 0, 1)).unwrap_err();
    assert!(matches!(err, DeviceError::NotReady));
    assert_eq!(counters.range_reads.get(), 0);
}

#[test]
fn initialize_reports_the_host_error() {
    let handle = MockHandle {
        fail_size: true,
        ..MockHandle::new(Vec::new())
    };
    let mut device = FileBackedSectorDevice::new(handle, DeviceConfig::default()).unwrap();
    let err = pollster::block_on(device.initialize()).unwrap_err();
    assert!(matches!(
        err,
        DeviceError::HostIo(HostIoError {
            kind: HostIoErrorKind::AccessDenied,
            ..
        })
    ));
}

#[test]
fn host_read_failure_becomes_false_status() {
    let handle = MockHandle {
        fail_reads: true,
        ..MockHandle::new(patterned(1024))
    };
    let mut device = open_device(handle, DeviceConfig::default());

    let mut buf = vec![0u8; 512];
    assert!(!pollster::block_on(device.read_sectors(&mut buf, 0, 1)).unwrap());

    let err = pollster::block_on(device.try_read_sectors(&mut buf, 0, 1)).unwrap_err();
    assert!(matches!(err, DeviceError::HostIo(_)));
}

#[test]
fn host_write_failure_becomes_false_status_and_aborts_writer() {
    let handle = MockHandle {
        fail_writes: true,
        ..MockHandle::new(vec![0u8; 1024])
    };
    let counters = Rc::clone(&handle.counters);
    let mut device = open_device(handle.clone(), DeviceConfig::new(9, false));

    assert!(!pollster::block_on(device.write_sectors(&[0xFFu8; 512], 0, 1)).unwrap());
    assert_eq!(counters.writables_opened.get(), 1);
    assert_eq!(counters.aborted.get(), 1);
    assert_eq!(counters.closed.get(), 0);
    assert_eq!(*handle.data.borrow(), vec![0u8; 1024]);
}

#[test]
fn file_shrinking_under_the_device_is_a_host_failure() {
    let handle = MockHandle::new(patterned(2048));
    let mut device = open_device(handle.clone(), DeviceConfig::default());
    handle.data.borrow_mut().truncate(100);

    let mut buf = vec![0u8; 512];
    assert!(!pollster::block_on(device.read_sectors(&mut buf, 1, 1)).unwrap());
}
