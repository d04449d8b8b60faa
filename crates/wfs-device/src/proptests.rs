use crate::{DeviceConfig, DeviceError, FileBackedSectorDevice, MemHostFile, SectorDevice};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { sector: u64, count: u64, fill: u8 },
    Read { sector: u64, count: u64 },
}

const LOG2_SECTOR_SIZE: u32 = 9;
const SECTOR_SIZE: usize = 1 << LOG2_SECTOR_SIZE;
const MAX_IMAGE_SIZE: usize = 64 * 1024;
const MAX_OPS: usize = 48;

fn image_strategy() -> impl Strategy<Value = Vec<u8>> {
    // Odd sizes exercise the zero-padded final sector.
    (1usize..=MAX_IMAGE_SIZE).prop_flat_map(|len| prop::collection::vec(any::<u8>(), len))
}

fn op_strategy(sector_limit: u64) -> impl Strategy<Value = Op> {
    // Allow addresses a little past the end so out-of-range paths are hit too.
    let sector = 0..sector_limit + 4;
    let count = 0u64..8;
    prop_oneof![
        (sector.clone(), count.clone(), any::<u8>())
            .prop_map(|(sector, count, fill)| Op::Write {
                sector,
                count,
                fill
            }),
        (sector, count).prop_map(|(sector, count)| Op::Read { sector, count }),
    ]
}

fn run_case(image: Vec<u8>, ops: Vec<Op>) -> TestCaseResult {
    let handle = MemHostFile::writable(image.clone());
    let mut device = pollster::block_on(FileBackedSectorDevice::open(
        handle.clone(),
        DeviceConfig::new(LOG2_SECTOR_SIZE, false),
    ))
    .unwrap();

    // Reference model: file contents padded to a whole sector.
    let mut model = image;
    let capacity = model.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    model.resize(capacity, 0);
    let mut logical_len = handle.len() as usize;

    for op in ops {
        match op {
            Op::Write {
                sector,
                count,
                fill,
            } => {
                let start = sector as usize * SECTOR_SIZE;
                let len = count as usize * SECTOR_SIZE;
                let before = handle.contents();
                let buf = vec![fill; len];
                let res = pollster::block_on(device.write_sectors(&buf, sector, count));
                if start + len > capacity {
                    prop_assert!(
                        matches!(res, Err(DeviceError::OutOfRange { .. })),
                        "expected OutOfRange, got {:?}",
                        res
                    );
                    prop_assert_eq!(handle.contents(), before);
                } else {
                    prop_assert!(res.unwrap());
                    model[start..start + len].fill(fill);
                    if len > 0 {
                        logical_len = logical_len.max(start + len);
                    }
                }
            }
            Op::Read { sector, count } => {
                let start = sector as usize * SECTOR_SIZE;
                let len = count as usize * SECTOR_SIZE;
                let mut buf = vec![0xEEu8; len];
                let res = pollster::block_on(device.read_sectors(&mut buf, sector, count));
                if start + len > capacity {
                    prop_assert!(
                        matches!(res, Err(DeviceError::OutOfRange { .. })),
                        "expected OutOfRange, got {:?}",
                        res
                    );
                } else {
                    prop_assert!(res.unwrap());
                    prop_assert_eq!(&buf[..], &model[start..start + len]);
                }
            }
        }
    }

    prop_assert_eq!(device.size_bytes(), Some(logical_len as u64));
    prop_assert_eq!(&handle.contents()[..], &model[..logical_len]);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn device_matches_padded_reference_model(
        (image, ops) in image_strategy().prop_flat_map(|image| {
            let sectors = image.len().div_ceil(SECTOR_SIZE) as u64;
            (Just(image), prop::collection::vec(op_strategy(sectors), 1..MAX_OPS))
        })
    ) {
        run_case(image, ops)?;
    }
}
