//! Enumeration of pixel formats, frame sizes, frame intervals and controls.
//!
//! Every walk asks the driver for index 0, 1, 2, ... until the driver
//! rejects an index; that rejection is the end-of-list signal, not an error.
//! Stepwise size and interval ranges are resolved against fixed candidate
//! lists, so results are always concrete combinations.

use crate::controls::{Control, ControlInfo, MenuEntry};
use crate::format::{Format, FormatDescription, FrameInterval, FrameSize, Interval};
use crate::traits::{retry_interrupted, VideoDriver};

/// First user-class control id (`V4L2_CID_BASE`).
pub const CID_BASE: u32 = 0x0098_0900;

/// One past the last predefined user-class control id (`V4L2_CID_LASTP1`).
pub const CID_LASTP1: u32 = CID_BASE + 44;

/// `V4L2_CTRL_FLAG_NEXT_CTRL`: ask for the first control after the given id.
pub const NEXT_CTRL_FLAG: u32 = 0x8000_0000;

/// Resolutions tried against stepwise frame-size ranges.
pub const CANDIDATE_SIZES: [(u32, u32); 7] = [
    (640, 480),
    (800, 600),
    (1024, 768),
    (1440, 1080),
    (1024, 576),
    (1280, 720),
    (1920, 1080),
];

/// Frame rates tried against stepwise frame-interval ranges.
pub const CANDIDATE_FPS: [u32; 5] = [5, 10, 15, 20, 30];

/// Walk an index-addressed driver list until the driver rejects an index.
fn walk<T, F>(mut query: F) -> Vec<T>
where
    F: FnMut(u32) -> std::io::Result<T>,
{
    let mut items = Vec::new();
    for index in 0.. {
        match retry_interrupted(|| query(index)) {
            Ok(item) => items.push(item),
            Err(err) => {
                log::trace!("enumeration ended at index {index}: {err}");
                break;
            }
        }
    }
    items
}

/// `a <= b` for two intervals, compared as exact fractions.
fn interval_le(a: Interval, b: Interval) -> bool {
    u64::from(a.numerator) * u64::from(b.denominator)
        <= u64::from(b.numerator) * u64::from(a.denominator)
}

fn interval_within(value: Interval, min: Interval, max: Interval) -> bool {
    if value.denominator == 0 || min.denominator == 0 || max.denominator == 0 {
        return false;
    }
    interval_le(min, value) && interval_le(value, max)
}

/// List the pixel formats the device offers.
pub fn list_pixel_formats<D: VideoDriver>(driver: &mut D) -> Vec<FormatDescription> {
    walk(|index| driver.enum_format(index))
}

/// List every concrete pixel format, size and frame interval combination.
///
/// Discrete reports are emitted as-is; stepwise reports are resolved against
/// [`CANDIDATE_SIZES`] and [`CANDIDATE_FPS`]. A discrete size whose intervals
/// cannot be enumerated is emitted once with an unspecified interval; a
/// candidate size from a stepwise range is dropped instead, since the driver
/// never named it. Overlapping reports may produce duplicates.
pub fn list_formats<D: VideoDriver>(driver: &mut D) -> Vec<Format> {
    let mut formats = Vec::new();
    for description in list_pixel_formats(driver) {
        let fourcc = description.fourcc;
        for size in walk(|index| driver.enum_frame_size(fourcc, index)) {
            match size {
                FrameSize::Discrete { width, height } => {
                    let size = Format::new(width, height, fourcc);
                    if !push_intervals(driver, &mut formats, size) {
                        formats.push(size);
                    }
                }
                FrameSize::Stepwise {
                    min_width,
                    max_width,
                    min_height,
                    max_height,
                    ..
                } => {
                    for (width, height) in CANDIDATE_SIZES {
                        if (min_width..=max_width).contains(&width)
                            && (min_height..=max_height).contains(&height)
                        {
                            let size = Format::new(width, height, fourcc);
                            push_intervals(driver, &mut formats, size);
                        }
                    }
                }
            }
        }
    }
    log::debug!("enumerated {} format combinations", formats.len());
    formats
}

/// Push `size` once per enumerated interval. Returns `false` if the driver
/// reported no intervals for it.
fn push_intervals<D: VideoDriver>(
    driver: &mut D,
    formats: &mut Vec<Format>,
    size: Format,
) -> bool {
    let intervals = walk(|index| {
        driver.enum_frame_interval(size.fourcc, size.width, size.height, index)
    });
    if intervals.is_empty() {
        return false;
    }

    for interval in intervals {
        match interval {
            FrameInterval::Discrete(interval) => formats.push(size.with_interval(interval)),
            FrameInterval::Stepwise { min, max, .. } => {
                formats.extend(
                    CANDIDATE_FPS
                        .iter()
                        .map(|&fps| Interval::from_fps(fps))
                        .filter(|&candidate| interval_within(candidate, min, max))
                        .map(|candidate| size.with_interval(candidate)),
                );
            }
        }
    }
    true
}

/// List the device's controls, with menu entries for menu-typed controls.
///
/// Uses the next-control cursor when the driver supports it and scans the
/// predefined user-class id range otherwise.
pub fn list_controls<D: VideoDriver>(driver: &mut D) -> Vec<Control> {
    let infos = match retry_interrupted(|| driver.query_control(NEXT_CTRL_FLAG)) {
        Ok(first) => follow_cursor(driver, first),
        Err(err) => {
            log::debug!("control cursor unsupported ({err}), scanning id range");
            (CID_BASE..CID_LASTP1)
                .filter_map(|id| retry_interrupted(|| driver.query_control(id)).ok())
                .collect()
        }
    };

    infos
        .into_iter()
        .map(|info| with_menu(driver, info))
        .collect()
}

fn follow_cursor<D: VideoDriver>(driver: &mut D, first: ControlInfo) -> Vec<ControlInfo> {
    let mut last_id = first.id;
    let mut infos = vec![first];
    while let Ok(next) = retry_interrupted(|| driver.query_control(last_id | NEXT_CTRL_FLAG)) {
        if next.id <= last_id {
            log::warn!("control cursor did not advance past {last_id:#010x}");
            break;
        }
        last_id = next.id;
        infos.push(next);
    }
    infos
}

fn with_menu<D: VideoDriver>(driver: &mut D, info: ControlInfo) -> Control {
    let mut control = Control::from(info);
    if !control.kind.has_menu() {
        return control;
    }

    let (id, kind) = (control.id, control.kind);
    let last = u32::try_from(control.maximum).ok();
    control.menu = last
        .into_iter()
        .flat_map(|last| 0..=last)
        .filter_map(|index| {
            retry_interrupted(|| driver.query_menu(id, index, kind))
                .ok()
                .map(|item| MenuEntry { index, item })
        })
        .collect();
    control
}
