//! evdev-backed touch source for Linux.
//!
//! Opens `/dev/input/eventN` and streams its raw `(type, code, value)` events
//! through tokio.  The device is not grabbed, so the desktop keeps receiving
//! the same touches.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evdev::{AbsoluteAxisType, Device, EventStream};
use tracing::{debug, info};

use touch_core::RawEvent;

use super::{DeviceError, EventSource};

/// `errno` reported by reads from a device that has been unplugged.
const ENODEV: i32 = 19;

const INPUT_DIR: &str = "/dev/input";

/// A multi-touch device found by [`scan_touch_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
}

/// Reads raw events from one evdev device.
pub struct EvdevSource {
    name: String,
    stream: EventStream,
    max_slots: Option<u32>,
}

impl EvdevSource {
    /// Opens `path` and starts streaming its events.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] if the device cannot be opened or put
    /// into non-blocking stream mode.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let open_err = |source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        };

        let device = Device::open(path).map_err(open_err)?;
        let name = device.name().unwrap_or("unknown").to_string();
        let max_slots = advertised_slots(&device);
        if !is_multitouch(&device) {
            debug!(path = %path.display(), "device does not advertise multi-touch slots");
        }

        let stream = device.into_event_stream().map_err(open_err)?;
        info!(path = %path.display(), %name, ?max_slots, "opened touch device");

        Ok(Self {
            name,
            stream,
            max_slots,
        })
    }
}

#[async_trait]
impl EventSource for EvdevSource {
    async fn next_event(&mut self) -> Result<RawEvent, DeviceError> {
        match self.stream.next_event().await {
            Ok(ev) => Ok(RawEvent::from_raw(ev.event_type().0, ev.code(), ev.value())),
            Err(e) if e.raw_os_error() == Some(ENODEV) => Err(DeviceError::Disconnected),
            Err(e) => Err(DeviceError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_slots(&self) -> Option<u32> {
        self.max_slots
    }
}

/// Lists `/dev/input/event*` devices that advertise `ABS_MT_SLOT` and both MT
/// position axes, sorted by path.
///
/// Devices that cannot be opened (usually for lack of permission) are
/// skipped.
pub fn scan_touch_devices() -> Vec<DeviceInfo> {
    let Ok(entries) = std::fs::read_dir(INPUT_DIR) else {
        return Vec::new();
    };

    let mut found: Vec<DeviceInfo> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .filter_map(|path| {
            let device = Device::open(&path).ok()?;
            is_multitouch(&device).then(|| DeviceInfo {
                name: device.name().unwrap_or("unknown").to_string(),
                path,
            })
        })
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

fn is_multitouch(device: &Device) -> bool {
    device.supported_absolute_axes().is_some_and(|axes| {
        axes.contains(AbsoluteAxisType::ABS_MT_SLOT)
            && axes.contains(AbsoluteAxisType::ABS_MT_POSITION_X)
            && axes.contains(AbsoluteAxisType::ABS_MT_POSITION_Y)
    })
}

/// Slot count from the `ABS_MT_SLOT` axis range (`maximum + 1`).
fn advertised_slots(device: &Device) -> Option<u32> {
    let state = device.get_abs_state().ok()?;
    let info = state.get(AbsoluteAxisType::ABS_MT_SLOT.0 as usize)?;
    u32::try_from(info.maximum).ok().map(|max| max + 1)
}
