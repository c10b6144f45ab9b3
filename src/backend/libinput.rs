use std::{
    fs::{File, OpenOptions},
    os::{fd::OwnedFd, unix::fs::OpenOptionsExt},
    path::Path,
};

use smithay::{
    backend::input::TabletToolType,
    reexports::input::{
        self, DeviceCapability, Libinput, LibinputInterface,
        event::{DeviceEvent, EventTrait},
    },
};

use crate::{
    MapperError, Result,
    device::{DeviceType, MappedDevice},
};

/// Device type from the capabilities libinput reports. Tablet pads are
/// checked before tools since pad nodes never carry a tool.
pub fn classify(has: impl Fn(DeviceCapability) -> bool) -> DeviceType {
    if has(DeviceCapability::TabletPad) {
        DeviceType::Pad
    } else if has(DeviceCapability::TabletTool) {
        DeviceType::Tablet
    } else if has(DeviceCapability::Touch) {
        DeviceType::Touchscreen
    } else if has(DeviceCapability::Gesture) && has(DeviceCapability::Pointer) {
        DeviceType::Touchpad
    } else if has(DeviceCapability::Pointer) {
        DeviceType::Pointer
    } else if has(DeviceCapability::Keyboard) {
        DeviceType::Keyboard
    } else {
        DeviceType::Other
    }
}

/// Type of the virtual device a tablet tool drives once it comes into
/// proximity.
pub fn device_type_for_tool(tool: TabletToolType) -> DeviceType {
    match tool {
        TabletToolType::Eraser => DeviceType::Eraser,
        TabletToolType::Mouse | TabletToolType::Lens => DeviceType::Cursor,
        _ => DeviceType::Pen,
    }
}

impl MappedDevice for input::Device {
    fn device_type(&self) -> DeviceType {
        classify(|capability| self.has_capability(capability))
    }

    fn name(&self) -> String {
        input::Device::name(self).to_owned()
    }

    fn physical_size(&self) -> Option<(f64, f64)> {
        input::Device::size(self)
    }
}

/// A libinput node, or one tool of a tablet node. Tools of the same tablet
/// share the node but claim their own capability class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SeatDevice<H = input::Device> {
    device: H,
    tool: Option<DeviceType>,
}

impl<H> SeatDevice<H> {
    pub fn node(device: H) -> Self {
        Self { device, tool: None }
    }

    pub fn tool(device: H, tool: TabletToolType) -> Self {
        Self {
            device,
            tool: Some(device_type_for_tool(tool)),
        }
    }

    pub fn device(&self) -> &H {
        &self.device
    }
}

impl<H: MappedDevice> MappedDevice for SeatDevice<H> {
    fn device_type(&self) -> DeviceType {
        self.tool.unwrap_or_else(|| self.device.device_type())
    }

    fn name(&self) -> String {
        self.device.name()
    }

    fn physical_size(&self) -> Option<(f64, f64)> {
        self.device.physical_size()
    }
}

/// Handles to register for one node. A tablet node expands to its pen and
/// eraser; cursor tools are only known once one comes into proximity.
pub fn seat_devices<H: MappedDevice>(device: H) -> Vec<SeatDevice<H>> {
    if device.device_type() != DeviceType::Tablet {
        return vec![SeatDevice::node(device)];
    }
    [TabletToolType::Pen, TabletToolType::Eraser]
        .into_iter()
        .map(|tool| SeatDevice::tool(device.clone(), tool))
        .collect()
}

/// Opens device nodes directly, without a seat manager. Needs read access to
/// `/dev/input`.
#[derive(Debug, Default)]
pub struct DirectInterface;

impl LibinputInterface for DirectInterface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> std::result::Result<OwnedFd, i32> {
        let access = flags & libc::O_ACCMODE;
        OpenOptions::new()
            .read(access == libc::O_RDONLY || access == libc::O_RDWR)
            .write(access == libc::O_WRONLY || access == libc::O_RDWR)
            .custom_flags(flags & !libc::O_ACCMODE)
            .open(path)
            .map(OwnedFd::from)
            .map_err(|err| {
                tracing::warn!(path = %path.display(), "failed to open input device: {err}");
                err.raw_os_error().unwrap_or(libc::EIO)
            })
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(File::from(fd));
    }
}

/// Snapshot of the devices on one seat. The context is kept alive for as
/// long as the device handles are.
pub struct DeviceProbe {
    _context: Libinput,
    pub devices: Vec<input::Device>,
}

pub fn probe_devices(seat: &str) -> Result<DeviceProbe> {
    let mut context = Libinput::new_with_udev(DirectInterface);
    context
        .udev_assign_seat(seat)
        .map_err(|_| MapperError::Backend(format!("failed to assign seat {seat} to libinput")))?;
    context
        .dispatch()
        .map_err(|err| MapperError::Backend(format!("failed to dispatch libinput events: {err}")))?;

    let devices: Vec<input::Device> = context
        .by_ref()
        .filter_map(|event| match event {
            input::Event::Device(DeviceEvent::Added(added)) => Some(added.device()),
            _ => None,
        })
        .collect();

    tracing::info!(seat, count = devices.len(), "libinput devices enumerated");
    Ok(DeviceProbe {
        _context: context,
        devices,
    })
}
