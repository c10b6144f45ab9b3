use std::{fs::OpenOptions, os::fd::OwnedFd, path::Path};

use smithay::{
    backend::drm::DrmDeviceFd,
    reexports::drm::control::{Device as ControlDevice, connector},
    utils::DeviceFd,
};
use smithay_drm_extras::display_info;

use crate::{
    MapperError, Result,
    monitor::{LogicalMonitorId, Monitor, MonitorId, is_builtin_connector},
};

pub fn connector_name(info: &connector::Info) -> String {
    format!("{}-{}", info.interface().as_str(), info.interface_id())
}

/// Monitor for a DRM connector, identified through its EDID.
pub fn monitor_from_connector<S: AsRef<str>>(
    device: &impl ControlDevice,
    info: &connector::Info,
    id: MonitorId,
    logical_monitor: Option<LogicalMonitorId>,
    builtin_connectors: &[S],
) -> Monitor {
    let name = connector_name(info);
    let display_info = display_info::for_connector(device, info.handle());
    let make = display_info
        .as_ref()
        .and_then(|info| info.make())
        .unwrap_or_default();
    let model = display_info
        .as_ref()
        .and_then(|info| info.model())
        .unwrap_or_default();
    let serial = display_info
        .as_ref()
        .and_then(|info| info.serial())
        .unwrap_or_default();

    let (width_mm, height_mm) = info.size().unwrap_or((0, 0));
    let builtin = is_builtin_connector(&name, builtin_connectors);

    let mut monitor = Monitor::new(id, name)
        .with_edid(make, model, serial)
        .with_size(width_mm as i32, height_mm as i32)
        .builtin(builtin);
    monitor.logical_monitor = logical_monitor;
    monitor
}

/// Connected connectors of one card. A connector driven by an encoder gets a
/// logical monitor of its own; the others are reported disabled.
pub fn scan_card<S: AsRef<str>>(
    path: &Path,
    first_id: u32,
    builtin_connectors: &[S],
) -> Result<Vec<Monitor>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| {
            MapperError::Backend(format!("failed to open DRM device {}: {err}", path.display()))
        })?;
    let device = DrmDeviceFd::new(DeviceFd::from(OwnedFd::from(file)));

    let resources = device.resource_handles().map_err(|err| {
        MapperError::Backend(format!("failed to query DRM resources: {err}"))
    })?;

    let mut monitors = Vec::new();
    for handle in resources.connectors() {
        let info = match device.get_connector(*handle, false) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(?handle, "failed to query connector: {err}");
                continue;
            }
        };
        if info.state() != connector::State::Connected {
            continue;
        }

        let id = first_id + monitors.len() as u32;
        let logical_monitor = info.current_encoder().map(|_| LogicalMonitorId(id));
        let monitor = monitor_from_connector(
            &device,
            &info,
            MonitorId(id),
            logical_monitor,
            builtin_connectors,
        );
        tracing::debug!(
            connector = %monitor.connector,
            vendor = %monitor.vendor,
            product = %monitor.product,
            enabled = logical_monitor.is_some(),
            "found DRM connector"
        );
        monitors.push(monitor);
    }

    Ok(monitors)
}
