//! Monitor discovery through `/sys/class/drm`, without DRM master or a
//! running compositor.

use std::{
    fs,
    path::{Path, PathBuf},
};

use libdisplay_info::info::Info;

use crate::{
    MapperError, Result,
    monitor::{
        LogicalMonitorId, Monitor, MonitorId, MonitorLayout, MonitorSource, is_builtin_connector,
    },
};

pub const DEFAULT_DRM_ROOT: &str = "/sys/class/drm";

const EDID_HEADER: [u8; 8] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];

/// Physical size from the EDID base block, which stores it in centimetres.
pub fn edid_size_mm(edid: &[u8]) -> Option<(i32, i32)> {
    if edid.len() < 128 || edid[..8] != EDID_HEADER {
        return None;
    }
    let (width_cm, height_cm) = (edid[21], edid[22]);
    // Zero in either byte means an unknown size or an aspect ratio.
    if width_cm == 0 || height_cm == 0 {
        return None;
    }
    Some((i32::from(width_cm) * 10, i32::from(height_cm) * 10))
}

#[derive(Debug, Clone)]
pub struct SysfsMonitors {
    root: PathBuf,
    builtin_connectors: Vec<String>,
}

impl SysfsMonitors {
    pub fn new(root: impl Into<PathBuf>, builtin_connectors: Vec<String>) -> Self {
        Self {
            root: root.into(),
            builtin_connectors,
        }
    }

    /// Connected connectors in name order. Enabled ones get a logical
    /// monitor each.
    pub fn scan(&self) -> Result<Vec<Monitor>> {
        let entries = fs::read_dir(&self.root).map_err(|err| {
            MapperError::Backend(format!(
                "failed to scan DRM sysfs directory {}: {err}",
                self.root.display()
            ))
        })?;

        let mut connectors: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let file_name = file_name.to_str()?;
                let (card, connector) = file_name.split_once('-')?;
                card.starts_with("card").then(|| (connector.to_owned(), entry.path()))
            })
            .collect();
        connectors.sort();

        let mut monitors = Vec::new();
        for (connector, path) in connectors {
            if read_trimmed(&path.join("status")).as_deref() != Some("connected") {
                continue;
            }

            let id = MonitorId(monitors.len() as u32);
            let enabled = read_trimmed(&path.join("enabled")).as_deref() == Some("enabled");
            let mut monitor = Monitor::new(id, connector.clone())
                .builtin(is_builtin_connector(&connector, &self.builtin_connectors));
            if enabled {
                monitor = monitor.in_logical_monitor(LogicalMonitorId(id.0));
            }

            match fs::read(path.join("edid")) {
                Ok(edid) if !edid.is_empty() => apply_edid(&mut monitor, &edid),
                Ok(_) => tracing::debug!(%connector, "connector has no EDID"),
                Err(err) => tracing::debug!(%connector, "failed to read EDID: {err}"),
            }

            tracing::debug!(
                %connector,
                vendor = %monitor.vendor,
                product = %monitor.product,
                width_mm = monitor.width_mm,
                height_mm = monitor.height_mm,
                enabled,
                "found connector"
            );
            monitors.push(monitor);
        }

        Ok(monitors)
    }
}

impl MonitorSource for SysfsMonitors {
    fn monitor_layout(&self) -> MonitorLayout {
        match self.scan() {
            Ok(monitors) => MonitorLayout::new(monitors),
            Err(err) => {
                tracing::warn!("{err}");
                MonitorLayout::default()
            }
        }
    }
}

fn apply_edid(monitor: &mut Monitor, edid: &[u8]) {
    if let Some((width_mm, height_mm)) = edid_size_mm(edid) {
        monitor.width_mm = width_mm;
        monitor.height_mm = height_mm;
    }

    match Info::parse_edid(edid) {
        Ok(info) => {
            monitor.vendor = info.make().unwrap_or_default();
            monitor.product = info.model().unwrap_or_default();
            monitor.serial = info.serial().unwrap_or_default();
        }
        Err(err) => {
            tracing::warn!(connector = %monitor.connector, error = ?err, "failed to parse EDID");
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|contents| contents.trim().to_owned())
}
