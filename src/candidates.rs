//! Per-device candidate generation.
//!
//! Every heuristic fills at most one slot of a fixed array indexed by
//! [`MatchKind`]. The solver later walks the populated slots from the
//! strongest kind to the weakest.

use tracing::debug;

use crate::{
    device::MappedDevice,
    monitor::{Monitor, MonitorId, MonitorLayout},
};

/// Maximum relative deviation, per axis, for a physical size match.
pub const MAX_SIZE_MATCH_DIFF: f64 = 0.05;

/// Match criteria, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchKind {
    /// Device name contains the monitor product string, eg. "Cintiq 12WX".
    EdidFull,
    /// Device name contains one word of the product string, eg. "Cintiq".
    EdidPartial,
    /// Device name contains the EDID vendor, eg. "WAC".
    EdidVendor,
    /// Device and monitor physical sizes agree within the tolerance.
    Size,
    /// The built-in panel, for integrated devices or as a last resort.
    IsBuiltin,
}

impl MatchKind {
    pub const COUNT: usize = 5;

    pub const ALL: [MatchKind; MatchKind::COUNT] = [
        MatchKind::EdidFull,
        MatchKind::EdidPartial,
        MatchKind::EdidVendor,
        MatchKind::Size,
        MatchKind::IsBuiltin,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidates {
    slots: [Option<MonitorId>; MatchKind::COUNT],
}

impl Candidates {
    pub fn get(&self, kind: MatchKind) -> Option<MonitorId> {
        self.slots[kind.index()]
    }

    pub fn set(&mut self, kind: MatchKind, monitor: MonitorId) {
        self.slots[kind.index()] = Some(monitor);
    }

    /// Strongest populated slot.
    pub fn best(&self) -> Option<MatchKind> {
        MatchKind::ALL
            .into_iter()
            .find(|kind| self.slots[kind.index()].is_some())
    }

    /// Populated slots, strongest first.
    pub fn iter(&self) -> impl Iterator<Item = (MatchKind, MonitorId)> + '_ {
        MatchKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|monitor| (kind, monitor)))
    }

    pub fn is_empty(&self) -> bool {
        self.best().is_none()
    }
}

fn contains_ci(lowered_haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && lowered_haystack.contains(&needle.to_ascii_lowercase())
}

/// Text match of a device name against one monitor's EDID strings.
///
/// The vendor has to appear first; the result is then upgraded to a full or
/// partial product match when possible.
pub fn match_edid(device_name: &str, monitor: &Monitor) -> Option<MatchKind> {
    let name = device_name.to_ascii_lowercase();

    if !contains_ci(&name, &monitor.vendor) {
        return None;
    }

    if contains_ci(&name, &monitor.product) {
        return Some(MatchKind::EdidFull);
    }

    if monitor
        .product
        .split_whitespace()
        .any(|token| contains_ci(&name, token))
    {
        Some(MatchKind::EdidPartial)
    } else {
        Some(MatchKind::EdidVendor)
    }
}

/// Closest monitor whose width and height both deviate from the device's by
/// less than `tolerance`. Each accepted monitor tightens both bounds.
pub fn find_size_match(
    (device_w, device_h): (f64, f64),
    monitors: &[Monitor],
    tolerance: f64,
) -> Option<MonitorId> {
    if device_w <= 0.0 || device_h <= 0.0 {
        return None;
    }

    let mut min_w_diff = tolerance;
    let mut min_h_diff = tolerance;
    let mut matched = None;

    for monitor in monitors {
        let w_diff = (1.0 - f64::from(monitor.width_mm) / device_w).abs();
        let h_diff = (1.0 - f64::from(monitor.height_mm) / device_h).abs();

        if w_diff >= min_w_diff || h_diff >= min_h_diff {
            continue;
        }

        matched = Some(monitor.id);
        min_w_diff = w_diff;
        min_h_diff = h_diff;
    }

    matched
}

pub fn guess_candidates<D: MappedDevice>(
    device: &D,
    builtin: bool,
    layout: &MonitorLayout,
    size_tolerance: f64,
) -> Candidates {
    let mut candidates = Candidates::default();
    let name = device.name();

    for monitor in layout.monitors() {
        if let Some(kind) = match_edid(&name, monitor) {
            candidates.set(kind, monitor.id);
        }
    }

    if let Some(size) = device.physical_size()
        && let Some(monitor) = find_size_match(size, layout.monitors(), size_tolerance)
    {
        candidates.set(MatchKind::Size, monitor);
    }

    if (builtin || candidates.is_empty())
        && let Some(panel) = layout.builtin_panel()
    {
        candidates.set(MatchKind::IsBuiltin, panel.id);
    }

    debug!(
        device = %name,
        builtin,
        best = ?candidates.best(),
        candidates = ?candidates.iter().collect::<Vec<_>>(),
        "guessed output candidates"
    );

    candidates
}
