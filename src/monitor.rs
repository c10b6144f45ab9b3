use std::fmt;

/// Connector name prefixes that identify a panel integrated into the chassis.
pub const DEFAULT_BUILTIN_CONNECTORS: &[&str] = &["eDP", "LVDS", "DSI"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalMonitorId(pub u32);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{}", self.0)
    }
}

impl fmt::Display for LogicalMonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "logical#{}", self.0)
    }
}

/// A physical display and its EDID identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Monitor {
    pub id: MonitorId,
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
    pub width_mm: i32,
    pub height_mm: i32,
    /// `None` while the monitor is connected but disabled.
    pub logical_monitor: Option<LogicalMonitorId>,
    pub is_builtin: bool,
}

impl Monitor {
    pub fn new(id: MonitorId, connector: impl Into<String>) -> Self {
        Self {
            id,
            connector: connector.into(),
            vendor: String::new(),
            product: String::new(),
            serial: String::new(),
            width_mm: 0,
            height_mm: 0,
            logical_monitor: None,
            is_builtin: false,
        }
    }

    pub fn with_edid(
        mut self,
        vendor: impl Into<String>,
        product: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        self.vendor = vendor.into();
        self.product = product.into();
        self.serial = serial.into();
        self
    }

    pub fn with_size(mut self, width_mm: i32, height_mm: i32) -> Self {
        self.width_mm = width_mm;
        self.height_mm = height_mm;
        self
    }

    pub fn in_logical_monitor(mut self, logical_monitor: LogicalMonitorId) -> Self {
        self.logical_monitor = Some(logical_monitor);
        self
    }

    pub fn builtin(mut self, is_builtin: bool) -> Self {
        self.is_builtin = is_builtin;
        self
    }

    pub fn matches_edid(&self, vendor: &str, product: &str, serial: &str) -> bool {
        self.vendor == vendor && self.product == product && self.serial == serial
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalMonitor {
    pub id: LogicalMonitorId,
    pub monitors: Vec<MonitorId>,
}

/// Snapshot of the monitor registry.
///
/// Logical monitors are derived from the monitors' membership, in order of
/// first appearance, so the two views can never disagree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MonitorLayout {
    monitors: Vec<Monitor>,
    logical_monitors: Vec<LogicalMonitor>,
}

impl MonitorLayout {
    pub fn new(monitors: Vec<Monitor>) -> Self {
        let mut logical_monitors: Vec<LogicalMonitor> = Vec::new();
        for monitor in &monitors {
            let Some(logical_id) = monitor.logical_monitor else {
                continue;
            };
            match logical_monitors.iter_mut().find(|lm| lm.id == logical_id) {
                Some(logical) => logical.monitors.push(monitor.id),
                None => logical_monitors.push(LogicalMonitor {
                    id: logical_id,
                    monitors: vec![monitor.id],
                }),
            }
        }

        Self {
            monitors,
            logical_monitors,
        }
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn logical_monitors(&self) -> &[LogicalMonitor] {
        &self.logical_monitors
    }

    pub fn monitor(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.iter().find(|monitor| monitor.id == id)
    }

    pub fn logical_monitor(&self, id: LogicalMonitorId) -> Option<&LogicalMonitor> {
        self.logical_monitors.iter().find(|lm| lm.id == id)
    }

    pub fn builtin_panel(&self) -> Option<&Monitor> {
        self.monitors.iter().find(|monitor| monitor.is_builtin)
    }

    /// Exact EDID triplet lookup over enabled monitors.
    pub fn find_by_edid(
        &self,
        vendor: &str,
        product: &str,
        serial: &str,
    ) -> Option<(LogicalMonitorId, &Monitor)> {
        self.logical_monitors.iter().find_map(|logical| {
            logical
                .monitors
                .iter()
                .filter_map(|id| self.monitor(*id))
                .find(|monitor| monitor.matches_edid(vendor, product, serial))
                .map(|monitor| (logical.id, monitor))
        })
    }
}

/// Anything that can describe the current monitor set.
pub trait MonitorSource {
    fn monitor_layout(&self) -> MonitorLayout;
}

impl MonitorSource for MonitorLayout {
    fn monitor_layout(&self) -> MonitorLayout {
        self.clone()
    }
}

pub fn is_builtin_connector<S: AsRef<str>>(connector: &str, prefixes: &[S]) -> bool {
    let connector = connector.trim();
    prefixes.iter().any(|prefix| {
        let prefix = prefix.as_ref();
        connector
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            && connector[prefix.len()..]
                .chars()
                .next()
                .is_none_or(|ch| ch == '-' || ch.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout() -> MonitorLayout {
        MonitorLayout::new(vec![
            Monitor::new(MonitorId(0), "eDP-1")
                .with_edid("BOE", "0x0974", "")
                .in_logical_monitor(LogicalMonitorId(0))
                .builtin(true),
            Monitor::new(MonitorId(1), "HDMI-A-1")
                .with_edid("DEL", "DELL U2720Q", "ABC123")
                .in_logical_monitor(LogicalMonitorId(1)),
            Monitor::new(MonitorId(2), "DP-1")
                .with_edid("DEL", "DELL U2720Q", "XYZ789")
                .in_logical_monitor(LogicalMonitorId(1)),
            Monitor::new(MonitorId(3), "DP-2").with_edid("GSM", "LG ULTRAFINE", "1"),
        ])
    }

    #[test]
    fn logical_monitors_follow_membership() {
        let layout = layout();
        assert_eq!(
            layout.logical_monitors(),
            &[
                LogicalMonitor {
                    id: LogicalMonitorId(0),
                    monitors: vec![MonitorId(0)],
                },
                LogicalMonitor {
                    id: LogicalMonitorId(1),
                    monitors: vec![MonitorId(1), MonitorId(2)],
                },
            ]
        );
    }

    #[test]
    fn builtin_panel_lookup() {
        assert_eq!(layout().builtin_panel().map(|m| m.id), Some(MonitorId(0)));
        assert_eq!(MonitorLayout::default().builtin_panel(), None);
    }

    #[test]
    fn edid_lookup_is_exact_and_skips_disabled() {
        let layout = layout();
        let found = layout.find_by_edid("DEL", "DELL U2720Q", "XYZ789");
        assert_eq!(
            found.map(|(lm, m)| (lm, m.id)),
            Some((LogicalMonitorId(1), MonitorId(2)))
        );
        assert!(layout.find_by_edid("DEL", "DELL U2720Q", "").is_none());
        assert!(layout.find_by_edid("GSM", "LG ULTRAFINE", "1").is_none());
    }

    #[test]
    fn builtin_connector_names() {
        let prefixes = DEFAULT_BUILTIN_CONNECTORS;
        assert!(is_builtin_connector("eDP-1", prefixes));
        assert!(is_builtin_connector("LVDS1", prefixes));
        assert!(is_builtin_connector("DSI-2", prefixes));
        assert!(!is_builtin_connector("DP-1", prefixes));
        assert!(!is_builtin_connector("HDMI-A-1", prefixes));
        assert!(!is_builtin_connector("DSIX-1", prefixes));
    }
}
