//! Monitor snapshots of a running compositor's `Output`s.

use smithay::output::Output;

use crate::monitor::{
    LogicalMonitorId, Monitor, MonitorId, MonitorLayout, MonitorSource, is_builtin_connector,
};

/// Outputs showing the same region at the same mode mirror each other and
/// share one logical monitor. Outputs without a mode are disabled.
#[derive(Debug, Clone)]
pub struct OutputMonitors {
    layout: MonitorLayout,
    outputs: Vec<(MonitorId, Output)>,
}

impl OutputMonitors {
    pub fn new<S: AsRef<str>>(
        outputs: impl IntoIterator<Item = Output>,
        builtin_connectors: &[S],
    ) -> Self {
        let mut regions = Vec::new();
        let mut monitors = Vec::new();
        let mut tracked = Vec::new();

        for (index, output) in outputs.into_iter().enumerate() {
            let id = MonitorId(index as u32);
            let properties = output.physical_properties();
            let name = output.name();

            let logical_monitor = output.current_mode().map(|mode| {
                let region = (output.current_location(), mode.size);
                let position = regions
                    .iter()
                    .position(|known| *known == region)
                    .unwrap_or_else(|| {
                        regions.push(region);
                        regions.len() - 1
                    });
                LogicalMonitorId(position as u32)
            });

            let mut monitor = Monitor::new(id, name.clone())
                .with_edid(properties.make, properties.model, properties.serial_number)
                .with_size(properties.size.w, properties.size.h)
                .builtin(is_builtin_connector(&name, builtin_connectors));
            monitor.logical_monitor = logical_monitor;

            monitors.push(monitor);
            tracked.push((id, output));
        }

        Self {
            layout: MonitorLayout::new(monitors),
            outputs: tracked,
        }
    }

    pub fn layout(&self) -> &MonitorLayout {
        &self.layout
    }

    pub fn output_for(&self, monitor: MonitorId) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|(id, _)| *id == monitor)
            .map(|(_, output)| output)
    }

    /// Every output that belongs to `logical_monitor`.
    pub fn logical_outputs(
        &self,
        logical_monitor: LogicalMonitorId,
    ) -> impl Iterator<Item = &Output> {
        self.layout
            .logical_monitor(logical_monitor)
            .into_iter()
            .flat_map(|logical| logical.monitors.iter())
            .filter_map(|id| self.output_for(*id))
    }
}

impl MonitorSource for OutputMonitors {
    fn monitor_layout(&self) -> MonitorLayout {
        self.layout.clone()
    }
}
