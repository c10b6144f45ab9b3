//! Per-device display preferences layered over the automatic mapper.
//!
//! A device with an output pin that names a present monitor is bound to that
//! monitor and kept out of the mapper. Everything else that is display
//! mapped is delegated to the mapper according to its integration class.

use tracing::{debug, info};

use crate::{
    config::{Integration, MapperConfig},
    device::{DeviceType, MappedDevice},
    mapper::{DeviceMapped, InputMapper},
    monitor::{LogicalMonitorId, Monitor, MonitorId, MonitorLayout},
};

/// Compared by monitor value since monitor ids are positional.
type Binding = (Option<LogicalMonitorId>, Option<Monitor>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    Pinned(LogicalMonitorId, MonitorId),
    Mapper { builtin: bool },
    Unmapped,
}

pub struct InputSettings<D: MappedDevice> {
    config: MapperConfig,
    mapper: InputMapper<D>,
    /// Display mapped devices in arrival order.
    devices: Vec<D>,
}

impl<D: MappedDevice> InputSettings<D> {
    pub fn new(layout: MonitorLayout, config: MapperConfig) -> Self {
        let mapper = InputMapper::new(layout, config.mapper_options());
        Self {
            config,
            mapper,
            devices: Vec::new(),
        }
    }

    pub fn mapper(&self) -> &InputMapper<D> {
        &self.mapper
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn device_added(&mut self, device: D) -> Vec<DeviceMapped<D>> {
        if !device.device_type().is_display_mapped() {
            debug!(device = %device.name(), "device has no display mapping");
            return Vec::new();
        }
        if self.devices.contains(&device) {
            return Vec::new();
        }

        let before = self.binding(&device);
        self.devices.push(device.clone());
        self.place(&device);
        self.report(&device, before).into_iter().collect()
    }

    pub fn device_removed(&mut self, device: &D) -> Vec<DeviceMapped<D>> {
        let Some(index) = self.devices.iter().position(|known| known == device) else {
            return Vec::new();
        };

        let before = self.binding(device);
        let device = self.devices.remove(index);
        self.mapper.remove_device(&device);
        self.report(&device, before).into_iter().collect()
    }

    /// Re-evaluate every device against a new monitor set.
    pub fn monitors_changed(&mut self, layout: MonitorLayout) -> Vec<DeviceMapped<D>> {
        let devices = self.devices.clone();
        let before: Vec<Binding> = devices.iter().map(|device| self.binding(device)).collect();

        // Pins are resolved against the new layout.
        let placements: Vec<Placement> = devices
            .iter()
            .map(|device| self.placement_in(device, &layout))
            .collect();

        for (device, placement) in devices.iter().zip(&placements) {
            if !matches!(placement, Placement::Mapper { .. }) {
                self.mapper.remove_device(device);
            }
        }

        self.mapper.monitors_changed(layout);

        for (device, placement) in devices.iter().zip(&placements) {
            if let Placement::Mapper { builtin } = placement {
                self.mapper.add_device(device.clone(), *builtin);
            }
        }

        devices
            .iter()
            .zip(before)
            .filter_map(|(device, before)| self.report(device, before))
            .collect()
    }

    /// Logical monitor a tablet or touchscreen works on, automatic binding
    /// first and explicit pin second.
    pub fn tablet_logical_monitor(&self, device: &D) -> Option<LogicalMonitorId> {
        self.mapper
            .device_logical_monitor(device)
            .or_else(|| self.pin(device, self.mapper.layout()).map(|(lm, _)| lm))
    }

    /// Touchscreen of the built-in panel, to be disabled while the panel is
    /// powered down.
    pub fn builtin_touchscreen(&self) -> Option<&D> {
        self.mapper.builtin_panel_device(DeviceType::Touchscreen)
    }

    /// Effective binding of every display mapped device, in arrival order.
    pub fn bindings(
        &self,
    ) -> impl Iterator<Item = (&D, Option<LogicalMonitorId>, Option<&Monitor>)> {
        self.devices.iter().map(|device| {
            let (logical_monitor, monitor) = self.binding_id(device);
            (
                device,
                logical_monitor,
                monitor.and_then(|id| self.mapper.layout().monitor(id)),
            )
        })
    }

    fn place(&mut self, device: &D) {
        match self.placement_in(device, self.mapper.layout()) {
            Placement::Pinned(logical_monitor, monitor) => {
                debug!(
                    device = %device.name(),
                    %logical_monitor,
                    %monitor,
                    "device pinned by config"
                );
                self.mapper.remove_device(device);
            }
            Placement::Mapper { builtin } => {
                self.mapper.add_device(device.clone(), builtin);
            }
            Placement::Unmapped => {
                debug!(device = %device.name(), "standalone tablet is not display mapped");
                self.mapper.remove_device(device);
            }
        }
    }

    fn placement_in(&self, device: &D, layout: &MonitorLayout) -> Placement {
        if let Some((logical_monitor, monitor)) = self.pin(device, layout) {
            return Placement::Pinned(logical_monitor, monitor);
        }

        if device.device_type() == DeviceType::Touchscreen {
            return Placement::Mapper { builtin: false };
        }

        let integration = self
            .config
            .rule_for(&device.name())
            .and_then(|rule| rule.integration);
        match integration {
            Some(Integration::Standalone) => Placement::Unmapped,
            Some(Integration::System) => Placement::Mapper { builtin: true },
            Some(Integration::Display) | None => Placement::Mapper { builtin: false },
        }
    }

    fn pin(&self, device: &D, layout: &MonitorLayout) -> Option<(LogicalMonitorId, MonitorId)> {
        let edid = self.config.rule_for(&device.name())?.output.as_ref()?;
        let found = layout.find_by_edid(&edid.vendor, &edid.product, &edid.serial);
        if found.is_none() {
            debug!(
                device = %device.name(),
                vendor = %edid.vendor,
                product = %edid.product,
                serial = %edid.serial,
                "configured output is not present"
            );
        }
        found.map(|(logical_monitor, monitor)| (logical_monitor, monitor.id))
    }

    fn binding(&self, device: &D) -> Binding {
        let (logical_monitor, monitor) = self.binding_id(device);
        let monitor = monitor.and_then(|id| self.mapper.layout().monitor(id)).cloned();
        (logical_monitor, monitor)
    }

    fn binding_id(&self, device: &D) -> (Option<LogicalMonitorId>, Option<MonitorId>) {
        if !self.devices.contains(device) {
            return (None, None);
        }
        if let Some((logical_monitor, monitor)) = self.pin(device, self.mapper.layout()) {
            return (Some(logical_monitor), Some(monitor));
        }
        (
            self.mapper.device_logical_monitor(device),
            self.mapper.device_monitor(device).map(|monitor| monitor.id),
        )
    }

    fn report(&self, device: &D, before: Binding) -> Option<DeviceMapped<D>> {
        let (logical_monitor, monitor) = self.binding(device);
        if logical_monitor == before.0 && monitor == before.1 {
            return None;
        }

        match (logical_monitor, monitor.as_ref()) {
            (Some(logical_monitor), Some(monitor)) => info!(
                device = %device.name(),
                %logical_monitor,
                connector = %monitor.connector,
                "device output changed"
            ),
            _ => info!(device = %device.name(), "device has no output"),
        }

        Some(DeviceMapped {
            device: device.clone(),
            logical_monitor,
            monitor,
        })
    }
}
