//! The mapping store: which input device is bound to which logical monitor.
//!
//! Devices are added one at a time and assigned incrementally. A change of
//! the monitor set throws every output entry away and reassigns all devices
//! from scratch. Every mutating call returns one [`DeviceMapped`] per device
//! whose binding changed, after the whole batch has settled.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    candidates::{MAX_SIZE_MATCH_DIFF, guess_candidates},
    device::{DeviceType, InputCapabilities, MappedDevice},
    monitor::{LogicalMonitorId, Monitor, MonitorId, MonitorLayout, MonitorSource},
    solver::{self, AssignmentQueue, TieBreak},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapperOptions {
    pub size_tolerance: f64,
    pub tie_break: TieBreak,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            size_tolerance: MAX_SIZE_MATCH_DIFF,
            tie_break: TieBreak::Stable,
        }
    }
}

/// A device's binding changed.
///
/// `monitor` is the physical monitor that matched, which consumers need for
/// monitor-specific metadata when computing the device transform.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceMapped<D> {
    pub device: D,
    pub logical_monitor: Option<LogicalMonitorId>,
    pub monitor: Option<Monitor>,
}

/// Backends number monitors by position, so a binding is compared by the
/// matched monitor's value and not only by its id.
type Binding = (Option<LogicalMonitorId>, Option<Monitor>);

#[derive(Debug)]
pub(crate) struct InputEntry<D> {
    pub device: D,
    pub builtin: bool,
    pub output: Option<LogicalMonitorId>,
    pub monitor: Option<MonitorId>,
}

impl<D> InputEntry<D> {
    fn clear(&mut self) {
        self.output = None;
        self.monitor = None;
    }
}

#[derive(Debug)]
pub(crate) struct OutputEntry<D> {
    logical_monitor: LogicalMonitorId,
    /// Most recently bound first.
    devices: Vec<D>,
    pub attached_caps: InputCapabilities,
}

impl<D: MappedDevice> OutputEntry<D> {
    fn new(logical_monitor: LogicalMonitorId) -> Self {
        Self {
            logical_monitor,
            devices: Vec::new(),
            attached_caps: InputCapabilities::empty(),
        }
    }

    pub fn add_input(&mut self, input: &mut InputEntry<D>, monitor: MonitorId) {
        debug_assert!(input.output.is_none(), "input is already bound");

        self.devices.insert(0, input.device.clone());
        self.attached_caps |= input.device.capabilities();
        input.output = Some(self.logical_monitor);
        input.monitor = Some(monitor);
    }

    fn remove_input(&mut self, device: &D) {
        self.devices.retain(|bound| bound != device);
        self.attached_caps = self
            .devices
            .iter()
            .fold(InputCapabilities::empty(), |caps, bound| {
                caps | bound.capabilities()
            });
    }
}

pub struct InputMapper<D: MappedDevice> {
    layout: MonitorLayout,
    options: MapperOptions,
    /// Registration order; feeds the solver's tie-break.
    inputs: Vec<InputEntry<D>>,
    outputs: HashMap<LogicalMonitorId, OutputEntry<D>>,
}

impl<D: MappedDevice> InputMapper<D> {
    pub fn new(layout: MonitorLayout, options: MapperOptions) -> Self {
        let mut mapper = Self {
            layout,
            options,
            inputs: Vec::new(),
            outputs: HashMap::new(),
        };
        mapper.rebuild_outputs();
        mapper
    }

    pub fn layout(&self) -> &MonitorLayout {
        &self.layout
    }

    pub fn options(&self) -> MapperOptions {
        self.options
    }

    pub fn contains(&self, device: &D) -> bool {
        self.position(device).is_some()
    }

    /// Register `device` and assign it against the current outputs. Other
    /// devices keep their bindings. Adding a known device does nothing.
    pub fn add_device(&mut self, device: D, builtin: bool) -> Vec<DeviceMapped<D>> {
        if self.contains(&device) {
            debug!(device = %device.name(), "device already registered");
            return Vec::new();
        }

        self.inputs.push(InputEntry {
            device,
            builtin,
            output: None,
            monitor: None,
        });
        let index = self.inputs.len() - 1;

        self.recalculate(&[index]);
        self.changes(&[index], &[(None, None)])
    }

    /// Forget `device`, releasing its claim on its output. Removing an
    /// unknown device does nothing.
    pub fn remove_device(&mut self, device: &D) -> Vec<DeviceMapped<D>> {
        let Some(index) = self.position(device) else {
            return Vec::new();
        };

        let entry = self.inputs.remove(index);
        let Some(logical_monitor) = entry.output else {
            return Vec::new();
        };

        if let Some(output) = self.outputs.get_mut(&logical_monitor) {
            output.remove_input(&entry.device);
        }

        info!(device = %entry.device.name(), %logical_monitor, "device unmapped");
        vec![DeviceMapped {
            device: entry.device,
            logical_monitor: None,
            monitor: None,
        }]
    }

    /// Replace the monitor set and reassign every registered device.
    pub fn monitors_changed(&mut self, layout: MonitorLayout) -> Vec<DeviceMapped<D>> {
        let before: Vec<Binding> = self
            .inputs
            .iter()
            .map(|input| self.binding_of(input))
            .collect();

        self.layout = layout;
        for input in &mut self.inputs {
            input.clear();
        }
        self.rebuild_outputs();

        let all: Vec<usize> = (0..self.inputs.len()).collect();
        self.recalculate(&all);
        self.changes(&all, &before)
    }

    pub fn refresh_from(&mut self, source: &impl MonitorSource) -> Vec<DeviceMapped<D>> {
        self.monitors_changed(source.monitor_layout())
    }

    /// Device of exactly `device_type` bound to `logical_monitor`.
    pub fn logical_monitor_device(
        &self,
        logical_monitor: LogicalMonitorId,
        device_type: DeviceType,
    ) -> Option<&D> {
        self.outputs
            .get(&logical_monitor)?
            .devices
            .iter()
            .find(|device| device.device_type() == device_type)
    }

    pub fn device_logical_monitor(&self, device: &D) -> Option<LogicalMonitorId> {
        self.entry(device)?.output
    }

    /// The physical monitor whose match produced the device's binding.
    pub fn device_monitor(&self, device: &D) -> Option<&Monitor> {
        self.layout.monitor(self.entry(device)?.monitor?)
    }

    /// Device of `device_type` bound to the built-in panel, eg. the laptop
    /// touchscreen to disable while the panel is powered down.
    pub fn builtin_panel_device(&self, device_type: DeviceType) -> Option<&D> {
        let logical_monitor = self.layout.builtin_panel()?.logical_monitor?;
        self.logical_monitor_device(logical_monitor, device_type)
    }

    pub fn attached_capabilities(&self, logical_monitor: LogicalMonitorId) -> InputCapabilities {
        self.outputs
            .get(&logical_monitor)
            .map(|output| output.attached_caps)
            .unwrap_or_default()
    }

    pub fn devices(&self) -> impl Iterator<Item = &D> {
        self.inputs.iter().map(|input| &input.device)
    }

    /// Every registered device with its binding, in registration order.
    pub fn mappings(
        &self,
    ) -> impl Iterator<Item = (&D, Option<LogicalMonitorId>, Option<&Monitor>)> {
        self.inputs.iter().map(|input| {
            (
                &input.device,
                input.output,
                input.monitor.and_then(|id| self.layout.monitor(id)),
            )
        })
    }

    fn position(&self, device: &D) -> Option<usize> {
        self.inputs.iter().position(|input| &input.device == device)
    }

    fn entry(&self, device: &D) -> Option<&InputEntry<D>> {
        self.inputs.iter().find(|input| &input.device == device)
    }

    fn rebuild_outputs(&mut self) {
        self.outputs = self
            .layout
            .logical_monitors()
            .iter()
            .map(|logical| (logical.id, OutputEntry::new(logical.id)))
            .collect();
    }

    fn recalculate(&mut self, indices: &[usize]) {
        let mut queue = AssignmentQueue::new(self.options.tie_break);
        for &index in indices {
            let input = &self.inputs[index];
            let candidates = guess_candidates(
                &input.device,
                input.builtin,
                &self.layout,
                self.options.size_tolerance,
            );
            queue.push(index, candidates);
        }

        solver::apply(queue, &mut self.inputs, &mut self.outputs, &self.layout);
    }

    fn binding_of(&self, input: &InputEntry<D>) -> Binding {
        let monitor = input.monitor.and_then(|id| self.layout.monitor(id)).cloned();
        (input.output, monitor)
    }

    fn changes(&self, indices: &[usize], before: &[Binding]) -> Vec<DeviceMapped<D>> {
        indices
            .iter()
            .zip(before)
            .filter_map(|(&index, previous)| {
                let input = &self.inputs[index];
                let (logical_monitor, monitor) = self.binding_of(input);
                if logical_monitor == previous.0 && monitor == previous.1 {
                    return None;
                }

                match (input.output, monitor.as_ref()) {
                    (Some(logical_monitor), Some(monitor)) => info!(
                        device = %input.device.name(),
                        %logical_monitor,
                        connector = %monitor.connector,
                        "device mapped"
                    ),
                    _ => info!(device = %input.device.name(), "device unmapped"),
                }

                Some(DeviceMapped {
                    device: input.device.clone(),
                    logical_monitor: input.output,
                    monitor,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use pretty_assertions::assert_eq;

    fn panel(id: u32) -> Monitor {
        Monitor::new(MonitorId(id), "eDP-1")
            .with_edid("BOE", "0x0974", "")
            .with_size(290, 170)
            .in_logical_monitor(LogicalMonitorId(id))
            .builtin(true)
    }

    fn cintiq(id: u32) -> Monitor {
        Monitor::new(MonitorId(id), "DP-1")
            .with_edid("WAC", "Cintiq 12WX", "8BH01234")
            .with_size(261, 163)
            .in_logical_monitor(LogicalMonitorId(id))
    }

    fn external(id: u32, width_mm: i32, height_mm: i32) -> Monitor {
        Monitor::new(MonitorId(id), format!("HDMI-A-{id}"))
            .with_edid("GSM", "LG HDR 4K", "")
            .with_size(width_mm, height_mm)
            .in_logical_monitor(LogicalMonitorId(id))
    }

    fn mapper(monitors: Vec<Monitor>) -> InputMapper<DeviceInfo> {
        InputMapper::new(MonitorLayout::new(monitors), MapperOptions::default())
    }

    fn bound(mapper: &InputMapper<DeviceInfo>, device: &DeviceInfo) -> Option<u32> {
        mapper.device_logical_monitor(device).map(|lm| lm.0)
    }

    #[test]
    fn edid_full_match_binds() {
        let mut mapper = mapper(vec![cintiq(0)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);

        let events = mapper.add_device(pen.clone(), false);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].logical_monitor, Some(LogicalMonitorId(0)));
        assert_eq!(events[0].monitor.as_ref().map(|m| m.id), Some(MonitorId(0)));
        assert_eq!(bound(&mapper, &pen), Some(0));
    }

    #[test]
    fn builtin_device_binds_to_panel() {
        let mut mapper = mapper(vec![panel(0), external(1, 600, 340)]);
        let touch = DeviceInfo::new(1, "ELAN Touchscreen", DeviceType::Touchscreen);

        mapper.add_device(touch.clone(), true);

        assert_eq!(bound(&mapper, &touch), Some(0));
        assert_eq!(
            mapper.builtin_panel_device(DeviceType::Touchscreen),
            Some(&touch)
        );
    }

    #[test]
    fn builtin_device_without_panel_stays_unbound() {
        let mut mapper = mapper(vec![external(0, 600, 340)]);
        let touch = DeviceInfo::new(1, "ELAN Touchscreen", DeviceType::Touchscreen);

        let events = mapper.add_device(touch.clone(), true);

        assert!(events.is_empty());
        assert_eq!(bound(&mapper, &touch), None);
        assert!(mapper.contains(&touch));
    }

    #[test]
    fn different_classes_share_an_output() {
        let intuos = Monitor::new(MonitorId(0), "DP-1")
            .with_edid("WAC", "Intuos", "")
            .in_logical_monitor(LogicalMonitorId(0));
        let mut mapper = mapper(vec![intuos]);
        let pen = DeviceInfo::new(1, "Wacom Intuos Pen", DeviceType::Pen);
        let eraser = DeviceInfo::new(2, "Wacom Intuos Eraser", DeviceType::Eraser);

        mapper.add_device(pen.clone(), false);
        mapper.add_device(eraser.clone(), false);

        assert_eq!(bound(&mapper, &pen), Some(0));
        assert_eq!(bound(&mapper, &eraser), Some(0));
        assert_eq!(
            mapper.attached_capabilities(LogicalMonitorId(0)),
            InputCapabilities::STYLUS | InputCapabilities::ERASER
        );
    }

    #[test]
    fn same_class_falls_through_to_next_slot() {
        let mut mapper = mapper(vec![external(0, 300, 200), panel(1)]);
        let first = DeviceInfo::new(1, "Generic Pen", DeviceType::Pen).with_size(300.0, 200.0);
        let second = DeviceInfo::new(2, "Generic Pen", DeviceType::Pen).with_size(300.0, 200.0);
        let third =
            DeviceInfo::new(3, "Generic Tablet", DeviceType::Tablet).with_size(300.0, 200.0);

        mapper.add_device(first.clone(), false);
        mapper.add_device(second.clone(), true);
        let events = mapper.add_device(third.clone(), false);

        assert_eq!(bound(&mapper, &first), Some(0));
        assert_eq!(bound(&mapper, &second), Some(1));
        assert_eq!(bound(&mapper, &third), None);
        assert!(events.is_empty());
    }

    #[test]
    fn edid_beats_tighter_size_match() {
        let monitors = vec![cintiq(0), external(1, 300, 200)];
        let mut mapper = mapper(monitors);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen)
            .with_size(300.0, 200.0);

        mapper.add_device(pen.clone(), false);

        assert_eq!(bound(&mapper, &pen), Some(0));
    }

    #[test]
    fn adding_twice_is_a_noop() {
        let mut mapper = mapper(vec![cintiq(0)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);

        assert_eq!(mapper.add_device(pen.clone(), false).len(), 1);
        assert!(mapper.add_device(pen.clone(), true).is_empty());
        assert_eq!(mapper.devices().count(), 1);
        assert_eq!(bound(&mapper, &pen), Some(0));
    }

    #[test]
    fn removing_releases_the_class() {
        let mut mapper = mapper(vec![cintiq(0)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        let other = DeviceInfo::new(2, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        mapper.add_device(pen.clone(), false);
        mapper.add_device(other.clone(), false);
        assert_eq!(bound(&mapper, &other), None);

        let events = mapper.remove_device(&pen);
        assert_eq!(
            events,
            vec![DeviceMapped {
                device: pen.clone(),
                logical_monitor: None,
                monitor: None,
            }]
        );
        assert!(!mapper.contains(&pen));
        assert_eq!(
            mapper.attached_capabilities(LogicalMonitorId(0)),
            InputCapabilities::empty()
        );
        assert!(mapper.remove_device(&pen).is_empty());
    }

    #[test]
    fn unplugged_monitor_rebinds_or_unbinds() {
        let mut mapper = mapper(vec![panel(0), cintiq(1)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        mapper.add_device(pen.clone(), false);
        assert_eq!(bound(&mapper, &pen), Some(1));

        let events = mapper.monitors_changed(MonitorLayout::new(vec![panel(0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].logical_monitor, Some(LogicalMonitorId(0)));
        assert_eq!(bound(&mapper, &pen), Some(0));

        let events = mapper.monitors_changed(MonitorLayout::new(vec![external(2, 600, 340)]));
        assert_eq!(
            events,
            vec![DeviceMapped {
                device: pen.clone(),
                logical_monitor: None,
                monitor: None,
            }]
        );
        assert_eq!(bound(&mapper, &pen), None);
    }

    #[test]
    fn unchanged_layout_emits_nothing() {
        let monitors = vec![panel(0), cintiq(1)];
        let mut mapper = mapper(monitors.clone());
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        let touch = DeviceInfo::new(2, "ELAN Touchscreen", DeviceType::Touchscreen);
        mapper.add_device(pen.clone(), false);
        mapper.add_device(touch.clone(), true);

        let events = mapper.monitors_changed(MonitorLayout::new(monitors));

        assert!(events.is_empty());
        assert_eq!(bound(&mapper, &pen), Some(1));
        assert_eq!(bound(&mapper, &touch), Some(0));
    }

    #[test]
    fn reverse_lookup_filters_by_type() {
        let mut mapper = mapper(vec![cintiq(0)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        let pad = DeviceInfo::new(2, "Wacom Cintiq 12WX Pad", DeviceType::Pad);
        mapper.add_device(pen.clone(), false);
        mapper.add_device(pad.clone(), false);

        assert_eq!(
            mapper.logical_monitor_device(LogicalMonitorId(0), DeviceType::Pad),
            Some(&pad)
        );
        assert_eq!(
            mapper.logical_monitor_device(LogicalMonitorId(0), DeviceType::Pen),
            Some(&pen)
        );
        assert_eq!(
            mapper.logical_monitor_device(LogicalMonitorId(0), DeviceType::Eraser),
            None
        );
        assert_eq!(
            mapper.logical_monitor_device(LogicalMonitorId(7), DeviceType::Pen),
            None
        );
    }

    #[test]
    fn disabled_monitor_is_never_a_target() {
        let disabled = Monitor::new(MonitorId(0), "DP-1").with_edid("WAC", "Cintiq 12WX", "");
        let mut mapper = mapper(vec![disabled]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);

        assert!(mapper.add_device(pen.clone(), false).is_empty());
        assert_eq!(mapper.device_monitor(&pen), None);
    }

    #[test]
    fn full_recompute_serves_better_matches_first() {
        let mut mapper = mapper(vec![panel(0), cintiq(1)]);
        // Only a size match on the Cintiq, but registered first.
        let generic = DeviceInfo::new(1, "Generic Pen", DeviceType::Pen).with_size(261.0, 163.0);
        let cintiq_pen = DeviceInfo::new(2, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        mapper.add_device(generic.clone(), true);
        mapper.add_device(cintiq_pen.clone(), false);
        assert_eq!(bound(&mapper, &generic), Some(1));
        assert_eq!(bound(&mapper, &cintiq_pen), None);

        let events = mapper.monitors_changed(MonitorLayout::new(vec![panel(0), cintiq(1)]));

        assert_eq!(bound(&mapper, &generic), Some(0));
        assert_eq!(bound(&mapper, &cintiq_pen), Some(1));
        let devices: Vec<u64> = events.iter().map(|event| event.device.id).collect();
        assert_eq!(devices, vec![1, 2]);
    }

    #[test]
    fn replaced_monitor_under_same_id_is_reported() {
        let panel = panel(0);
        let first = Monitor::new(MonitorId(1), "DP-1")
            .with_edid("WAC", "Cintiq 16", "AAA")
            .in_logical_monitor(LogicalMonitorId(1));
        let second = Monitor::new(MonitorId(1), "HDMI-A-1")
            .with_edid("WAC", "Cintiq 16", "BBB")
            .in_logical_monitor(LogicalMonitorId(1));
        let mut mapper = mapper(vec![panel.clone(), first]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 16 Pen", DeviceType::Pen);
        mapper.add_device(pen.clone(), false);

        let events = mapper.monitors_changed(MonitorLayout::new(vec![panel, second.clone()]));

        assert_eq!(
            events,
            vec![DeviceMapped {
                device: pen.clone(),
                logical_monitor: Some(LogicalMonitorId(1)),
                monitor: Some(second),
            }]
        );
        assert_eq!(
            mapper.device_monitor(&pen).map(|m| m.connector.as_str()),
            Some("HDMI-A-1")
        );
    }

    #[test]
    fn refresh_pulls_layout_from_source() {
        let mut mapper = mapper(vec![panel(0)]);
        let pen = DeviceInfo::new(1, "Wacom Cintiq 12WX Pen", DeviceType::Pen);
        mapper.add_device(pen.clone(), false);
        assert_eq!(bound(&mapper, &pen), Some(0));

        let source = MonitorLayout::new(vec![panel(0), cintiq(1)]);
        let events = mapper.refresh_from(&source);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].logical_monitor, Some(LogicalMonitorId(1)));
        assert_eq!(mapper.layout(), &source);
        assert!(mapper.refresh_from(&source).is_empty());
    }
}
