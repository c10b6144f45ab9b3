use smithay::reexports::calloop::{
    LoopHandle, RegistrationToken,
    channel::{self, Sender},
};

use crate::{
    MapperError, Result,
    device::MappedDevice,
    mapper::{DeviceMapped, InputMapper},
    monitor::MonitorLayout,
};

/// A change in one of the registries the mapper follows.
#[derive(Clone, Debug)]
pub enum MapperEvent<D> {
    DeviceAdded { device: D, builtin: bool },
    DeviceRemoved { device: D },
    MonitorsChanged(MonitorLayout),
}

pub trait InputMapperHandler {
    type Device: MappedDevice;

    fn input_mapper(&mut self) -> &mut InputMapper<Self::Device>;

    /// A device got a new binding, or lost it when both fields are `None`.
    fn device_mapped(&mut self, mapped: DeviceMapped<Self::Device>);
}

/// Apply `event` to the handler's mapper, then report every binding change.
pub fn process_event<H: InputMapperHandler>(state: &mut H, event: MapperEvent<H::Device>) {
    let mapper = state.input_mapper();
    let changes = match event {
        MapperEvent::DeviceAdded { device, builtin } => mapper.add_device(device, builtin),
        MapperEvent::DeviceRemoved { device } => mapper.remove_device(&device),
        MapperEvent::MonitorsChanged(layout) => mapper.monitors_changed(layout),
    };

    for mapped in changes {
        state.device_mapped(mapped);
    }
}

/// Registration of the mapper's event channel on a calloop loop.
#[derive(Debug)]
pub struct MapperEventSource {
    token: RegistrationToken,
}

impl MapperEventSource {
    pub fn insert<H>(
        handle: &LoopHandle<'static, H>,
    ) -> Result<(Self, Sender<MapperEvent<H::Device>>)>
    where
        H: InputMapperHandler + 'static,
        H::Device: 'static,
    {
        let (sender, receiver) = channel::channel();
        let token = handle
            .insert_source(receiver, |event, _, state: &mut H| match event {
                channel::Event::Msg(event) => process_event(state, event),
                channel::Event::Closed => tracing::debug!("input mapper channel closed"),
            })
            .map_err(|err| {
                MapperError::EventLoop(format!("failed to insert input mapper source: {err}"))
            })?;

        tracing::debug!("input mapper source registered");
        Ok((Self { token }, sender))
    }

    pub fn remove<H>(self, handle: &LoopHandle<'static, H>) {
        handle.remove(self.token);
        tracing::debug!("input mapper source removed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use smithay::reexports::calloop::EventLoop;

    use super::*;
    use crate::{
        device::{DeviceInfo, DeviceType},
        mapper::MapperOptions,
        monitor::{LogicalMonitorId, Monitor, MonitorId},
    };

    struct State {
        mapper: InputMapper<DeviceInfo>,
        mapped: Vec<DeviceMapped<DeviceInfo>>,
    }

    impl InputMapperHandler for State {
        type Device = DeviceInfo;

        fn input_mapper(&mut self) -> &mut InputMapper<DeviceInfo> {
            &mut self.mapper
        }

        fn device_mapped(&mut self, mapped: DeviceMapped<DeviceInfo>) {
            self.mapped.push(mapped);
        }
    }

    fn layout() -> MonitorLayout {
        MonitorLayout::new(vec![
            Monitor::new(MonitorId(0), "eDP-1")
                .with_size(290, 170)
                .in_logical_monitor(LogicalMonitorId(0))
                .builtin(true),
        ])
    }

    fn state() -> State {
        State {
            mapper: InputMapper::new(layout(), MapperOptions::default()),
            mapped: Vec::new(),
        }
    }

    #[test]
    fn process_event_notifies_after_apply() {
        let mut state = state();
        let touch = DeviceInfo::new(1, "ELAN Touchscreen", DeviceType::Touchscreen);

        process_event(
            &mut state,
            MapperEvent::DeviceAdded {
                device: touch.clone(),
                builtin: true,
            },
        );
        assert_eq!(state.mapped.len(), 1);
        assert_eq!(state.mapped[0].logical_monitor, Some(LogicalMonitorId(0)));

        process_event(&mut state, MapperEvent::MonitorsChanged(MonitorLayout::default()));
        assert_eq!(state.mapped.len(), 2);
        assert_eq!(state.mapped[1].logical_monitor, None);

        process_event(&mut state, MapperEvent::DeviceRemoved { device: touch });
        assert_eq!(state.mapped.len(), 2);
        assert_eq!(state.mapper.devices().count(), 0);
    }

    #[test]
    fn channel_delivers_until_removed() {
        let mut event_loop: EventLoop<State> = EventLoop::try_new().unwrap();
        let mut state = state();
        let handle = event_loop.handle();
        let (source, sender) = MapperEventSource::insert(&handle).unwrap();

        let touch = DeviceInfo::new(1, "ELAN Touchscreen", DeviceType::Touchscreen);
        sender
            .send(MapperEvent::DeviceAdded {
                device: touch.clone(),
                builtin: true,
            })
            .unwrap();
        event_loop
            .dispatch(Some(Duration::ZERO), &mut state)
            .unwrap();
        assert_eq!(state.mapped.len(), 1);

        source.remove(&handle);
        let _ = sender.send(MapperEvent::DeviceRemoved { device: touch });
        event_loop
            .dispatch(Some(Duration::ZERO), &mut state)
            .unwrap();
        assert_eq!(state.mapped.len(), 1);
        assert_eq!(state.mapper.devices().count(), 1);
    }
}
