use std::hash::Hash;

use bitflags::bitflags;

bitflags! {
    /// Capability classes that compete for a logical monitor. At most one
    /// device per class may be bound to the same logical monitor.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InputCapabilities: u32 {
        /// Touchscreens and touch-capable tablets.
        const TOUCH = 1 << 0;
        /// Tablet pens.
        const STYLUS = 1 << 1;
        const ERASER = 1 << 2;
        /// Tablet pads (button/ring/strip clusters).
        const PAD = 1 << 3;
        /// Pointer-like tablet tools such as pucks and lenses.
        const CURSOR = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Pointer,
    Keyboard,
    Touchpad,
    Touchscreen,
    Tablet,
    Pen,
    Eraser,
    Cursor,
    Pad,
    Other,
}

impl DeviceType {
    pub fn capabilities(self) -> InputCapabilities {
        match self {
            DeviceType::Touchscreen => InputCapabilities::TOUCH,
            DeviceType::Tablet | DeviceType::Pen => InputCapabilities::STYLUS,
            DeviceType::Eraser => InputCapabilities::ERASER,
            DeviceType::Cursor => InputCapabilities::CURSOR,
            DeviceType::Pad => InputCapabilities::PAD,
            DeviceType::Pointer
            | DeviceType::Keyboard
            | DeviceType::Touchpad
            | DeviceType::Other => InputCapabilities::empty(),
        }
    }

    /// Whether devices of this type get an absolute display mapping at all.
    pub fn is_display_mapped(self) -> bool {
        matches!(
            self,
            DeviceType::Tablet | DeviceType::Pen | DeviceType::Eraser | DeviceType::Touchscreen
        )
    }
}

/// An input device as seen by the mapper.
///
/// Implementors are cheap handles (libinput devices are refcounted); the
/// mapper clones them into its tables and compares them by identity.
pub trait MappedDevice: Clone + Eq + Hash {
    fn device_type(&self) -> DeviceType;

    /// Human readable name, matched against monitor EDID strings.
    fn name(&self) -> String;

    /// Physical width and height in millimetres, when the platform knows it.
    fn physical_size(&self) -> Option<(f64, f64)>;

    fn capabilities(&self) -> InputCapabilities {
        self.device_type().capabilities()
    }
}

/// Plain device description for callers without a backend device handle.
/// Identity is the `id` alone.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub id: u64,
    pub name: String,
    pub device_type: DeviceType,
    pub size_mm: Option<(f64, f64)>,
}

impl DeviceInfo {
    pub fn new(id: u64, name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id,
            name: name.into(),
            device_type,
            size_mm: None,
        }
    }

    pub fn with_size(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.size_mm = Some((width_mm, height_mm));
        self
    }
}

impl PartialEq for DeviceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceInfo {}

impl Hash for DeviceInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl MappedDevice for DeviceInfo {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn physical_size(&self) -> Option<(f64, f64)> {
        self.size_mm
    }
}
