pub mod drm;
pub mod libinput;
pub mod output;
pub mod sysfs;
