use std::{backtrace::Backtrace, fs, path::PathBuf};

use anyhow::{Context, bail};
use raven_input_mapper::{
    InputSettings, MappedDevice, MapperError, Monitor, MonitorLayout, Result,
    backend::{drm, libinput, sysfs::{DEFAULT_DRM_ROOT, SysfsMonitors}},
    config,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = concat!(
    "raven_input_mapper=info,",
    "raven_input_mapper::backend=debug,",
    "smithay=warn"
);

struct Args {
    config: Option<PathBuf>,
    seat: String,
    sysfs_root: PathBuf,
    use_drm: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args {
            config: None,
            seat: "seat0".to_owned(),
            sysfs_root: PathBuf::from(DEFAULT_DRM_ROOT),
            use_drm: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--drm" => parsed.use_drm = true,
                "--config" => parsed.config = Some(next_value(&mut args, &arg)?.into()),
                "--seat" => parsed.seat = next_value(&mut args, &arg)?,
                "--sysfs-root" => parsed.sysfs_root = next_value(&mut args, &arg)?.into(),
                other => bail!("unknown argument `{other}`"),
            }
        }

        Ok(parsed)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next()
        .with_context(|| format!("`{flag}` expects a value"))
}

fn main() -> anyhow::Result<()> {
    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    let args = Args::parse(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let loaded = config::load_or_create_default().context("failed to load config")?;
            tracing::info!(path = %loaded.path.display(), "config loaded");
            loaded.config
        }
    };

    let monitors = if args.use_drm {
        scan_drm_cards(&config.builtin_connectors).context("failed to scan DRM devices")?
    } else {
        SysfsMonitors::new(&args.sysfs_root, config.builtin_connectors.clone())
            .scan()
            .context("failed to scan connectors")?
    };
    let layout = MonitorLayout::new(monitors);

    let probe = libinput::probe_devices(&args.seat)
        .with_context(|| format!("failed to enumerate input devices on {}", args.seat))?;

    let mut settings = InputSettings::new(layout, config);
    for device in probe.devices {
        for handle in libinput::seat_devices(device) {
            settings.device_added(handle);
        }
    }

    print!("{}", render_report(&settings));
    Ok(())
}

fn scan_drm_cards(builtin_connectors: &[String]) -> Result<Vec<Monitor>> {
    let entries = fs::read_dir("/dev/dri")
        .map_err(|err| MapperError::Backend(format!("failed to scan /dev/dri: {err}")))?;

    let mut cards: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("card"))
        })
        .collect();
    cards.sort();

    let mut monitors = Vec::new();
    for card in cards {
        match drm::scan_card(&card, monitors.len() as u32, builtin_connectors) {
            Ok(found) => monitors.extend(found),
            Err(err) => tracing::warn!(card = %card.display(), "{err}"),
        }
    }
    Ok(monitors)
}

fn render_report<D: MappedDevice>(settings: &InputSettings<D>) -> String {
    let mut report = String::from("monitors:\n");
    let layout = settings.mapper().layout();
    if layout.monitors().is_empty() {
        report.push_str("  (none)\n");
    }
    for monitor in layout.monitors() {
        let logical = monitor
            .logical_monitor
            .map(|lm| lm.to_string())
            .unwrap_or_else(|| "disabled".to_owned());
        report.push_str(&format!(
            "  {} {} vendor={:?} product={:?} serial={:?} {}x{}mm {}{}\n",
            monitor.id,
            monitor.connector,
            monitor.vendor,
            monitor.product,
            monitor.serial,
            monitor.width_mm,
            monitor.height_mm,
            logical,
            if monitor.is_builtin { " builtin" } else { "" },
        ));
    }

    report.push_str("devices:\n");
    let mut any_device = false;
    for (device, logical_monitor, monitor) in settings.bindings() {
        any_device = true;
        let target = match (logical_monitor, monitor) {
            (Some(logical_monitor), Some(monitor)) => {
                format!("{logical_monitor} via {}", monitor.connector)
            }
            _ => "unmapped".to_owned(),
        };
        report.push_str(&format!(
            "  {} ({:?}) -> {target}\n",
            device.name(),
            device.device_type()
        ));
    }
    if !any_device {
        report.push_str("  (none)\n");
    }

    if let Some(touchscreen) = settings.builtin_touchscreen() {
        report.push_str(&format!("builtin touchscreen: {}\n", touchscreen.name()));
    }

    report
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "0") };
    }
}

fn init_logging() -> Result<()> {
    let log_dir: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("log");
    fs::create_dir_all(&log_dir).map_err(|err| {
        MapperError::Backend(format!(
            "failed to create log directory {}: {err}",
            log_dir.display()
        ))
    })?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "raven-input-mapper.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    let log_file = log_dir.join("raven-input-mapper.log");
    tracing::info!(path = %log_file.display(), "logging initialized");

    Ok(())
}
