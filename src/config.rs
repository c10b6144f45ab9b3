use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{
    MapperError, Result,
    candidates::MAX_SIZE_MATCH_DIFF,
    mapper::MapperOptions,
    monitor::DEFAULT_BUILTIN_CONNECTORS,
    solver::TieBreak,
};

const CONFIG_FILE_NAME: &str = "input-mapper.lua";

#[derive(Clone, Debug, PartialEq)]
pub struct MapperConfig {
    pub size_tolerance: f64,
    pub tie_break: TieBreak,
    pub builtin_connectors: Vec<String>,
    pub devices: Vec<DeviceRule>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            size_tolerance: MAX_SIZE_MATCH_DIFF,
            tie_break: TieBreak::Stable,
            builtin_connectors: DEFAULT_BUILTIN_CONNECTORS
                .iter()
                .map(|prefix| (*prefix).to_owned())
                .collect(),
            devices: Vec::new(),
        }
    }
}

impl MapperConfig {
    pub fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            size_tolerance: self.size_tolerance,
            tie_break: self.tie_break,
        }
    }

    /// First rule whose name matches `device_name`.
    pub fn rule_for(&self, device_name: &str) -> Option<&DeviceRule> {
        self.devices.iter().find(|rule| rule.matches(device_name))
    }
}

/// Per-device display preferences.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceRule {
    /// Case-insensitive substring of the device name.
    pub name: String,
    pub output: Option<EdidTriplet>,
    pub integration: Option<Integration>,
}

impl DeviceRule {
    pub fn matches(&self, device_name: &str) -> bool {
        device_name
            .to_ascii_lowercase()
            .contains(&self.name.to_ascii_lowercase())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdidTriplet {
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

/// How a tablet is built into the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integration {
    /// A standalone tablet without a screen.
    Standalone,
    /// Part of an external display, eg. a Cintiq.
    Display,
    /// Part of the computer itself, eg. a convertible laptop.
    System,
}

pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: MapperConfig,
}

pub fn load_or_create_default() -> Result<LoadedConfig> {
    let path = config_path()?;
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                MapperError::Config(format!(
                    "failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&path, default_config_template()).map_err(|err| {
            MapperError::Config(format!(
                "failed to write default config {}: {err}",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), "created default {CONFIG_FILE_NAME}");
    }

    let config = load_from_path(&path)?;
    Ok(LoadedConfig { path, config })
}

pub fn load_from_path(path: &Path) -> Result<MapperConfig> {
    if !path.exists() {
        return Err(MapperError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|err| {
        MapperError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;
    if content.trim().is_empty() {
        tracing::info!(path = %path.display(), "config is empty; using defaults");
        return Ok(MapperConfig::default());
    }

    let values = load_lua_values(path)?;
    parse_values(&values)
}

pub fn parse_values(values: &HashMap<String, String>) -> Result<MapperConfig> {
    let mut config = MapperConfig::default();

    config.size_tolerance = parse_f64(values, "size_tolerance", config.size_tolerance)?;
    if !(config.size_tolerance > 0.0 && config.size_tolerance < 1.0) {
        return Err(MapperError::Config(
            "size_tolerance must be between 0 and 1".to_owned(),
        ));
    }

    if let Some(raw) = values.get("tie_break") {
        config.tie_break = parse_tie_break(raw)?;
    }

    let builtin_connectors = collect_indexed_values(values, "builtin_connectors.")?;
    if !builtin_connectors.is_empty() {
        config.builtin_connectors = builtin_connectors
            .into_iter()
            .map(|prefix| prefix.trim().to_owned())
            .filter(|prefix| !prefix.is_empty())
            .collect();
    }

    config.devices = parse_device_rules(values)?;

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("raven").join(CONFIG_FILE_NAME));
    }

    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("raven")
            .join(CONFIG_FILE_NAME));
    }

    Err(MapperError::Config(
        "unable to resolve config path: HOME and XDG_CONFIG_HOME are unset".to_owned(),
    ))
}

fn load_lua_values(path: &Path) -> Result<HashMap<String, String>> {
    let output = Command::new("lua")
        .arg("-e")
        .arg(lua_loader_script())
        .env("RAVEN_INPUT_MAPPER_CONFIG", path)
        .output()
        .map_err(|err| MapperError::Config(format!("failed to execute lua: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let reason = if stderr.is_empty() {
            "lua exited with non-zero status".to_owned()
        } else {
            stderr
        };
        return Err(MapperError::Config(format!(
            "failed to load {}: {reason}",
            path.display()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_key_value_stdout(&stdout)
}

pub fn parse_key_value_stdout(stdout: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(MapperError::Config(format!("invalid lua output line: {line}")));
        };
        values.insert(key.to_owned(), value.to_owned());
    }
    Ok(values)
}

fn collect_indexed_values(values: &HashMap<String, String>, prefix: &str) -> Result<Vec<String>> {
    let mut indexed = Vec::<(usize, String)>::new();

    for (key, value) in values {
        let Some(index_str) = key.strip_prefix(prefix) else {
            continue;
        };

        let index = index_str.parse::<usize>().map_err(|err| {
            MapperError::Config(format!(
                "invalid indexed key `{key}`: index is not a number ({err})"
            ))
        })?;
        indexed.push((index, value.clone()));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}

fn parse_device_rules(values: &HashMap<String, String>) -> Result<Vec<DeviceRule>> {
    let mut grouped = BTreeMap::<usize, HashMap<String, String>>::new();

    for (key, value) in values {
        let Some(rest) = key.strip_prefix("device.") else {
            continue;
        };
        let Some((raw_index, field)) = rest.split_once('.') else {
            return Err(MapperError::Config(format!(
                "invalid device key `{key}`: expected format device.<index>.<field>"
            )));
        };
        if field.trim().is_empty() {
            return Err(MapperError::Config(format!(
                "invalid device key `{key}`: missing field"
            )));
        }
        let index = raw_index.parse::<usize>().map_err(|err| {
            MapperError::Config(format!(
                "invalid device key `{key}`: index is not a number ({err})"
            ))
        })?;
        grouped
            .entry(index)
            .or_default()
            .insert(field.trim().to_owned(), value.clone());
    }

    let mut rules = Vec::with_capacity(grouped.len());

    for (index, fields) in grouped {
        let name = fields
            .get("name")
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| {
                MapperError::Config(format!("missing `device.{index}.name` in device rule"))
            })?;

        let integration = fields
            .get("integration")
            .map(|raw| parse_integration(raw, &format!("device.{index}.integration")))
            .transpose()?;

        let output_values = collect_indexed_values(&fields, "output.")?;
        let output = parse_output(name, output_values);

        rules.push(DeviceRule {
            name: name.to_owned(),
            output,
            integration,
        });
    }

    Ok(rules)
}

/// An output pin is the exact `[vendor, product, serial]` of a monitor.
/// Anything else is ignored with a warning; three empty strings mean no pin.
fn parse_output(device: &str, values: Vec<String>) -> Option<EdidTriplet> {
    if values.is_empty() {
        return None;
    }

    let [vendor, product, serial]: [String; 3] = match values.try_into() {
        Ok(triplet) => triplet,
        Err(values) => {
            tracing::warn!(
                device,
                count = values.len(),
                "ignoring output setting: expected vendor, product and serial"
            );
            return None;
        }
    };

    if vendor.is_empty() && product.is_empty() && serial.is_empty() {
        return None;
    }

    Some(EdidTriplet {
        vendor,
        product,
        serial,
    })
}

fn parse_tie_break(raw: &str) -> Result<TieBreak> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "stable" => Ok(TieBreak::Stable),
        "newest_first" | "newest-first" => Ok(TieBreak::NewestFirst),
        _ => Err(MapperError::Config(format!(
            "invalid value for tie_break: {raw} (expected stable or newest_first)"
        ))),
    }
}

fn parse_integration(raw: &str, key: &str) -> Result<Integration> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "standalone" => Ok(Integration::Standalone),
        "display" => Ok(Integration::Display),
        "system" => Ok(Integration::System),
        _ => Err(MapperError::Config(format!(
            "invalid value for {key}: {raw} (expected none, display or system)"
        ))),
    }
}

fn parse_f64(values: &HashMap<String, String>, key: &str, default: f64) -> Result<f64> {
    match values.get(key) {
        Some(raw) => raw.trim().parse::<f64>().map_err(|err| {
            MapperError::Config(format!("invalid value for {key}: {raw} ({err})"))
        }),
        None => Ok(default),
    }
}

fn default_config_template() -> &'static str {
    r#"-- Raven input mapper config
-- File: ~/.config/raven/input-mapper.lua (or $XDG_CONFIG_HOME/raven/input-mapper.lua)
return {
  -- Largest relative difference per axis for a tablet and a monitor to be
  -- considered the same physical size.
  size_tolerance = 0.05,

  -- Order of devices with equally good matches: "stable" or "newest_first".
  tie_break = "stable",

  -- Connector name prefixes of the built-in panel.
  builtin_connectors = { "eDP", "LVDS", "DSI" },

  devices = {
    -- { name = "Wacom Cintiq 16 Pen", output = { "WAC", "Cintiq 16", "1234567" } },
    -- { name = "Wacom Intuos", integration = "none" },
    -- { name = "Wacom HID 5256 Pen", integration = "system" },
  },
}
"#
}

fn lua_loader_script() -> &'static str {
    r#"
local path = os.getenv("RAVEN_INPUT_MAPPER_CONFIG")
if type(path) ~= "string" or path == "" then
  io.stderr:write("RAVEN_INPUT_MAPPER_CONFIG is not set\n")
  os.exit(1)
end

local chunk, load_err = loadfile(path)
if not chunk then
  io.stderr:write(load_err .. "\n")
  os.exit(1)
end

local ok, result = pcall(chunk)
if not ok then
  io.stderr:write(result .. "\n")
  os.exit(1)
end

local cfg = nil
if type(result) == "table" then
  cfg = result
elseif type(_G.config) == "table" then
  cfg = _G.config
else
  cfg = {}
end

local function emit(key, value)
  io.write(key)
  io.write("=")
  io.write(tostring(value))
  io.write("\n")
end

local function expect_table(name, value)
  if value ~= nil and type(value) ~= "table" then
    io.stderr:write(name .. " must be a table\n")
    os.exit(1)
  end
end

local function emit_string(name, value)
  if value == nil then
    return
  end
  if type(value) ~= "string" then
    io.stderr:write(name .. " must be a string\n")
    os.exit(1)
  end
  emit(name, value)
end

local function emit_number(name, value)
  if value == nil then
    return
  end
  if type(value) ~= "number" then
    io.stderr:write(name .. " must be a number\n")
    os.exit(1)
  end
  emit(name, value)
end

local function pick(primary, fallback)
  if primary ~= nil then
    return primary
  end
  return fallback
end

emit_number("size_tolerance", pick(cfg.size_tolerance, _G.size_tolerance))
emit_string("tie_break", pick(cfg.tie_break, _G.tie_break))

local builtin_connectors = pick(cfg.builtin_connectors, _G.builtin_connectors)
expect_table("builtin_connectors", builtin_connectors)
if builtin_connectors then
  for index, prefix in ipairs(builtin_connectors) do
    emit_string("builtin_connectors." .. tostring(index), prefix)
  end
end

local devices = pick(cfg.devices, _G.devices)
expect_table("devices", devices)
if devices then
  for index, device in ipairs(devices) do
    local prefix = "device." .. tostring(index)
    if type(device) ~= "table" then
      io.stderr:write(prefix .. " must be a table\n")
      os.exit(1)
    end

    emit_string(prefix .. ".name", device.name)
    emit_string(prefix .. ".integration", device.integration)

    expect_table(prefix .. ".output", device.output)
    if device.output then
      for field_index, field in ipairs(device.output) do
        emit_string(prefix .. ".output." .. tostring(field_index), field)
      end
    end
  end
end
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(stdout: &str) -> Result<MapperConfig> {
        parse_values(&parse_key_value_stdout(stdout)?)
    }

    #[test]
    fn empty_output_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, MapperConfig::default());
        assert_eq!(config.builtin_connectors, vec!["eDP", "LVDS", "DSI"]);
        assert_eq!(config.mapper_options(), MapperOptions::default());
    }

    #[test]
    fn parses_device_rules() {
        let config = parse(
            "size_tolerance=0.08\n\
             tie_break=newest_first\n\
             builtin_connectors.2=DSI\n\
             builtin_connectors.1=eDP\n\
             device.2.name=Wacom Intuos\n\
             device.2.integration=none\n\
             device.1.name=Wacom Cintiq 16 Pen\n\
             device.1.output.1=WAC\n\
             device.1.output.2=Cintiq 16\n\
             device.1.output.3=1234567\n",
        )
        .unwrap();

        assert_eq!(config.size_tolerance, 0.08);
        assert_eq!(config.tie_break, TieBreak::NewestFirst);
        assert_eq!(config.builtin_connectors, vec!["eDP", "DSI"]);
        assert_eq!(
            config.devices,
            vec![
                DeviceRule {
                    name: "Wacom Cintiq 16 Pen".to_owned(),
                    output: Some(EdidTriplet {
                        vendor: "WAC".to_owned(),
                        product: "Cintiq 16".to_owned(),
                        serial: "1234567".to_owned(),
                    }),
                    integration: None,
                },
                DeviceRule {
                    name: "Wacom Intuos".to_owned(),
                    output: None,
                    integration: Some(Integration::Standalone),
                },
            ]
        );
        assert_eq!(
            config.rule_for("wacom intuos pen").map(|rule| rule.name.as_str()),
            Some("Wacom Intuos")
        );
        assert!(config.rule_for("ELAN Touchscreen").is_none());
    }

    #[test]
    fn malformed_output_pins_are_ignored() {
        let config = parse(
            "device.1.name=Pen\n\
             device.1.output.1=WAC\n\
             device.1.output.2=Cintiq 16\n\
             device.2.name=Eraser\n\
             device.2.output.1=\n\
             device.2.output.2=\n\
             device.2.output.3=\n",
        )
        .unwrap();

        assert_eq!(config.devices[0].output, None);
        assert_eq!(config.devices[1].output, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(parse("size_tolerance=1.5"), Err(MapperError::Config(_))));
        assert!(matches!(parse("size_tolerance=0"), Err(MapperError::Config(_))));
        assert!(matches!(parse("tie_break=random"), Err(MapperError::Config(_))));
        assert!(matches!(
            parse("device.1.integration=system"),
            Err(MapperError::Config(_))
        ));
        assert!(matches!(
            parse("device.1.name=Pen\ndevice.1.integration=builtin"),
            Err(MapperError::Config(_))
        ));
        assert!(matches!(parse("not a pair"), Err(MapperError::Config(_))));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "\n").unwrap();

        assert_eq!(load_from_path(&path).unwrap(), MapperConfig::default());
        assert!(load_from_path(&dir.path().join("missing.lua")).is_err());
    }
}
