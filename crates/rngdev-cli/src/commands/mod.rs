pub mod probe;
pub mod read;
pub mod serve;

use rngdev_core::{DeviceConfig, ReadContract};

/// Build the device config: file (if any) first, then CLI overrides.
pub fn load_config(path: Option<&str>, legacy_zero: bool) -> DeviceConfig {
    let mut config = match path {
        Some(p) => match DeviceConfig::from_json_file(std::path::Path::new(p)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {p}: {e}");
                std::process::exit(1);
            }
        },
        None => DeviceConfig::default(),
    };
    if legacy_zero {
        config.read_contract = ReadContract::LegacyZero;
    }
    config
}

/// Render bytes as lowercase hex.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
