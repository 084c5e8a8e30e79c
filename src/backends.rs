//! Backend registration and dispatch
//!
//! A backend provides the controller register block. The backend string is
//! either just a name (`dummy`) or a name followed by options
//! (`physmap:base=0xff0f0000`).

use qspiflash_core::{QspiFlash, RegisterIo, Tuning};

use crate::cli::parse_hex_u64;
use crate::error::CliError;

/// Flash handle over whichever backend was selected
pub type Flash = QspiFlash<Box<dyn RegisterIo>>;

/// Information about a backend
pub struct BackendInfo {
    /// Name used in the backend string
    pub name: &'static str,
    /// Short description including the accepted options
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory controller emulator (vendor=<name>,code=<id>,fifo=<depth>,image=<file>)",
    });

    #[cfg(feature = "physmap")]
    backends.push(BackendInfo {
        name: "physmap",
        description: "Register block mapped through /dev/mem (base=<addr>[,len=<size>]) - requires root",
    });

    backends
}

/// Split a backend string into its name and `key=value` options
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Open the backend described by `backend` and attach the flash driver to it
pub fn open_flash(backend: &str, tuning: Tuning) -> Result<Flash, CliError> {
    let (name, options) = parse_backend_string(backend);
    let io = open_registers(name, &options)?;

    let flash = QspiFlash::attach(io, tuning)?;
    log::info!(
        "attached {} flash, {} bytes, FIFO depth {}",
        flash.vendor(),
        flash.capacity(),
        flash.fifo_depth()
    );
    Ok(flash)
}

#[allow(unused_variables)]
fn open_registers(name: &str, options: &[(&str, &str)]) -> Result<Box<dyn RegisterIo>, CliError> {
    match name {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(options),
        #[cfg(feature = "physmap")]
        "physmap" => open_physmap(options),
        _ => Err(CliError::UnknownBackend {
            name: name.to_string(),
            available: crate::cli::backend_names().join(", "),
        }),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, CliError> {
    parse_hex_u64(value).map_err(|message| CliError::InvalidOption {
        key: key.to_string(),
        message,
    })
}

#[cfg(feature = "dummy")]
fn open_dummy(options: &[(&str, &str)]) -> Result<Box<dyn RegisterIo>, CliError> {
    use qspiflash_core::Vendor;
    use qspiflash_dummy::{DummyConfig, DummyQspi};

    let mut config = DummyConfig::default();
    let mut image = None;

    for &(key, value) in options {
        match key {
            "vendor" => {
                let vendor = Vendor::from_name(value).ok_or_else(|| CliError::InvalidOption {
                    key: key.to_string(),
                    message: format!("unknown vendor '{}'", value),
                })?;
                config.vendor_id = vendor.id();
            }
            "code" => {
                config.capacity_code =
                    u8::try_from(parse_number(key, value)?).map_err(|_| CliError::InvalidOption {
                        key: key.to_string(),
                        message: "capacity code must fit in one byte".to_string(),
                    })?;
            }
            "fifo" => {
                config.fifo_depth = parse_number(key, value)? as usize;
            }
            "image" => image = Some(value),
            _ => return Err(CliError::UnknownOption(key.to_string())),
        }
    }

    let mut dummy = DummyQspi::new(config);
    if let Some(path) = image {
        let data = std::fs::read(path)?;
        log::info!("loaded {} bytes into the emulated flash", data.len());
        dummy.load(0, 0, &data);
    }

    Ok(Box::new(dummy))
}

#[cfg(feature = "physmap")]
fn open_physmap(options: &[(&str, &str)]) -> Result<Box<dyn RegisterIo>, CliError> {
    use qspiflash_physmap::QspiRegisters;

    let mut base = None;
    let mut len = None;

    for &(key, value) in options {
        match key {
            "base" => base = Some(parse_number(key, value)?),
            "len" => len = Some(parse_number(key, value)? as usize),
            _ => return Err(CliError::UnknownOption(key.to_string())),
        }
    }

    let base = base.ok_or(CliError::MissingOption("base"))?;
    Ok(Box::new(QspiRegisters::open(base, len)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_string() {
        assert_eq!(parse_backend_string("dummy"), ("dummy", vec![]));
        assert_eq!(
            parse_backend_string("physmap:base=0x1000,len=0x80"),
            ("physmap", vec![("base", "0x1000"), ("len", "0x80")])
        );
    }

    #[test]
    fn test_unknown_backend() {
        let err = open_flash("ch341a", Tuning::default()).err();
        assert!(matches!(err, Some(CliError::UnknownBackend { .. })));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy_macronix() {
        let flash = open_flash("dummy:vendor=macronix,code=0x39,fifo=128", Tuning::default())
            .unwrap();
        assert_eq!(flash.vendor(), qspiflash_core::Vendor::Macronix);
        assert_eq!(flash.capacity(), 32 * 1024 * 1024);
        assert_eq!(flash.fifo_depth(), 128);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_rejects_bad_options() {
        let err = open_flash("dummy:vendor=winbond", Tuning::default()).err();
        assert!(matches!(err, Some(CliError::InvalidOption { .. })));

        let err = open_flash("dummy:code=0x1234", Tuning::default()).err();
        assert!(matches!(err, Some(CliError::InvalidOption { .. })));

        let err = open_flash("dummy:speed=10", Tuning::default()).err();
        assert!(matches!(err, Some(CliError::UnknownOption(_))));
    }

    #[cfg(feature = "physmap")]
    #[test]
    fn test_physmap_needs_base() {
        let err = open_flash("physmap:len=0x100", Tuning::default()).err();
        assert!(matches!(err, Some(CliError::MissingOption("base"))));
    }
}
