// src/vm/wire.rs

use std::fs::File;
use std::io;
use tracing::{debug, warn};

use crate::config::{ConfigError, VirtualMachineConfig};

/// Transport form of a configuration handed to the VM manager.
///
/// The code bundle is passed as an open read-only handle rather than as a
/// path. The manager runs with different privileges and must not open
/// caller-named paths on the caller's behalf.
#[derive(Debug)]
pub struct VirtualMachineAppConfig {
    /// Read-only handle to the code bundle
    pub apk: File,

    /// Path within the code bundle to the payload config
    pub config_path: String,

    /// Whether the VM exposes its debug surface
    pub debug: bool,

    /// Requested RAM in MiB; zero or negative selects the manager default
    pub memory_mib: i32,
}

impl VirtualMachineConfig {
    /// Converts this config into the form consumed by the VM manager,
    /// opening the code bundle read-only.
    pub fn to_wire(&self) -> Result<VirtualMachineAppConfig, ConfigError> {
        let not_found = |source: io::Error| ConfigError::CodeBundleNotFound {
            path: self.apk_path().to_string(),
            source,
        };

        let apk = File::open(self.apk_path()).map_err(|e| {
            warn!("Cannot open code bundle {}: {}", self.apk_path(), e);
            not_found(e)
        })?;

        let metadata = apk.metadata().map_err(not_found)?;
        if !metadata.is_file() {
            warn!("Code bundle {} is not a regular file", self.apk_path());
            return Err(not_found(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        debug!(
            payload = self.payload_config_path(),
            debug = self.debug_mode(),
            memory_mib = self.memory_mib(),
            "Projected configuration to wire form"
        );

        Ok(VirtualMachineAppConfig {
            apk,
            config_path: self.payload_config_path().to_string(),
            debug: self.debug_mode(),
            memory_mib: self.memory_mib(),
        })
    }
}
