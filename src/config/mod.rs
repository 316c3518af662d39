// src/config/mod.rs

/// Construction from the installed application identity
pub mod builder;

/// Typed key/value stream format
pub mod bundle;

/// Signing certificates
pub mod certificate;

/// Caller-set build options
pub mod options;

/// Persisted schema and file helpers
pub mod persist;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use builder::{AppIdentity, Builder, IdentityError, StaticIdentity};
pub use bundle::{Bundle, BundleValue};
pub use certificate::Certificate;
pub use options::BuildOptions;
pub use persist::CONFIG_VERSION;

/// Configuration of a virtual machine instance.
///
/// Describes the software the VM runs (the owning application's code bundle
/// and the payload config inside it) and the few hardware knobs the caller
/// may set. Instances are immutable; every constructor path goes through
/// [`VirtualMachineConfig::new`], which enforces:
///
/// * `apk_path` and `payload_config_path` are non-empty
/// * `certificates` holds at least one non-empty certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachineConfig {
    /// Path to the installed code bundle of the owning application
    apk_path: String,

    /// Signing certificate history of the owning application
    certificates: Vec<Certificate>,

    /// Path within the code bundle to the payload config
    payload_config_path: String,

    /// Whether the VM exposes its debug surface
    debug_mode: bool,

    /// Requested RAM in MiB; zero or negative selects the manager default
    memory_mib: i32,
}

impl VirtualMachineConfig {
    /// Creates a configuration after checking its invariants
    pub fn new(
        apk_path: impl Into<String>,
        certificates: Vec<Certificate>,
        payload_config_path: impl Into<String>,
        debug_mode: bool,
        memory_mib: i32,
    ) -> Result<Self, ConfigError> {
        let apk_path = apk_path.into();
        let payload_config_path = payload_config_path.into();

        if apk_path.is_empty() {
            return Err(ConfigError::InvalidIdentity(
                "code bundle path is empty".to_string()
            ));
        }

        if certificates.is_empty() {
            return Err(ConfigError::InvalidIdentity(
                "signing certificate history is empty".to_string()
            ));
        }

        if certificates.iter().any(Certificate::is_empty) {
            return Err(ConfigError::InvalidIdentity(
                "signing certificate history contains an empty certificate".to_string()
            ));
        }

        if payload_config_path.is_empty() {
            return Err(ConfigError::MissingField(persist::KEY_PAYLOAD_CONFIG_PATH));
        }

        Ok(Self {
            apk_path,
            certificates,
            payload_config_path,
            debug_mode,
            memory_mib,
        })
    }

    /// Path to the code bundle this VM runs software from
    pub fn apk_path(&self) -> &str {
        &self.apk_path
    }

    /// Signing certificate history, in the order the identity resolver reported it
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Path to the payload config within the owning application
    pub fn payload_config_path(&self) -> &str {
        &self.payload_config_path
    }

    /// Whether the VM exposes its debug surface
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Requested RAM in MiB; zero or negative selects the manager default
    pub fn memory_mib(&self) -> i32 {
        self.memory_mib
    }

    /// Tests if this config may be used interchangeably with `other` for the
    /// same virtual machine.
    ///
    /// Only the signer and the debug mode matter. Certificate histories must
    /// be equal as ordered sequences. Memory size, payload config path and
    /// code bundle path may all differ.
    pub fn is_compatible_with(&self, other: &VirtualMachineConfig) -> bool {
        if self.certificates != other.certificates {
            debug!("Configs incompatible: signing certificates differ");
            return false;
        }

        if self.debug_mode != other.debug_mode {
            debug!(
                ours = self.debug_mode,
                theirs = other.debug_mode,
                "Configs incompatible: debug mode differs"
            );
            return false;
        }

        true
    }
}

/// Free-function form of [`VirtualMachineConfig::is_compatible_with`]
pub fn is_compatible(a: &VirtualMachineConfig, b: &VirtualMachineConfig) -> bool {
    a.is_compatible_with(b)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Stored schema is newer than this build understands
    #[error("Configuration version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the stream
        found: i32,
        /// Highest version this build reads
        supported: i32,
    },

    /// A required key is absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A key holds a value of the wrong type or form
    #[error("Malformed field {key}: {reason}")]
    MalformedField {
        /// Offending key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// Code path or signing certificate history violates the model invariants
    #[error("Invalid application identity: {0}")]
    InvalidIdentity(String),

    /// The code bundle could not be opened as a regular file
    #[error("Code bundle not found at {path}: {source}")]
    CodeBundleNotFound {
        /// Code bundle path
        path: String,
        /// Underlying open failure
        source: std::io::Error,
    },

    /// The stream header or encoding could not be decoded
    #[error("Corrupt configuration stream: {0}")]
    Corrupt(String),

    /// The options file could not be read
    #[error("Failed to read options file {path}: {error}")]
    OptionsReadError {
        /// Options file path
        path: String,
        /// Read failure
        error: String,
    },

    /// The options file is not valid YAML for [`BuildOptions`]
    #[error("Failed to parse options: {0}")]
    OptionsParseError(String),

    /// Stream read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
