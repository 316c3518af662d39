// src/config/builder.rs

use thiserror::Error;
use tracing::{debug, error};

use super::certificate::Certificate;
use super::options::BuildOptions;
use super::{ConfigError, VirtualMachineConfig};

/// Errors raised by an identity resolver
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The package is not installed
    #[error("Package not found: {0}")]
    NotFound(String),
}

/// Resolves the installed identity of the calling application
#[cfg_attr(test, mockall::automock)]
pub trait AppIdentity {
    /// Name of the calling package
    fn package_name(&self) -> String;

    /// Path to the installed code bundle of the calling package
    fn package_code_path(&self) -> Result<String, IdentityError>;

    /// Signing certificate history of the calling package
    fn signing_certificate_history(&self) -> Result<Vec<Certificate>, IdentityError>;
}

/// An identity with fixed values
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    /// Package name
    pub package_name: String,

    /// Installed code bundle path
    pub code_path: String,

    /// Signing certificate history
    pub certificates: Vec<Certificate>,
}

impl AppIdentity for StaticIdentity {
    fn package_name(&self) -> String {
        self.package_name.clone()
    }

    fn package_code_path(&self) -> Result<String, IdentityError> {
        Ok(self.code_path.clone())
    }

    fn signing_certificate_history(&self) -> Result<Vec<Certificate>, IdentityError> {
        Ok(self.certificates.clone())
    }
}

/// Builds a [`VirtualMachineConfig`] for the calling application
pub struct Builder<'a, I: AppIdentity + ?Sized> {
    identity: &'a I,
    payload_config_path: String,
    debug_mode: bool,
    memory_mib: i32,
}

impl<'a, I: AppIdentity + ?Sized> Builder<'a, I> {
    /// Creates a builder for the given application and the payload config file in its code bundle
    pub fn new(identity: &'a I, payload_config_path: impl Into<String>) -> Self {
        Self {
            identity,
            payload_config_path: payload_config_path.into(),
            debug_mode: false,
            memory_mib: 0,
        }
    }

    /// Enables or disables the debug mode
    pub fn debug_mode(mut self, enable: bool) -> Self {
        self.debug_mode = enable;
        self
    }

    /// Sets the amount of RAM to give the VM. Zero or negative selects the default.
    pub fn memory_mib(mut self, memory_mib: i32) -> Self {
        self.memory_mib = memory_mib;
        self
    }

    /// Applies every option set in an options file
    pub fn with_options(mut self, options: &BuildOptions) -> Self {
        if let Some(path) = &options.payload_config_path {
            self.payload_config_path = path.clone();
        }
        self.debug_mode = options.debug_mode;
        self.memory_mib = options.memory_mib;
        self
    }

    /// Builds an immutable [`VirtualMachineConfig`].
    ///
    /// # Panics
    ///
    /// Panics if the identity resolver cannot find the calling package. The
    /// builder only ever asks about the caller's own installed package, so
    /// this is an environment failure rather than bad input.
    pub fn build(self) -> Result<VirtualMachineConfig, ConfigError> {
        let (apk_path, certificates) = match self.resolve_identity() {
            Ok(identity) => identity,
            Err(e) => {
                error!("Failed to resolve own package identity: {}", e);
                panic!("cannot resolve identity of the calling package: {}", e);
            }
        };

        debug!(
            package = %self.identity.package_name(),
            certificates = certificates.len(),
            debug_mode = self.debug_mode,
            memory_mib = self.memory_mib,
            "Building VM configuration"
        );

        VirtualMachineConfig::new(
            apk_path,
            certificates,
            self.payload_config_path,
            self.debug_mode,
            self.memory_mib,
        )
    }

    fn resolve_identity(&self) -> Result<(String, Vec<Certificate>), IdentityError> {
        let apk_path = self.identity.package_code_path()?;
        let certificates = self.identity.signing_certificate_history()?;
        Ok((apk_path, certificates))
    }
}
