// vmconfig - Virtual machine configuration
//
// Licensed under the GNU General Public License v3.0

//! Configuration of a virtual machine instance: the immutable model, its
//! versioned on-disk format, the compatibility test used to decide whether a
//! VM instance may be reused across application updates, and the projection
//! handed to the VM manager.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Configuration subsystem
pub mod config;

/// VM manager boundary
pub mod vm;

/// Security subsystem
pub mod security;

// Re-export common types
pub use config::{ConfigError, VirtualMachineConfig};
pub use security::DiceChainVerifier;
pub use vm::VirtualMachineAppConfig;
