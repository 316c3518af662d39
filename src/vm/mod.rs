// Virtual machine manager boundary

/// Transport form handed to the VM manager
pub mod wire;

// Re-exports
pub use wire::VirtualMachineAppConfig;
