// Security subsystem

/// DICE chain validation
pub mod chain;

// Re-exports
pub use chain::{ChainValidator, DiceChainVerifier};
