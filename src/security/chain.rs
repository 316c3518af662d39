// src/security/chain.rs

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::VirtualMachineConfig;

/// Validates a byte-encoded DICE certificate chain.
///
/// Implementations wrap the native validator. `allow_any_mode` accepts
/// certificates in any DICE mode (debug, maintenance) instead of only the
/// normal mode.
#[cfg_attr(test, mockall::automock)]
pub trait ChainValidator: Send + Sync {
    /// Returns whether `chain` is a valid DICE chain
    fn validate_chain(&self, chain: &[u8], allow_any_mode: bool) -> bool;
}

impl<F> ChainValidator for F
where
    F: Fn(&[u8], bool) -> bool + Send + Sync,
{
    fn validate_chain(&self, chain: &[u8], allow_any_mode: bool) -> bool {
        self(chain, allow_any_mode)
    }
}

/// Verifies the DICE chain of a VM against the configuration it was started with.
///
/// Build one at process start with the bound validator and hand clones to
/// whatever needs it.
#[derive(Clone)]
pub struct DiceChainVerifier {
    validator: Arc<dyn ChainValidator>,
}

impl DiceChainVerifier {
    /// Creates a verifier around an initialized validator
    pub fn new(validator: Arc<dyn ChainValidator>) -> Self {
        Self { validator }
    }

    /// Checks `chain` for a VM running with `config`.
    ///
    /// A debuggable VM reports non-normal DICE modes, so any mode is accepted
    /// exactly when the config enables debug mode.
    pub fn verify(&self, config: &VirtualMachineConfig, chain: &[u8]) -> bool {
        if chain.is_empty() {
            warn!("Rejecting empty DICE chain");
            return false;
        }

        let allow_any_mode = config.debug_mode();
        let valid = self.validator.validate_chain(chain, allow_any_mode);

        debug!(
            chain_len = chain.len(),
            allow_any_mode,
            valid,
            "DICE chain validated"
        );

        valid
    }
}

impl std::fmt::Debug for DiceChainVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiceChainVerifier").finish_non_exhaustive()
    }
}
