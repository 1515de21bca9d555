//! Control-flow target redirection.
//!
//! Callers can override control-transfer targets (thunks, patched imports)
//! before the lifter consults type information. Redirection is resolved at
//! the single point of target resolution, so every category of control
//! transfer observes the same table.

/// Address redirection table.
///
/// Implementations must be idempotent:
/// `redirection(redirection(a)) == redirection(a)` for every address `a`.
/// The identity mapping is the default.
pub trait ControlFlowProvider {
    /// Returns the effective target for a transfer to `addr`.
    fn redirection(&self, addr: u64) -> u64;
}

/// The identity redirection: every address maps to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullControlFlowProvider;

impl ControlFlowProvider for NullControlFlowProvider {
    fn redirection(&self, addr: u64) -> u64 {
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_provider_is_identity() {
        let provider = NullControlFlowProvider;
        for addr in [0u64, 1, 0x1000, u64::MAX] {
            assert_eq!(provider.redirection(addr), addr);
        }
    }
}
