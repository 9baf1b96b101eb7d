use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::RoutingError;

/// Cooperative cancellation token passed to every distance/geocoding entry
/// point (spec.md §5, §9). Cheaply cloned; firing is visible to every clone.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(RoutingError::Cancelled)` if cancellation has fired;
    /// intended to be called at the top of each phase/iteration loop.
    pub fn check(&self) -> Result<(), RoutingError> {
        if self.is_cancelled() {
            Err(RoutingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(RoutingError::Cancelled)));
    }
}
