// Dispose guard
//
// Contexts can be disposed explicitly (to surface errors and control
// ordering) and again from Drop; only the first call tears anything down.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{GraphicsError, Result};

const INITIALIZED: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

#[derive(Debug, Default)]
pub struct DisposeState {
    value: AtomicU8,
}

impl DisposeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the single caller that should run teardown.
    pub fn begin_dispose(&self) -> bool {
        self.value
            .compare_exchange(INITIALIZED, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_dispose(&self) {
        self.value.store(DISPOSED, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.value.load(Ordering::Acquire) != INITIALIZED
    }

    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(GraphicsError::Disposed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_dispose_wins() {
        let state = DisposeState::new();
        assert!(state.ensure_alive().is_ok());

        assert!(state.begin_dispose());
        assert!(!state.begin_dispose());
        state.end_dispose();
        assert!(!state.begin_dispose());
    }

    #[test]
    fn disposing_blocks_use() {
        let state = DisposeState::new();
        state.begin_dispose();
        assert!(matches!(state.ensure_alive(), Err(GraphicsError::Disposed)));
        state.end_dispose();
        assert!(state.is_disposed());
    }

    #[test]
    fn concurrent_dispose_runs_once() {
        let state = std::sync::Arc::new(DisposeState::new());
        let winners: usize = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.begin_dispose())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }
}
