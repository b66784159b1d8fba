// Present modes
//
// One user-facing setting mapped onto each API's presentation controls.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    /// No vsync, lowest latency, may tear
    Immediate,
    /// No vsync, no tearing, triple buffered
    Mailbox,
    /// Vsync, always available
    #[default]
    Fifo,
    /// Vsync, tears when a frame is late
    FifoRelaxed,
}

/// How a present mode maps onto `IDXGISwapChain::Present`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DxgiPresent {
    pub sync_interval: u32,
    pub allow_tearing: bool,
}

impl PresentMode {
    /// Modes to try in order on Vulkan. FIFO must be supported, so it
    /// terminates the list and nothing is tried after it.
    pub fn fallback_chain(self) -> Vec<PresentMode> {
        if self == PresentMode::Fifo {
            return vec![PresentMode::Fifo];
        }
        let mut chain = vec![self];
        for mode in [PresentMode::Mailbox, PresentMode::Immediate] {
            if mode != self {
                chain.push(mode);
            }
        }
        chain.push(PresentMode::Fifo);
        chain
    }

    /// DXGI has no mailbox or relaxed FIFO; flip-model swap chains get the
    /// closest equivalent. Tearing needs DXGI 1.5 support.
    pub fn dxgi(self, tearing_supported: bool) -> DxgiPresent {
        match self {
            PresentMode::Immediate => DxgiPresent {
                sync_interval: 0,
                allow_tearing: tearing_supported,
            },
            PresentMode::Mailbox => DxgiPresent {
                sync_interval: 0,
                allow_tearing: false,
            },
            PresentMode::Fifo | PresentMode::FifoRelaxed => DxgiPresent {
                sync_interval: 1,
                allow_tearing: false,
            },
        }
    }

    pub fn to_vulkan(self) -> ash::vk::PresentModeKHR {
        use ash::vk::PresentModeKHR;
        match self {
            PresentMode::Immediate => PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => PresentModeKHR::MAILBOX,
            PresentMode::Fifo => PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => PresentModeKHR::FIFO_RELAXED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_always_ends_in_fifo() {
        assert_eq!(
            PresentMode::Immediate.fallback_chain(),
            vec![PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo]
        );
        assert_eq!(
            PresentMode::FifoRelaxed.fallback_chain(),
            vec![
                PresentMode::FifoRelaxed,
                PresentMode::Mailbox,
                PresentMode::Immediate,
                PresentMode::Fifo
            ]
        );
        assert_eq!(
            PresentMode::Mailbox.fallback_chain(),
            vec![PresentMode::Mailbox, PresentMode::Immediate, PresentMode::Fifo]
        );
    }

    #[test]
    fn fifo_needs_no_fallback() {
        assert_eq!(PresentMode::Fifo.fallback_chain(), vec![PresentMode::Fifo]);
    }

    #[test]
    fn immediate_only_tears_when_supported() {
        assert_eq!(
            PresentMode::Immediate.dxgi(true),
            DxgiPresent { sync_interval: 0, allow_tearing: true }
        );
        assert_eq!(
            PresentMode::Immediate.dxgi(false),
            DxgiPresent { sync_interval: 0, allow_tearing: false }
        );
        assert_eq!(PresentMode::Fifo.dxgi(true).sync_interval, 1);
        assert!(!PresentMode::Mailbox.dxgi(true).allow_tearing);
    }
}
