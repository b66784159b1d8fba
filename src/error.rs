// Error types for the graphics providers
//
// Native status codes (VkResult, HRESULT) are passed through untouched,
// tagged with the name of the call that produced them.

use ash::vk;
use thiserror::Error;

use crate::backend::frame::FramePhase;
use crate::backend::BackendKind;

pub type Result<T, E = GraphicsError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("{call} failed: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[cfg(windows)]
    #[error("{call} failed: {source}")]
    Direct3D {
        call: &'static str,
        #[source]
        source: windows::core::Error,
    },

    #[error("Failed to load Vulkan library: {0}")]
    Loader(String),

    #[error("No suitable graphics adapter found")]
    NoSuitableAdapter,

    #[error("Backend {0:?} is not supported on this platform")]
    UnsupportedBackend(BackendKind),

    #[error("Unsupported window handle: {0}")]
    UnsupportedWindow(String),

    #[error("{operation} called while frame is {actual:?} (expected {expected:?})")]
    FrameOrder {
        operation: &'static str,
        expected: FramePhase,
        actual: FramePhase,
    },

    #[error("Graphics object used after dispose")]
    Disposed,
}

impl GraphicsError {
    /// True when a swapchain has to be rebuilt before the next frame.
    pub fn is_out_of_date(&self) -> bool {
        matches!(
            self,
            GraphicsError::Vulkan {
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
                ..
            }
        )
    }
}

/// Turns a raw `VkResult` into a `GraphicsError` carrying the call name.
pub trait VkResultExt<T> {
    fn check(self, call: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn check(self, call: &'static str) -> Result<T> {
        self.map_err(|result| GraphicsError::Vulkan { call, result })
    }
}

/// Same as [`VkResultExt`] for COM `HRESULT`-backed results.
#[cfg(windows)]
pub trait HResultExt<T> {
    fn check(self, call: &'static str) -> Result<T>;
}

#[cfg(windows)]
impl<T> HResultExt<T> for windows::core::Result<T> {
    fn check(self, call: &'static str) -> Result<T> {
        self.map_err(|source| GraphicsError::Direct3D { call, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_tags_call_name() {
        let failed: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = failed.check("vkQueueSubmit").unwrap_err();
        assert_eq!(err.to_string(), "vkQueueSubmit failed: ERROR_DEVICE_LOST");
        assert!(!err.is_out_of_date());
    }

    #[test]
    fn out_of_date_is_detected() {
        let failed: std::result::Result<u32, vk::Result> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(failed.check("vkAcquireNextImageKHR").unwrap_err().is_out_of_date());
    }

    #[test]
    fn success_passes_through() {
        let ok: std::result::Result<u32, vk::Result> = Ok(7);
        assert_eq!(ok.check("vkAcquireNextImageKHR").unwrap(), 7);
    }
}
