// Backend module - graphics providers
//
// Each backend stands up instance/factory -> adapter -> device -> queue ->
// swap chain -> per-frame sync objects, and drives the
// begin_frame / end_frame / present_frame protocol on top of them.

pub mod adapter;
pub mod frame;
pub mod present;
pub mod state;
pub mod vulkan;

#[cfg(windows)]
pub mod d3d12;

use glam::Vec4;
use serde::Deserialize;

use crate::error::{GraphicsError, Result};
use crate::window::NativeWindow;

pub use adapter::{AdapterInfo, AdapterKind, PowerPreference};
pub use frame::FramePhase;
pub use present::PresentMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Direct3D 12 on Windows, Vulkan elsewhere
    #[default]
    Auto,
    Vulkan,
    #[serde(rename = "direct3d12", alias = "d3d12")]
    Direct3D12,
}

impl BackendKind {
    /// Resolve `Auto` and reject backends this build cannot provide.
    pub fn resolve(self) -> Result<BackendKind> {
        match self {
            BackendKind::Auto if cfg!(windows) => Ok(BackendKind::Direct3D12),
            BackendKind::Auto => Ok(BackendKind::Vulkan),
            BackendKind::Direct3D12 if !cfg!(windows) => {
                Err(GraphicsError::UnsupportedBackend(BackendKind::Direct3D12))
            }
            kind => Ok(kind),
        }
    }
}

/// Result of `begin_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame is open; `end_frame` and `present_frame` must follow.
    Ready,
    /// Nothing to render this time (minimized, or the swap chain was
    /// rebuilt). No frame is open.
    Skipped,
}

/// Everything a backend needs to create its context.
#[derive(Debug, Clone)]
pub struct ContextDesc {
    pub app_name: String,
    pub width: u32,
    pub height: u32,
    pub present_mode: PresentMode,
    pub frames_in_flight: usize,
    pub validation: bool,
    pub power_preference: PowerPreference,
    pub adapter_filter: Option<String>,
}

impl Default for ContextDesc {
    fn default() -> Self {
        Self {
            app_name: "Graphics Provider".to_string(),
            width: 1280,
            height: 720,
            present_mode: PresentMode::Fifo,
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            power_preference: PowerPreference::HighPerformance,
            adapter_filter: None,
        }
    }
}

/// A device plus swap chain bound to one window.
pub trait GraphicsContext {
    fn backend(&self) -> BackendKind;

    fn adapter(&self) -> &AdapterInfo;

    /// Swap chain buffer the current frame renders into.
    fn frame_index(&self) -> usize;

    /// Frames presented so far.
    fn frame_count(&self) -> u64;

    /// Wait for the frame's resources, open its command list and clear the
    /// back buffer to `clear_color`.
    fn begin_frame(&mut self, clear_color: Vec4) -> Result<FrameStatus>;

    /// Transition the back buffer for presentation and submit.
    fn end_frame(&mut self) -> Result<()>;

    fn present_frame(&mut self) -> Result<()>;

    /// Record a new window size; buffers are rebuilt before the next frame.
    fn resize(&mut self, width: u32, height: u32);

    fn wait_idle(&mut self) -> Result<()>;

    /// Release every native object, children first. Safe to call twice.
    fn dispose(&mut self) -> Result<()>;
}

/// Create the context for `kind` on `window`.
pub fn create_context(
    kind: BackendKind,
    window: &NativeWindow,
    desc: &ContextDesc,
) -> Result<Box<dyn GraphicsContext>> {
    let kind = kind.resolve()?;
    log::info!("Creating {:?} context for {}", kind, desc.app_name);

    match kind {
        BackendKind::Vulkan => Ok(Box::new(vulkan::VulkanContext::new(window, desc)?)),
        #[cfg(windows)]
        BackendKind::Direct3D12 => Ok(Box::new(d3d12::D3D12Context::new(window, desc)?)),
        other => Err(GraphicsError::UnsupportedBackend(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_per_platform() {
        let expected = if cfg!(windows) {
            BackendKind::Direct3D12
        } else {
            BackendKind::Vulkan
        };
        assert_eq!(BackendKind::Auto.resolve().unwrap(), expected);
        assert_eq!(BackendKind::Vulkan.resolve().unwrap(), BackendKind::Vulkan);
    }

    #[cfg(not(windows))]
    #[test]
    fn direct3d12_rejected_off_windows() {
        assert!(matches!(
            BackendKind::Direct3D12.resolve(),
            Err(GraphicsError::UnsupportedBackend(BackendKind::Direct3D12))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn create_context_rejects_d3d12_before_touching_window() {
        let window = NativeWindow::Xlib {
            display: std::ptr::null_mut(),
            window: 1,
        };
        let result = create_context(BackendKind::Direct3D12, &window, &ContextDesc::default());
        assert!(matches!(result, Err(GraphicsError::UnsupportedBackend(_))));
    }
}
