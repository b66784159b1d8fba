//! Graphics device, swap chain and frame-loop providers for Direct3D 12 and
//! Vulkan, presenting to Win32 or Xlib windows.
//!
//! ```text
//! create_context(backend, window, desc)
//!   └── GraphicsContext
//!         begin_frame(clear) -> end_frame() -> present_frame()
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod window;

pub use backend::{create_context, BackendKind, ContextDesc, FrameStatus, GraphicsContext};
pub use error::{GraphicsError, Result};
pub use window::NativeWindow;
