// Direct3D 12 backend (Windows only)
//
// DXGI factory/adapter/device, flip-model swap chain with RTVs, and the
// fence-paced D3D12Context on top.

pub mod context;
pub mod debug;
pub mod device;
pub mod swapchain;

pub use context::D3D12Context;
pub use device::D3D12Device;
