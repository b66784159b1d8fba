// D3D12 graphics context
//
// FRAME FLOW:
// 1. Ask the swap chain for the current back buffer
// 2. Wait until the fence passes the value recorded for that buffer
// 3. Reset its allocator + the command list, PRESENT -> RENDER_TARGET, clear
// 4. end_frame: RENDER_TARGET -> PRESENT, close, execute
// 5. present_frame: Present, signal fence, record value for the buffer

use glam::Vec4;
use std::mem::ManuallyDrop;

use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, WAIT_EVENT, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D12::{
    ID3D12CommandAllocator, ID3D12CommandList, ID3D12Fence, ID3D12GraphicsCommandList,
    ID3D12PipelineState, ID3D12Resource, D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_FENCE_FLAG_NONE,
    D3D12_RESOURCE_BARRIER, D3D12_RESOURCE_BARRIER_0, D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
    D3D12_RESOURCE_BARRIER_FLAG_NONE, D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
    D3D12_RESOURCE_STATES, D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET,
    D3D12_RESOURCE_TRANSITION_BARRIER,
};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use super::debug::InfoQueue;
use super::device::D3D12Device;
use super::swapchain::D3D12Swapchain;
use crate::backend::frame::{self, FenceSchedule, FrameLifecycle};
use crate::backend::state::DisposeState;
use crate::backend::{AdapterInfo, BackendKind, ContextDesc, FrameStatus, GraphicsContext};
use crate::error::{GraphicsError, HResultExt, Result};
use crate::window::NativeWindow;

/// Fence, its Win32 wait event and the values signalled on it
struct FrameFence {
    fence: ID3D12Fence,
    event: HANDLE,
    schedule: FenceSchedule,
}

impl FrameFence {
    fn new(device: &D3D12Device, buffer_count: usize) -> Result<Self> {
        let fence: ID3D12Fence =
            unsafe { device.device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }.check("CreateFence")?;
        let event = unsafe { CreateEventW(None, false, false, None) }.check("CreateEventW")?;
        Ok(Self {
            fence,
            event,
            schedule: FenceSchedule::new(buffer_count),
        })
    }

    fn wait_for(&self, value: u64) -> Result<()> {
        if unsafe { self.fence.GetCompletedValue() } >= value {
            return Ok(());
        }
        unsafe {
            self.fence
                .SetEventOnCompletion(value, self.event)
                .check("ID3D12Fence::SetEventOnCompletion")?;
            check_wait(WaitForSingleObject(self.event, INFINITE)).check("WaitForSingleObject")
        }
    }

    /// Block until the back buffer's previous frame has left the GPU.
    fn wait_for_buffer(&self, buffer: usize) -> Result<()> {
        let completed = unsafe { self.fence.GetCompletedValue() };
        match self.schedule.wait_target(buffer, completed) {
            Some(value) => self.wait_for(value),
            None => Ok(()),
        }
    }

    /// Signal a fresh value on the queue and wait for it.
    fn flush(&mut self, device: &D3D12Device) -> Result<()> {
        let value = self.schedule.next_signal();
        unsafe { device.queue.Signal(&self.fence, value) }.check("ID3D12CommandQueue::Signal")?;
        self.wait_for(value)
    }
}

impl Drop for FrameFence {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.event) } {
            log::warn!("CloseHandle failed for fence event: {}", e);
        }
    }
}

/// Anything but a signalled event means the fence may not have passed.
fn check_wait(status: WAIT_EVENT) -> windows::core::Result<()> {
    if status == WAIT_OBJECT_0 {
        Ok(())
    } else {
        Err(windows::core::Error::from_win32())
    }
}

/// Direct3D 12 device and flip-model swap chain bound to one HWND.
pub struct D3D12Context {
    frames: FrameLifecycle,
    current_buffer: usize,

    info_queue: Option<InfoQueue>,
    fence: Option<FrameFence>,
    command_list: Option<ID3D12GraphicsCommandList>,
    allocators: Vec<ID3D12CommandAllocator>,
    swapchain: Option<D3D12Swapchain>,
    device: Option<D3D12Device>,

    adapter: AdapterInfo,
    width: u32,
    height: u32,
    needs_resize: bool,
    state: DisposeState,
}

impl D3D12Context {
    pub fn new(window: &NativeWindow, desc: &ContextDesc) -> Result<Self> {
        log::info!("Initializing Direct3D 12...");

        let NativeWindow::Win32 { hwnd, .. } = *window else {
            return Err(GraphicsError::UnsupportedWindow(
                "Direct3D 12 needs a Win32 window".to_string(),
            ));
        };

        let device = D3D12Device::new(desc)?;
        // Flip-model swap chains need at least two buffers
        let buffer_count = desc.frames_in_flight.clamp(2, 3);
        let present = desc.present_mode.dxgi(device.tearing_supported);

        let swapchain = D3D12Swapchain::new(
            &device,
            HWND(hwnd as *mut _),
            desc.width.max(1),
            desc.height.max(1),
            buffer_count as u32,
            present,
        )?;

        let allocators = (0..buffer_count)
            .map(|_| unsafe {
                device
                    .device
                    .CreateCommandAllocator::<ID3D12CommandAllocator>(D3D12_COMMAND_LIST_TYPE_DIRECT)
            }
            .check("CreateCommandAllocator"))
            .collect::<Result<Vec<_>>>()?;

        let command_list: ID3D12GraphicsCommandList = unsafe {
            device.device.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                &allocators[0],
                None::<&ID3D12PipelineState>,
            )
        }
        .check("CreateCommandList")?;
        // Lists are created open; begin_frame expects them closed
        unsafe { command_list.Close() }.check("ID3D12GraphicsCommandList::Close")?;

        let fence = FrameFence::new(&device, buffer_count)?;
        let info_queue = if device.debug_layer {
            InfoQueue::new(&device.device)
        } else {
            None
        };

        log::info!("Direct3D 12 initialized successfully!");
        Ok(Self {
            frames: FrameLifecycle::new(buffer_count),
            current_buffer: swapchain.current_index(),
            info_queue,
            fence: Some(fence),
            command_list: Some(command_list),
            allocators,
            swapchain: Some(swapchain),
            adapter: device.adapter_info.clone(),
            device: Some(device),
            width: desc.width,
            height: desc.height,
            needs_resize: false,
            state: DisposeState::new(),
        })
    }

    fn parts(
        &self,
    ) -> Result<(&D3D12Device, &D3D12Swapchain, &ID3D12GraphicsCommandList, &FrameFence)> {
        match (&self.device, &self.swapchain, &self.command_list, &self.fence) {
            (Some(device), Some(swapchain), Some(list), Some(fence)) => {
                Ok((device, swapchain, list, fence))
            }
            _ => Err(GraphicsError::Disposed),
        }
    }

    fn apply_resize(&mut self) -> Result<()> {
        if frame::is_minimized(self.width, self.height) {
            return Ok(());
        }
        let (Some(device), Some(swapchain), Some(fence)) =
            (&self.device, &mut self.swapchain, &mut self.fence)
        else {
            return Err(GraphicsError::Disposed);
        };

        fence.flush(device)?;
        swapchain.resize(device, self.width, self.height)?;
        fence.schedule.reset(swapchain.buffer_count());
        self.current_buffer = swapchain.current_index();
        self.needs_resize = false;
        Ok(())
    }

    fn submit(&self) -> Result<()> {
        let (device, swapchain, list, _) = self.parts()?;
        let buffer = self.current_buffer;

        unsafe {
            list.ResourceBarrier(&[transition_barrier(
                &swapchain.back_buffers[buffer],
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            )]);
            list.Close().check("ID3D12GraphicsCommandList::Close")?;

            let lists = [Some(list.cast::<ID3D12CommandList>().check("ID3D12CommandList")?)];
            device.queue.ExecuteCommandLists(&lists);
        }
        Ok(())
    }

    fn drain_debug_messages(&self) {
        if let Some(info_queue) = &self.info_queue {
            info_queue.drain();
        }
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // Borrowed without AddRef; the barrier must not be dropped as owned
                pResource: unsafe { std::mem::transmute_copy(resource) },
                StateBefore: state_before,
                StateAfter: state_after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}

impl GraphicsContext for D3D12Context {
    fn backend(&self) -> BackendKind {
        BackendKind::Direct3D12
    }

    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn frame_index(&self) -> usize {
        self.current_buffer
    }

    fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    fn begin_frame(&mut self, clear_color: Vec4) -> Result<FrameStatus> {
        self.state.ensure_alive()?;

        if frame::is_minimized(self.width, self.height) {
            return Ok(FrameStatus::Skipped);
        }
        if self.needs_resize {
            self.apply_resize()?;
        }

        self.frames.begin()?;
        let recorded = (|| -> Result<usize> {
            let (_, swapchain, list, fence) = self.parts()?;
            let buffer = swapchain.current_index();

            fence.wait_for_buffer(buffer)?;

            let allocator = &self.allocators[buffer];
            unsafe {
                allocator.Reset().check("ID3D12CommandAllocator::Reset")?;
                list.Reset(allocator, None::<&ID3D12PipelineState>)
                    .check("ID3D12GraphicsCommandList::Reset")?;

                list.ResourceBarrier(&[transition_barrier(
                    &swapchain.back_buffers[buffer],
                    D3D12_RESOURCE_STATE_PRESENT,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                )]);

                let rtv = swapchain.rtv(buffer);
                list.OMSetRenderTargets(1, Some(&rtv), false, None);
                list.ClearRenderTargetView(rtv, clear_color.to_array().as_ptr(), None);
            }
            Ok(buffer)
        })();

        match recorded {
            Ok(buffer) => {
                self.current_buffer = buffer;
                Ok(FrameStatus::Ready)
            }
            Err(e) => {
                self.frames.abandon();
                Err(e)
            }
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        self.state.ensure_alive()?;
        self.frames.end()?;

        let submitted = self.submit();
        if submitted.is_err() {
            // Nothing reached the queue; the buffer's fence value is unchanged
            self.frames.abandon();
        }
        submitted
    }

    fn present_frame(&mut self) -> Result<()> {
        self.state.ensure_alive()?;
        self.frames.present()?;

        let buffer = self.current_buffer;
        let (Some(device), Some(swapchain), Some(fence)) =
            (&self.device, &self.swapchain, &mut self.fence)
        else {
            return Err(GraphicsError::Disposed);
        };

        let presented = swapchain.present();

        // Signal even if Present failed so the buffer's work is still fenced
        let value = fence.schedule.next_signal();
        unsafe { device.queue.Signal(&fence.fence, value) }.check("ID3D12CommandQueue::Signal")?;
        fence.schedule.record(buffer, value);

        self.drain_debug_messages();
        presented
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            log::debug!("Resize requested: {}x{}", width, height);
            self.width = width;
            self.height = height;
            self.needs_resize = true;
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        let (Some(device), Some(fence)) = (&self.device, &mut self.fence) else {
            return Err(GraphicsError::Disposed);
        };
        fence.flush(device)
    }

    fn dispose(&mut self) -> Result<()> {
        if !self.state.begin_dispose() {
            return Ok(());
        }
        log::info!("Cleaning up Direct3D 12 resources...");
        self.frames.abandon();

        let mut result = Ok(());
        if let (Some(device), Some(fence)) = (&self.device, &mut self.fence) {
            result = fence.flush(device);
        }
        self.drain_debug_messages();

        // Children before parents: event/fence, list, allocators, RTVs +
        // swap chain, then queue/device/factory
        self.info_queue = None;
        self.fence = None;
        self.command_list = None;
        self.allocators.clear();
        self.swapchain = None;
        self.device = None;

        self.state.end_dispose();
        log::info!("Cleanup complete");
        result
    }
}

impl Drop for D3D12Context {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::error!("Error while disposing Direct3D 12 context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::{WAIT_FAILED, WAIT_TIMEOUT};

    #[test]
    fn only_signalled_wait_succeeds() {
        assert!(check_wait(WAIT_OBJECT_0).is_ok());
        assert!(check_wait(WAIT_FAILED).is_err());
        assert!(check_wait(WAIT_TIMEOUT).is_err());
    }

    #[test]
    fn wait_error_carries_call_name() {
        let err = check_wait(WAIT_FAILED).check("WaitForSingleObject").unwrap_err();
        assert!(err.to_string().starts_with("WaitForSingleObject failed"));
    }
}
