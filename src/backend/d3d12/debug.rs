// D3D12 info queue
//
// With the debug layer on, validation messages pile up in the device's
// ID3D12InfoQueue. They are drained into `log` once per frame.

use std::ffi::CStr;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12Device, ID3D12InfoQueue, D3D12_MESSAGE, D3D12_MESSAGE_SEVERITY_CORRUPTION,
    D3D12_MESSAGE_SEVERITY_ERROR, D3D12_MESSAGE_SEVERITY_WARNING,
};

pub struct InfoQueue {
    queue: ID3D12InfoQueue,
}

impl InfoQueue {
    /// `None` unless the debug layer is active.
    pub fn new(device: &ID3D12Device) -> Option<Self> {
        device.cast::<ID3D12InfoQueue>().ok().map(|queue| Self { queue })
    }

    pub fn drain(&self) {
        unsafe {
            let count = self.queue.GetNumStoredMessages();
            for index in 0..count {
                let mut length = 0usize;
                if self.queue.GetMessage(index, None, &mut length).is_err() || length == 0 {
                    continue;
                }

                // D3D12_MESSAGE followed by its description, 8-byte aligned
                let mut storage = vec![0u64; length.div_ceil(8)];
                let message = storage.as_mut_ptr() as *mut D3D12_MESSAGE;
                if self.queue.GetMessage(index, Some(message), &mut length).is_err() {
                    continue;
                }

                let text = CStr::from_ptr((*message).pDescription as *const _).to_string_lossy();
                match (*message).Severity {
                    D3D12_MESSAGE_SEVERITY_CORRUPTION | D3D12_MESSAGE_SEVERITY_ERROR => {
                        log::error!("[D3D12] {}", text)
                    }
                    D3D12_MESSAGE_SEVERITY_WARNING => log::warn!("[D3D12] {}", text),
                    _ => log::debug!("[D3D12] {}", text),
                }
            }
            self.queue.ClearStoredMessages();
        }
    }
}
