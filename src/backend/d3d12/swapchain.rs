// D3D12 swap chain - flip-model swap chain, back buffers and RTVs

use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Resource, D3D12_CPU_DESCRIPTOR_HANDLE,
    D3D12_DESCRIPTOR_HEAP_DESC, D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_UNSPECIFIED, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain1, IDXGISwapChain3, DXGI_PRESENT, DXGI_PRESENT_ALLOW_TEARING, DXGI_SCALING_STRETCH,
    DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_CHAIN_FLAG, DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING,
    DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use super::device::D3D12Device;
use crate::backend::present::DxgiPresent;
use crate::error::{HResultExt, Result};

pub struct D3D12Swapchain {
    pub back_buffers: Vec<ID3D12Resource>,
    rtv_heap: ID3D12DescriptorHeap,
    rtv_descriptor_size: usize,
    pub swap_chain: IDXGISwapChain3,
    buffer_count: u32,
    flags: DXGI_SWAP_CHAIN_FLAG,
    present: DxgiPresent,
}

impl D3D12Swapchain {
    pub fn new(
        device: &D3D12Device,
        hwnd: HWND,
        width: u32,
        height: u32,
        buffer_count: u32,
        present: DxgiPresent,
    ) -> Result<Self> {
        log::info!("Creating swap chain: {}x{}, {} buffers", width, height, buffer_count);

        let flags = if present.allow_tearing {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING
        } else {
            DXGI_SWAP_CHAIN_FLAG(0)
        };

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            Stereo: false.into(),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: buffer_count,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: flags.0 as u32,
        };

        let swap_chain: IDXGISwapChain1 = unsafe {
            device
                .factory
                .CreateSwapChainForHwnd(&device.queue, hwnd, &desc, None, None)
        }
        .check("CreateSwapChainForHwnd")?;
        let swap_chain: IDXGISwapChain3 = swap_chain.cast().check("IDXGISwapChain3")?;

        let rtv_heap: ID3D12DescriptorHeap = unsafe {
            device.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: buffer_count,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                ..Default::default()
            })
        }
        .check("CreateDescriptorHeap")?;
        let rtv_descriptor_size = unsafe {
            device
                .device
                .GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV)
        } as usize;

        let mut swapchain = Self {
            back_buffers: Vec::new(),
            rtv_heap,
            rtv_descriptor_size,
            swap_chain,
            buffer_count,
            flags,
            present,
        };
        swapchain.create_render_targets(device)?;
        Ok(swapchain)
    }

    fn create_render_targets(&mut self, device: &D3D12Device) -> Result<()> {
        self.back_buffers.clear();
        for index in 0..self.buffer_count {
            let buffer: ID3D12Resource =
                unsafe { self.swap_chain.GetBuffer(index) }.check("IDXGISwapChain::GetBuffer")?;
            unsafe {
                device
                    .device
                    .CreateRenderTargetView(&buffer, None, self.rtv(index as usize))
            };
            self.back_buffers.push(buffer);
        }
        Ok(())
    }

    pub fn rtv(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let start = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index * self.rtv_descriptor_size,
        }
    }

    pub fn current_index(&self) -> usize {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() as usize }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count as usize
    }

    /// GPU must be idle: every back buffer reference is released first.
    pub fn resize(&mut self, device: &D3D12Device, width: u32, height: u32) -> Result<()> {
        log::info!("Resizing swap chain: {}x{}", width, height);
        self.back_buffers.clear();
        unsafe {
            self.swap_chain
                .ResizeBuffers(self.buffer_count, width, height, DXGI_FORMAT_UNKNOWN, self.flags)
        }
        .check("IDXGISwapChain::ResizeBuffers")?;
        self.create_render_targets(device)
    }

    pub fn present(&self) -> Result<()> {
        let flags = if self.present.allow_tearing {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };
        unsafe { self.swap_chain.Present(self.present.sync_interval, flags) }
            .ok()
            .check("IDXGISwapChain::Present")
    }
}
