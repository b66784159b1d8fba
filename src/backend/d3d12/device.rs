// D3D12 device - factory, adapter and device creation
//
// Responsibilities:
// - Debug layer + DXGI debug factory when validation is on
// - Adapter enumeration into AdapterInfo
// - DXGI 1.5 tearing support query
// - Device + direct command queue

use windows::core::Interface;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateDevice, D3D12GetDebugInterface, ID3D12CommandQueue, ID3D12Debug, ID3D12Device,
    D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_COMMAND_QUEUE_DESC, D3D12_COMMAND_QUEUE_FLAG_NONE,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIAdapter1, IDXGIFactory4, IDXGIFactory5, DXGI_ADAPTER_DESC1,
    DXGI_ADAPTER_FLAG_SOFTWARE, DXGI_CREATE_FACTORY_DEBUG, DXGI_CREATE_FACTORY_FLAGS,
    DXGI_FEATURE_PRESENT_ALLOW_TEARING,
};

use crate::backend::adapter::{self, AdapterInfo, AdapterKind};
use crate::backend::ContextDesc;
use crate::error::{GraphicsError, HResultExt, Result};

/// Below this much dedicated VRAM an adapter is assumed to share system memory.
const DISCRETE_MEMORY_THRESHOLD: u64 = 512 * 1024 * 1024;

pub struct D3D12Device {
    pub queue: ID3D12CommandQueue,
    pub device: ID3D12Device,
    pub adapter: IDXGIAdapter1,
    pub factory: IDXGIFactory4,
    pub adapter_info: AdapterInfo,
    pub tearing_supported: bool,
    pub debug_layer: bool,
}

impl D3D12Device {
    pub fn new(desc: &ContextDesc) -> Result<Self> {
        log::info!("Creating D3D12 device: {}", desc.app_name);

        let debug_layer = desc.validation && Self::enable_debug_layer();
        let flags = if debug_layer {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory2(flags) }.check("CreateDXGIFactory2")?;

        let adapters = Self::enumerate_adapters(&factory)?;
        for (_, info) in &adapters {
            log::info!("Found adapter: {}", info);
        }

        let infos: Vec<AdapterInfo> = adapters.iter().map(|(_, info)| info.clone()).collect();
        let chosen = adapter::select_adapter(
            &infos,
            desc.power_preference,
            desc.adapter_filter.as_deref(),
        )
        .ok_or(GraphicsError::NoSuitableAdapter)?;
        let (adapter, adapter_info) = adapters
            .into_iter()
            .nth(chosen)
            .ok_or(GraphicsError::NoSuitableAdapter)?;

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }
            .check("D3D12CreateDevice")?;
        let device = device.ok_or(GraphicsError::NoSuitableAdapter)?;
        log::info!("Selected GPU: {}", adapter_info);

        let queue_desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Priority: 0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let queue: ID3D12CommandQueue =
            unsafe { device.CreateCommandQueue(&queue_desc) }.check("CreateCommandQueue")?;

        let tearing_supported = Self::tearing_supported(&factory);
        log::info!("Tearing support: {}", tearing_supported);

        Ok(Self {
            queue,
            device,
            adapter,
            factory,
            adapter_info,
            tearing_supported,
            debug_layer,
        })
    }

    /// Must run before the device is created.
    fn enable_debug_layer() -> bool {
        let mut debug: Option<ID3D12Debug> = None;
        match unsafe { D3D12GetDebugInterface(&mut debug) } {
            Ok(()) => match debug {
                Some(debug) => {
                    unsafe { debug.EnableDebugLayer() };
                    log::info!("D3D12 debug layer enabled");
                    true
                }
                None => false,
            },
            Err(e) => {
                log::warn!("D3D12 debug layer unavailable: {}", e);
                false
            }
        }
    }

    /// Hardware adapters that can create a feature level 11_0 device, plus
    /// software adapters as a last resort.
    fn enumerate_adapters(factory: &IDXGIFactory4) -> Result<Vec<(IDXGIAdapter1, AdapterInfo)>> {
        let mut adapters = Vec::new();

        // EnumAdapters1 fails with DXGI_ERROR_NOT_FOUND past the last one
        for index in 0.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(index) }) else {
                break;
            };
            let desc = unsafe { adapter.GetDesc1() }.check("IDXGIAdapter1::GetDesc1")?;
            let info = adapter_info(&desc);

            let supported = unsafe {
                D3D12CreateDevice(
                    &adapter,
                    D3D_FEATURE_LEVEL_11_0,
                    std::ptr::null_mut::<Option<ID3D12Device>>(),
                )
            }
            .is_ok();

            if supported {
                adapters.push((adapter, info));
            } else {
                log::debug!("Skipping {}: no feature level 11_0", info.name);
            }
        }

        if adapters.is_empty() {
            return Err(GraphicsError::NoSuitableAdapter);
        }
        Ok(adapters)
    }

    fn tearing_supported(factory: &IDXGIFactory4) -> bool {
        let Ok(factory5) = factory.cast::<IDXGIFactory5>() else {
            return false;
        };
        let mut allow = BOOL::default();
        let checked = unsafe {
            factory5.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut allow as *mut BOOL as *mut _,
                std::mem::size_of::<BOOL>() as u32,
            )
        };
        checked.is_ok() && allow.as_bool()
    }
}

fn adapter_info(desc: &DXGI_ADAPTER_DESC1) -> AdapterInfo {
    let name_len = desc
        .Description
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(desc.Description.len());
    let name = String::from_utf16_lossy(&desc.Description[..name_len]);
    let dedicated_memory = desc.DedicatedVideoMemory as u64;

    let kind = if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
        AdapterKind::Cpu
    } else if dedicated_memory >= DISCRETE_MEMORY_THRESHOLD {
        AdapterKind::Discrete
    } else {
        AdapterKind::Integrated
    };

    AdapterInfo {
        name,
        kind,
        vendor_id: desc.VendorId,
        device_id: desc.DeviceId,
        dedicated_memory,
    }
}
