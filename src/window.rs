// Native window handles
//
// The providers only speak Win32 and Xlib. Everything else coming out of
// raw-window-handle is rejected up front.

use std::ffi::{c_ulong, c_void};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use crate::error::{GraphicsError, Result};

/// A window the graphics providers can present to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeWindow {
    Win32 {
        hwnd: isize,
        /// Module owning the window class; `None` means "this executable"
        hinstance: Option<isize>,
    },
    Xlib {
        display: *mut c_void,
        window: c_ulong,
    },
}

impl NativeWindow {
    pub fn from_raw(window: RawWindowHandle, display: RawDisplayHandle) -> Result<Self> {
        match (window, display) {
            (RawWindowHandle::Win32(handle), _) => Ok(NativeWindow::Win32 {
                hwnd: handle.hwnd.get(),
                hinstance: handle.hinstance.map(|h| h.get()),
            }),
            (RawWindowHandle::Xlib(handle), RawDisplayHandle::Xlib(display)) => {
                let display = display.display.ok_or_else(|| {
                    GraphicsError::UnsupportedWindow("Xlib window without a display".to_string())
                })?;
                Ok(NativeWindow::Xlib {
                    display: display.as_ptr(),
                    window: handle.window,
                })
            }
            (window, display) => Err(GraphicsError::UnsupportedWindow(format!(
                "{:?} on {:?}",
                window, display
            ))),
        }
    }

    pub fn from_window<W>(window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        let window_handle = window
            .window_handle()
            .map_err(|e| GraphicsError::UnsupportedWindow(e.to_string()))?
            .as_raw();
        let display_handle = window
            .display_handle()
            .map_err(|e| GraphicsError::UnsupportedWindow(e.to_string()))?
            .as_raw();
        Self::from_raw(window_handle, display_handle)
    }

    /// Module handle for the window, resolved through `GetModuleHandleW`
    /// when the window system did not report one.
    #[cfg(windows)]
    pub fn module_handle(&self) -> Result<isize> {
        use crate::error::HResultExt;
        use windows::Win32::System::LibraryLoader::GetModuleHandleW;

        match *self {
            NativeWindow::Win32 {
                hinstance: Some(hinstance),
                ..
            } => Ok(hinstance),
            NativeWindow::Win32 { hinstance: None, .. } => {
                let module = unsafe { GetModuleHandleW(None) }.check("GetModuleHandleW")?;
                Ok(module.0 as isize)
            }
            NativeWindow::Xlib { .. } => Err(GraphicsError::UnsupportedWindow(
                "Xlib window has no module handle".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{
        WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle, WindowsDisplayHandle,
        XlibDisplayHandle, XlibWindowHandle,
    };
    use std::num::NonZeroIsize;
    use std::ptr::NonNull;

    #[test]
    fn win32_handles_convert() {
        let mut handle = Win32WindowHandle::new(NonZeroIsize::new(0x1234).unwrap());
        handle.hinstance = NonZeroIsize::new(0x4000);

        let window = NativeWindow::from_raw(
            RawWindowHandle::Win32(handle),
            RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
        )
        .unwrap();

        assert_eq!(
            window,
            NativeWindow::Win32 {
                hwnd: 0x1234,
                hinstance: Some(0x4000)
            }
        );
    }

    #[test]
    fn xlib_handles_convert() {
        let mut display_storage = 0u8;
        let display = NonNull::from(&mut display_storage).cast::<c_void>();

        let window = NativeWindow::from_raw(
            RawWindowHandle::Xlib(XlibWindowHandle::new(42)),
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(Some(display), 0)),
        )
        .unwrap();

        assert_eq!(
            window,
            NativeWindow::Xlib {
                display: display.as_ptr(),
                window: 42
            }
        );
    }

    #[test]
    fn xlib_without_display_is_rejected() {
        let result = NativeWindow::from_raw(
            RawWindowHandle::Xlib(XlibWindowHandle::new(42)),
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
        );
        assert!(matches!(result, Err(GraphicsError::UnsupportedWindow(_))));
    }

    #[test]
    fn wayland_is_unsupported() {
        let mut storage = 0u8;
        let ptr = NonNull::from(&mut storage).cast::<c_void>();
        let result = NativeWindow::from_raw(
            RawWindowHandle::Wayland(WaylandWindowHandle::new(ptr)),
            RawDisplayHandle::Wayland(WaylandDisplayHandle::new(ptr)),
        );
        assert!(matches!(result, Err(GraphicsError::UnsupportedWindow(_))));
    }
}
