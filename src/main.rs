// =============================================================================
// GRAPHICS PROVIDER HOST
// =============================================================================
//
// Opens a window, stands up a Direct3D 12 or Vulkan context for it and runs
// the begin_frame / end_frame / present_frame loop, clearing the back
// buffer to the configured colour.
//
// FRAME FLOW:
// 1. Pick up config changes (hot reload)
// 2. begin_frame: wait for the buffer's fence, record the clear
// 3. end_frame: transition for present, submit
// 4. present_frame: present, signal
//
// =============================================================================

use anyhow::{Context, Result};
use graphics_provider::config::{self, Config, ConfigWatcher};
use graphics_provider::{create_context, FrameStatus, GraphicsContext, NativeWindow};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config)?;
    log::info!("Starting graphics provider");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Backend: {:?}, present mode: {:?}",
        config.graphics.backend,
        config.graphics.present_mode
    );

    let event_loop = build_event_loop()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Xlib is the only Unix window system the providers present to, so keep
/// winit off Wayland.
fn build_event_loop() -> Result<EventLoop<()>> {
    let mut builder = EventLoop::builder();

    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_x11();
    }

    builder.build().context("Failed to create event loop")
}

/// Logs go to stderr and, if enabled, to the configured log file as well.
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {}", config.debug.log_file))?;
        writeln!(file, "=== Graphics Provider Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    builder.init();
    Ok(())
}

struct Tee {
    file: std::fs::File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the context must go before the window
/// its swap chain presents to.
struct App {
    config: Config,
    watcher: Option<ConfigWatcher>,

    context: Option<Box<dyn GraphicsContext>>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let watcher = if config.debug.hot_reload {
            ConfigWatcher::new(config::DEFAULT_PATH)
                .map_err(|e| log::warn!("Config hot reload disabled: {:#}", e))
                .ok()
        } else {
            None
        };
        let now = Instant::now();
        Self {
            config,
            watcher,
            context: None,
            window: None,
            is_fullscreen,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn init_graphics(&mut self, window: &Window) -> Result<()> {
        let native = NativeWindow::from_window(window)?;
        let size = window.inner_size();
        let desc = self.config.context_desc(size.width, size.height);

        let context = create_context(self.config.graphics.backend, &native, &desc)?;
        log::info!(
            "{:?} context ready on {}",
            context.backend(),
            context.adapter()
        );
        self.context = Some(context);
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Returns `false` when the frame was skipped.
    fn render_frame(&mut self) -> Result<bool> {
        self.apply_config_updates();

        let clear_color = self.config.clear_color();
        let Some(context) = self.context.as_mut() else {
            return Ok(false);
        };

        if context.begin_frame(clear_color)? == FrameStatus::Skipped {
            return Ok(false);
        }
        context.end_frame()?;
        context.present_frame()?;
        Ok(true)
    }

    /// Only settings that do not need a new device are applied live.
    fn apply_config_updates(&mut self) {
        let Some(update) = self.watcher.as_ref().and_then(|w| w.take_update()) else {
            return;
        };

        if update.graphics.backend != self.config.graphics.backend
            || update.graphics.present_mode != self.config.graphics.present_mode
            || update.graphics.adapter != self.config.graphics.adapter
        {
            log::warn!("Backend, present mode and adapter changes apply on restart");
        }

        self.config.graphics.clear_color = update.graphics.clear_color;
        self.config.debug.show_fps = update.debug.show_fps;
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let (Some(window), Some(context)) = (&self.window, &self.context) {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{:?}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    context.backend()
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut context) = self.context.take() {
            log::info!("Presented {} frames", context.frame_count());
            if let Err(e) = context.dispose() {
                log::error!("Failed to dispose graphics context: {}", e);
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_graphics(&window) {
            log::error!("Failed to initialize graphics: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(context) = self.context.as_mut() {
                    context.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    self.shutdown();
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown();
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
        log::info!("Cleanup complete");
    }
}
