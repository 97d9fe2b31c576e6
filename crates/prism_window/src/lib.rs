use std::{sync::Arc, time::Instant};

use prism_core::{
    FrameScheduler, GBufferPacking, MAX_LIGHTS, OrbitRig, PipelineKind, RuntimeConfig, Time,
};
use prism_renderer::{RenderError, Renderer, SceneDescription};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("event loop failure: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Os(#[from] winit::error::OsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Light count step for the Up/Down keys.
const LIGHT_STEP: u32 = 250;

// Holds the renderer while waiting for the OS to hand us a window
struct PrismRunner {
    config: RuntimeConfig,
    scene: SceneDescription,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scheduler: FrameScheduler,
    time: Time,
    orbit: OrbitRig,
    failure: Option<WindowError>,
}

impl PrismRunner {
    fn new(config: RuntimeConfig, scene: SceneDescription) -> Self {
        Self {
            config,
            scene,
            window: None,
            renderer: None,
            scheduler: FrameScheduler::new(),
            time: Time::default(),
            orbit: OrbitRig::default(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), WindowError> {
        let window = Arc::new(
            event_loop.create_window(Window::default_attributes().with_title("Prism Renderer"))?,
        );
        let size = window.inner_size();
        let renderer = Renderer::new(
            window.clone(),
            size.width,
            size.height,
            self.config.clone(),
            &self.scene,
        )?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.scheduler.start();
        Ok(())
    }

    /// Records the error, stops ticking and leaves the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: WindowError) {
        self.scheduler.halt(&err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn tick(&mut self) -> Result<(), RenderError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let started = Instant::now();
        let Some(tick) = self.scheduler.begin_tick(started) else {
            return Ok(());
        };

        // 1. Tick the clock
        self.time.advance(tick.delta);

        // 2. Camera keeps orbiting even while light time is frozen
        self.orbit.advance(self.time.delta_seconds());
        let result = renderer.render(self.time.delta_seconds(), self.orbit.view_matrix());

        self.scheduler.end_tick(started.elapsed());
        result
    }

    /// Applies a config edit with the tick loop disarmed, so no frame runs
    /// against a half-built variant. The light clock keeps the paused time.
    fn reconfigure(&mut self, edit: impl FnOnce(&mut RuntimeConfig)) -> Result<(), RenderError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let mut next = renderer.config().clone();
        edit(&mut next);

        self.scheduler.stop();
        renderer.apply_config(next)?;
        self.config = renderer.config().clone();
        self.scheduler.resume();
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<(), RenderError> {
        match code {
            KeyCode::Digit1 => self.reconfigure(|c| c.pipeline = PipelineKind::Naive),
            KeyCode::Digit2 => self.reconfigure(|c| c.pipeline = PipelineKind::ForwardPlus),
            KeyCode::Digit3 => self.reconfigure(|c| c.pipeline = PipelineKind::ClusteredDeferred),
            KeyCode::Tab => self.reconfigure(|c| c.pipeline = c.pipeline.next()),
            KeyCode::KeyG => self.reconfigure(|c| {
                c.gbuffer_packing = match c.gbuffer_packing {
                    GBufferPacking::MultiAttachment => GBufferPacking::Packed,
                    GBufferPacking::Packed => GBufferPacking::MultiAttachment,
                }
            }),
            KeyCode::KeyB => self.reconfigure(|c| c.bloom_enabled = !c.bloom_enabled),
            KeyCode::KeyT => self.reconfigure(|c| c.time_frozen = !c.time_frozen),
            KeyCode::KeyR => {
                self.reconfigure(|c| c.use_batched_command_replay = !c.use_batched_command_replay)
            }
            KeyCode::KeyD => match self.renderer.as_mut() {
                Some(renderer) => {
                    let enabled = renderer
                        .bloom()
                        .is_some_and(|bloom| bloom.debug_views().is_some());
                    renderer.set_bloom_debug_copy(!enabled)
                }
                None => Ok(()),
            },
            KeyCode::ArrowUp => self.reconfigure(|c| {
                c.active_light_count = (c.active_light_count + LIGHT_STEP).min(MAX_LIGHTS)
            }),
            KeyCode::ArrowDown => self.reconfigure(|c| {
                c.active_light_count = c.active_light_count.saturating_sub(LIGHT_STEP).max(1)
            }),
            _ => Ok(()),
        }
    }
}

impl ApplicationHandler for PrismRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let result = match event {
            WindowEvent::CloseRequested => {
                log::info!(
                    "close requested after {:.1}s ({} frames); stopping",
                    self.time.elapsed_seconds(),
                    self.scheduler.stats().frame_count
                );
                self.scheduler.stop();
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => match self.renderer.as_mut() {
                Some(renderer) => renderer.resize(size.width, size.height),
                None => Ok(()),
            },
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code),
            WindowEvent::RedrawRequested => self.tick(),
            _ => Ok(()),
        };

        if let Err(err) = result {
            self.fail(event_loop, err.into());
        }
    }
}

/// Opens the window and runs the tick loop until the window closes or a frame fails.
pub fn run_app(config: RuntimeConfig, scene: SceneDescription) -> Result<(), WindowError> {
    let event_loop = EventLoop::new()?;

    // Poll keeps redraws flowing without waiting on OS events
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = PrismRunner::new(config, scene);
    event_loop.run_app(&mut runner)?;

    match runner.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
