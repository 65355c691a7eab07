use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{
    ElementState, Event, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent,
};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use asset_inspector::{
    export_all, ingest_archive, load_model, BundleArchive, EntityStore, FlyCamera, NavKey,
    Renderer,
};

/// Redraw cadence of the viewport (~60 Hz), scheduled cooperatively.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let store = EntityStore::new();
    load_into_store(Path::new(&options.path), &store)?;

    println!("Loaded {} entities:", store.len());
    for name in store.display_names() {
        println!(" - {name}");
    }

    if let Some(dir) = options.export_dir.as_deref() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;
        let written = store.with_all(|entities| export_all(entities, dir));
        println!("Exported {written} file(s) to {}", dir.display());
    }

    if options.summary_only {
        return Ok(());
    }

    match run_interactive(store) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Re-run with --summary-only to skip the viewport (set DISPLAY or \
                     install GPU drivers to enable rendering)."
                );
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

/// Dispatches on the file extension: engine bundles go through the
/// ingestion engine, everything else through the generic model loader.
fn load_into_store(path: &Path, store: &EntityStore) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "assets" | "bundle" | "unity3d" => {
            let bundle = BundleArchive::open(path)?;
            let (entities, summary) = ingest_archive(&bundle);
            store.append_batch(entities);
            println!(
                "Loaded bundle: {} textures, {} meshes (best-effort mapping)",
                summary.textures, summary.meshes
            );
        }
        _ => {
            let entity = load_model(path)?;
            store.append_batch(vec![entity]);
        }
    }
    Ok(())
}

fn run_interactive(store: EntityStore) -> Result<()> {
    // EventLoop::new panics rather than erroring on headless hosts; probe
    // it behind a silenced hook.
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Asset Inspector")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window)))
        .map_err(|err| WindowInitError::from_error("renderer", format!("{err:#}")))?;

    let mut app = AppState {
        renderer,
        store,
        camera: FlyCamera::new(),
        selected: None,
        next_frame: Instant::now(),
        last_error: None,
    };

    let mut event_loop = event_loop;
    event_loop.run_return(|event, _, control_flow| {
        if let Err(err) = app.process_event(&event, control_flow) {
            app.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct AppState {
    renderer: Renderer,
    store: EntityStore,
    camera: FlyCamera,
    selected: Option<usize>,
    next_frame: Instant,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.renderer.resize(**new_inner_size);
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        self.handle_keyboard(input, control_flow);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        if *button == MouseButton::Right {
                            self.camera.set_look_active(*state == ElementState::Pressed);
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        self.camera
                            .pointer_moved(Vec2::new(position.x as f32, position.y as f32));
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                match self.renderer.render(&self.store, &self.camera) {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = self.renderer.window().inner_size();
                        self.renderer.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        return Err(anyhow!("GPU is out of memory"));
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        info!("Surface timeout; retrying next frame");
                    }
                }
                // Movement integrates after the draw so it lands next frame.
                self.camera.integrate();
            }
            Event::MainEventsCleared => {
                let now = Instant::now();
                if now >= self.next_frame {
                    self.renderer.window().request_redraw();
                    self.next_frame = now + FRAME_INTERVAL;
                }
                *control_flow = ControlFlow::WaitUntil(self.next_frame);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_keyboard(&mut self, input: &KeyboardInput, control_flow: &mut ControlFlow) {
        let Some(key) = input.virtual_keycode else {
            return;
        };
        let pressed = input.state == ElementState::Pressed;

        if let Some(nav) = nav_key(key) {
            if pressed {
                self.camera.key_pressed(nav);
            } else {
                self.camera.key_released(nav);
            }
            return;
        }
        if !pressed {
            return;
        }
        match key {
            VirtualKeyCode::Escape => control_flow.set_exit(),
            VirtualKeyCode::Tab => self.select_next(),
            VirtualKeyCode::Key1 => self.select(0),
            VirtualKeyCode::Key2 => self.select(1),
            VirtualKeyCode::Key3 => self.select(2),
            VirtualKeyCode::Key4 => self.select(3),
            VirtualKeyCode::Key5 => self.select(4),
            VirtualKeyCode::Key6 => self.select(5),
            VirtualKeyCode::Key7 => self.select(6),
            VirtualKeyCode::Key8 => self.select(7),
            VirtualKeyCode::Key9 => self.select(8),
            _ => {}
        }
    }

    /// Selection contract: focus the camera when a mesh is present (home
    /// position otherwise) and attempt a texture upload either way.
    fn select(&mut self, index: usize) {
        let applied = self.store.with_entity_mut(index, |entity| {
            match entity.mesh.as_ref() {
                Some(mesh) => self.camera.focus_on(mesh),
                None => self.camera.reset_home(),
            }
            self.renderer.upload_texture(entity);
        });
        if applied.is_some() {
            self.selected = Some(index);
        }
    }

    fn select_next(&mut self) {
        let len = self.store.len();
        if len == 0 {
            return;
        }
        let next = self.selected.map_or(0, |current| (current + 1) % len);
        self.select(next);
    }
}

fn nav_key(key: VirtualKeyCode) -> Option<NavKey> {
    Some(match key {
        VirtualKeyCode::W => NavKey::Forward,
        VirtualKeyCode::S => NavKey::Back,
        VirtualKeyCode::A => NavKey::Left,
        VirtualKeyCode::D => NavKey::Right,
        VirtualKeyCode::Space => NavKey::Up,
        VirtualKeyCode::LShift | VirtualKeyCode::RShift => NavKey::Down,
        _ => return None,
    })
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

struct CliOptions {
    path: String,
    export_dir: Option<PathBuf>,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: asset-inspector <file> [--export-dir DIR] [--summary-only]"
            ));
        };
        let mut export_dir = None;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--export-dir" => {
                    let Some(dir) = args.next() else {
                        return Err(anyhow!("--export-dir requires a directory argument"));
                    };
                    export_dir = Some(PathBuf::from(dir));
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --export-dir or --summary-only"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            export_dir,
            summary_only,
        })
    }
}
