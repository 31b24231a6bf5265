//! Interactive cluster-LOD viewer
//!
//! Bakes (or loads) a cluster DAG per model, spawns a grid of instances
//! and flies a free camera through them. Keys: W/A/S/D move, mouse
//! looks, Shift runs, `E` toggles dynamic LOD, `P` saves a screenshot,
//! `Esc` quits.

mod manifest;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use meshlod_build::{load_dag, save_dag, BuildConfig, CacheError, DagBuilder, ModelPaths};
use meshlod_core::{obj, ClusterDag};
use meshlod_render::{InstanceManager, Model, Renderer, Texture};
use meshlod_runtime::Camera;

use manifest::Manifest;

const MOVE_SPEED: f32 = 2.0;
const RUN_MULTIPLIER: f32 = 8.0;
const MOUSE_SENSITIVITY: f32 = 0.002;

struct BakedModel {
    name: String,
    dag: Arc<ClusterDag>,
    texture_path: std::path::PathBuf,
}

/// Load every model's DAG from cache, rebaking on miss or corruption.
fn bake_models(manifest: &Manifest) -> Result<Vec<BakedModel>> {
    let builder = DagBuilder::new(BuildConfig::default());
    let mut out = Vec::new();
    for entry in &manifest.models {
        let cached = if manifest.force_rebuild {
            None
        } else {
            match load_dag(&entry.cache) {
                Ok((dag, _paths)) => Some(dag),
                Err(CacheError::Miss) => {
                    log::info!("no cache for {}, baking", entry.name);
                    None
                }
                Err(CacheError::Corrupt(reason)) => {
                    log::warn!("cache for {} unusable ({reason}), rebaking", entry.name);
                    None
                }
            }
        };

        let dag = match cached {
            Some(dag) => dag,
            None => {
                log::info!("baking LOD DAG for {}, this can take a while", entry.name);
                let mesh = obj::load_obj(&entry.obj)
                    .with_context(|| format!("failed to load model {}", entry.name))?;
                let dag = builder.build(&mesh)?;
                let paths = ModelPaths {
                    obj: entry.obj.clone(),
                    texture: entry.texture.clone(),
                };
                save_dag(&entry.cache, &dag, &paths)?;
                dag
            }
        };

        out.push(BakedModel {
            name: entry.name.clone(),
            dag: Arc::new(dag),
            texture_path: entry.texture.clone(),
        });
    }
    Ok(out)
}

struct App {
    manifest: Manifest,
    baked: Vec<BakedModel>,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scene: Option<InstanceManager>,
    keys: HashSet<KeyCode>,
    last_frame: Instant,
    hud_timer: Instant,
    hud_frames: u32,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(manifest: Manifest, baked: Vec<BakedModel>) -> Self {
        Self {
            manifest,
            baked,
            window: None,
            renderer: None,
            scene: None,
            keys: HashSet::new(),
            last_frame: Instant::now(),
            hud_timer: Instant::now(),
            hud_frames: 0,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        self.error = Some(error);
        event_loop.exit();
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("meshlod viewer")
                        .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0)),
                )
                .context("failed to create window")?,
        );
        window.set_cursor_visible(false);
        // Prefer a locked pointer for mouse look; fall back to confined.
        if window
            .set_cursor_grab(winit::window::CursorGrabMode::Locked)
            .is_err()
        {
            let _ = window.set_cursor_grab(winit::window::CursorGrabMode::Confined);
        }

        let renderer = pollster::block_on(Renderer::new(window.clone()))?;

        let mut camera = Camera::new(Vec3::new(0.0, 0.85, -4.0), std::f32::consts::FRAC_PI_2);
        camera.aspect = renderer.aspect();
        let mut scene = InstanceManager::new(camera);

        for model in &self.baked {
            let texture = Texture::from_path(
                renderer.device(),
                renderer.queue(),
                renderer.texture_layout(),
                &model.texture_path,
            )?;
            scene.register_model(
                model.name.clone(),
                Model {
                    dag: model.dag.clone(),
                    texture,
                },
            );
        }

        // Instance grid, every model cycled through the cells.
        if !self.baked.is_empty() {
            let grid = self.manifest.grid.max(1);
            let spacing = self.manifest.spacing;
            let mut slot = 0usize;
            for z in 0..grid {
                for x in 0..grid {
                    let name = &self.baked[slot % self.baked.len()].name;
                    scene.spawn(name, Vec3::new(x as f32 * spacing, 0.0, z as f32 * spacing))?;
                    slot += 1;
                }
            }
        }
        log::info!("spawned {} instances", scene.instance_count());

        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };

        let dt = self.last_frame.elapsed().as_secs_f32().min(0.1);
        self.last_frame = Instant::now();

        let mut speed = MOVE_SPEED;
        if self.keys.contains(&KeyCode::ShiftLeft) || self.keys.contains(&KeyCode::ShiftRight) {
            speed *= RUN_MULTIPLIER;
        }
        let forward = scene.camera.forward();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let mut velocity = Vec3::ZERO;
        if self.keys.contains(&KeyCode::KeyW) {
            velocity += forward;
        }
        if self.keys.contains(&KeyCode::KeyS) {
            velocity -= forward;
        }
        if self.keys.contains(&KeyCode::KeyD) {
            velocity += right;
        }
        if self.keys.contains(&KeyCode::KeyA) {
            velocity -= right;
        }
        if velocity.length_squared() > 0.0 {
            scene
                .camera
                .update(velocity.normalize() * speed * dt, 0.0, 0.0);
        }

        scene.update(renderer);
        renderer.render(scene)?;

        self.hud_frames += 1;
        if self.hud_frames >= 60 {
            let elapsed = self.hud_timer.elapsed().as_secs_f32();
            let fps = self.hud_frames as f32 / elapsed.max(1e-3);
            let mtris = scene.live_triangles() as f32 / 1.0e6;
            if let Some(window) = &self.window {
                window.set_title(&format!(
                    "meshlod viewer | Dynamic LOD: {} | FPS: {fps:.1} | Triangles: {mtris:.2} M",
                    scene.dynamic_lod
                ));
            }
            self.hud_frames = 0;
            self.hud_timer = Instant::now();
        }
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                self.keys.insert(code);
                if event.repeat {
                    return;
                }
                match code {
                    KeyCode::Escape => event_loop.exit(),
                    KeyCode::KeyE => {
                        if let Some(scene) = self.scene.as_mut() {
                            scene.dynamic_lod = !scene.dynamic_lod;
                            log::info!("dynamic LOD: {}", scene.dynamic_lod);
                        }
                    }
                    KeyCode::KeyP => {
                        if let Some(renderer) = self.renderer.as_mut() {
                            if let Err(e) = std::fs::create_dir_all("screenshots") {
                                log::warn!("cannot create screenshots directory: {e}");
                                return;
                            }
                            let stamp = SystemTime::now()
                                .duration_since(UNIX_EPOCH)
                                .map(|d| d.as_secs())
                                .unwrap_or(0);
                            renderer.request_screenshot(
                                Path::new("screenshots").join(format!("{stamp}.png")),
                            );
                        }
                    }
                    _ => {}
                }
            }
            ElementState::Released => {
                self.keys.remove(&code);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_graphics(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                    if let Some(scene) = self.scene.as_mut() {
                        scene.camera.aspect = renderer.aspect();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if let Some(scene) = self.scene.as_mut() {
                scene.camera.update(
                    Vec3::ZERO,
                    dx as f32 * MOUSE_SENSITIVITY,
                    -dy as f32 * MOUSE_SENSITIVITY,
                );
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    std::fs::create_dir_all("data/build").context("failed to create data/build")?;

    let manifest = Manifest::load_or_default(Path::new("models.toml"))?;
    let baked = bake_models(&manifest)?;

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(manifest, baked);
    event_loop.run_app(&mut app).context("event loop failed")?;

    match app.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
