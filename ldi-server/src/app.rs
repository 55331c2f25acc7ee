//! Top-level application state and router, mirroring
//! `stitching_server::app`'s `App`/`AppInner`/`ServerConfig` split.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};

use axum::{
    extract::{ws::Message, State},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use ldi_core::{
    transport::ChunkTransport, xr::GamepadState, Capture, CaptureSummary, RenderCamera, Renderer,
    XrFrame, XrSession,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::mpsc};

use crate::{
    log,
    proto::{chunk_frame, ClientMessage, Eye, ServerMessage},
    util::{ws_upgrader, IntervalTimer},
};

#[derive(Clone)]
pub struct App(Arc<AppInner>);

struct AppInner {
    ctx: Arc<ldi_gpu::Context>,
    renderer: Mutex<Renderer>,
    xr: Mutex<Option<XrSession>>,
    transport: Mutex<ChunkTransport>,
    summary: CaptureSummary,
    server_cfg: ServerConfig,
    started_at: Instant,
}

#[derive(Serialize, Deserialize)]
struct AppConfig {
    server: ServerConfig,
    capture_path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub asset_dir: PathBuf,
}

impl App {
    /// Loads the TOML config at `p`, then the `.lif` capture it points at,
    /// and stands up the GPU context and renderer for it.
    pub async fn from_toml_cfg(p: impl AsRef<Path>) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(&std::fs::read_to_string(&p)?)?;
        tracing::info!("opened config at {:?}", p.as_ref());
        Self::load_capture(cfg.server, &cfg.capture_path).await
    }

    /// Loads `capture_path` directly, using default server settings —
    /// the path `ldi-server serve <capture>` takes without a config file.
    pub async fn from_capture_path(capture_path: &Path, host: String, port: u16, asset_dir: PathBuf) -> anyhow::Result<Self> {
        Self::load_capture(ServerConfig { host, port, asset_dir }, capture_path).await
    }

    async fn load_capture(server_cfg: ServerConfig, capture_path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(capture_path)?;
        let capture = Capture::parse(&bytes)?;
        let summary = capture.summarize();
        tracing::info!(?summary, "loaded capture");

        let ctx = ldi_gpu::Context::builder().high_performance().build().await?;
        let renderer = Renderer::load(&capture, Arc::clone(&ctx), (summary.max_side_px, summary.max_side_px))?;
        let xr = if capture.views.len() == 2 {
            Some(XrSession::request(&capture)?)
        } else {
            None
        };

        Ok(Self(Arc::new(AppInner {
            ctx,
            renderer: Mutex::new(renderer),
            xr: Mutex::new(xr),
            transport: Mutex::new(ChunkTransport::new()),
            summary,
            server_cfg,
            started_at: Instant::now(),
        })))
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/capture/summary", get(summary_handler))
            .route("/ws", get(ws_upgrader(conn_state_machine)))
            .fallback_service(tower_http::services::ServeDir::new(&self.0.server_cfg.asset_dir))
            .layer(log::http_trace_layer())
            .with_state(self)
    }

    async fn create_tcp_listener(&self) -> anyhow::Result<TcpListener> {
        let cfg = &self.0.server_cfg;
        let bind = TcpListener::bind((&*cfg.host, cfg.port)).await?;
        tracing::info!("listening on {}:{}", cfg.host, cfg.port);
        Ok(bind)
    }

    pub async fn listen_and_serve(self) -> anyhow::Result<()> {
        let bind = self.create_tcp_listener().await?;
        axum::serve(bind, self.into_router()).await.map_err(Into::into)
    }

    pub async fn listen_and_serve_until(
        self,
        signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let bind = self.create_tcp_listener().await?;
        axum::serve(bind, self.into_router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(Into::into)
    }

    fn elapsed_secs(&self) -> f32 {
        self.0.started_at.elapsed().as_secs_f32()
    }

    fn is_stereo(&self) -> bool {
        self.0.xr.lock().unwrap().is_some()
    }

    /// Renders one eye from `cam` and returns it PNG-encoded, the blocking
    /// GPU work run on a `spawn_blocking` thread so it never stalls the
    /// tokio runtime the websocket connection lives on.
    async fn render_eye_png(&self, cam: RenderCamera) -> anyhow::Result<Vec<u8>> {
        let app = self.clone();
        let t = self.elapsed_secs();
        tokio::task::spawn_blocking(move || {
            let mut timer = IntervalTimer::new();
            let renderer = app.0.renderer.lock().unwrap();
            renderer.draw(cam, t)?;
            timer.mark("raycast");

            let rgba = renderer.canvas().read_rgba(&app.0.ctx);
            timer.mark("readback");
            let (w, h) = (renderer.canvas().width(), renderer.canvas().height());
            drop(renderer);

            let mut png = Cursor::new(Vec::new());
            image::RgbaImage::from_raw(w, h, rgba)
                .ok_or_else(|| anyhow::anyhow!("canvas readback had the wrong byte length"))?
                .write_to(&mut png, image::ImageFormat::Png)?;
            timer.mark("encode");
            Ok(png.into_inner())
        })
        .await?
    }

    /// Drives one stereo frame from a client-supplied pose and returns the
    /// chunked wire messages for both eyes. Returns an empty vec on the
    /// session's `Initializing` frame, which sizes/seeds the convergence
    /// plane but — per spec.md's state machine — draws nothing.
    async fn render_stereo_frame(&self, left: ldi_core::XrCamera, right: ldi_core::XrCamera, gamepad: GamepadState) -> anyhow::Result<Vec<ServerMessage>> {
        let frame = {
            let mut xr = self.0.xr.lock().unwrap();
            let session = xr.as_mut().ok_or_else(|| anyhow::anyhow!("capture has no stereo views"))?;
            session.on_frame(left, right, gamepad)?
        };
        let (cam_l, cam_r) = match frame {
            XrFrame::Initializing => return Ok(Vec::new()),
            XrFrame::Running(cam_l, cam_r) => (cam_l, cam_r),
        };
        let left_png = self.render_eye_png(cam_l).await?;
        let right_png = self.render_eye_png(cam_r).await?;
        let mut out = chunk_frame("response_left", Eye::Left, &left_png);
        out.extend(chunk_frame("response_right", Eye::Right, &right_png));
        Ok(out)
    }
}

async fn summary_handler(State(app): State<App>) -> Json<CaptureSummary> {
    Json(app.0.summary.clone())
}

/// Per-connection websocket loop: receives pose updates, renders, and
/// streams back chunked frames, matching
/// `stitching_server::app::video::conn_state_machine`'s split send/recv
/// task shape.
async fn conn_state_machine(app: App, socket: axum::extract::ws::WebSocket) {
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerMessage>(32);

    let mut send_task = tokio::spawn(send_loop(rx, sender));
    let mut recv_task = tokio::spawn(recv_loop(app.clone(), receiver, tx.clone()));

    if !app.is_stereo() {
        let mono_tx = tx.clone();
        let mono_app = app.clone();
        let mut mono_task = tokio::spawn(mono_sweep_loop(mono_app, mono_tx));
        tokio::select! {
            _ = (&mut send_task) => { recv_task.abort(); mono_task.abort(); }
            _ = (&mut recv_task) => { send_task.abort(); mono_task.abort(); }
            _ = (&mut mono_task) => { send_task.abort(); recv_task.abort(); }
        }
        return;
    }

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
}

async fn send_loop<S>(mut rx: mpsc::Receiver<ServerMessage>, mut sender: S)
where
    S: SinkExt<Message> + Unpin + Send,
{
    while let Some(msg) = rx.recv().await {
        let Ok(text) = serde_json::to_string(&msg) else { continue };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn recv_loop<R>(app: App, mut receiver: R, tx: mpsc::Sender<ServerMessage>)
where
    R: StreamExt<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(raw) = msg else { continue };
        let parsed: Result<ClientMessage, _> = serde_json::from_str(&raw);
        let Ok(client_msg) = parsed else {
            tracing::warn!("failed to parse client message: {raw}");
            continue;
        };
        match client_msg {
            ClientMessage::Pose { left, right, buttons_pressed } => {
                let gamepad = crate::proto::gamepad_from_wire(buttons_pressed);
                match app.render_stereo_frame(left.into_xr_camera(), right.into_xr_camera(), gamepad).await {
                    Ok(frames) => {
                        for f in frames {
                            if tx.send(f).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(ServerMessage::Error { message: err.to_string() }).await;
                    }
                }
            }
            ClientMessage::MonoPose { .. } | ClientMessage::ResetXr => {
                // Stereo captures drive resets through the gamepad button
                // in `Pose`; mono captures are driven by `mono_sweep_loop`
                // and don't take client-supplied poses at all.
            }
        }
    }
}

/// Drives the renderer from a fixed parametric camera sweep for
/// single-view captures, the "non-XR test scene" fallback §7 requires
/// when there is no XR session to drive the camera from.
async fn mono_sweep_loop(app: App, tx: mpsc::Sender<ServerMessage>) {
    let summary = app.0.summary.clone();
    let radius = (summary.max_side_px as f32 / summary.focal_px_range.1.max(1.0)) * 0.15;
    loop {
        let t = app.elapsed_secs();
        let cam = RenderCamera {
            position: glam::Vec3::new(radius * t.sin(), 0.0, radius * (1.0 - t.cos())),
            slant: glam::Vec2::ZERO,
            skew: glam::Vec2::ZERO,
            roll_degrees: 0.0,
            focal_px: summary.focal_px_range.1.max(1.0),
        };
        match app.render_eye_png(cam).await {
            Ok(png) => {
                for msg in chunk_frame("response_mono", Eye::Mono, &png) {
                    if tx.send(msg).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = tx.send(ServerMessage::Error { message: err.to_string() }).await;
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(33)).await;
    }
}
