//! Frame routing between capture, the expensive path, and the display.
//!
//! Contexts, each a named thread:
//! - the caller of [`FrameRouter::on_frame`] (capture) converts and shows
//!   the passthrough view, then claims the in-flight slot
//! - `pose-worker` zooms and either runs local inference or packs the wire
//!   message, strictly one frame at a time
//! - `net-send` owns every write to the server (remote mode)
//! - `net-recv` decodes returned images (remote mode, see `net`)
//! - `presenter` owns the display surface
//!
//! The in-flight guard travels with the frame and is dropped once the
//! frame is rendered (local) or written to the socket (remote).

use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use frame_wire::RawFrameMessage;
use image::RgbImage;
use tracing::{debug, info, warn};

use super::controls::{Controls, FrameConfig};
use super::inflight::{InFlight, InFlightGuard};
use crate::diagnostics::{DropReason, PipelineSnapshot, PipelineStats};
use crate::display::{DisplaySurface, View};
use crate::error::{PipelineError, Result};
use crate::frame::codec::{nv21_to_rgb, pack_nv21};
use crate::frame::zoom::{is_identity, zoom_nv21, zoom_rgb};
use crate::frame::{EncodedImage, PlanarImage, RawFrame};
use crate::net::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::pose::backend::BackendHandle;
use crate::pose::decoder::decode;
use crate::pose::suppression::suppress;
use crate::pose::InferenceBackend;
use crate::render::render;

/// Images waiting for the presenter before new ones are dropped.
const PRESENT_QUEUE: usize = 4;

/// Where the expensive path runs.
pub enum InferenceMode {
    /// Run the model on this machine and draw the overlay here.
    Local(Box<dyn InferenceBackend>),
    /// Ship packed frames to a pose server and show what it returns.
    Remote(ConnectionConfig),
}

type Presentation = (View, Arc<RgbImage>);

enum Job {
    Local {
        image: Arc<RgbImage>,
        config: FrameConfig,
        captured_at_us: u64,
        guard: InFlightGuard,
    },
    Remote {
        frame: RawFrame,
        config: FrameConfig,
        guard: InFlightGuard,
    },
}

struct Outgoing {
    message: RawFrameMessage,
    _guard: InFlightGuard,
}

struct RouterInner {
    controls: Arc<Controls>,
    in_flight: Arc<InFlight>,
    stats: Arc<Mutex<PipelineStats>>,
    jobs: Mutex<Option<SyncSender<Job>>>,
    presenter: Mutex<Option<SyncSender<Presentation>>>,
    remote: bool,
}

/// Capture-side entry point. Cheap to clone; hand one to each frame source.
#[derive(Clone)]
pub struct FrameRouter {
    inner: Arc<RouterInner>,
}

impl FrameRouter {
    /// Pack a captured planar image and route it.
    pub fn on_planar(&self, image: &PlanarImage<'_>, timestamp_us: u64) {
        match pack_nv21(image, timestamp_us) {
            Ok(frame) => self.on_frame(frame),
            Err(e) => {
                let mut stats = self.inner.stats.lock();
                stats.record_captured();
                stats.record_drop(DropReason::Encode);
                debug!("dropping frame: {e}");
            }
        }
    }

    /// Route one packed frame: always show it, and start the expensive path
    /// if nothing else is in flight.
    pub fn on_frame(&self, frame: RawFrame) {
        let config = self.inner.controls.frame_config();
        let captured_at_us = {
            let mut stats = self.inner.stats.lock();
            stats.record_captured();
            stats.now_us()
        };

        let rgb = nv21_to_rgb(&frame);
        let zoomed = if is_identity(config.zoom) {
            Ok(rgb)
        } else {
            zoom_rgb(&rgb, config.zoom).map(Cow::into_owned)
        };
        let passthrough = match zoomed {
            Ok(image) => Arc::new(image),
            Err(e) => {
                self.inner.stats.lock().record_drop(DropReason::Encode);
                debug!("dropping frame: {e}");
                return;
            }
        };
        self.present(View::Passthrough, Arc::clone(&passthrough));

        let Some(guard) = self.inner.in_flight.try_claim() else {
            self.inner.stats.lock().record_drop(DropReason::Busy);
            return;
        };

        let job = if self.inner.remote {
            Job::Remote {
                frame,
                config,
                guard,
            }
        } else {
            Job::Local {
                image: passthrough,
                config,
                captured_at_us,
                guard,
            }
        };
        self.dispatch(job);
    }

    fn dispatch(&self, job: Job) {
        let jobs = self.inner.jobs.lock();
        let Some(tx) = jobs.as_ref() else {
            return;
        };
        // The slot admits one job at a time, so the queue of one is never
        // full. A rejected job drops its guard.
        if let Err(TrySendError::Disconnected(_)) = tx.try_send(job) {
            debug!("pose worker gone, frame dropped");
        }
    }

    fn present(&self, view: View, image: Arc<RgbImage>) {
        let presenter = self.inner.presenter.lock();
        let Some(tx) = presenter.as_ref() else {
            return;
        };
        if let Err(TrySendError::Full(_)) = tx.try_send((view, image)) {
            self.inner.stats.lock().record_drop(DropReason::Display);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.is_busy()
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.inner.stats.lock().snapshot()
    }

    fn record_drop(&self, reason: DropReason) {
        self.inner.stats.lock().record_drop(reason);
    }
}

/// A running pipeline and its worker threads.
pub struct Pipeline {
    router: FrameRouter,
    connection: Option<Arc<ConnectionManager>>,
    workers: Vec<JoinHandle<()>>,
    presenter: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the workers for `mode` and start presenting on `display`.
    pub fn start(
        mode: InferenceMode,
        controls: Arc<Controls>,
        display: Box<dyn DisplaySurface>,
    ) -> Result<Self> {
        let (present_tx, present_rx) = mpsc::sync_channel::<Presentation>(PRESENT_QUEUE);
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);

        let router = FrameRouter {
            inner: Arc::new(RouterInner {
                controls,
                in_flight: InFlight::new(),
                stats: Arc::new(Mutex::new(PipelineStats::new())),
                jobs: Mutex::new(Some(job_tx)),
                presenter: Mutex::new(Some(present_tx)),
                remote: matches!(mode, InferenceMode::Remote(_)),
            }),
        };

        let presenter = spawn("presenter", move || run_presenter(display, present_rx))?;
        let mut pipeline = Self {
            router: router.clone(),
            connection: None,
            workers: Vec::new(),
            presenter: Some(presenter),
        };

        match mode {
            InferenceMode::Local(backend) => {
                let handle = BackendHandle::new(backend);
                let worker_router = router.clone();
                pipeline.workers.push(spawn("pose-worker", move || {
                    run_local_worker(worker_router, handle, job_rx)
                })?);
                info!("pipeline started with local inference");
            }
            InferenceMode::Remote(config) => {
                let addr = config.addr();
                let receive_router = router.clone();
                let connection = Arc::new(ConnectionManager::new(
                    config,
                    Arc::new(move |image| on_server_image(&receive_router, image)),
                ));

                let (send_tx, send_rx) = mpsc::sync_channel::<Outgoing>(1);
                let sender_connection = Arc::clone(&connection);
                let sender_router = router.clone();
                pipeline.workers.push(spawn("net-send", move || {
                    run_sender(sender_router, sender_connection, send_rx)
                })?);

                let worker_router = router.clone();
                pipeline.workers.push(spawn("pose-worker", move || {
                    run_remote_worker(worker_router, job_rx, send_tx)
                })?);

                pipeline.connection = Some(connection);
                info!("pipeline started against pose server {addr}");
            }
        }

        Ok(pipeline)
    }

    pub fn router(&self) -> FrameRouter {
        self.router.clone()
    }

    pub fn on_frame(&self, frame: RawFrame) {
        self.router.on_frame(frame);
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.router.stats()
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.router.inner.controls
    }

    /// `None` in local mode.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.as_ref().map(|c| c.state())
    }

    /// Stop accepting frames, close the connection, drain the workers and
    /// the backend, then stop the presenter. Idempotent.
    ///
    /// The connection goes first: closing shuts the socket down, which
    /// releases a `net-send` blocked on a server that stopped reading.
    pub fn shutdown(&mut self) {
        if self.presenter.is_none() {
            return;
        }
        self.router.inner.jobs.lock().take();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.router.inner.presenter.lock().take();
        if let Some(presenter) = self.presenter.take() {
            let _ = presenter.join();
        }
        info!("pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn(name: &str, work: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map_err(|source| PipelineError::Spawn {
            name: name.to_string(),
            source,
        })
}

fn run_presenter(mut display: Box<dyn DisplaySurface>, rx: Receiver<Presentation>) {
    for (view, image) in rx {
        display.present(view, image);
    }
    debug!("presenter exiting");
}

fn run_local_worker(router: FrameRouter, mut backend: BackendHandle, jobs: Receiver<Job>) {
    for job in jobs {
        let Job::Local {
            image,
            config,
            captured_at_us,
            guard,
        } = job
        else {
            continue;
        };

        match annotate(&mut backend, &image, &config) {
            Ok(annotated) => {
                router.inner.stats.lock().record_processed(captured_at_us);
                router.present(View::Processed, annotated);
            }
            Err(e) => {
                router.record_drop(DropReason::Inference);
                log_drop(&e);
            }
        }
        drop(guard);
    }
    backend.close();
    debug!("pose worker exiting");
}

/// Run the model on `image` and draw what it finds. With every overlay
/// switched off the model is skipped and the image shown as is.
fn annotate(
    backend: &mut BackendHandle,
    image: &Arc<RgbImage>,
    config: &FrameConfig,
) -> Result<Arc<RgbImage>> {
    if !config.render.draws_anything() {
        return Ok(Arc::clone(image));
    }
    let tensor = backend.run(image)?;
    let detections = suppress(decode(&tensor));
    debug!("{} detections", detections.len());
    Ok(Arc::new(render(image, detections.as_slice(), &config.render)))
}

fn run_remote_worker(router: FrameRouter, jobs: Receiver<Job>, outgoing: SyncSender<Outgoing>) {
    for job in jobs {
        let Job::Remote {
            frame,
            config,
            guard,
        } = job
        else {
            continue;
        };

        let frame = match zoom_nv21(frame, config.zoom) {
            Ok(frame) => frame,
            Err(e) => {
                router.record_drop(DropReason::Encode);
                log_drop(&e);
                continue;
            }
        };
        let message = RawFrameMessage::new(frame.into_data(), config.ml_enabled);
        let next = Outgoing {
            message,
            _guard: guard,
        };
        if outgoing.try_send(next).is_err() {
            router.record_drop(DropReason::Disconnected);
        }
    }
    debug!("pose worker exiting");
}

fn run_sender(router: FrameRouter, connection: Arc<ConnectionManager>, outgoing: Receiver<Outgoing>) {
    for next in outgoing {
        if let Err(e) = connection.reconnect_if_due() {
            router.record_drop(DropReason::Disconnected);
            log_drop(&e);
            continue;
        }
        match connection.send(&next.message) {
            Ok(()) => router
                .inner
                .stats
                .lock()
                .record_sent(next.message.payload.len()),
            Err(e) => {
                router.record_drop(DropReason::Disconnected);
                log_drop(&e);
            }
        }
    }
    debug!("net sender exiting");
}

fn on_server_image(router: &FrameRouter, image: EncodedImage) {
    let bytes = image.len();
    match image.decode() {
        Ok(decoded) => {
            router.inner.stats.lock().record_received(bytes);
            router.present(View::Processed, Arc::new(decoded));
        }
        Err(e) => {
            router.record_drop(DropReason::Decode);
            log_drop(&e);
        }
    }
}

/// Errors confined to one frame repeat at frame rate, so they stay at debug.
/// Anything else means the pipeline itself is degraded.
fn log_drop(e: &PipelineError) {
    match e {
        PipelineError::NotConnected => debug!("not connected, frame dropped"),
        e if e.is_per_frame() => debug!("frame dropped: {e}"),
        e => warn!("frame dropped: {e}"),
    }
}
