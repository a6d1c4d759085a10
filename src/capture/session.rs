use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::Result;
use crate::frame::PlanarImage;

/// Callback type for reporting capture errors.
/// Arguments: (source_name, error_message).
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Receives every captured frame on the capture thread. The planes are only
/// valid for the duration of the call.
pub type FrameCallback = Arc<dyn Fn(&PlanarImage<'_>, u64) + Send + Sync>;

/// A camera, or anything that produces planar frames on demand.
pub trait FrameSource: Send {
    /// Capture one frame and hand it to `deliver` with its timestamp in
    /// microseconds. Returns `Ok(false)` once the source has no more frames.
    fn capture(&mut self, deliver: &mut dyn FnMut(&PlanarImage<'_>, u64)) -> Result<bool>;
}

/// Configuration for the frame watchdog timer.
struct WatchdogConfig {
    /// Maximum time to wait for the capture loop to set `running = true`.
    startup_timeout: Duration,
    /// Time to wait for the first frame after the loop is running.
    frame_timeout: Duration,
    /// Poll interval for the watchdog thread.
    poll_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            frame_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Active capture session driving one frame source.
pub struct CaptureSession {
    name: String,
    running: Arc<AtomicBool>,
    /// Signals the capture loop and the watchdog to exit.
    shutdown: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Start pulling frames from `source` at up to `fps`, delivering each
    /// to `on_frame` on a `capture-<name>` thread.
    ///
    /// If `on_error` is provided, it is called with `(name, error_msg)` when
    /// the source fails or the watchdog sees no frames.
    pub fn start(
        name: String,
        source: Box<dyn FrameSource>,
        fps: f32,
        on_frame: FrameCallback,
        on_error: Option<ErrorCallback>,
    ) -> std::io::Result<Self> {
        Self::start_with_watchdog(name, source, fps, on_frame, on_error, WatchdogConfig::default())
    }

    fn start_with_watchdog(
        name: String,
        source: Box<dyn FrameSource>,
        fps: f32,
        on_frame: FrameCallback,
        on_error: Option<ErrorCallback>,
        watchdog_config: WatchdogConfig,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let frame_interval = Duration::from_secs_f32(1.0 / fps.max(1.0));

        // Clone on_error for the watchdog; the capture thread gets the original
        let on_error_wd = on_error.clone();

        let thread = {
            let name = name.clone();
            let running = Arc::clone(&running);
            let shutdown = Arc::clone(&shutdown);
            let frames = Arc::clone(&frames);
            std::thread::Builder::new()
                .name(format!("capture-{name}"))
                .spawn(move || {
                    info!("capture thread starting for {name}");
                    Self::run_capture(
                        &name,
                        source,
                        frame_interval,
                        &on_frame,
                        on_error.as_ref(),
                        &running,
                        &shutdown,
                        &frames,
                    );
                    info!("capture thread exiting for {name}");
                })?
        };

        let mut session = Self {
            name,
            running,
            shutdown,
            frames,
            thread: Some(thread),
            watchdog: None,
        };

        let watchdog = {
            let name = session.name.clone();
            let running = Arc::clone(&session.running);
            let shutdown = Arc::clone(&session.shutdown);
            let frames = Arc::clone(&session.frames);
            std::thread::Builder::new()
                .name(format!("watchdog-{name}"))
                .spawn(move || {
                    Self::run_watchdog_with_config(
                        &name,
                        &frames,
                        &running,
                        &shutdown,
                        on_error_wd.as_ref(),
                        watchdog_config,
                    );
                })
        };
        match watchdog {
            Ok(handle) => session.watchdog = Some(handle),
            Err(e) => {
                session.stop();
                return Err(e);
            }
        }

        Ok(session)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_capture(
        name: &str,
        mut source: Box<dyn FrameSource>,
        frame_interval: Duration,
        on_frame: &FrameCallback,
        on_error: Option<&ErrorCallback>,
        running: &AtomicBool,
        shutdown: &AtomicBool,
        frames: &AtomicU64,
    ) {
        running.store(true, Ordering::Relaxed);
        while !shutdown.load(Ordering::Relaxed) && running.load(Ordering::Relaxed) {
            let started = Instant::now();
            let mut deliver = |image: &PlanarImage<'_>, timestamp_us: u64| {
                frames.fetch_add(1, Ordering::Relaxed);
                on_frame(image, timestamp_us);
            };
            match source.capture(&mut deliver) {
                Ok(true) => {}
                Ok(false) => {
                    info!("source {name} has no more frames");
                    break;
                }
                Err(e) => {
                    error!("capture failed for {name}: {e}");
                    if let Some(cb) = on_error {
                        cb(name, &e.to_string());
                    }
                    break;
                }
            }
            if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        running.store(false, Ordering::Relaxed);
    }

    /// Check if the capture session is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames delivered so far.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Watchdog: waits for the capture loop to start running, then checks
    /// that frames arrive within `frame_timeout`. Fires `on_error` and stops
    /// the session if the source produces no frames.
    fn run_watchdog_with_config(
        name: &str,
        frames: &AtomicU64,
        running: &AtomicBool,
        shutdown: &AtomicBool,
        on_error: Option<&ErrorCallback>,
        config: WatchdogConfig,
    ) {
        let WatchdogConfig {
            startup_timeout,
            frame_timeout,
            poll_interval,
        } = config;
        // Phase 1: wait for `running` to become true
        let start = Instant::now();
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            if running.load(Ordering::Relaxed) {
                break;
            }
            if start.elapsed() >= startup_timeout {
                // Loop never started; the capture thread reports its own error
                return;
            }
            std::thread::sleep(poll_interval);
        }

        // Phase 2: wait for at least one frame within frame_timeout
        let deadline = Instant::now() + frame_timeout;
        loop {
            if shutdown.load(Ordering::Relaxed) || !running.load(Ordering::Relaxed) {
                return;
            }
            if frames.load(Ordering::Relaxed) > 0 {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "watchdog: no frames received within {}ms for {name}",
                    frame_timeout.as_millis()
                );
                if let Some(cb) = on_error {
                    cb(
                        name,
                        &format!(
                            "Source produces no frames ({}ms timeout)",
                            frame_timeout.as_millis()
                        ),
                    );
                }
                running.store(false, Ordering::Relaxed);
                return;
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Stop the capture session. Idempotent: calling stop twice does not panic.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::frame::Plane;
    use parking_lot::Mutex;

    /// Emits `remaining` tiny frames, then ends.
    struct CountdownSource {
        remaining: u32,
    }

    impl FrameSource for CountdownSource {
        fn capture(&mut self, deliver: &mut dyn FnMut(&PlanarImage<'_>, u64)) -> Result<bool> {
            if self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            let y = [16u8; 4];
            let uv = [128u8; 1];
            deliver(
                &PlanarImage {
                    width: 2,
                    height: 2,
                    y: Plane::new(&y, 2, 1),
                    u: Plane::new(&uv, 1, 1),
                    v: Plane::new(&uv, 1, 1),
                },
                u64::from(self.remaining),
            );
            Ok(true)
        }
    }

    /// Never delivers a frame.
    struct SilentSource;

    impl FrameSource for SilentSource {
        fn capture(&mut self, _deliver: &mut dyn FnMut(&PlanarImage<'_>, u64)) -> Result<bool> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(true)
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn capture(&mut self, _deliver: &mut dyn FnMut(&PlanarImage<'_>, u64)) -> Result<bool> {
            Err(PipelineError::Capture("sensor unplugged".to_string()))
        }
    }

    fn ignore_frames() -> FrameCallback {
        Arc::new(|_: &PlanarImage<'_>, _: u64| {})
    }

    /// Short durations for watchdog tests, keeping tests under 200ms.
    fn fast_watchdog() -> WatchdogConfig {
        WatchdogConfig {
            startup_timeout: Duration::from_millis(50),
            frame_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn recording_callback() -> (ErrorCallback, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let cb: ErrorCallback = Arc::new(move |_name: &str, message: &str| {
            sink.lock().push(message.to_string());
        });
        (cb, messages)
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn delivers_every_frame_then_stops() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = CaptureSession::start(
            "countdown".to_string(),
            Box::new(CountdownSource { remaining: 3 }),
            200.0,
            Arc::new(move |image: &PlanarImage<'_>, ts: u64| {
                sink.lock().push((image.width, ts))
            }),
            None,
        )
        .unwrap();

        assert!(wait_until(|| !session.is_running() && session.frame_count() == 3));
        assert_eq!(*seen.lock(), vec![(2, 2), (2, 1), (2, 0)]);
    }

    #[test]
    fn source_error_is_reported_and_ends_session() {
        let (on_error, messages) = recording_callback();
        let mut session = CaptureSession::start(
            "broken".to_string(),
            Box::new(FailingSource),
            30.0,
            ignore_frames(),
            Some(on_error),
        )
        .unwrap();

        assert!(wait_until(|| !messages.lock().is_empty()));
        assert!(messages.lock()[0].contains("sensor unplugged"));
        session.stop();
        assert!(!session.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut session = CaptureSession::start(
            "silent".to_string(),
            Box::new(SilentSource),
            30.0,
            ignore_frames(),
            None,
        )
        .unwrap();
        session.stop();
        session.stop(); // Should not panic
        assert!(!session.is_running());
        assert_eq!(session.name(), "silent");
    }

    #[test]
    fn watchdog_stops_silent_source() {
        let (on_error, messages) = recording_callback();
        let session = CaptureSession::start_with_watchdog(
            "silent".to_string(),
            Box::new(SilentSource),
            30.0,
            ignore_frames(),
            Some(on_error),
            fast_watchdog(),
        )
        .unwrap();

        assert!(wait_until(|| !session.is_running()));
        assert!(wait_until(|| !messages.lock().is_empty()));
        assert!(messages.lock()[0].contains("no frames"));
    }

    #[test]
    fn error_callback_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ErrorCallback>();
        assert_send_sync::<FrameCallback>();
    }

    #[test]
    fn watchdog_does_not_fire_when_frames_arrive() {
        let frames = AtomicU64::new(1);
        let running = AtomicBool::new(true);
        let shutdown = AtomicBool::new(false);
        let (on_error, messages) = recording_callback();

        CaptureSession::run_watchdog_with_config(
            "test",
            &frames,
            &running,
            &shutdown,
            Some(&on_error),
            fast_watchdog(),
        );

        assert!(messages.lock().is_empty());
        assert!(running.load(Ordering::Relaxed));
    }

    #[test]
    fn watchdog_fires_when_no_frames_arrive() {
        let frames = AtomicU64::new(0);
        let running = AtomicBool::new(true);
        let shutdown = AtomicBool::new(false);
        let (on_error, messages) = recording_callback();

        CaptureSession::run_watchdog_with_config(
            "test",
            &frames,
            &running,
            &shutdown,
            Some(&on_error),
            fast_watchdog(),
        );

        assert_eq!(messages.lock().len(), 1);
        assert!(!running.load(Ordering::Relaxed));
    }

    #[test]
    fn watchdog_exits_early_when_shutdown_signalled() {
        let frames = AtomicU64::new(0);
        let running = AtomicBool::new(false);
        let shutdown = AtomicBool::new(true);
        let (on_error, messages) = recording_callback();

        CaptureSession::run_watchdog_with_config(
            "test",
            &frames,
            &running,
            &shutdown,
            Some(&on_error),
            fast_watchdog(),
        );

        assert!(messages.lock().is_empty());
    }

    #[test]
    fn watchdog_exits_if_loop_never_starts() {
        let frames = AtomicU64::new(0);
        let running = AtomicBool::new(false);
        let shutdown = AtomicBool::new(false);
        let (on_error, messages) = recording_callback();

        CaptureSession::run_watchdog_with_config(
            "test",
            &frames,
            &running,
            &shutdown,
            Some(&on_error),
            fast_watchdog(),
        );

        // Never ran; watchdog exits via startup timeout, not via error
        assert!(messages.lock().is_empty());
    }
}
