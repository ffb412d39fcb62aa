use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PlaybackTimings;
use crate::display::Surface;
use crate::events::{MediaEntry, SessionEnd, SessionOutcome};
use crate::media::{self, FolderRef};
use crate::platform::lock::{LockAction, LockReport};
use crate::tasks::loader::{Drawable, ImageLoader, LoadMode};
use crate::tasks::scanner::{self, DocumentProvider};

/// Collaborators one activation talks to.
#[derive(Clone)]
pub struct Activation {
    pub provider: Arc<dyn DocumentProvider>,
    pub loader: Arc<dyn ImageLoader>,
    pub surface: Arc<dyn Surface>,
    pub lock: Arc<dyn LockAction>,
    pub timings: PlaybackTimings,
}

/// State owned by a single activation.
///
/// `transition_out` is latched: the first call locks and ends the session,
/// every later call does nothing.
#[derive(Debug)]
pub struct PlaybackSession {
    cancel: CancellationToken,
    transitioned: AtomicBool,
    displayed: Option<MediaEntry>,
}

impl PlaybackSession {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            transitioned: AtomicBool::new(false),
            displayed: None,
        }
    }

    pub fn displayed(&self) -> Option<&MediaEntry> {
        self.displayed.as_ref()
    }

    pub fn has_transitioned(&self) -> bool {
        self.transitioned.load(Ordering::Acquire)
    }

    /// Lock the device and end the session. Returns `None` if the session
    /// already transitioned or was torn down.
    pub fn transition_out(&self, lock: &dyn LockAction) -> Option<LockReport> {
        if !self.claim_transition() {
            return None;
        }
        let report = lock.lock_now();
        debug!(outcome = ?report.outcome, "transition out");
        Some(report)
    }

    fn claim_transition(&self) -> bool {
        if self.cancel.is_cancelled() {
            debug!("session torn down; not locking");
            return false;
        }
        if self.transitioned.swap(true, Ordering::AcqRel) {
            debug!("session already transitioned; ignoring");
            return false;
        }
        true
    }

    // Same latch as `transition_out`, with the lock command on the blocking pool.
    async fn finish(self, lock: &Arc<dyn LockAction>, end: SessionEnd) -> SessionOutcome {
        let end = if self.cancel.is_cancelled() {
            SessionEnd::Interrupted
        } else {
            end
        };
        if end.locks() && self.claim_transition() {
            let lock = Arc::clone(lock);
            match tokio::task::spawn_blocking(move || lock.lock_now()).await {
                Ok(report) => debug!(outcome = ?report.outcome, "transition out"),
                Err(err) => warn!(error = %err, "lock task failed"),
            }
        }
        info!(end = ?end, displayed = ?self.displayed.as_ref().map(|e| &e.path), "session finished");
        SessionOutcome {
            displayed: self.displayed,
            end,
        }
    }
}

/// Pick one entry uniformly at random.
pub fn select_entry<'a, R: Rng + ?Sized>(entries: &'a [MediaEntry], rng: &mut R) -> Option<&'a MediaEntry> {
    entries.choose(rng)
}

pub fn load_mode(gif: bool, animated_playback: bool) -> LoadMode {
    match (gif, animated_playback) {
        (true, true) => LoadMode::Animated,
        (true, false) => LoadMode::FirstFrame,
        (false, _) => LoadMode::Static,
    }
}

/// One screensaver activation: scan, pick, show, wait, lock.
///
/// Cancelling `cancel` tears the session down without locking.
#[instrument(skip_all, fields(folder = folder.as_ref().map(FolderRef::as_str)))]
pub async fn run_activation<R: Rng + Send + ?Sized>(
    ctx: &Activation,
    folder: Option<FolderRef>,
    rng: &mut R,
    cancel: CancellationToken,
) -> SessionOutcome {
    let mut session = PlaybackSession::new(cancel.clone());
    let lock = &ctx.lock;

    let probe = Arc::clone(lock);
    let already_locked = select! {
        biased;
        _ = cancel.cancelled() => return session.finish(lock, SessionEnd::Interrupted).await,
        probed = tokio::task::spawn_blocking(move || probe.is_locked()) => probed.unwrap_or_else(|err| {
            warn!(error = %err, "lock probe task failed; assuming unlocked");
            false
        }),
    };
    if already_locked {
        info!("device already locked; ending without display");
        return SessionOutcome {
            displayed: None,
            end: SessionEnd::AlreadyLocked,
        };
    }

    let Some(folder) = folder else {
        info!("no media folder selected");
        return session.finish(lock, SessionEnd::NoFolder).await;
    };

    let entries = select! {
        biased;
        _ = cancel.cancelled() => return session.finish(lock, SessionEnd::Interrupted).await,
        entries = scanner::scan_blocking(Arc::clone(&ctx.provider), folder) => entries,
    };

    let Some(entry) = select_entry(&entries, rng).cloned() else {
        info!("media folder has no images");
        return session.finish(lock, SessionEnd::EmptyFolder).await;
    };
    let gif = media::is_gif(&entry);
    let mode = load_mode(gif, ctx.timings.animated_playback);
    info!(
        path = %entry.path.display(),
        content_type = entry.content_type.as_deref(),
        candidates = entries.len(),
        gif,
        mode = ?mode,
        "selected entry"
    );

    let loaded = select! {
        biased;
        _ = cancel.cancelled() => return session.finish(lock, SessionEnd::Interrupted).await,
        loaded = ctx.loader.load(&entry, mode) => loaded,
    };
    let drawable = match loaded {
        Ok(drawable) => drawable,
        Err(err) => {
            warn!(path = %entry.path.display(), error = %err, "decode failed; ending session");
            return session.finish(lock, SessionEnd::DecodeFailed).await;
        }
    };
    session.displayed = Some(entry);

    let surface = ctx.surface.as_ref();
    let end = match drawable {
        Drawable::Animated(animation) => {
            let safety = ctx.timings.gif_safety_timeout;
            debug!(
                frames = animation.frames().len(),
                duration_ms = animation.duration().as_millis() as u64,
                safety_ms = safety.as_millis() as u64,
                "starting animated playback"
            );
            select! {
                biased;
                _ = cancel.cancelled() => SessionEnd::Interrupted,
                played = animation.play(surface) => match played {
                    Ok(()) => SessionEnd::AnimationCompleted,
                    Err(err) => {
                        warn!(error = %err, "animated playback failed");
                        SessionEnd::DisplayFailed
                    }
                },
                _ = sleep(safety) => {
                    warn!(safety_ms = safety.as_millis() as u64, "animation did not finish before safety timeout");
                    SessionEnd::SafetyTimeout
                }
            }
        }
        Drawable::Still(frame) => {
            if let Err(err) = surface.present(&frame) {
                warn!(error = %err, "display failed; ending session");
                return session.finish(lock, SessionEnd::DisplayFailed).await;
            }
            let (dwell, end) = if gif {
                (ctx.timings.gif_fallback_dwell, SessionEnd::GifFallbackElapsed)
            } else {
                (ctx.timings.static_dwell, SessionEnd::StaticDwellElapsed)
            };
            select! {
                biased;
                _ = cancel.cancelled() => SessionEnd::Interrupted,
                _ = sleep(dwell) => end,
            }
        }
    };

    session.finish(lock, end).await
}
