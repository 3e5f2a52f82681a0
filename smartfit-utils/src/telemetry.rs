//! Stage timing for the try-on pipeline.
//!
//! A [`StageTimer`] measures one pipeline stage (decode, inference, fitting,
//! compositing, encode) and logs the elapsed time under the
//! `smartfit::telemetry` target when it goes out of scope. Timers are inert
//! unless telemetry was switched on with [`configure`] and the logger accepts
//! the requested level, so leaving them in hot paths costs one atomic load.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

pub const TELEMETRY_TARGET: &str = "smartfit::telemetry";

static ENABLED: AtomicBool = AtomicBool::new(false);
static MAX_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Logs the lifetime of a pipeline stage on drop.
pub struct StageTimer {
    stage: Cow<'static, str>,
    level: Level,
    started: Instant,
    armed: bool,
}

impl StageTimer {
    /// Returns `true` when the timer will log on drop.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the timer without logging and return the measured duration.
    pub fn stop(mut self) -> Duration {
        self.armed = false;
        self.started.elapsed()
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if self.armed {
            log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} took {:.2?}",
                self.stage,
                self.started.elapsed()
            );
        }
    }
}

/// Start timing `stage`; the result is logged at `level` when the timer drops.
pub fn timing_guard(stage: impl Into<Cow<'static, str>>, level: Level) -> StageTimer {
    let armed = telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    StageTimer {
        stage: stage.into(),
        level,
        started: Instant::now(),
        armed,
    }
}

/// Switch stage telemetry on or off and set the most verbose level it emits.
pub fn configure(enabled: bool, level: LevelFilter) {
    ENABLED.store(enabled, Ordering::Relaxed);
    MAX_LEVEL.store(level as usize as u8, Ordering::Relaxed);
}

pub fn telemetry_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// `true` when telemetry is on and `level` is within the configured ceiling.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && (level as usize as u8) <= MAX_LEVEL.load(Ordering::Relaxed)
}
