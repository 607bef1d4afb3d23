use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    events::{SceneBus, SceneEvent, QUALITY_CHANGED},
    Clock, PerformanceConfig, QualityLevel, QualitySettings,
};

/// Bounded sliding window of frame durations. Pushing past capacity evicts
/// the oldest sample.
#[derive(Debug, Clone)]
pub struct FrameWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean frame duration in milliseconds, or zero for an empty window.
    pub fn mean_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        (total.as_secs_f64() * 1000.0 / self.samples.len() as f64) as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Snapshot of what the controller measured at its last evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub fps: f32,
    pub avg_frame_ms: f32,
    pub level: QualityLevel,
    pub auto_adjust: bool,
    pub frames_measured: u64,
}

/// Measures frame cost and steps the active [`QualityLevel`] one level at a
/// time when the measured frame rate leaves the configured band.
///
/// Every level change, automatic or manual, is published on the bus under
/// [`QUALITY_CHANGED`].
pub struct QualityController {
    config: PerformanceConfig,
    clock: Arc<dyn Clock>,
    bus: SceneBus,
    level: QualityLevel,
    auto_adjust: bool,
    window: FrameWindow,
    frame_start: Option<Duration>,
    frames_in_interval: u32,
    interval_start: Duration,
    fps: f32,
    frames_measured: u64,
}

impl QualityController {
    pub fn new(config: PerformanceConfig, clock: Arc<dyn Clock>, bus: SceneBus) -> Self {
        let interval_start = clock.now();
        Self {
            level: config.initial_quality,
            auto_adjust: config.auto_adjust,
            window: FrameWindow::new(config.sample_capacity),
            // Nothing has been measured yet; report the target rather than
            // dividing by an empty interval.
            fps: config.target_fps,
            frame_start: None,
            frames_in_interval: 0,
            interval_start,
            frames_measured: 0,
            config,
            clock,
            bus,
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Some(self.clock.now());
    }

    /// Closes the frame opened by [`begin_frame`](Self::begin_frame) and, once
    /// an evaluation interval has elapsed, re-evaluates the quality level.
    /// Returns the new level when an automatic transition happened.
    pub fn end_frame(&mut self) -> Option<QualityLevel> {
        let now = self.clock.now();
        let Some(start) = self.frame_start.take() else {
            tracing::debug!("end_frame called without a matching begin_frame");
            return None;
        };

        self.window.push(now.saturating_sub(start));
        self.frames_in_interval += 1;
        self.frames_measured += 1;

        if now.saturating_sub(self.interval_start) >= self.config.evaluation_interval() {
            self.evaluate(now)
        } else {
            None
        }
    }

    /// Restarts the evaluation interval, discarding partial counts. Used after
    /// the loop has been paused so the idle span does not read as a stall.
    pub fn restart_interval(&mut self) {
        self.interval_start = self.clock.now();
        self.frames_in_interval = 0;
        self.frame_start = None;
    }

    /// Applies `level` immediately, bypassing the thresholds. The change event
    /// is published even when `level` is already active.
    pub fn set_quality(&mut self, level: QualityLevel) {
        self.apply(level, "manual");
    }

    /// Parses `name` and applies it. Unknown names are logged and ignored.
    pub fn set_quality_named(&mut self, name: &str) -> bool {
        match name.parse::<QualityLevel>() {
            Ok(level) => {
                self.set_quality(level);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring quality request");
                false
            }
        }
    }

    pub fn set_auto_adjust(&mut self, enabled: bool) {
        if self.auto_adjust != enabled {
            tracing::info!(enabled, "automatic quality adjustment toggled");
        }
        self.auto_adjust = enabled;
    }

    pub fn auto_adjust(&self) -> bool {
        self.auto_adjust
    }

    pub fn level(&self) -> QualityLevel {
        self.level
    }

    pub fn settings(&self) -> QualitySettings {
        self.level.settings()
    }

    /// Frame rate measured at the last evaluation, or the target frame rate
    /// before the first interval has elapsed.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn average_frame_ms(&self) -> f32 {
        self.window.mean_ms()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            fps: self.fps,
            avg_frame_ms: self.window.mean_ms(),
            level: self.level,
            auto_adjust: self.auto_adjust,
            frames_measured: self.frames_measured,
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    fn evaluate(&mut self, now: Duration) -> Option<QualityLevel> {
        let elapsed = now.saturating_sub(self.interval_start);
        self.fps = (f64::from(self.frames_in_interval) / elapsed.as_secs_f64()) as f32;
        self.frames_in_interval = 0;
        self.interval_start = now;

        let avg_frame_ms = self.window.mean_ms();
        tracing::debug!(
            fps = self.fps,
            avg_frame_ms,
            level = %self.level,
            "performance evaluation"
        );

        if !self.auto_adjust {
            return None;
        }

        let config = &self.config;
        let next = if self.fps < config.min_fps && avg_frame_ms > config.downgrade_frame_ms {
            self.level.lower()
        } else if self.fps >= config.target_fps && avg_frame_ms < config.upgrade_frame_ms {
            self.level.higher()
        } else {
            self.level
        };

        if next == self.level {
            return None;
        }
        self.apply(next, "auto");
        Some(next)
    }

    fn apply(&mut self, level: QualityLevel, reason: &'static str) {
        tracing::info!(from = %self.level, to = %level, reason, "quality level applied");
        self.level = level;
        self.bus.emit(
            QUALITY_CHANGED,
            &SceneEvent::QualityChanged {
                level,
                settings: level.settings(),
            },
        );
    }
}

impl fmt::Debug for QualityController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityController")
            .field("level", &self.level)
            .field("auto_adjust", &self.auto_adjust)
            .field("fps", &self.fps)
            .field("window", &self.window.len())
            .field("frames_measured", &self.frames_measured)
            .finish()
    }
}
