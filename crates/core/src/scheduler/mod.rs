use std::{fmt, sync::Arc, time::Duration};

use crate::{
    events::{SceneBus, SceneEvent, LOOP_PAUSED, LOOP_RESUMED},
    Clock, PerformanceConfig, QualityController, QualityLevel, QualitySettings, Result,
};

/// Largest frame delta handed to systems. Longer gaps (a backgrounded tab, a
/// debugger stop) are reported as this value.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

/// Per-frame inputs shared by every system and the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub frame: u64,
    pub delta: Duration,
    /// Scene time: the sum of all deltas, excluding paused spans.
    pub elapsed: Duration,
    pub quality: QualityLevel,
    pub settings: QualitySettings,
}

impl FrameContext {
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }
}

/// Idempotent per-frame state update (camera, lighting, scene objects).
pub trait FrameSystem {
    fn name(&self) -> &str;

    fn update(&mut self, ctx: &FrameContext);
}

/// The rendering pass whose cost is measured each frame.
pub trait FrameRenderer {
    fn render(&mut self, ctx: &FrameContext) -> Result<()>;
}

/// Renderer that draws nothing. Useful when only the scene state matters.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl FrameRenderer for NullRenderer {
    fn render(&mut self, _ctx: &FrameContext) -> Result<()> {
        Ok(())
    }
}

/// Proof that the loop is currently registered with the host. Dropping it is
/// what stops further frames from running.
#[derive(Debug)]
struct LoopRegistration {
    generation: u64,
}

/// Summary of a frame that actually ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub delta: Duration,
    pub generation: u64,
    /// Quality level the controller moved to at the end of this frame.
    pub transition: Option<QualityLevel>,
}

/// Drives one update/render pass per display refresh and feeds its cost to
/// the [`QualityController`].
pub struct FrameScheduler {
    clock: Arc<dyn Clock>,
    bus: SceneBus,
    controller: QualityController,
    systems: Vec<Box<dyn FrameSystem>>,
    renderer: Box<dyn FrameRenderer>,
    registration: Option<LoopRegistration>,
    generations: u64,
    frame: u64,
    last_tick: Option<Duration>,
    elapsed: Duration,
}

impl FrameScheduler {
    /// Creates a scheduler that is already running.
    pub fn new(config: PerformanceConfig, clock: Arc<dyn Clock>, bus: SceneBus) -> Self {
        let controller = QualityController::new(config, Arc::clone(&clock), bus.clone());
        Self {
            clock,
            bus,
            controller,
            systems: Vec::new(),
            renderer: Box::new(NullRenderer),
            registration: Some(LoopRegistration { generation: 1 }),
            generations: 1,
            frame: 0,
            last_tick: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Appends a system. Systems run in the order they were added.
    pub fn add_system(&mut self, system: Box<dyn FrameSystem>) {
        tracing::debug!(system = system.name(), "frame system registered");
        self.systems.push(system);
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn FrameRenderer>) {
        self.renderer = renderer;
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Host per-refresh callback. Returns `None` without touching any system
    /// while the loop is paused.
    pub fn on_refresh(&mut self) -> Option<FrameReport> {
        let generation = self.registration.as_ref()?.generation;

        self.controller.begin_frame();
        let now = self.clock.now();
        let delta = match self.last_tick {
            Some(last) => now.saturating_sub(last).min(MAX_FRAME_DELTA),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        self.elapsed += delta;
        self.frame += 1;

        let ctx = FrameContext {
            frame: self.frame,
            delta,
            elapsed: self.elapsed,
            quality: self.controller.level(),
            settings: self.controller.settings(),
        };
        for system in &mut self.systems {
            system.update(&ctx);
        }
        if let Err(err) = self.renderer.render(&ctx) {
            tracing::warn!(frame = self.frame, error = %err, "render pass failed");
        }

        let transition = self.controller.end_frame();
        Some(FrameReport {
            frame: self.frame,
            delta,
            generation,
            transition,
        })
    }

    /// Cancels the loop registration. No frame runs until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        let Some(registration) = self.registration.take() else {
            tracing::debug!("pause requested while already paused");
            return;
        };
        tracing::info!(
            generation = registration.generation,
            frame = self.frame,
            "render loop paused"
        );
        drop(registration);
        self.bus.emit(LOOP_PAUSED, &SceneEvent::LoopPaused);
    }

    /// Registers a fresh loop. The paused span is neither reported as frame
    /// delta nor counted against the frame rate.
    pub fn resume(&mut self) {
        if self.registration.is_some() {
            tracing::debug!("resume requested while already running");
            return;
        }
        self.generations += 1;
        self.registration = Some(LoopRegistration {
            generation: self.generations,
        });
        self.last_tick = None;
        self.controller.restart_interval();
        tracing::info!(generation = self.generations, "render loop resumed");
        self.bus.emit(LOOP_RESUMED, &SceneEvent::LoopResumed);
    }

    pub fn is_running(&self) -> bool {
        self.registration.is_some()
    }

    pub fn set_quality(&mut self, level: QualityLevel) {
        self.controller.set_quality(level);
    }

    pub fn set_quality_named(&mut self, name: &str) -> bool {
        self.controller.set_quality_named(name)
    }

    pub fn set_auto_adjust(&mut self, enabled: bool) {
        self.controller.set_auto_adjust(enabled);
    }

    pub fn quality(&self) -> &QualityController {
        &self.controller
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn bus(&self) -> &SceneBus {
        &self.bus
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("running", &self.is_running())
            .field("frame", &self.frame)
            .field("systems", &self.system_names())
            .field("controller", &self.controller)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::handler, ManualClock, SceneError};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl FrameSystem for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, ctx: &FrameContext) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, ctx.frame));
        }
    }

    /// Renderer whose cost is simulated by advancing the manual clock.
    struct CostlyRenderer {
        clock: ManualClock,
        cost_ms: f64,
        fail: bool,
    }

    impl FrameRenderer for CostlyRenderer {
        fn render(&mut self, _ctx: &FrameContext) -> Result<()> {
            self.clock.advance_ms(self.cost_ms);
            if self.fail {
                Err(SceneError::msg("gpu lost"))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(clock: &ManualClock) -> FrameScheduler {
        FrameScheduler::new(
            PerformanceConfig::default(),
            Arc::new(clock.clone()),
            SceneBus::new(),
        )
    }

    #[test]
    fn runs_systems_in_order_then_renders() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let log: Log = Arc::default();
        for name in ["camera", "lights"] {
            scheduler.add_system(Box::new(Recorder {
                name,
                log: Arc::clone(&log),
            }));
        }

        scheduler.on_refresh();
        scheduler.on_refresh();

        assert_eq!(scheduler.system_names(), vec!["camera", "lights"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["camera:1", "lights:1", "camera:2", "lights:2"]
        );
    }

    #[test]
    fn delta_is_measured_and_clamped() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);

        assert_eq!(scheduler.on_refresh().unwrap().delta, Duration::ZERO);
        clock.advance_ms(16.0);
        assert_eq!(
            scheduler.on_refresh().unwrap().delta,
            Duration::from_millis(16)
        );
        clock.advance_ms(2_000.0);
        assert_eq!(scheduler.on_refresh().unwrap().delta, MAX_FRAME_DELTA);
    }

    #[test]
    fn paused_loop_invokes_nothing_until_resumed() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let log: Log = Arc::default();
        scheduler.add_system(Box::new(Recorder {
            name: "camera",
            log: Arc::clone(&log),
        }));
        let events: Arc<Mutex<Vec<SceneEvent>>> = Arc::default();
        for name in [LOOP_PAUSED, LOOP_RESUMED] {
            let sink = Arc::clone(&events);
            let _ = scheduler.bus().subscribe(
                name,
                handler(move |event: &SceneEvent| {
                    sink.lock().unwrap().push(event.clone());
                    Ok(())
                }),
            );
        }

        let first = scheduler.on_refresh().unwrap();
        scheduler.pause();
        scheduler.pause();
        assert!(!scheduler.is_running());
        assert!(scheduler.on_refresh().is_none());
        assert_eq!(log.lock().unwrap().len(), 1);

        clock.advance_ms(10_000.0);
        scheduler.resume();
        scheduler.resume();
        let resumed = scheduler.on_refresh().unwrap();

        assert_ne!(resumed.generation, first.generation);
        assert_eq!(resumed.delta, Duration::ZERO);
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec![SceneEvent::LoopPaused, SceneEvent::LoopResumed]
        );
    }

    #[test]
    fn render_cost_drives_quality_down() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.set_renderer(Box::new(CostlyRenderer {
            clock: clock.clone(),
            cost_ms: 40.0,
            fail: false,
        }));

        let transitions: Vec<_> = (0..60)
            .filter_map(|_| scheduler.on_refresh().and_then(|report| report.transition))
            .collect();

        assert_eq!(transitions, vec![QualityLevel::Medium, QualityLevel::Low]);
        assert_eq!(scheduler.quality().level(), QualityLevel::Low);
    }

    #[test]
    fn systems_see_quality_applied_in_earlier_frames() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.set_quality(QualityLevel::Low);

        struct SettingsRecorder(Arc<Mutex<Option<QualitySettings>>>);
        impl FrameSystem for SettingsRecorder {
            fn name(&self) -> &str {
                "settings-recorder"
            }
            fn update(&mut self, ctx: &FrameContext) {
                *self.0.lock().unwrap() = Some(ctx.settings);
            }
        }
        let seen = Arc::new(Mutex::new(None));
        scheduler.add_system(Box::new(SettingsRecorder(Arc::clone(&seen))));
        scheduler.on_refresh();

        assert_eq!(*seen.lock().unwrap(), Some(QualityLevel::Low.settings()));
    }

    #[test]
    fn render_failure_does_not_stop_the_loop() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.set_renderer(Box::new(CostlyRenderer {
            clock: clock.clone(),
            cost_ms: 5.0,
            fail: true,
        }));

        assert!(scheduler.on_refresh().is_some());
        assert!(scheduler.on_refresh().is_some());
        assert_eq!(scheduler.frame(), 2);
        assert_eq!(scheduler.quality().metrics().frames_measured, 2);
    }

    #[test]
    fn auto_adjust_can_be_frozen_through_the_scheduler() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.set_auto_adjust(false);
        scheduler.set_renderer(Box::new(CostlyRenderer {
            clock: clock.clone(),
            cost_ms: 40.0,
            fail: false,
        }));

        for _ in 0..60 {
            assert_eq!(scheduler.on_refresh().unwrap().transition, None);
        }
        assert_eq!(scheduler.quality().level(), QualityLevel::High);
        assert!(!scheduler.set_quality_named("potato"));
    }
}
