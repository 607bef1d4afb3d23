use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    events::SceneBus, AppConfig, AssetCache, CameraRig, Clock, FrameScheduler, LightRig,
    ParticleField, Result, SceneError,
};

static CONSTRUCTED: AtomicBool = AtomicBool::new(false);

/// The one per-process bundle of shared scene services: the event bus, the
/// render loop with its quality controller, and the asset cache.
///
/// Only one context may be alive at a time. Collaborators receive the bus or
/// scheduler by reference instead of reaching for globals.
pub struct SceneContext {
    config: AppConfig,
    bus: SceneBus,
    scheduler: FrameScheduler,
    assets: AssetCache,
}

impl SceneContext {
    /// Builds the context. Fails with [`SceneError::AlreadyConstructed`] while
    /// another context is alive.
    pub fn new(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        if CONSTRUCTED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SceneError::AlreadyConstructed);
        }

        let bus = SceneBus::new();
        let scheduler = FrameScheduler::new(config.performance.clone(), clock, bus.clone());
        tracing::info!(
            quality = %config.performance.initial_quality,
            auto_adjust = config.performance.auto_adjust,
            "scene context constructed"
        );

        Ok(Self {
            config,
            bus,
            scheduler,
            assets: AssetCache::new(),
        })
    }

    /// Registers the camera, lighting and particle systems.
    pub fn install_scene(&mut self) {
        let particles = self.scheduler.quality().settings().particle_count;
        self.scheduler
            .add_system(Box::new(CameraRig::attach(&self.bus, &self.config.scene)));
        self.scheduler
            .add_system(Box::new(LightRig::new(&self.config.scene)));
        self.scheduler
            .add_system(Box::new(ParticleField::attach(&self.bus, particles)));
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &SceneBus {
        &self.bus
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler {
        &mut self.scheduler
    }

    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetCache {
        &mut self.assets
    }
}

impl Drop for SceneContext {
    fn drop(&mut self) {
        self.bus.clear_all();
        CONSTRUCTED.store(false, Ordering::Release);
        tracing::debug!("scene context released");
    }
}

impl fmt::Debug for SceneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneContext")
            .field("bus", &self.bus)
            .field("scheduler", &self.scheduler)
            .field("assets", &self.assets.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::{SceneEvent, POINTER_MOVED, QUALITY_CHANGED},
        ManualClock, QualityLevel,
    };

    // The construction guard is process-wide, so everything that builds a
    // context lives in this single test.
    #[test]
    fn single_live_context_with_installed_scene() {
        let clock = ManualClock::new();
        let invalid = AppConfig {
            performance: crate::PerformanceConfig {
                sample_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            SceneContext::new(invalid, Arc::new(clock.clone())),
            Err(SceneError::InvalidConfig(_))
        ));

        let mut context = SceneContext::new(AppConfig::default(), Arc::new(clock.clone()))
            .expect("first construction succeeds");
        assert!(matches!(
            SceneContext::new(AppConfig::default(), Arc::new(clock.clone())),
            Err(SceneError::AlreadyConstructed)
        ));

        context.install_scene();
        assert_eq!(
            context.scheduler().system_names(),
            vec!["camera", "lights", "particles"]
        );
        assert_eq!(context.bus().listener_count(QUALITY_CHANGED), 1);
        assert_eq!(context.bus().listener_count(POINTER_MOVED), 1);

        context
            .bus()
            .emit(POINTER_MOVED, &SceneEvent::PointerMoved { x: 0.2, y: 0.1 });
        context.scheduler_mut().set_quality(QualityLevel::Medium);
        clock.advance_ms(16.0);
        assert!(context.scheduler_mut().on_refresh().is_some());
        assert_eq!(context.scheduler().quality().level(), QualityLevel::Medium);
        assert_eq!(context.assets().stats().entries, 0);

        drop(context);
        let again = SceneContext::new(AppConfig::default(), Arc::new(clock));
        assert!(again.is_ok());
    }
}
