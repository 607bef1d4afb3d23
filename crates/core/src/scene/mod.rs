use std::{
    f32::consts::TAU,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use serde::{Deserialize, Serialize};

use crate::{
    events::{handler, SceneBus, SceneEvent, Subscription, POINTER_MOVED, QUALITY_CHANGED},
    FrameContext, FrameSystem, SceneConfig,
};

const KEY_LIGHT_BASE_INTENSITY: f32 = 1.2;
const KEY_LIGHT_PULSE_DEPTH: f32 = 0.25;
const PARTICLE_FIELD_RADIUS: f32 = 12.0;
const PARTICLE_SPIN_RADIANS_PER_SEC: f32 = 0.05;
const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Camera offset that eases toward the pointer for a parallax effect.
#[derive(Debug)]
pub struct CameraRig {
    strength: f32,
    damping: f32,
    pointer: Arc<Mutex<[f32; 2]>>,
    offset: [f32; 2],
    subscription: Option<Subscription<SceneEvent>>,
}

impl CameraRig {
    pub fn attach(bus: &SceneBus, config: &SceneConfig) -> Self {
        let pointer = Arc::new(Mutex::new([0.0_f32; 2]));
        let target = Arc::clone(&pointer);
        let subscription = bus.subscribe(
            POINTER_MOVED,
            handler(move |event: &SceneEvent| {
                if let SceneEvent::PointerMoved { x, y } = *event {
                    let mut target = target.lock().unwrap_or_else(PoisonError::into_inner);
                    *target = [x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0)];
                }
                Ok(())
            }),
        );

        Self {
            strength: config.parallax_strength,
            damping: config.camera_damping.max(0.0),
            pointer,
            offset: [0.0; 2],
            subscription: Some(subscription),
        }
    }

    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    /// Where the camera is heading given the last pointer position.
    pub fn target(&self) -> [f32; 2] {
        let pointer = *self.pointer.lock().unwrap_or_else(PoisonError::into_inner);
        [pointer[0] * self.strength, -pointer[1] * self.strength]
    }
}

impl Drop for CameraRig {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl FrameSystem for CameraRig {
    fn name(&self) -> &str {
        "camera"
    }

    fn update(&mut self, ctx: &FrameContext) {
        let target = self.target();
        // Frame-rate independent exponential smoothing.
        let blend = 1.0 - (-self.damping * ctx.delta_secs()).exp();
        for (offset, target) in self.offset.iter_mut().zip(target) {
            *offset += (target - *offset) * blend;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub intensity: f32,
    pub shadows: bool,
    pub shadow_map_size: u32,
}

/// Key light that pulses slowly and follows the active shadow settings.
#[derive(Debug)]
pub struct LightRig {
    pulse_hz: f32,
    state: LightState,
}

impl LightRig {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            pulse_hz: config.light_pulse_hz,
            state: LightState {
                intensity: KEY_LIGHT_BASE_INTENSITY,
                shadows: false,
                shadow_map_size: 0,
            },
        }
    }

    pub fn state(&self) -> LightState {
        self.state
    }
}

impl FrameSystem for LightRig {
    fn name(&self) -> &str {
        "lights"
    }

    fn update(&mut self, ctx: &FrameContext) {
        let phase = (TAU * self.pulse_hz * ctx.elapsed_secs()).sin();
        self.state = LightState {
            intensity: KEY_LIGHT_BASE_INTENSITY * (1.0 + KEY_LIGHT_PULSE_DEPTH * phase),
            shadows: ctx.settings.shadows,
            shadow_map_size: ctx.settings.shadow_map_size,
        };
    }
}

/// Background particles. The active count follows `quality:changed` events.
#[derive(Debug)]
pub struct ParticleField {
    target: Arc<AtomicU32>,
    positions: Vec<[f32; 3]>,
    rotation: f32,
    subscription: Option<Subscription<SceneEvent>>,
}

impl ParticleField {
    pub fn attach(bus: &SceneBus, initial_count: u32) -> Self {
        let target = Arc::new(AtomicU32::new(initial_count));
        let sink = Arc::clone(&target);
        let subscription = bus.subscribe(
            QUALITY_CHANGED,
            handler(move |event: &SceneEvent| {
                if let SceneEvent::QualityChanged { settings, .. } = event {
                    sink.store(settings.particle_count, Ordering::Relaxed);
                }
                Ok(())
            }),
        );

        let mut field = Self {
            target,
            positions: Vec::new(),
            rotation: 0.0,
            subscription: Some(subscription),
        };
        field.resize(initial_count as usize);
        field
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Requested particle count; applied on the next update.
    pub fn target_count(&self) -> u32 {
        self.target.load(Ordering::Relaxed)
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    fn resize(&mut self, count: usize) {
        if count < self.positions.len() {
            self.positions.truncate(count);
            return;
        }
        // Fibonacci sphere. Existing points stay put so a resize never makes
        // the whole field jump.
        let start = self.positions.len();
        self.positions
            .extend((start..count).map(|index| sphere_point(index, count)));
    }
}

impl Drop for ParticleField {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl FrameSystem for ParticleField {
    fn name(&self) -> &str {
        "particles"
    }

    fn update(&mut self, ctx: &FrameContext) {
        let target = self.target_count() as usize;
        if target != self.positions.len() {
            tracing::debug!(from = self.positions.len(), to = target, "resizing particle field");
            self.resize(target);
        }
        self.rotation = (self.rotation + PARTICLE_SPIN_RADIANS_PER_SEC * ctx.delta_secs()) % TAU;
    }
}

fn sphere_point(index: usize, count: usize) -> [f32; 3] {
    let count = count.max(1) as f32;
    let y = 1.0 - 2.0 * (index as f32 + 0.5) / count;
    let ring = (1.0 - y * y).max(0.0).sqrt();
    let theta = GOLDEN_ANGLE * index as f32;
    [
        ring * theta.cos() * PARTICLE_FIELD_RADIUS,
        y * PARTICLE_FIELD_RADIUS,
        ring * theta.sin() * PARTICLE_FIELD_RADIUS,
    ]
}
