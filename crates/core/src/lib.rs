//! Core library for the portfolio scene runtime.
//!
//! The crate holds the few pieces of the decorative 3D background that carry
//! real state: a named publish/subscribe bus, the per-frame scheduler that
//! runs camera, lighting and particle updates, and the quality controller
//! that trades visual fidelity for frame rate. Rendering itself is left to
//! whatever implements [`FrameRenderer`].

pub mod assets;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod monitor;
pub mod quality;
pub mod scene;
pub mod scheduler;

pub use assets::{AssetCache, AssetEntry, AssetKind, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, PerformanceConfig, SceneConfig};
pub use context::SceneContext;
pub use error::{Result, SceneError};
pub use events::{EventBus, Handler, SceneBus, SceneEvent, Subscription};
pub use monitor::{FrameWindow, PerformanceMetrics, QualityController};
pub use quality::{QualityLevel, QualitySettings};
pub use scene::{CameraRig, LightRig, LightState, ParticleField};
pub use scheduler::{
    FrameContext, FrameRenderer, FrameReport, FrameScheduler, FrameSystem, NullRenderer,
};
