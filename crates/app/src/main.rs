use std::{
    cell::Cell,
    io::{self, BufRead, Write},
    path::PathBuf,
    rc::Rc,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use folio_scene_core::{
    events::{handler, SceneEvent, POINTER_MOVED, QUALITY_CHANGED},
    AppConfig, AssetEntry, AssetKind, FrameContext, FrameRenderer, ManualClock, QualityLevel,
    SceneContext,
};
use tracing_subscriber::EnvFilter;

fn main() -> folio_scene_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            frames,
            frame_ms,
            idle_ms,
            quality,
            no_auto,
        } => run_simulation(config, frames, frame_ms, idle_ms, quality, no_auto),
        Commands::Console => run_console(config),
    }
}

/// Renderer stand-in whose cost is charged to the manual clock. Cost scales
/// with the pixel count implied by the active pixel ratio.
struct SyntheticLoad {
    clock: ManualClock,
    base_ms: Rc<Cell<f64>>,
}

impl FrameRenderer for SyntheticLoad {
    fn render(&mut self, ctx: &FrameContext) -> folio_scene_core::Result<()> {
        let pixel_scale = f64::from(ctx.settings.pixel_ratio).powi(2) / 4.0;
        self.clock.advance_ms(self.base_ms.get() * pixel_scale);
        Ok(())
    }
}

struct Host {
    context: SceneContext,
    clock: ManualClock,
    base_ms: Rc<Cell<f64>>,
}

impl Host {
    fn new(config: AppConfig, base_ms: f64) -> folio_scene_core::Result<Self> {
        let clock = ManualClock::new();
        let mut context = SceneContext::new(config, Arc::new(clock.clone()))?;
        context.install_scene();
        context
            .assets_mut()
            .insert(AssetEntry::new("particle-sprite", AssetKind::Texture, 64 * 64 * 4));

        let base_ms = Rc::new(Cell::new(base_ms));
        context.scheduler_mut().set_renderer(Box::new(SyntheticLoad {
            clock: clock.clone(),
            base_ms: Rc::clone(&base_ms),
        }));

        let _ = context.bus().subscribe(
            QUALITY_CHANGED,
            handler(|event: &SceneEvent| {
                if let SceneEvent::QualityChanged { level, settings } = event {
                    tracing::info!(
                        %level,
                        pixel_ratio = settings.pixel_ratio,
                        shadows = settings.shadows,
                        particles = settings.particle_count,
                        "quality changed"
                    );
                }
                Ok(())
            }),
        );

        Ok(Self {
            context,
            clock,
            base_ms,
        })
    }

    /// Runs `count` refreshes with `idle_ms` of vsync wait after each one.
    fn run_frames(&mut self, count: u32, idle_ms: f64) {
        for _ in 0..count {
            if let Some(report) = self.context.scheduler_mut().on_refresh() {
                if let Some(level) = report.transition {
                    tracing::debug!(frame = report.frame, %level, "automatic transition");
                }
            }
            self.clock.advance_ms(idle_ms);
        }
    }

    fn status(&self) -> String {
        let scheduler = self.context.scheduler();
        let metrics = scheduler.quality().metrics();
        let assets = self.context.assets().stats();
        format!(
            "running={} frame={} level={} auto={} fps={:.1} avg_frame_ms={:.2} assets={}",
            scheduler.is_running(),
            scheduler.frame(),
            metrics.level,
            metrics.auto_adjust,
            metrics.fps,
            metrics.avg_frame_ms,
            assets.entries,
        )
    }
}

fn run_simulation(
    config: AppConfig,
    frames: u32,
    frame_ms: f64,
    idle_ms: f64,
    quality: Option<QualityLevel>,
    no_auto: bool,
) -> folio_scene_core::Result<()> {
    tracing::info!(frames, frame_ms, idle_ms, "starting simulation");

    let mut host = Host::new(config, frame_ms)?;
    if let Some(level) = quality {
        host.context.scheduler_mut().set_quality(level);
    }
    if no_auto {
        host.context.scheduler_mut().set_auto_adjust(false);
    }

    host.run_frames(frames, idle_ms);
    println!("{}", host.status());
    Ok(())
}

fn run_console(config: AppConfig) -> folio_scene_core::Result<()> {
    let mut host = Host::new(config, 10.0)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    writeln!(stdout, "{}", host.status())?;
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match (command, args.as_slice()) {
            ("quit" | "exit", _) => break,
            ("status", _) => {}
            ("pause", _) => host.context.scheduler_mut().pause(),
            ("resume", _) => host.context.scheduler_mut().resume(),
            ("quality", [name]) => {
                host.context.scheduler_mut().set_quality_named(name);
            }
            ("auto", ["on"]) => host.context.scheduler_mut().set_auto_adjust(true),
            ("auto", ["off"]) => host.context.scheduler_mut().set_auto_adjust(false),
            ("frame", [ms, rest @ ..]) if rest.len() <= 1 => {
                let cost = ms.parse::<f64>();
                let count = rest.first().map_or(Ok(1), |count| count.parse::<u32>());
                match (cost, count) {
                    (Ok(cost), Ok(count)) => {
                        host.base_ms.set(cost);
                        host.run_frames(count, 0.0);
                    }
                    _ => tracing::warn!(%line, "usage: frame <ms> [count]"),
                }
            }
            ("pointer", [x, y]) => match (x.parse::<f32>(), y.parse::<f32>()) {
                (Ok(x), Ok(y)) => {
                    host.context
                        .bus()
                        .emit(POINTER_MOVED, &SceneEvent::PointerMoved { x, y });
                }
                _ => tracing::warn!(%line, "usage: pointer <x> <y>"),
            },
            _ => {
                tracing::warn!(%line, "unknown command");
                continue;
            }
        }
        writeln!(stdout, "{}", host.status())?;
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Portfolio scene runtime host", long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the render loop with synthetic frame costs and report the
    /// resulting quality level.
    Simulate {
        /// Number of display refreshes to run.
        #[arg(short, long, default_value_t = 300)]
        frames: u32,
        /// Render cost of one frame at the highest pixel ratio, in ms.
        #[arg(long, default_value_t = 40.0)]
        frame_ms: f64,
        /// Idle time between frames, in ms.
        #[arg(long, default_value_t = 0.0)]
        idle_ms: f64,
        /// Quality level to start from.
        #[arg(short, long)]
        quality: Option<QualityLevel>,
        /// Disable automatic quality adjustment.
        #[arg(long)]
        no_auto: bool,
    },
    /// Read debug commands (pause, resume, quality <level>, auto on|off,
    /// frame <ms> [count], pointer <x> <y>, status, quit) from stdin.
    Console,
}
