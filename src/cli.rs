use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::capability::{DeviceTier, GpuScore, RawProbeSignal, SignatureBuilder};
use crate::config::ViewerConfig;
use crate::material::{MaterialFactory, MaterialVariant, ParamsOnlyFactory, WgpuMaterialFactory};
use crate::probe::{sample_signature, AdapterProbe, CapabilityProbe, StaticProbe};
use crate::quality::{PartClass, SizeClass};
use crate::scene::{demo_ring, JsonSceneProvider, ObjSceneProvider, SceneAssetProvider};
use crate::session::ViewerSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Viewer config JSON (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Device signals for commands that build a capability signature.
#[derive(clap::Args)]
struct DeviceArgs {
    /// Viewport width in pixels
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Renderer identifier string
    #[arg(long)]
    renderer: Option<String>,

    /// Maximum 2D texture size
    #[arg(long)]
    max_texture_size: Option<u32>,

    /// Treat the device as a mobile browser
    #[arg(long)]
    mobile: bool,

    /// Full user agent string
    #[arg(long)]
    user_agent: Option<String>,

    /// Probe the local GPU through wgpu instead of the flags above
    #[arg(long)]
    gpu: bool,
}

impl DeviceArgs {
    fn signal(&self) -> RawProbeSignal {
        RawProbeSignal {
            width: self.width,
            renderer: self.renderer.clone(),
            max_texture_size: self.max_texture_size,
            is_mobile_ua: self.mobile,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the capability signature for a device
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Print the quality profile for one capability level and part
    Resolve {
        /// Device tier (1 = highest); out-of-range values clamp
        #[arg(long)]
        tier: i64,

        /// GPU score (5 = highest); out-of-range values clamp
        #[arg(long)]
        score: i64,

        /// Part class: stone, metal or pearl
        #[arg(long, default_value = "stone")]
        class: PartClass,

        /// Size class: main, medium or small
        #[arg(long, default_value = "main")]
        size: SizeClass,
    },

    /// Print the quality table as JSON
    Table,

    /// Sweep the scroll position and print one JSON line per frame
    Simulate {
        #[command(flatten)]
        device: DeviceArgs,

        /// Viewport height in pixels
        #[arg(long, default_value_t = 1080)]
        height: u32,

        /// Scene file (.obj or .json); a demo ring is used when omitted
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Scroll offset advanced per frame
        #[arg(long, default_value_t = 40)]
        step: i64,

        /// Final scroll offset (defaults to the end of the last section)
        #[arg(long)]
        to: Option<i64>,

        /// Extra frames after the sweep so the pose can settle
        #[arg(long, default_value_t = 60)]
        settle_frames: u32,

        /// Material variants to select, e.g. platinum, ruby, black_pearl
        #[arg(long = "variant")]
        variants: Vec<MaterialVariant>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };

    match cli.command {
        Commands::Probe { device } => {
            let builder = SignatureBuilder::new(config.tier_breakpoints);
            let signature = if device.gpu {
                let (adapter, _device) = pollster::block_on(request_gpu())?;
                sample_signature(&AdapterProbe::new(&adapter, device.width), &builder).0
            } else {
                sample_signature(&StaticProbe::new(device.signal()), &builder).0
            };
            print_json(&signature)?;
        }
        Commands::Resolve { tier, score, class, size } => {
            let resolver = config.quality.resolver()?;
            print_json(&resolver.resolve_clamped(tier, score, class, size))?;
        }
        Commands::Table => {
            #[derive(Serialize)]
            struct Cell<'a> {
                tier: u8,
                score: u8,
                row: &'a crate::quality::QualityRow,
            }
            let table = &config.quality.table;
            let cells: Vec<Cell> = DeviceTier::all()
                .flat_map(|t| GpuScore::all().map(move |s| (t, s)))
                .map(|(t, s)| Cell {
                    tier: t.get(),
                    score: s.get(),
                    row: table.row(t, s),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "version": table.version,
                    "fallback": config.quality.fallback,
                    "cells": cells,
                }))?
            );
        }
        Commands::Simulate {
            device,
            height,
            scene,
            step,
            to,
            settle_frames,
            variants,
        } => {
            let scene = load_scene(scene.as_deref())?;
            let sweep = Sweep {
                width: device.width,
                height,
                step: step.max(1),
                to,
                settle_frames,
                variants,
            };
            if device.gpu {
                let (adapter, gpu) = pollster::block_on(request_gpu())?;
                let probe = AdapterProbe::new(&adapter, device.width);
                simulate(config, &probe, scene.as_ref(), WgpuMaterialFactory::new(gpu), &sweep)?;
            } else {
                let probe = StaticProbe::new(device.signal());
                simulate(config, &probe, scene.as_ref(), ParamsOnlyFactory::new(), &sweep)?;
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_scene(path: Option<&Path>) -> Result<Box<dyn SceneAssetProvider>> {
    let Some(path) = path else {
        return Ok(Box::new(demo_ring()));
    };
    let is_obj = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("obj"));
    if is_obj {
        Ok(Box::new(ObjSceneProvider::from_path(path)?))
    } else {
        Ok(Box::new(JsonSceneProvider::from_path(path)?))
    }
}

struct Sweep {
    width: u32,
    height: u32,
    step: i64,
    to: Option<i64>,
    settle_frames: u32,
    variants: Vec<MaterialVariant>,
}

fn simulate<F: MaterialFactory>(
    config: ViewerConfig,
    probe: &dyn CapabilityProbe,
    scene: &dyn SceneAssetProvider,
    factory: F,
    sweep: &Sweep,
) -> Result<()> {
    let mut session = ViewerSession::new(config, probe, scene, factory)
        .context("Failed to start viewer session")?;
    for variant in &sweep.variants {
        session.set_variant(*variant);
    }

    let end = sweep
        .to
        .unwrap_or(session.section_count() as i64 * sweep.height as i64 - 1);
    session.on_resize(sweep.width, sweep.height);

    let mut offset = 0;
    let mut frame = 0u64;
    loop {
        session.on_scroll(offset);
        emit(&mut session, frame)?;
        frame += 1;
        if offset >= end {
            break;
        }
        offset = (offset + sweep.step).min(end);
    }
    for _ in 0..sweep.settle_frames {
        emit(&mut session, frame)?;
        frame += 1;
    }

    log::info!("Simulated {} frames, cache {:?}", frame, session.cache_stats());
    session.teardown();
    Ok(())
}

fn emit<F: MaterialFactory>(session: &mut ViewerSession<F>, frame: u64) -> Result<()> {
    if let Some(out) = session.frame() {
        let line = serde_json::json!({ "frame": frame, "output": out });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

async fn request_gpu() -> Result<(wgpu::Adapter, wgpu::Device)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, _queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .context("Failed to create device")?;
    Ok((adapter, device))
}
