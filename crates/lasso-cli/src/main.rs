//! lasso CLI - raster slicer for FDM printers
//!
//! Reads a triangle mesh as JSON, slices it and writes G-code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lasso_slicer::colorize::DEFAULT_PIXELS_PER_MM;
use lasso_slicer::{
    apply_texture, ColorMode, MachineToolpath, SliceContext, SliceControl, SliceStatus,
    TextureSampler, TriangleMesh,
};
use lasso_slicer_gcode::{save_gcode, PrinterProfile};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::LassoConfig;

#[derive(Parser)]
#[command(name = "lasso")]
#[command(about = "Raster slicer for FDM printers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every layer
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Slice a JSON mesh into G-code
    Slice {
        /// Input mesh (.json with `vertices` and `indices`)
        input: PathBuf,
        /// Output file (default: input with a .gcode extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// TOML config with [slice] and [gcode] tables
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Built-in printer profile (see `lasso printers`)
        #[arg(short, long)]
        printer: Option<String>,
        /// PNG texture to colour the print from
        #[arg(long)]
        texture: Option<PathBuf>,
        /// How the texture is applied
        #[arg(long, value_enum, default_value_t = ColorArg::Dual)]
        color_mode: ColorArg,
        /// Texture pixels per millimetre of build plate
        #[arg(long, default_value_t = DEFAULT_PIXELS_PER_MM)]
        pixels_per_mm: f64,
        /// Keep the slicer's path order
        #[arg(long)]
        no_optimize: bool,
    },
    /// Print the default configuration as TOML
    Config,
    /// List built-in printer profiles
    Printers,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    /// Black on extruder 0, white on extruder 1
    Dual,
    /// Single extruder, colour comments per segment
    Soft,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Dual => ColorMode::Dual,
            ColorArg::Soft => ColorMode::Soft,
        }
    }
}

/// Options of one `slice` invocation.
struct SliceJob {
    input: PathBuf,
    output: PathBuf,
    config: LassoConfig,
    texture: Option<(PathBuf, f64, ColorMode)>,
    optimize: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Slice {
            input,
            output,
            config,
            printer,
            texture,
            color_mode,
            pixels_per_mm,
            no_optimize,
        } => {
            let mut config = match config {
                Some(path) => LassoConfig::load(&path)?,
                None => LassoConfig::default(),
            };
            if let Some(name) = printer {
                let Some(profile) = PrinterProfile::by_name(&name) else {
                    bail!("Unknown printer: {name} (see `lasso printers`)");
                };
                config.use_printer(profile);
            }
            config.sync();

            let output = output.unwrap_or_else(|| input.with_extension("gcode"));
            run_slice(SliceJob {
                input,
                output,
                config,
                texture: texture.map(|path| (path, pixels_per_mm, color_mode.into())),
                optimize: !no_optimize,
            })?;
        }
        Commands::Config => {
            print!("{}", LassoConfig::default().to_toml()?);
        }
        Commands::Printers => {
            list_printers();
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn read_mesh(path: &Path) -> Result<TriangleMesh> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading mesh {}", path.display()))?;
    let mesh: TriangleMesh = serde_json::from_str(&json)
        .with_context(|| format!("parsing mesh {}", path.display()))?;
    Ok(mesh)
}

fn run_slice(job: SliceJob) -> Result<()> {
    let mesh = read_mesh(&job.input)?;
    info!(
        input = %job.input.display(),
        triangles = mesh.triangle_count(),
        "mesh loaded"
    );

    let ctx = SliceContext::new(&mesh, &job.config.slice).context("preparing slice")?;
    let mut toolpath = MachineToolpath::new();
    let mut last_decile = None;
    let status = ctx
        .run(&mut toolpath, |p| {
            debug!(pass = ?p.pass, layer = p.layer, total = p.total, "layer done");
            let decile = p.percent / 10;
            if last_decile != Some(decile) {
                last_decile = Some(decile);
                info!("{}%", p.percent);
            }
            SliceControl::Continue
        })
        .context("slicing")?;
    if let SliceStatus::Cancelled { completed_layers } = status {
        bail!("slicing stopped after {completed_layers} layers");
    }

    if job.optimize {
        toolpath.optimize();
    }

    if let Some((path, pixels_per_mm, mode)) = &job.texture {
        let sampler = TextureSampler::open(path, *pixels_per_mm)
            .with_context(|| format!("loading texture {}", path.display()))?;
        apply_texture(&mut toolpath, &sampler, *mode);
        if *mode == ColorMode::Dual && job.config.gcode.printer.extruder_count < 2 {
            warn!(
                printer = %job.config.gcode.printer.name,
                "dual colour output on a single-extruder printer"
            );
        }
    }

    save_gcode(&toolpath, &job.output, &job.config.gcode)
        .with_context(|| format!("writing {}", job.output.display()))?;
    println!(
        "Sliced {} layers to {}",
        toolpath.layer_count(),
        job.output.display()
    );
    Ok(())
}

fn list_printers() {
    for p in PrinterProfile::all_profiles() {
        println!(
            "{:<20} {:>4} x {:<4} mm  {} extruder(s)  {:?}",
            p.name, p.bed_x, p.bed_y, p.extruder_count, p.flavor
        );
    }
}
