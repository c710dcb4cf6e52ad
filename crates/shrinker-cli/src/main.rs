use anyhow::Context;
use clap::Parser;
use shrinker_core::{
    AppView, CliOverrides, Container, ItemFactory, MappingWriter, OptimizationLevel, ProgramModel,
    ShrinkerConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILES: [&str; 3] = ["shrinker.json", "shrinker.yaml", "shrinker.yml"];

/// Shrinker - whole-program class merging and enum unboxing
#[derive(Parser, Debug)]
#[command(name = "shrinker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program model to optimize (JSON or YAML)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Where to write the optimized program; stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Configuration file (default: shrinker.json or shrinker.yaml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Optimization level (0, 1, 2, 3, auto)
    #[arg(short = 'O', long = "optimization-level", value_name = "LEVEL", value_parser = parse_level)]
    optimization_level: Option<OptimizationLevel>,

    /// Disable horizontal class merging
    #[arg(long)]
    no_horizontal_merging: bool,

    /// Disable enum unboxing
    #[arg(long)]
    no_enum_unboxing: bool,

    /// Report which enums were unboxed and why the others were not
    #[arg(long)]
    enum_unboxing_debug_logs: bool,

    /// Write the original -> final mapping to this file
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Write a default shrinker.json to the current directory
    #[arg(long)]
    init: bool,
}

fn parse_level(value: &str) -> Result<OptimizationLevel, String> {
    OptimizationLevel::from_flag(value)
        .ok_or_else(|| format!("unknown optimization level '{value}' (expected 0, 1, 2, 3 or auto)"))
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug for per-pass details
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.init {
        return init_config();
    }

    let Some(input) = cli.input.clone() else {
        eprintln!("Error: No input file specified. Use --help for usage information.");
        std::process::exit(1);
    };

    let config = load_config(&cli)?;
    debug!(?config, "Resolved configuration");
    run(&input, cli.output.as_deref(), config)
}

fn init_config() -> anyhow::Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILES[0]);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    ShrinkerConfig::init_file(path).context("Failed to write configuration")?;
    println!("Created {}", path.display());
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ShrinkerConfig> {
    let mut config = match &cli.config {
        Some(path) => ShrinkerConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?,
        None => match DEFAULT_CONFIG_FILES.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => ShrinkerConfig::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
            None => ShrinkerConfig::default(),
        },
    };

    config.merge_with_cli(CliOverrides {
        optimization_level: cli.optimization_level,
        no_horizontal_merging: cli.no_horizontal_merging,
        no_enum_unboxing: cli.no_enum_unboxing,
        enum_unboxing_debug_logs: cli.enum_unboxing_debug_logs,
        mapping_output: cli
            .mapping
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
    });
    Ok(config)
}

fn run(input: &Path, output: Option<&Path>, config: ShrinkerConfig) -> anyhow::Result<()> {
    let model = ProgramModel::from_file(input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;
    let mut factory = ItemFactory::new();
    let mut program = model
        .to_program(&mut factory)
        .map_err(|e| anyhow::anyhow!("Invalid program {}: {}", input.display(), e))?;
    program.add_runtime_library(&mut factory);
    info!(classes = program.class_count(), input = %input.display(), "Loaded program");

    let mut app = AppView::new(factory, program);
    let mapping = config.mapping.clone();
    let container = Container::new(config);
    let summary = container.optimizer().optimize(&mut app)?;

    if let Some(merging) = &summary.horizontal_merging {
        info!(
            groups = merging.groups,
            merged = merging.merged_classes,
            "Horizontal class merging"
        );
    }
    if let Some(unboxing) = &summary.enum_unboxing {
        info!(unboxed = unboxing.unboxed.len(), "Enum unboxing");
    }

    let written = ProgramModel::from_program(&app.program, &app.factory);
    match output {
        Some(path) => {
            written
                .write_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
            info!(classes = written.classes.len(), output = %path.display(), "Wrote program");
        }
        None => println!("{}", written.to_json(true)?),
    }

    if let Some(path) = &mapping.output {
        MappingWriter::new(&app)
            .include_unchanged_members(mapping.include_unchanged_members)
            .write_to_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to write mapping {}: {}", path, e))?;
    }

    if container.has_errors() {
        eprintln!("Optimization failed with {} error(s)", container.error_count());
        std::process::exit(1);
    }
    Ok(())
}
