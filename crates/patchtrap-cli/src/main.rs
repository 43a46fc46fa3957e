//! PatchTrap CLI - run a program under the monkey-patch guard

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use patchtrap_core::{
    interval_from_secs, parse_watch_list, GuardScript, LoaderKind, PatchTrap, PatchTrapConfig,
    Resolver, RunStatus, TargetPath,
};

#[derive(Parser)]
#[command(name = "patchtrap")]
#[command(about = "PatchTrap - detect and revert runtime monkey-patching")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by `run` and `check`.
#[derive(clap::Args)]
struct GuardArgs {
    /// Program to guard (guard script, or executable with --loader process)
    target: Option<PathBuf>,

    /// Arguments for the program, whitespace-separated
    #[arg(long, allow_hyphen_values = true)]
    args: Option<String>,

    /// Comma-separated dotted paths to watch
    #[arg(long)]
    watch: Option<String>,

    /// Restore replaced targets (1) or only report them (0)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    auto_restore: Option<u8>,

    /// Seconds between periodic checks; 0 checks only after the program ends
    #[arg(long)]
    interval: Option<f64>,

    /// Report file path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Namespace manifest (JSON); the built-in prelude when omitted
    #[arg(long)]
    namespace: Option<PathBuf>,

    /// How to run the program: script or process
    #[arg(long)]
    loader: Option<LoaderKind>,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run a program under guard and write a report
    Run(GuardArgs),
    /// Validate configuration, watch list and guard script without running
    Check(GuardArgs),
}

impl GuardArgs {
    fn into_config(self) -> anyhow::Result<PatchTrapConfig> {
        let mut config = match &self.config {
            Some(path) => PatchTrapConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PatchTrapConfig::default(),
        };
        if let Some(target) = self.target {
            config = config.with_program(target);
        }
        if let Some(args) = self.args {
            config = config.with_args(args.split_whitespace());
        }
        if let Some(watch) = self.watch {
            config = config.with_watch(parse_watch_list(&watch));
        }
        if let Some(flag) = self.auto_restore {
            config = config.with_auto_restore(flag == 1);
        }
        if let Some(secs) = self.interval {
            config = config.with_interval(interval_from_secs(secs)?);
        }
        if let Some(report) = self.report {
            config = config.with_report_path(report);
        }
        if let Some(namespace) = self.namespace {
            config = config.with_namespace_manifest(namespace);
        }
        if let Some(loader) = self.loader {
            config = config.with_loader(loader);
        }
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: GuardArgs) -> anyhow::Result<i32> {
    let config = args.into_config()?;
    let trap = PatchTrap::new(config)?;
    let report = trap.run().await?;
    let path = trap
        .write_report(&report)
        .context("writing report")?;

    let status = match report.status {
        RunStatus::Ok => "OK",
        RunStatus::AlertsFound => "ALERTS_FOUND",
        RunStatus::GuardedProgramFailed => "GUARDED_PROGRAM_FAILED",
    };
    println!(
        "PatchTrap: {} ({} alerts, {} restored, {} unrestored) -> {}",
        status,
        report.summary.total(),
        report.summary.restored,
        report.summary.restore_failed,
        path.display()
    );
    Ok(report.exit_code())
}

fn check(args: GuardArgs) -> anyhow::Result<i32> {
    let config = args.into_config()?;
    let trap = PatchTrap::new(config)?;
    let config = trap.config();

    let ns = trap.namespace();
    let mut problems = 0;
    for raw in &config.watch {
        let resolved = raw
            .parse::<TargetPath>()
            .map_err(|e| e.to_string())
            .and_then(|path| ns.resolve(&path).map_err(|e| e.to_string()));
        match resolved {
            Ok(binding) => println!("  ok    {} ({})", raw, binding.kind()),
            Err(reason) => {
                problems += 1;
                println!("  skip  {}: {}", raw, reason);
            }
        }
    }

    if let (Some(program), LoaderKind::Script) = (&config.program, config.loader) {
        match GuardScript::from_file(program, &config.args) {
            Ok(script) => println!("  script {} ({} commands)", program.display(), script.len()),
            Err(e) => {
                problems += 1;
                println!("  script error: {}", e);
            }
        }
    }

    println!("Config check: {} problem(s)", problems);
    Ok(if problems == 0 { 0 } else { 1 })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let code = match cli.command {
        Some(Commands::Run(args)) => run(args).await?,
        Some(Commands::Check(args)) => check(args)?,
        None => {
            println!("PatchTrap v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    std::process::exit(code);
}
