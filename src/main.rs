//! L2Wrap command line.
//!
//! Usage:
//!   l2wrap check
//!   l2wrap check --batch-size 4 --seq-len 128 --vocab-size 65536 --scaling upstream-scaled
//!   l2wrap check --backend wgpu --grad-output 0.5
//!   l2wrap devices --spec 0,2 --device-count 4

use std::process::ExitCode;

use burn::backend::{wgpu::WgpuDevice, NdArray, Wgpu};
use clap::{Parser, Subcommand, ValueEnum};
use l2wrap::{
    accelerator::{AcceleratorRegistry, DeviceSpec, WgpuAccelerator},
    l2wrap::{harness::check_all_pairs, EquivalenceCase},
    L2WrapConfig, PenaltyScaling, Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "l2wrap", about = "L2Wrap penalty gradient tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that every backward strategy produces the same logits gradient.
    Check(CheckArgs),
    /// Resolve a device specification against the wgpu accelerator.
    Devices(DevicesArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Ndarray,
    Wgpu,
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    #[arg(long, default_value_t = 2)]
    batch_size: usize,
    #[arg(long, default_value_t = 3)]
    seq_len: usize,
    #[arg(long, default_value_t = 5)]
    vocab_size: usize,
    /// Defaults to batch_size * seq_len.
    #[arg(long)]
    token_amount: Option<usize>,
    #[arg(long, default_value_t = 1.0)]
    loss: f32,
    #[arg(long, default_value_t = 1.0)]
    grad_output: f32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f32,
    /// Defaults to the L2WRAP_SCALE_BY_GRAD (or WN_FIX_L2WRAP) environment toggle.
    #[arg(long, value_enum)]
    scaling: Option<PenaltyScaling>,
    #[arg(long)]
    min_max_logit: Option<f64>,
    #[arg(long, value_enum, default_value_t = BackendKind::Ndarray)]
    backend: BackendKind,
}

#[derive(clap::Args, Debug)]
struct DevicesArgs {
    /// `auto`, a device count, a comma separated index list or a device kind.
    #[arg(long, default_value = "auto")]
    spec: String,
    /// Number of visible devices; wgpu cannot enumerate adapters through burn.
    #[arg(long)]
    device_count: Option<usize>,
    #[arg(long, default_value = WgpuAccelerator::KIND)]
    accelerator: String,
}

fn run_check(args: &CheckArgs) -> Result<()> {
    let case = EquivalenceCase::new()
        .with_batch_size(args.batch_size)
        .with_seq_len(args.seq_len)
        .with_vocab_size(args.vocab_size)
        .with_token_amount(args.token_amount.unwrap_or(args.batch_size * args.seq_len))
        .with_loss(args.loss)
        .with_grad_output(args.grad_output)
        .with_seed(args.seed)
        .with_tolerance(args.tolerance);

    let config = match args.scaling {
        Some(scaling) => L2WrapConfig::new().with_scaling(scaling),
        None => L2WrapConfig::new().with_env_overrides(),
    }
    .with_min_max_logit(args.min_max_logit);

    info!(
        shape = ?case.shape(),
        scaling = %config.scaling,
        backend = ?args.backend,
        "running equivalence check"
    );

    let reports = match args.backend {
        BackendKind::Ndarray => check_all_pairs::<NdArray>(&case, &config, &Default::default())?,
        BackendKind::Wgpu => check_all_pairs::<Wgpu>(&case, &config, &WgpuDevice::default())?,
    };

    for report in reports {
        println!(
            "{} vs {}: max |diff| = {:e} (tolerance {:e})",
            report.lhs, report.rhs, report.max_abs_diff, report.tolerance
        );
    }
    Ok(())
}

fn run_devices(args: &DevicesArgs) -> Result<()> {
    let spec: DeviceSpec = args.spec.parse()?;

    let registry = AcceleratorRegistry::with_defaults();
    for name in registry.names() {
        info!(name, description = ?registry.description(name), "accelerator registered");
    }

    let mut accelerator = registry.get(&args.accelerator)?;
    if let Some(count) = args.device_count {
        if accelerator.kind() == WgpuAccelerator::KIND {
            accelerator = Box::new(WgpuAccelerator::new(count));
        }
    }

    println!(
        "{}: available = {}, devices = {}",
        accelerator.kind(),
        accelerator.is_available(),
        accelerator.auto_device_count()
    );
    for device in accelerator.parallel_devices(&spec)? {
        println!("  {device}");
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let result = match &args.command {
        Command::Check(check) => run_check(check),
        Command::Devices(devices) => run_devices(devices),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
