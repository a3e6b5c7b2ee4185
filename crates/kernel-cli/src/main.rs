//! Demo binary for the capability kernel: wires one [`kernel_core::Kernel`]
//! against a scratch workspace directory and drives it through a handful of
//! representative requests for manual inspection. Not a production host —
//! a real integration supplies its own vault, probe checker, and policy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kernel_core::{ApprovalInput, Kernel, KernelConfig, SystemClock};
use kernel_model::{ApprovalType, ExecutionIntent};
use kernel_policy::PolicyEngine;
use kernel_vault::{AlwaysApprove, FileBackedVault};
use kernel_verify::AlwaysPassChecker;

#[derive(Parser)]
#[command(
    name = "kernel-cli",
    about = "Exercises a capability kernel instance against a scratch workspace",
    disable_help_subcommand = true
)]
struct Cli {
    /// Workspace directory the kernel's durable state lives under. Defaults
    /// to a freshly created temp directory that is removed on exit.
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a single intent and print the pipeline's decision.
    Submit {
        action: String,
        #[arg(long)]
        target: Option<String>,
        /// Mark the action as involving a payment, for risk scoring.
        #[arg(long)]
        payment: bool,
    },
    /// Run the built-in demo scenario sweep (low risk, high risk, deny,
    /// emergency stop, resume) and print each step's outcome.
    Demo,
    /// Print the current integrity posture and re-run the full check set.
    Integrity,
}

type DemoKernel = Kernel<FileBackedVault<AlwaysApprove>, AlwaysPassChecker>;

fn open_kernel(workspace: &std::path::Path) -> Result<DemoKernel> {
    let config = KernelConfig::at(workspace);
    let vault = FileBackedVault::open_or_create(&workspace.join("vault"), AlwaysApprove)
        .context("opening demo vault")?;
    Kernel::open(
        &config,
        vault,
        AlwaysPassChecker,
        PolicyEngine::default_preset(),
        Arc::new(SystemClock),
    )
    .context("opening kernel")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let _temp_guard;
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => {
            let dir = tempfile::tempdir().context("creating scratch workspace")?;
            let path = dir.path().to_path_buf();
            _temp_guard = dir;
            path
        }
    };

    let kernel = open_kernel(&workspace)?;

    match cli.command {
        Commands::Submit { action, target, payment } => {
            let mut intent = ExecutionIntent::new(action);
            if let Some(target) = target {
                intent = intent.with_target(target);
            }
            if payment {
                intent.parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
            }
            let result = kernel.execute(intent).await;
            println!("{result:#?}");
        }
        Commands::Demo => run_demo(&kernel).await?,
        Commands::Integrity => {
            let report = kernel.perform_full_check()?;
            println!("posture: {:?}", report.posture);
            println!("{report:#?}");
        }
    }

    Ok(())
}

/// Drives a representative handful of requests through the pipeline for
/// manual inspection: an auto-approved low-risk read (spec.md §8 S1), a
/// high-risk request parked for approval then carried through to a minted
/// and consumed token, a second request denied outright, and an emergency
/// stop followed by resume. This is a manual-inspection tour, not the §8
/// acceptance suite — see `kernel-core`'s own integration tests for that.
async fn run_demo(kernel: &DemoKernel) -> Result<()> {
    println!("== low-risk read, auto-approved (S1) ==");
    let result = kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await;
    println!("{result:#?}");

    println!("== high-risk payment email, parked pending approval ==");
    let mut high_risk = ExecutionIntent::new("send email with payment instructions");
    high_risk.parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
    high_risk.parameters.insert(
        "recipients".to_string(),
        serde_json::json!(["a@example.com", "b@example.com", "c@example.com"]),
    );
    let pending = kernel.execute(high_risk).await;
    println!("{pending:#?}");

    if let kernel_core::ExecutionResult::PendingApproval { plan_id } = pending {
        println!("== approve it, collect a biometric signature, mint a token ==");
        let approved = kernel.authorize(plan_id, ApprovalInput::new(ApprovalType::Biometric));
        println!("{approved:#?}");

        let session = kernel.collect_biometric_approval(plan_id, "approve payment email?").await?;
        let token = kernel.issue_hardened_token(plan_id, &session)?;
        println!("minted token {}", token.id);
        kernel.verify_and_consume_token(&token)?;
        println!("token consumed; a replay now fails: {:?}", kernel.verify_and_consume_token(&token));
    }

    println!("== a second high-risk request, this time denied ==");
    let mut another = ExecutionIntent::new("send email with a payment");
    another.parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
    if let kernel_core::ExecutionResult::PendingApproval { plan_id } = kernel.execute(another).await {
        let denied = kernel.deny(plan_id, "double-check with finance first".to_string());
        println!("{denied:#?}");
    }

    println!("== emergency stop, then resume ==");
    let mut yet_another = ExecutionIntent::new("send email with a payment");
    yet_another.parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
    kernel.execute(yet_another).await;
    kernel.emergency_stop("operator-initiated halt for this demo")?;
    println!(
        "blocked while halted: {:?}",
        kernel.execute(ExecutionIntent::new("read calendar")).await
    );
    kernel.resume_from_halt()?;
    println!(
        "works again after resume: {:?}",
        kernel.execute(ExecutionIntent::new("read calendar")).await
    );

    Ok(())
}
