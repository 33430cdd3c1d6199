// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — meta-trains on the source domains
//   2. `evaluate` — scores a checkpoint on the target domain
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "masf",
    version = "0.1.0",
    about = "Meta-learning domain generalisation: train on source domains, evaluate on an unseen one."
)]
pub struct Cli {
    /// The subcommand to run (train or evaluate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

/// Handles the `train` subcommand.
/// Converts CLI args into a TrainConfig and hands off to Layer 2.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!(
        "Starting meta-training: target '{}' of {:?}",
        args.target_domain,
        args.domains
    );

    let summary = TrainUseCase::new(args.into()).execute()?;

    match summary.best {
        Some(best) => println!(
            "Training complete after {} iterations. Best: iteration {} \
             (val_acc={:.1}%, target_acc={:.1}%)",
            summary.iterations,
            best.iteration,
            best.val_accuracy * 100.0,
            best.target_accuracy * 100.0,
        ),
        None => println!("Training complete after {} iterations.", summary.iterations),
    }
    Ok(())
}

/// Handles the `evaluate` subcommand.
fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(
        args.checkpoint_dir,
        args.which.into(),
        args.backend.map(Into::into),
    );
    let out = use_case.execute()?;

    println!(
        "\n{}: accuracy={:.2}% loss={:.4} ({} images)",
        out.domain,
        out.report.accuracy * 100.0,
        out.report.loss,
        out.report.samples,
    );
    Ok(())
}
