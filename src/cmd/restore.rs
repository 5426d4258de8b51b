use anyhow::Result;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::RestoreArgs,
    core::{restore::RestoreReport, session::AppSession},
    error::CliError,
    utils::theme::{dimmed, error_message, header, success_message, warning_message, PhaseSpinner},
};

pub async fn run(sess: &mut AppSession, args: RestoreArgs) -> Result<i32> {
    info!(
        "restoring packages with ripple version {}",
        env!("CARGO_PKG_VERSION")
    );

    for name in &args.nugets {
        if !sess.solutions().iter().any(|s| s.dependencies().has(name)) {
            return Err(CliError::UnknownNuget(name.clone()).into());
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; abandoning outstanding downloads");
            ctrl_c.cancel();
        }
    });

    let mut exit_code = 0;

    for solution in sess.solutions_mut() {
        println!("{}", header(&format!("Restoring {}", solution.name())));

        if args.force {
            solution.force_restore();
        }

        for name in &args.nugets {
            if solution.dependencies().has(name) {
                solution.force_restore_nuget(name)?;
            }
        }

        let spinner = PhaseSpinner::new(format!("resolving {} package(s)", solution.dependencies().len()));
        let report = solution.restore_all_with(cancel.clone()).await;
        spinner.finish();

        let report = report?;
        print_report(&report);

        if !report.is_success() {
            exit_code = 1;
        }

        if cancel.is_cancelled() {
            return Err(CliError::Interrupted.into());
        }
    }

    Ok(exit_code)
}

fn print_report(report: &RestoreReport) {
    if report.restored.is_empty() && report.failures.is_empty() {
        println!("{}", success_message("Everything is up to date"));
        return;
    }

    for nuget in &report.restored {
        println!(
            "{} {}",
            success_message(&format!("{} {}", nuget.name, nuget.version.bold())),
            dimmed(&format!("from {}", nuget.source))
        );
    }

    for failure in &report.failures {
        let line = format!("{}: {:#}", failure.name, failure.error);

        if failure.is_transient() {
            println!("{}", warning_message(&line));
        } else {
            println!("{}", error_message(&line));
        }
    }
}
