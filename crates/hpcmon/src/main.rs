//! hpcmon - uniform batch-job monitor for SGE, Slurm and PBS clusters.

mod cli;
mod detect;
mod provider;
mod render;

use chrono::Utc;
use clap::Parser;
use cli::Args;
use detect::SchedulerKind;
use hpcmon_core::{HistoryQuery, Scheduler};
use hpcmon_local::LocalScheduler;
use hpcmon_pbs::PbsScheduler;
use hpcmon_sge::SgeScheduler;
use hpcmon_slurm::SlurmScheduler;
use miette::{IntoDiagnostic, Result, miette};
use provider::{JobProvider, Snapshot};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let kind = match args.scheduler {
        Some(kind) => kind,
        None => detect::detect().await,
    };
    tracing::info!("using {kind} backend");

    match kind {
        SchedulerKind::Sge => run(SgeScheduler::new(), &args).await,
        SchedulerKind::Slurm => run(SlurmScheduler::new(), &args).await,
        SchedulerKind::Pbs => run(PbsScheduler::new(), &args).await,
        SchedulerKind::Local => run(LocalScheduler::new(), &args).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run<S: Scheduler>(scheduler: S, args: &Args) -> Result<()> {
    if args.completed {
        return list_completed(&scheduler, args).await;
    }

    let provider = JobProvider::new(scheduler, args.job_filter());
    let mut rx = provider.subscribe();

    provider.refresh().await;
    print_snapshot(&rx.borrow_and_update().clone(), args)?;

    if args.once {
        return Ok(());
    }

    tokio::spawn(provider.clone().run(Duration::from_secs(args.interval)));
    loop {
        if rx.changed().await.is_err() {
            return Ok(());
        }
        let snapshot = rx.borrow_and_update().clone();
        print_snapshot(&snapshot, args)?;
    }
}

fn print_snapshot(snapshot: &Snapshot, args: &Args) -> Result<()> {
    if let Some(ref err) = snapshot.last_error {
        // Keep the previous table on screen; the failure goes to stderr.
        eprintln!("warning: poll failed, showing stale data: {err}");
        return Ok(());
    }

    if args.json {
        println!("{}", render::render_json(&snapshot.jobs).into_diagnostic()?);
    } else {
        if let Some(at) = snapshot.refreshed_at {
            println!(
                "{} jobs · refreshed {}",
                snapshot.jobs.len(),
                at.format("%H:%M:%S")
            );
        }
        print!("{}", render::render_table(&snapshot.jobs));
    }
    Ok(())
}

async fn list_completed<S: Scheduler>(scheduler: &S, args: &Args) -> Result<()> {
    if !scheduler.has_accounting() {
        return Err(miette!(
            "the {} backend has no accounting; cannot list completed jobs",
            scheduler.name()
        ));
    }

    let query = HistoryQuery {
        user: args.user_filter(),
        since: Some(Utc::now() - chrono::Duration::hours(args.since_hours as i64)),
        queue: args.queue.clone(),
        ..Default::default()
    };
    let jobs = scheduler
        .list_completed_jobs(&query)
        .await
        .into_diagnostic()?;

    if args.json {
        println!("{}", render::render_json(&jobs).into_diagnostic()?);
    } else {
        print!("{}", render::render_table(&jobs));
    }
    Ok(())
}
