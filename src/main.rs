//! CLI entry point for lockerdl.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result, bail};
use clap::Parser;
use lockerdl_core::config::default_settings_path;
use lockerdl_core::{
    Database, DownloadJob, EventSink, HttpClient, JobManager, JobStatus, JobStore, Settings,
    build_default_resolver_registry,
};
use tracing::{debug, info, warn};

mod cli;
mod progress_ui;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings = load_settings(&args)?;
    let manager = open_manager(&settings).await?;

    let failed = run_command(&args, &manager).await?;
    if failed > 0 {
        bail!("{failed} download(s) failed; run `lockerdl list` for details");
    }
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let path = args.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = Settings::load(&path)?;
    if let Some(dir) = &args.dir {
        settings.download_dir.clone_from(dir);
    }
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrent = usize::from(concurrency);
    }
    let settings = settings.normalized();
    debug!(?settings, "settings resolved");
    Ok(settings)
}

async fn open_manager(settings: &Settings) -> Result<JobManager> {
    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create data directory {}", parent.display()))?;
    }
    let db = Database::new(&settings.database_path)
        .await
        .with_context(|| format!("cannot open job database {}", settings.database_path.display()))?;
    let client = HttpClient::with_timeouts(settings.connect_timeout(), settings.read_timeout())?;

    let manager = JobManager::new(
        JobStore::new(db),
        client,
        EventSink::default(),
        settings.download_dir.clone(),
        settings.max_concurrent,
    );
    let demoted = manager.reconcile().await?;
    if demoted > 0 {
        info!(demoted, "interrupted jobs are paused; use `lockerdl resume <id>`");
    }
    Ok(manager)
}

/// Runs one subcommand. Returns how many of the jobs it waited on failed.
async fn run_command(args: &Args, manager: &JobManager) -> Result<usize> {
    let show_progress = args.command.runs_transfers() && !args.quiet && io::stderr().is_terminal();
    let ui = args
        .command
        .runs_transfers()
        .then(|| progress_ui::spawn_progress_ui(show_progress, manager.clone(), manager.subscribe()));

    let mut watched = Vec::new();
    match &args.command {
        Command::Get {
            url,
            name,
            password,
        } => {
            let registry = build_default_resolver_registry();
            let resolution = registry
                .resolve(url, password.as_deref())
                .await
                .with_context(|| format!("cannot resolve {url}"))?;
            info!(files = resolution.items.len(), "link resolved");

            for (item, outcome) in resolution
                .items
                .iter()
                .zip(manager.submit_resolution(&resolution, name.as_deref()).await)
            {
                match outcome {
                    Ok(outcome) => {
                        println!("{}: {outcome}", item.relative_path);
                        watched.extend(outcome.job_id());
                    }
                    Err(error) => warn!(file = %item.relative_path, error = %error, "not submitted"),
                }
            }
        }
        Command::Resume { id } => {
            let outcome = manager.resume(*id).await?;
            println!("{outcome}");
            watched.extend(outcome.job_id());
        }
        Command::Retry { id } => {
            let outcome = manager.retry(*id).await?;
            println!("{outcome}");
            watched.extend(outcome.job_id());
        }
        Command::List => print_jobs(&manager.list_jobs().await?),
        Command::Show { id } => {
            let job = manager
                .get_job(*id)
                .await?
                .with_context(|| format!("download job not found: id {id}"))?;
            print_job_details(&job);
        }
        Command::Cancel { id } => {
            manager.cancel(*id).await?;
            println!("job {id} cancelled");
        }
        Command::Delete { ids } => {
            let removed = manager.delete_jobs(ids).await?;
            println!("{removed} job(s) deleted");
        }
        Command::ClearCompleted => {
            let removed = manager.clear_completed().await?;
            println!("{removed} completed job(s) cleared");
        }
    }

    if !watched.is_empty() {
        wait_for_transfers(manager).await?;
    }
    if let Some((handle, stop)) = ui {
        let _ = stop.send(());
        let _ = handle.await;
    }

    count_failed(manager, &watched).await
}

/// Waits for every worker; Ctrl-C pauses them so a later `resume` continues.
async fn wait_for_transfers(manager: &JobManager) -> Result<()> {
    tokio::select! {
        () = manager.wait_idle() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("cannot listen for Ctrl-C")?;
            warn!("interrupted; pausing active downloads");
            manager.pause_all().await?;
            manager.wait_idle().await;
        }
    }
    Ok(())
}

async fn count_failed(manager: &JobManager, job_ids: &[i64]) -> Result<usize> {
    let mut failed = 0;
    for &id in job_ids {
        if let Some(job) = manager.get_job(id).await?
            && job.status() == JobStatus::Failed
        {
            failed += 1;
        }
    }
    Ok(failed)
}

fn print_jobs(jobs: &[DownloadJob]) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }
    println!("{:>5}  {:<11}  {:>6}  {:>12}  NAME", "ID", "STATUS", "DONE", "BYTES");
    for job in jobs {
        let percent = job
            .progress_percent()
            .map_or_else(|| "-".to_string(), |p| format!("{p}%"));
        println!(
            "{:>5}  {:<11}  {:>6}  {:>12}  {}",
            job.id,
            job.status().as_str(),
            percent,
            job.downloaded_bytes,
            job.display_name
        );
    }
}

fn print_job_details(job: &DownloadJob) {
    let total = if job.total_bytes > 0 {
        job.total_bytes.to_string()
    } else {
        "unknown".to_string()
    };
    println!("id:         {}", job.id);
    println!("name:       {}", job.display_name);
    println!("status:     {}", job.status());
    println!("url:        {}", job.url);
    println!("path:       {}", job.local_path().display());
    println!("downloaded: {} / {total}", job.downloaded_bytes);
    if let Some(group) = &job.group_id {
        println!("group:      {group}");
    }
}
