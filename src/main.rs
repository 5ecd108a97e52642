use anyhow::{Context, Result};
use clap::Parser;
use packwise::config::PackwiseConfig;
use packwise::store::{TripLinkRegistry, TripRepository};
use packwise::jobs::ReportReceiver;
use packwise::{
    FjallStore, ForecastProcessor, JobQueue, JobRunner, PackwiseError, RetryPolicy,
    TomorrowClient, Trip, TripId, TripPipeline, TripStatus, telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cli;

use cli::{Cli, Commands};

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<PackwiseError>() {
            Some(app_error) => eprintln!("Error: {}", app_error.user_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PackwiseConfig::load_from_path(cli.config.clone())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    telemetry::init_tracing(&config.logging)?;

    let store = Arc::new(
        FjallStore::open(&config.cache.location)
            .with_context(|| format!("Failed to open store at {}", config.cache.location))?,
    );

    match cli.command {
        Commands::Plan(args) => {
            let trip = Trip::new(&args.city, args.start, args.end)
                .map_err(|e| PackwiseError::validation(e.to_string()))?;
            drive(&config, store, Kickoff::Submit(trip)).await
        }
        Commands::Resume(args) => drive(&config, store, Kickoff::Resume(args.trip)).await,
        Commands::Show(args) => print_trip(&store, args.trip).await,
        Commands::List => list_trips(&store).await,
        Commands::Delete(args) => {
            if store.delete_trip(args.trip).await? {
                println!("Deleted trip {}", args.trip);
                Ok(())
            } else {
                Err(PackwiseError::validation(format!("no trip with id {}", args.trip)).into())
            }
        }
    }
}

/// How a trip enters the pipeline
enum Kickoff {
    Submit(Trip),
    Resume(TripId),
}

/// Run the pipeline in-process until the trip finishes or stops making progress
async fn drive(config: &PackwiseConfig, store: Arc<FjallStore>, kickoff: Kickoff) -> Result<()> {
    let provider = Arc::new(TomorrowClient::new(&config.weather)?);
    let processor = ForecastProcessor::new(Arc::clone(&store), provider)
        .with_freshness_window(config.cache.freshness_window());
    let (queue, receiver) = JobQueue::new();
    let pipeline = Arc::new(TripPipeline::new(
        Arc::clone(&store),
        processor,
        Arc::new(queue),
        RetryPolicy::from_config(&config.pipeline),
    ));

    let (report_tx, mut reports) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let runner = JobRunner::new(Arc::clone(&pipeline), config.pipeline.workers).with_reports(report_tx);
    let runner_task = tokio::spawn(runner.run(receiver, shutdown.clone()));

    let trip = match kickoff {
        Kickoff::Submit(trip) => {
            let trip = pipeline.submit(trip).await?;
            println!("Planning trip {} to {}", trip.id, trip.city);
            trip
        }
        Kickoff::Resume(trip_id) => {
            let trip = pipeline.resume(trip_id).await?;
            println!("Resuming trip {} to {} ({})", trip.id, trip.city, trip.status);
            trip
        }
    };

    let status = wait_for_terminal(&store, trip.id, &mut reports).await;
    shutdown.cancel();
    runner_task.await?;
    let status = status?;

    print_trip(&store, trip.id).await?;
    if status == TripStatus::Failed {
        return Err(PackwiseError::general("Trip processing could not complete.").into());
    }
    Ok(())
}

async fn current_status(store: &FjallStore, trip_id: TripId) -> Result<TripStatus> {
    let trip = store
        .trip(trip_id)
        .await?
        .ok_or_else(|| PackwiseError::general(format!("trip {trip_id} disappeared")))?;
    Ok(trip.status)
}

/// Wait for `ready` or `failed`.
///
/// A job for this trip that ends without completing while the trip is still
/// unfinished means nothing else will move it, so waiting stops there.
async fn wait_for_terminal(
    store: &FjallStore,
    trip_id: TripId,
    reports: &mut ReportReceiver,
) -> Result<TripStatus> {
    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let status = current_status(store, trip_id).await?;
                if status.is_terminal() {
                    info!(trip_id = %trip_id, %status, "Trip finished");
                    return Ok(status);
                }
            }
            report = reports.recv() => {
                let Some(report) = report else {
                    return Err(PackwiseError::general("Job runner stopped unexpectedly.").into());
                };
                if report.job.trip_id() != trip_id {
                    continue;
                }
                let status = current_status(store, trip_id).await?;
                if status.is_terminal() {
                    info!(trip_id = %trip_id, %status, "Trip finished");
                    return Ok(status);
                }
                if report.is_failure() {
                    return Err(PackwiseError::general(format!(
                        "Trip {trip_id} stopped while {status} ({}). Run `packwise resume --trip {trip_id}` to try again.",
                        report.outcome
                    ))
                    .into());
                }
            }
        }
    }
}

async fn list_trips(store: &FjallStore) -> Result<()> {
    let trips = store.trips().await?;
    if trips.is_empty() {
        println!("No trips yet");
        return Ok(());
    }
    for trip in &trips {
        println!(
            "{}  {:<20} {} to {}  {}",
            trip.id, trip.city, trip.start_date, trip.end_date, trip.status
        );
    }
    Ok(())
}

async fn print_trip(store: &FjallStore, trip_id: TripId) -> Result<()> {
    let trip = store
        .trip(trip_id)
        .await?
        .ok_or_else(|| PackwiseError::validation(format!("no trip with id {trip_id}")))?;

    println!();
    println!(
        "{} | {} to {} ({} days) | {}",
        trip.city,
        trip.start_date,
        trip.end_date,
        trip.duration_days(),
        trip.status
    );

    let forecasts = store.linked_forecasts(trip_id).await?;
    if !forecasts.is_empty() {
        println!("\nForecast:");
        for forecast in &forecasts {
            let weather = &forecast.weather;
            println!(
                "  {}  {:<18} {:<22} rain {:>3.0}%  UV {}",
                forecast.date(),
                forecast.format_temperature(),
                weather.conditions,
                weather.precipitation_probability.unwrap_or(0.0),
                weather.uv_index_max.unwrap_or(0)
            );
        }
    }

    let recommendations = store.recommendations(trip_id).await?;
    if !recommendations.is_empty() {
        println!("\nPack:");
        for recommendation in &recommendations {
            println!("  {:<12} {}", recommendation.category.as_str(), recommendation.details);
        }
    }
    Ok(())
}
