use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use iris_serve::config::load_config;
use iris_serve::scaling::{
    Autoscaler, ScaleDecision, ScalingError, ScalingPolicy, UtilizationSample, UtilizationSource,
};

#[derive(Parser)]
#[command(name = "iris-cli")]
#[command(about = "Client and tooling for the iris classifier service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one flower
    Predict {
        sepal_length: f64,
        sepal_width: f64,
        petal_length: f64,
        petal_width: f64,
    },
    /// Liveness probe
    Health,
    /// Service, model and span export status
    Status,
    /// Send prediction requests and report latency percentiles
    Load {
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        #[arg(short = 'n', long, default_value_t = 200)]
        requests: usize,
    },
    /// Replay utilization samples through the scaling policy
    Simulate {
        /// Config file whose [scaling] section is used
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Comma-separated utilization fractions, one per sync interval
        #[arg(short, long, value_delimiter = ',', required = true)]
        samples: Vec<f64>,

        /// Replica count before the first sample
        #[arg(short, long)]
        initial: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Predict {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        } => {
            let res = client
                .post(format!("{}/predict/", base))
                .json(&json!({
                    "sepal_length": sepal_length,
                    "sepal_width": sepal_width,
                    "petal_length": petal_length,
                    "petal_width": petal_width,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client.get(format!("{}/status", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Load {
            concurrency,
            requests,
        } => {
            run_load(client, &base, concurrency.max(1), requests).await;
        }
        Commands::Simulate {
            config,
            samples,
            initial,
        } => {
            let config = load_config(config.as_deref())?;
            simulate(ScalingPolicy::from_config(&config.scaling), samples, initial).await;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn run_load(client: reqwest::Client, base: &str, concurrency: usize, requests: usize) {
    let url = format!("{}/predict/", base);
    let remaining = Arc::new(AtomicUsize::new(requests));
    let failures = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let client = client.clone();
        let url = url.clone();
        let remaining = remaining.clone();
        let failures = failures.clone();
        workers.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            while remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                let sent = Instant::now();
                let ok = client
                    .post(&url)
                    .json(&json!({
                        "sepal_length": 5.1,
                        "sepal_width": 3.5,
                        "petal_length": 1.4,
                        "petal_width": 0.2,
                    }))
                    .send()
                    .await
                    .map(|r| r.status().is_success())
                    .unwrap_or(false);
                if ok {
                    latencies.push(sent.elapsed());
                } else {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            latencies
        }));
    }

    let mut latencies = Vec::with_capacity(requests);
    for worker in workers {
        if let Ok(mut batch) = worker.await {
            latencies.append(&mut batch);
        }
    }
    let elapsed = started.elapsed();
    latencies.sort_unstable();

    println!("requests:    {}", requests);
    println!("succeeded:   {}", latencies.len());
    println!("failed:      {}", failures.load(Ordering::Relaxed));
    println!("elapsed:     {:.2?}", elapsed);
    println!(
        "throughput:  {:.1} req/s",
        latencies.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    for (label, q) in [("p50", 0.50), ("p95", 0.95), ("p99", 0.99)] {
        match percentile(&latencies, q) {
            Some(d) => println!("{}:         {:.2?}", label, d),
            None => println!("{}:         -", label),
        }
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], q: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.saturating_sub(1).min(sorted.len() - 1)).copied()
}

struct Replay(Mutex<VecDeque<f64>>);

impl UtilizationSource for Replay {
    async fn sample(&self) -> Result<UtilizationSample, ScalingError> {
        let next = self.0.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        next.map(UtilizationSample::new)
            .ok_or_else(|| ScalingError::Sample("no samples left".into()))
    }
}

/// One sync interval of a replayed utilization trace.
struct ReplayStep {
    offset: Duration,
    utilization: f64,
    replicas: u32,
    outcome: Result<ScaleDecision, ScalingError>,
}

/// Feed `samples` to the autoscaler, one per `sync_interval`, on a virtual clock.
async fn replay(policy: ScalingPolicy, samples: &[f64], initial: Option<u32>) -> Vec<ReplayStep> {
    let interval = policy.sync_interval;
    let mut scaler = Autoscaler::new(policy, Replay(Mutex::new(samples.iter().copied().collect())));
    if let Some(initial) = initial {
        scaler = scaler.with_initial_replicas(initial);
    }

    let start = tokio::time::Instant::now();
    let mut steps = Vec::with_capacity(samples.len());
    for (i, &utilization) in samples.iter().enumerate() {
        let offset = interval * i as u32;
        let outcome = scaler.tick(start + offset).await;
        steps.push(ReplayStep {
            offset,
            utilization,
            replicas: scaler.replicas().current(),
            outcome,
        });
    }
    steps
}

async fn simulate(policy: ScalingPolicy, samples: Vec<f64>, initial: Option<u32>) {
    println!("{:>4}  {:>8}  {:>11}  {:>8}", "tick", "time", "utilization", "replicas");
    for (i, step) in replay(policy, &samples, initial).await.iter().enumerate() {
        let outcome = match &step.outcome {
            Ok(ScaleDecision::ScaleTo(n)) => format!("-> {}", n),
            Ok(ScaleDecision::NoChange) => String::new(),
            Err(e) => format!("error: {}", e),
        };
        println!(
            "{:>4}  {:>7}s  {:>10.0}%  {:>8}  {}",
            i,
            step.offset.as_secs(),
            step.utilization * 100.0,
            step.replicas,
            outcome
        );
    }
}
