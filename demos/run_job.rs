//! Runs one NSRDB job end to end and prints the result.
//!
//! ```sh
//! NSRDB_API_KEY=... NSRDB_EMAIL=me@example.com cargo run --example run_job
//! ```

use openweather::{JobRequest, JobResult, Orchestrator, OpenWeatherError, Settings};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), OpenWeatherError> {
    let settings = Settings::from_env()?;
    let api_key = std::env::var("NSRDB_API_KEY").unwrap_or_default();
    let email = std::env::var("NSRDB_EMAIL").unwrap_or_default();

    let orchestrator = Arc::new(Orchestrator::nsrdb(settings)?);
    let request = JobRequest::builder()
        .wkt("POINT(-76.4833 42.4433)")
        .dataset("aggregated")
        .interval("60")
        .years(vec!["2022".to_string()])
        .api_key(api_key)
        .email(email)
        .location("Ithaca")
        .region("New York")
        .country("United States")
        .build();

    let handle = match orchestrator.start(request).await {
        Ok(handle) => handle,
        Err(e) => {
            for message in e.messages() {
                eprintln!("{}", message);
            }
            return Ok(());
        }
    };
    println!("Job {} writing to {}", handle.job_id(), handle.directory().display());

    let job_id = handle.job_id();
    let poller = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            while let Some(progress) = orchestrator.progress(job_id).await {
                let state = progress.state;
                println!(
                    "{}: download {:.0}%, conversion {:.0}%",
                    state.status, state.download_progress, state.conversion_progress
                );
                if state.status.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        })
    };

    let result = match handle.join().await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Job task panicked: {}", e);
            return Ok(());
        }
    };
    let _ = poller.await;

    match &result {
        JobResult::Success(success) => {
            println!(
                "Done: {} file(s), {}",
                success.summary.total_files, success.summary.total_size_formatted
            );
        }
        JobResult::Failure(failure) => {
            for error in &failure.errors {
                eprintln!("{:?}: {}", failure.kind, error);
            }
        }
    }
    Ok(())
}
