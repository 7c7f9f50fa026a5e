//! Example usage of persistent_jobs
//!
//! Run with: cargo run --example basic

use std::time::Duration;

use persistent_jobs::{telemetry, JobContext, JobOptions, Queue, QueueConfig, WorkerOptions};

mod jobs;
use jobs::process_payment::ProcessPayment;
use jobs::send_email::SendEmail;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // 1. Open the queue (SQLite file from JOBQUEUE_DATABASE_URL, or ./jobs.db)
    let queue = Queue::connect(QueueConfig::load()?).await?;

    // 2. Register workers
    queue.add_worker(
        "send_email",
        |ctx: JobContext| async move {
            let args: SendEmail = ctx.payload_as().map_err(|e| e.to_string())?;
            SendEmail::handler(args).await
        },
        WorkerOptions::new().concurrency(2),
    )?;

    queue.add_worker(
        "process_payment",
        |ctx: JobContext| async move {
            let args: ProcessPayment = ctx.payload_as().map_err(|e| e.to_string())?;
            ProcessPayment::handler(args).await
        },
        WorkerOptions::new()
            .on_failure(|id, _payload| async move {
                println!("Payment job {id} failed, retrying");
                Ok(())
            })
            .on_failed(|id, _payload| async move {
                println!("Payment job {id} needs manual review");
                Ok(())
            }),
    )?;

    // 3. Enqueue jobs
    queue
        .create_job(
            "send_email",
            &SendEmail {
                to: "user@example.com".to_string(),
                subject: "Welcome!".to_string(),
            },
            JobOptions::new().with_priority(10),
            false,
        )
        .await?;

    queue
        .create_job(
            "process_payment",
            &ProcessPayment {
                order_id: "ORD-123".to_string(),
                amount: 1500.0,
            },
            JobOptions::new()
                .with_attempts(3)
                .with_timeout(Duration::from_secs(5))
                .with_wait_before_retry(Duration::from_millis(200)),
            false,
        )
        .await?;

    // 4. Process everything that fits in a 30 second budget
    queue.start(Some(Duration::from_secs(30))).await?;

    for job in queue.jobs().await? {
        println!("left in queue: {} ({}) failed={:?}", job.name, job.id, job.failed);
    }

    Ok(())
}
