//! Mirror a small generated tree and print the progress stream

use std::error::Error;
use std::time::Duration;
use mirror::{MirrorRunner, ProgressEvent, SyncOptions, SyncRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("Basic Mirror Example");
    println!("====================");

    let temp_dir = tempfile::TempDir::new()?;
    let source_dir = temp_dir.path().join("source");
    let target_dir = temp_dir.path().join("target");

    tokio::fs::create_dir_all(source_dir.join("subdir")).await?;
    tokio::fs::write(source_dir.join("file1.txt"), b"This is file 1 content").await?;
    tokio::fs::write(source_dir.join("file2.txt"), b"This is file 2 content").await?;
    tokio::fs::write(source_dir.join("subdir").join("file3.txt"), b"This is file 3 content").await?;

    // Stale content the mirror should remove
    tokio::fs::create_dir_all(target_dir.join("old")).await?;
    tokio::fs::write(target_dir.join("old").join("stale.txt"), b"stale").await?;

    println!("Source directory: {}", source_dir.display());
    println!("Target directory: {}", target_dir.display());
    println!();

    let options = SyncOptions {
        report_interval: Duration::ZERO,
        ..Default::default()
    };
    let mut runner = MirrorRunner::new(options);
    runner.setup(SyncRequest::new(&source_dir, &target_dir).report_detail(true))?;

    let mut run = runner.start()?;
    while let Some(event) = run.next_event().await {
        match event {
            ProgressEvent::Info { message } => println!("{}", message),
            ProgressEvent::Error { message } => eprintln!("error: {}", message),
            ProgressEvent::Status { message, stats } => println!("[{}] {}", stats.status_line(), message),
            ProgressEvent::Finished { .. } => {}
        }
    }

    let stats = run.wait().await?;
    println!();
    println!("{}", stats.summary());

    // A second pass finds nothing to do
    runner.setup(SyncRequest::new(&source_dir, &target_dir))?;
    let stats = runner.start()?.wait().await?;
    println!("Second run unchanged: {}", stats.is_unchanged());

    Ok(())
}
