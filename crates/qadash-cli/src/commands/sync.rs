//! Sync command handlers

use anyhow::Result;
use tracing::debug;

use qadash_core::sync::{DrainOutcome, ProbeOutcome, RefreshOutcome, SyncReport};
use qadash_core::{Store, SyncEvent};

use crate::output::{Output, OutputFormat};

/// Probe the server, upload queued tasks and refresh the cache
pub async fn sync(store: &Store, output: &Output) -> Result<()> {
    output.message(&format!("Connecting to {}...", store.config().api_url));
    let report = store.sync().sync_now().await;

    match report.probe {
        ProbeOutcome::Reachable { .. } | ProbeOutcome::Coalesced => {}
        ProbeOutcome::Unreachable { ref reason } => {
            output.warning(&format!("Server unreachable: {}", reason));
            let queued = store.sync().queued().await.len();
            if queued > 0 {
                output.message(&format!("{} task(s) stay queued for upload", queued));
            }
            return Ok(());
        }
    }

    match report.drain {
        Some(DrainOutcome::Completed(ref drain)) => output.print_drain(drain),
        Some(DrainOutcome::AlreadyRunning) => output.message("Upload already in progress"),
        Some(DrainOutcome::Empty) | None => {}
    }

    match report.refresh {
        Some(RefreshOutcome::Refreshed { tasks }) => {
            output.success(&format!("Sync complete - {} task(s)", tasks));
        }
        Some(RefreshOutcome::Failed(ref e)) => output.warning(&format!("Refresh failed: {}", e)),
        Some(RefreshOutcome::Skipped) => {}
        None => output.success("Sync complete"),
    }

    Ok(())
}

/// Sync quietly before reads; the cached copy is used when offline
pub async fn auto_sync(store: &Store, output: &Output) {
    let report = store.sync().sync_now().await;
    debug!(?report, "Auto-sync finished");
    for warning in auto_sync_warnings(&report) {
        output.warning(&warning);
    }
}

fn auto_sync_warnings(report: &SyncReport) -> Vec<String> {
    let mut warnings = Vec::new();
    if let ProbeOutcome::Unreachable { .. } = report.probe {
        warnings.push("Server unreachable, showing cached tasks".to_string());
    }
    if let Some(DrainOutcome::Completed(ref drain)) = report.drain {
        if !drain.is_clean() {
            warnings.push(format!("Upload incomplete: {}", drain.summary()));
        }
        warnings.extend(drain.warnings.iter().cloned());
    }
    if let Some(RefreshOutcome::Failed(ref e)) = report.refresh {
        warnings.push(format!("Refresh failed: {}", e));
    }
    warnings
}

/// List creates waiting in the offline queue
pub async fn pending(store: &Store, output: &Output) -> Result<()> {
    let entries = store.sync().queued().await;
    output.print_queue(&entries);
    Ok(())
}

/// Check the server and show the local sync state
///
/// Read-only: nothing is uploaded and the recorded reachability is kept.
pub async fn health(store: &Store, output: &Output) -> Result<()> {
    let server = store.sync().check_health().await;
    let status = store.sync().status().await;

    match output.format {
        OutputFormat::Json => {
            let (server, error) = match server {
                Ok(ref report) => (serde_json::to_value(report)?, None),
                Err(ref e) => (serde_json::Value::Null, Some(e.to_string())),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "api_url": store.config().api_url,
                    "server": server,
                    "error": error,
                    "sync": status,
                }))?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", if server.is_ok() { "up" } else { "down" });
        }
        OutputFormat::Human => {
            println!("QA Dashboard Status");
            println!("===================");
            println!();
            println!("API: {}", store.config().api_url);
            match server {
                Ok(ref report) => {
                    println!("  Status:   {}", report.status);
                    if let Some(ref version) = report.version {
                        println!("  Version:  {}", version);
                    }
                    if let Some(ref database) = report.database {
                        println!("  Database: {}", database);
                    }
                }
                Err(ref e) => println!("  Unreachable: {}", e),
            }
            println!();
            output.print_sync_status(&status);
        }
    }

    Ok(())
}

/// Run the scheduler in the foreground and print sync events until Ctrl-C
pub async fn watch(store: &mut Store, output: &Output) -> Result<()> {
    let Some(mut events) = store.take_events() else {
        anyhow::bail!("Sync events already taken");
    };
    let scheduler = store.start_scheduler();
    output.message(&format!(
        "Watching {} (Ctrl-C to stop)",
        store.config().api_url
    ));

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = describe_event(&event) {
                    output.message(&line);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

/// One-line notice for an event; phase changes are too chatty to print
fn describe_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::ReachabilityChanged(r) => {
            Some(format!("Server is now {}", format!("{:?}", r).to_lowercase()))
        }
        SyncEvent::PhaseChanged(_) => None,
        SyncEvent::Uploaded(u) => Some(format!("Uploaded {} as {}", u.offline_id, u.task_id)),
        SyncEvent::UploadFailed(f) => Some(format!(
            "Upload of \"{}\" failed, will retry: {}",
            f.title, f.error
        )),
        SyncEvent::DrainFinished(report) => Some(report.summary()),
        SyncEvent::CacheRefreshed { tasks } => Some(format!("Refreshed {} task(s)", tasks)),
        SyncEvent::StorageWarning(msg) => Some(format!("Storage warning: {}", msg)),
    }
}
