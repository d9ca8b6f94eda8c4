mod capture;
mod db;
mod filter;
mod sink;
mod source;
#[cfg(test)]
mod test_support;

use capture::{CancelToken, ScanSession, SessionCommand, SessionError, SessionOutcome};
use db::ScanLog;
use label_scan_common::config::Config;
use label_scan_common::frame::StillImage;
use label_scan_common::verdict::ComplianceVerdict;
use sink::{submit_cancellable, HttpComplianceSink, SinkError};
use source::{MjpegCamera, SourceError};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const RECENT_ON_EXIT: u32 = 5;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        stream = config.stream.url,
        api = config.api.base_url,
        interval_ms = config.sampler.interval_ms,
        window = config.stability.window,
        threshold = config.stability.threshold,
        countdown = config.capture.countdown_start,
        continuous = config.capture.continuous,
        "starting label-scan"
    );

    let code = run(config).await;
    std::process::exit(code);
}

async fn run(config: Config) -> i32 {
    // A missing log file only costs history; keep this run's results in memory.
    let device_id = &config.database.device_id;
    let scan_log = match ScanLog::open(Path::new(&config.database.path), device_id) {
        Ok(log) => Some(log),
        Err(e) => {
            error!(error = %e, "failed to open scan log; results will not be persisted");
            ScanLog::open_in_memory(device_id)
                .map_err(|e| warn!(error = %e, "in-memory scan log unavailable"))
                .ok()
        }
    };

    let sink = match HttpComplianceSink::new(&config.api) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to build compliance API client");
            return 1;
        }
    };
    info!(endpoint = sink.endpoint(), "compliance API client ready");

    let cancel = CancelToken::new();
    let (command_tx, mut commands) = mpsc::channel(8);

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            ctrl_c.cancel();
        }
    });
    tokio::spawn(read_commands(command_tx, cancel.clone()));

    let camera = match connect_camera(&config).await {
        Ok(c) => c,
        Err(_) => return 1,
    };
    let mut session = ScanSession::new(camera, &config);
    let mut scans: u64 = 0;

    loop {
        println!("Hold the label steady in frame. Type 'c' + Enter to capture now, 'q' to quit.");

        let still = match session.run(&cancel, &mut commands).await {
            Ok(SessionOutcome::Captured(still)) => still,
            Ok(SessionOutcome::Cancelled) => break,
            Err(SessionError::SourceLost) => {
                error!(url = config.stream.url, "camera stream lost");
                eprintln!("Camera error: stream lost. Nothing was captured.");
                return 1;
            }
            Err(e) => {
                error!(error = %e, "capture failed");
                return 1;
            }
        };

        scans += 1;
        submit_and_record(&sink, still, &config, scan_log.as_ref(), &cancel).await;

        if !config.capture.continuous || cancel.is_cancelled() {
            break;
        }

        match connect_camera(&config).await {
            Ok(camera) => session.restart(camera),
            Err(_) => return 1,
        }
    }

    if let Some(log) = &scan_log {
        match log.stats() {
            Ok(stats) => info!(
                session_scans = scans,
                total = stats.total,
                compliant = stats.compliant,
                non_compliant = stats.non_compliant,
                manual_review = stats.manual_review,
                failed = stats.failed,
                "scan log totals"
            ),
            Err(e) => warn!(error = %e, "failed to read scan log totals"),
        }
        match log.recent(RECENT_ON_EXIT) {
            Ok(records) if !records.is_empty() => {
                println!("Recent scans:");
                for r in records {
                    let when = chrono::DateTime::from_timestamp_millis(r.captured_at_ms)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("  {when}  {:<6}  {}", r.capture_trigger, r.status);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read recent scans"),
        }
    }
    info!("label-scan stopped");
    0
}

async fn connect_camera(config: &Config) -> Result<MjpegCamera, SourceError> {
    MjpegCamera::connect(&config.stream.url, config.stream.connect_timeout()).await.map_err(|e| {
        error!(error = %e, url = config.stream.url, terminal = e.is_terminal(), "could not acquire camera");
        eprintln!("Camera error: {e}");
        e
    })
}

/// Send the still for analysis, print the verdict and record the outcome.
async fn submit_and_record(
    sink: &HttpComplianceSink,
    still: StillImage,
    config: &Config,
    scan_log: Option<&ScanLog>,
    cancel: &CancelToken,
) {
    let captured_at_ms = still.captured_at_ms;
    let trigger = still.trigger;
    println!("Analyzing label...");

    match submit_cancellable(sink, still, config.api.alt_language, cancel).await {
        Ok(verdict) => {
            print_verdict(&verdict);
            if let Some(log) = scan_log {
                if let Err(e) = log.insert_verdict(captured_at_ms, trigger, &verdict) {
                    warn!(error = %e, "failed to log verdict");
                }
            }
        }
        Err(SinkError::Cancelled) => {
            info!("submission abandoned on shutdown");
        }
        Err(e) => {
            error!(error = %e, network = e.is_network(), "submission failed");
            eprintln!("Analysis failed: {e}. Recapture to try again.");
            if let Some(log) = scan_log {
                if let Err(log_err) = log.insert_failure(captured_at_ms, trigger, &e.to_string()) {
                    warn!(error = %log_err, "failed to log submission failure");
                }
            }
        }
    }
}

fn print_verdict(verdict: &ComplianceVerdict) {
    println!(
        "{} (confidence {:.1}%, {:.0} ms)",
        verdict.compliance_status.as_str(),
        verdict.confidence_score,
        verdict.processing_time_ms
    );
    let missing = verdict.missing_fields();
    if !missing.is_empty() {
        println!("  missing: {}", missing.join(", "));
    }
    let pii = verdict.pii_categories();
    if !pii.is_empty() {
        println!("  personal data: {}", pii.join(", "));
    }
    if verdict.tamper_alert {
        println!("  tamper alert: {}", verdict.tamper_reason);
    }
}

/// Operator commands on stdin: `c` captures now, `q` quits.
async fn read_commands(tx: mpsc::Sender<SessionCommand>, cancel: CancelToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match line.trim() {
                "c" | "capture" => {
                    if tx.send(SessionCommand::Capture).await.is_err() {
                        return;
                    }
                }
                "q" | "quit" => {
                    cancel.cancel();
                    return;
                }
                "" => {}
                other => println!("unknown command '{other}' (c = capture, q = quit)"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                return;
            }
        }
    }
}
