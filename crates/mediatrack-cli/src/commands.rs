//! CLI command implementations

use crate::output::{print_rows, OutputFormat};
use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mediatrack_core::{
    Hit, HitStore, HttpTransport, MediaAnalytics, MediaState, MemoryHitStore, RecordingProcessor,
    SqliteHitStore, Tracker, TrackerConfig, TrackerEvent,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::Tabled;
use tracing::{info, warn};

/// Interval between delivery progress checks
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shared configuration from a JSON file, defaults otherwise
pub fn load_state(path: Option<&Path>) -> anyhow::Result<MediaState> {
    let Some(path) = path else {
        return Ok(MediaState::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(state)
}

/// One event per non-empty line, `#` starts a comment line
pub fn parse_script(source: &str) -> anyhow::Result<Vec<(usize, TrackerEvent)>> {
    let mut events = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(line)
            .with_context(|| format!("invalid event on line {}", index + 1))?;
        events.push((index + 1, event));
    }
    Ok(events)
}

fn read_script(path: &Path) -> anyhow::Result<Vec<(usize, TrackerEvent)>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_script(&source)
}

fn format_ts(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

// =============================================================================
// Validate
// =============================================================================

#[derive(Debug, Serialize, Tabled)]
pub struct EventRow {
    line: usize,
    event: String,
    timestamp: String,
    valid: bool,
    message: String,
}

/// Run a script against the playback rules without delivering anything
pub fn validate(script: &Path, offline: bool, format: &str) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let events = read_script(script)?;

    let processor = Arc::new(RecordingProcessor::new());
    let mut tracker = Tracker::new(
        processor.clone(),
        TrackerConfig {
            downloaded_content: offline,
            ..Default::default()
        },
    );

    let rows: Vec<EventRow> = events
        .iter()
        .map(|(line, event)| {
            let response = tracker.track_event(event);
            EventRow {
                line: *line,
                event: event.name.clone(),
                timestamp: event.timestamp.map(|ts| ts.to_string()).unwrap_or_default(),
                valid: response.valid,
                message: response.message,
            }
        })
        .collect();

    print_rows(&rows, format, |row| {
        let verdict = if row.valid {
            style("OK").green().to_string()
        } else {
            style("INVALID").red().to_string()
        };
        if row.message.is_empty() {
            format!("{:>4}  {:<16} {}", row.line, row.event, verdict)
        } else {
            format!("{:>4}  {:<16} {} {}", row.line, row.event, verdict, row.message)
        }
    })?;

    let invalid = rows.iter().filter(|row| !row.valid).count();
    let hits = processor.hits().len();

    if format != OutputFormat::Json {
        println!(
            "\n{} events, {} invalid, {} hits generated in {} sessions",
            rows.len(),
            invalid,
            hits,
            processor.sessions_started()
        );
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} events rejected", invalid, rows.len());
    }

    Ok(())
}

// =============================================================================
// Replay
// =============================================================================

#[derive(Debug, Serialize)]
struct ReplaySummary {
    events: usize,
    rejected: usize,
    delivered: bool,
    elapsed_ms: u128,
}

/// Replay a script through the delivery services and wait for them to drain
pub async fn replay(
    script: &Path,
    state: MediaState,
    db: Option<PathBuf>,
    offline: bool,
    timeout: u64,
    format: &str,
) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let events = read_script(script)?;
    info!(script = %script.display(), events = events.len(), offline, "Replaying script");

    let store: mediatrack_core::Result<Box<dyn HitStore>> = match &db {
        Some(path) => SqliteHitStore::open(path).map(|store| Box::new(store) as Box<dyn HitStore>),
        None => Ok(Box::new(MemoryHitStore::new())),
    };

    let analytics = MediaAnalytics::new(state, Arc::new(HttpTransport::new()), store);
    let mut created = analytics.subscribe_sessions();
    let mut tracker = analytics.create_tracker(TrackerConfig {
        downloaded_content: offline,
        ..Default::default()
    });

    let progress = if format == OutputFormat::Text {
        let bar = ProgressBar::new(events.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "{spinner} [{bar:40}] {pos}/{len} {msg}",
        )?);
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut rejected = 0;
    for (line, event) in &events {
        progress.set_message(event.name.clone());
        let response = tracker.track_event(event);
        if !response.valid {
            rejected += 1;
            progress.println(format!(
                "{} line {}: {} {}",
                style("rejected").yellow(),
                line,
                event.name,
                response.message
            ));
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let start = Instant::now();
    let deadline = Duration::from_secs(timeout);
    let delivered = loop {
        if let Some(created) = created.as_mut() {
            while let Ok(session) = created.try_recv() {
                if format == OutputFormat::Text {
                    println!(
                        "[{}] Session created: {} (client {})",
                        now(),
                        session.backend_session_id,
                        session.client_session_id.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        let realtime_busy = analytics
            .realtime_service()
            .is_some_and(|service| service.session_count() > 0);
        let offline_busy = analytics
            .offline_service()
            .is_some_and(|service| service.has_pending_reports());

        if !realtime_busy && !offline_busy {
            break true;
        }
        if start.elapsed() >= deadline {
            break false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    analytics.destroy();

    let summary = ReplaySummary {
        events: events.len(),
        rejected,
        delivered,
        elapsed_ms: start.elapsed().as_millis(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            let status = if delivered {
                style("delivered").green()
            } else {
                style("incomplete").red()
            };
            println!(
                "[{}] {} events replayed, {} rejected, delivery {} after {}ms",
                now(),
                summary.events,
                summary.rejected,
                status,
                summary.elapsed_ms
            );
        }
    }

    if !delivered {
        warn!(timeout, "Delivery still pending, giving up");
        anyhow::bail!("delivery did not finish within {}s", timeout);
    }

    Ok(())
}

// =============================================================================
// Pending
// =============================================================================

#[derive(Debug, Serialize, Tabled)]
pub struct PendingRow {
    session: String,
    hits: usize,
    first_hit: String,
    last_hit: String,
}

/// List sessions persisted in an offline hit database
pub fn pending(db: &Path, format: &str) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let store = SqliteHitStore::open(db)
        .with_context(|| format!("failed to open hit store {}", db.display()))?;

    let mut rows = Vec::new();
    for session in store.session_ids()? {
        let hits: Vec<Hit> = store
            .hits(&session)?
            .iter()
            .filter_map(|raw| Hit::from_persisted(raw).ok())
            .collect();
        let first = hits.iter().map(|hit| hit.timestamp).min();
        let last = hits.iter().map(|hit| hit.timestamp).max();
        rows.push(PendingRow {
            session,
            hits: hits.len(),
            first_hit: first.map(format_ts).unwrap_or_default(),
            last_hit: last.map(format_ts).unwrap_or_default(),
        });
    }

    if rows.is_empty() && format == OutputFormat::Text {
        println!("No pending sessions");
        return Ok(());
    }

    print_rows(&rows, format, |row| {
        format!(
            "{}  {} hits  {} .. {}",
            style(&row.session).bold(),
            row.hits,
            row.first_hit,
            row.last_hit
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_skips_comments() {
        let source = r#"
# preroll
{"name":"sessionstart","timestamp":0,"params":{"media.id":"a"}}

{"name":"play","timestamp":1000}
"#;
        let events = parse_script(source).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, 3);
        assert_eq!(events[1].1.name, "play");
        assert_eq!(events[1].1.timestamp, Some(1000));
    }

    #[test]
    fn test_parse_script_reports_line() {
        let err = parse_script("{\"name\":\"play\"}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_state_defaults() {
        let state = load_state(None).unwrap();
        assert!(state.collection_server.is_none());
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00:00.000");
    }
}
