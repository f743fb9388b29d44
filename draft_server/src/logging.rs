//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; those records are bridged into
//! tracing so everything goes through one subscriber.

use snake_draft::draft::{Audience, DraftEvent};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the RUST_LOG env var.
///
/// # Example
///
/// ```no_run
/// use draft_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a published draft event with structured fields
///
/// # Arguments
///
/// * `audience` - Who the event was delivered to
/// * `event` - The event
pub fn log_draft_event(audience: Audience, event: &DraftEvent) {
    let (target, id) = match audience {
        Audience::Room(room_id) => ("room", room_id),
        Audience::User(user_id) => ("user", user_id),
    };

    match event {
        DraftEvent::TurnSkipped {
            room_id,
            turn,
            user_id,
            reason,
        } => tracing::warn!(
            event = event.name(),
            room_id = room_id,
            turn = turn,
            user_id = user_id,
            reason = reason.as_str(),
            "Turn skipped"
        ),
        DraftEvent::PlayerPicked { room_id, pick, .. } => tracing::info!(
            event = event.name(),
            room_id = room_id,
            pick_number = pick.pick_number,
            auto = pick.is_auto_pick,
            player = pick.player.as_ref().map(|p| p.id.as_str()),
            "Player picked"
        ),
        _ => tracing::debug!(
            event = event.name(),
            audience = target,
            audience_id = id,
            "Draft event"
        ),
    }
}

/// Log performance metric
///
/// # Arguments
///
/// * `operation` - Operation name
/// * `duration_ms` - Duration in milliseconds
/// * `metadata` - Additional metadata
///
/// # Example
///
/// ```
/// use draft_server::logging::log_performance;
/// use std::time::Instant;
///
/// let start = Instant::now();
/// // ... do work ...
/// let duration = start.elapsed().as_millis() as u64;
/// log_performance("stall_sweep", duration, Some("2 rooms recovered"));
/// ```
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "Performance metric"
        );
    }
}
