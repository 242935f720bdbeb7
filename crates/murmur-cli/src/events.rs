use murmur_protocol::Event;
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

/// RFC 3339 timestamp with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn elapsed_s(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub name: String,
    pub uuid: String,
    pub endpoint: Option<String>,
    pub mode: String,
    pub timestamp: String,
}

impl EventStarted {
    pub fn new(name: &str, uuid: &str, endpoint: Option<String>, mode: &str) -> Self {
        Self {
            event: "started",
            name: name.to_string(),
            uuid: uuid.to_string(),
            endpoint,
            mode: mode.to_string(),
            timestamp: now_iso(),
        }
    }
}

#[derive(Serialize)]
pub struct EventStopped {
    pub event: &'static str,
    pub events_received: u64,
    pub whispers_sent: u64,
    pub shouts_sent: u64,
    pub messages_dropped: u64,
    pub elapsed_s: f64,
    pub timestamp: String,
}

// ── Node events ─────────────────────────────────────────────────

/// One node event, flattened for JSON output. Frames are rendered as
/// lossy UTF-8.
#[derive(Serialize)]
pub struct EventNode {
    pub event: &'static str,
    pub kind: String,
    pub peer_uuid: String,
    pub peer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
    pub elapsed_s: f64,
    pub timestamp: String,
}

impl EventNode {
    pub fn new(event: &Event, start: Instant) -> Self {
        Self {
            event: "node_event",
            kind: event.kind().to_string(),
            peer_uuid: event.peer_uuid().to_string(),
            peer_name: event.peer_name().to_string(),
            peer_addr: event.peer_addr().map(str::to_string),
            group: event.group().map(str::to_string),
            frames: event
                .frames()
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect(),
            elapsed_s: elapsed_s(start),
            timestamp: now_iso(),
        }
    }
}

// ── Ping events ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventPing {
    pub event: &'static str,
    pub peer: String,
    pub seq: u32,
    pub rtt_ms: f64,
    pub elapsed_s: f64,
}

#[derive(Serialize)]
pub struct EventPingSummary {
    pub event: &'static str,
    pub peer: String,
    pub sent: u32,
    pub received: u32,
    pub rtt_min_ms: f64,
    pub rtt_max_ms: f64,
    pub rtt_avg_ms: f64,
}

// ── Shout events ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventShout {
    pub event: &'static str,
    pub group: String,
    pub seq: u32,
    pub members: usize,
    pub elapsed_s: f64,
}

// ── Keygen ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventKeygen {
    pub event: &'static str,
    pub public_key: String,
    pub path: String,
    pub timestamp: String,
}
