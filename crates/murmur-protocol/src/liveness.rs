/// LivenessTracker: peer liveness monitoring.
///
/// Pure state machine: record traffic, check liveness.
/// Three-tier timeout: Evasive (evasive) → Silent (silent + grace)
/// → Expired (expired). Each tier is reported once per quiet spell; any
/// traffic from the peer resets it to Alive.
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Extra quiet time past the silent timeout before SILENT fires.
pub(crate) const SILENT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Liveness {
    Alive,
    Evasive,
    Silent,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LivenessEvent {
    Evasive { uuid: String },
    Silent { uuid: String },
    Expired { uuid: String },
}

#[derive(Debug)]
struct Entry {
    last_seen: Instant,
    reported: Liveness,
}

pub(crate) struct LivenessTracker {
    peers: HashMap<String, Entry>,
    evasive: Duration,
    silent: Duration,
    expired: Duration,
}

impl LivenessTracker {
    pub(crate) fn new(evasive: Duration, silent: Duration, expired: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            evasive,
            silent: silent + SILENT_GRACE,
            expired,
        }
    }

    pub(crate) fn record(&mut self, uuid: &str) {
        self.record_at(uuid, Instant::now());
    }

    /// Record traffic from a peer at a specific time (for testing).
    pub(crate) fn record_at(&mut self, uuid: &str, now: Instant) {
        match self.peers.get_mut(uuid) {
            Some(entry) => {
                entry.last_seen = now;
                entry.reported = Liveness::Alive;
            }
            None => {
                self.peers.insert(
                    uuid.to_string(),
                    Entry {
                        last_seen: now,
                        reported: Liveness::Alive,
                    },
                );
            }
        }
    }

    pub(crate) fn untrack(&mut self, uuid: &str) {
        self.peers.remove(uuid);
    }

    pub(crate) fn check_all(&mut self) -> Vec<LivenessEvent> {
        self.check_all_at(Instant::now())
    }

    /// Report peers whose state got worse since the last check.
    ///
    /// Expired peers are removed from tracking.
    pub(crate) fn check_all_at(&mut self, now: Instant) -> Vec<LivenessEvent> {
        let (evasive, silent, expired) = (self.evasive, self.silent, self.expired);
        let mut events = vec![];
        let mut gone = vec![];

        for (uuid, entry) in self.peers.iter_mut() {
            let current = classify(
                now.saturating_duration_since(entry.last_seen),
                evasive,
                silent,
                expired,
            );
            if current <= entry.reported {
                continue;
            }
            if current == Liveness::Expired {
                gone.push(uuid.clone());
                continue;
            }
            // a long gap between checks still reports every tier it crossed
            if entry.reported < Liveness::Evasive {
                events.push(LivenessEvent::Evasive { uuid: uuid.clone() });
            }
            if current == Liveness::Silent {
                events.push(LivenessEvent::Silent { uuid: uuid.clone() });
            }
            entry.reported = current;
        }

        for uuid in gone {
            self.peers.remove(&uuid);
            events.push(LivenessEvent::Expired { uuid });
        }

        events
    }
}

fn classify(elapsed: Duration, evasive: Duration, silent: Duration, expired: Duration) -> Liveness {
    if elapsed >= expired {
        Liveness::Expired
    } else if elapsed >= silent {
        Liveness::Silent
    } else if elapsed >= evasive {
        Liveness::Evasive
    } else {
        Liveness::Alive
    }
}
