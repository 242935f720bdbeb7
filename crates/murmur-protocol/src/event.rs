//! Events emitted by a node.
//!
//! [`Event`] is a closed enum: each variant carries exactly the fields its
//! type defines, and accessors for fields a variant does not have return
//! `None`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::frame::{collect_frames, IntoFrame};
use crate::MurmurError;

// ── Event type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Enter,
    Exit,
    Evasive,
    Silent,
    Join,
    Leave,
    Whisper,
    Shout,
    Stop,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        Self::Enter,
        Self::Exit,
        Self::Evasive,
        Self::Silent,
        Self::Join,
        Self::Leave,
        Self::Whisper,
        Self::Shout,
        Self::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Exit => "EXIT",
            Self::Evasive => "EVASIVE",
            Self::Silent => "SILENT",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::Whisper => "WHISPER",
            Self::Shout => "SHOUT",
            Self::Stop => "STOP",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = MurmurError;

    /// Case-insensitive: `"enter"`, `"Enter"` and `"ENTER"` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MurmurError::UnknownEventType(s.to_string()))
    }
}

// ── Event ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A peer became reachable.
    Enter {
        peer_uuid: String,
        peer_name: String,
        peer_addr: String,
        headers: IndexMap<String, String>,
    },
    /// A peer departed or expired.
    Exit { peer_uuid: String, peer_name: String },
    /// A peer missed its expected liveness traffic.
    Evasive { peer_uuid: String, peer_name: String },
    /// An evasive peer stayed quiet past the silent timeout.
    Silent { peer_uuid: String, peer_name: String },
    Join {
        peer_uuid: String,
        peer_name: String,
        group: String,
    },
    Leave {
        peer_uuid: String,
        peer_name: String,
        group: String,
    },
    Whisper {
        peer_uuid: String,
        peer_name: String,
        frames: Vec<Bytes>,
    },
    Shout {
        peer_uuid: String,
        peer_name: String,
        group: String,
        frames: Vec<Bytes>,
    },
    /// The local node finished stopping. Carries the node's own identity.
    Stop { peer_uuid: String, peer_name: String },
}

impl Event {
    /// Wait for the next event from `node`. Same as [`Node::recv`](crate::Node::recv).
    pub async fn from_node(node: &crate::Node) -> Result<Event, MurmurError> {
        node.recv().await
    }

    /// Build an event without any network activity.
    ///
    /// Fields required by `kind` must be present in `fields`; the error names
    /// the first one missing. `peer_name` defaults to `"S-"` followed by the
    /// first six characters of `peer_uuid`.
    pub fn synthesize(
        kind: EventType,
        peer_uuid: impl Into<String>,
        fields: EventFields,
    ) -> Result<Event, MurmurError> {
        let peer_uuid = peer_uuid.into();
        let EventFields {
            peer_name,
            peer_addr,
            headers,
            group,
            frames,
        } = fields;
        let peer_name =
            peer_name.unwrap_or_else(|| format!("S-{}", peer_uuid.chars().take(6).collect::<String>()));

        let require = |value: Option<String>, field: &'static str| {
            value.ok_or(MurmurError::MissingField { field })
        };

        Ok(match kind {
            EventType::Enter => Event::Enter {
                peer_addr: require(peer_addr, "peer_addr")?,
                headers,
                peer_uuid,
                peer_name,
            },
            EventType::Exit => Event::Exit {
                peer_uuid,
                peer_name,
            },
            EventType::Evasive => Event::Evasive {
                peer_uuid,
                peer_name,
            },
            EventType::Silent => Event::Silent {
                peer_uuid,
                peer_name,
            },
            EventType::Join => Event::Join {
                group: require(group, "group")?,
                peer_uuid,
                peer_name,
            },
            EventType::Leave => Event::Leave {
                group: require(group, "group")?,
                peer_uuid,
                peer_name,
            },
            EventType::Whisper => Event::Whisper {
                frames: frames.ok_or(MurmurError::MissingField { field: "msg" })?,
                peer_uuid,
                peer_name,
            },
            EventType::Shout => Event::Shout {
                frames: frames.ok_or(MurmurError::MissingField { field: "msg" })?,
                group: require(group, "group")?,
                peer_uuid,
                peer_name,
            },
            EventType::Stop => Event::Stop {
                peer_uuid,
                peer_name,
            },
        })
    }

    pub fn kind(&self) -> EventType {
        match self {
            Self::Enter { .. } => EventType::Enter,
            Self::Exit { .. } => EventType::Exit,
            Self::Evasive { .. } => EventType::Evasive,
            Self::Silent { .. } => EventType::Silent,
            Self::Join { .. } => EventType::Join,
            Self::Leave { .. } => EventType::Leave,
            Self::Whisper { .. } => EventType::Whisper,
            Self::Shout { .. } => EventType::Shout,
            Self::Stop { .. } => EventType::Stop,
        }
    }

    pub fn peer_uuid(&self) -> &str {
        match self {
            Self::Enter { peer_uuid, .. }
            | Self::Exit { peer_uuid, .. }
            | Self::Evasive { peer_uuid, .. }
            | Self::Silent { peer_uuid, .. }
            | Self::Join { peer_uuid, .. }
            | Self::Leave { peer_uuid, .. }
            | Self::Whisper { peer_uuid, .. }
            | Self::Shout { peer_uuid, .. }
            | Self::Stop { peer_uuid, .. } => peer_uuid,
        }
    }

    pub fn peer_name(&self) -> &str {
        match self {
            Self::Enter { peer_name, .. }
            | Self::Exit { peer_name, .. }
            | Self::Evasive { peer_name, .. }
            | Self::Silent { peer_name, .. }
            | Self::Join { peer_name, .. }
            | Self::Leave { peer_name, .. }
            | Self::Whisper { peer_name, .. }
            | Self::Shout { peer_name, .. }
            | Self::Stop { peer_name, .. } => peer_name,
        }
    }

    /// The peer's endpoint. ENTER only.
    pub fn peer_addr(&self) -> Option<&str> {
        match self {
            Self::Enter { peer_addr, .. } => Some(peer_addr),
            _ => None,
        }
    }

    /// Headers the peer advertised. ENTER only.
    pub fn headers(&self) -> Option<&IndexMap<String, String>> {
        match self {
            Self::Enter { headers, .. } => Some(headers),
            _ => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()?.get(name).map(String::as_str)
    }

    /// The group. JOIN, LEAVE and SHOUT only.
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Join { group, .. } | Self::Leave { group, .. } | Self::Shout { group, .. } => {
                Some(group)
            }
            _ => None,
        }
    }

    /// The first frame of a WHISPER or SHOUT payload as text.
    ///
    /// Later frames are not included; use [`Event::frames`] for the full
    /// multi-part payload. Invalid UTF-8 is replaced, and an empty message
    /// has no text.
    pub fn msg(&self) -> Option<Cow<'_, str>> {
        self.frames().first().map(|f| String::from_utf8_lossy(f))
    }

    /// Every frame of a WHISPER or SHOUT payload; empty for other events.
    pub fn frames(&self) -> &[Bytes] {
        match self {
            Self::Whisper { frames, .. } | Self::Shout { frames, .. } => frames,
            _ => &[],
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.frames().len() > 1
    }

    /// Whether every field set in `criteria` equals this event's value.
    pub fn matches(&self, criteria: &EventCriteria) -> bool {
        fn check(expected: &Option<String>, actual: Option<&str>) -> bool {
            expected.as_deref().is_none_or_eq(actual)
        }

        criteria.kind.is_none_or_eq(Some(self.kind()))
            && check(&criteria.peer_uuid, Some(self.peer_uuid()))
            && check(&criteria.peer_name, Some(self.peer_name()))
            && check(&criteria.peer_addr, self.peer_addr())
            && check(&criteria.group, self.group())
            && check(&criteria.msg, self.msg().as_deref())
    }
}

/// `None` matches anything; `Some(x)` matches only `Some(x)`.
trait NoneOrEq<T> {
    fn is_none_or_eq(&self, actual: Option<T>) -> bool;
}

impl<T: PartialEq> NoneOrEq<T> for Option<T> {
    fn is_none_or_eq(&self, actual: Option<T>) -> bool {
        match self {
            None => true,
            Some(expected) => actual.as_ref() == Some(expected),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = format!("{} ({})", self.peer_name(), self.peer_uuid());
        match self {
            Self::Enter { peer_addr, headers, .. } => {
                write!(f, "ENTER {who} at {peer_addr}")?;
                if !headers.is_empty() {
                    let list: Vec<String> = headers.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    write!(f, " [{}]", list.join(", "))?;
                }
                Ok(())
            }
            Self::Exit { .. } => write!(f, "EXIT {who}"),
            Self::Evasive { .. } => write!(f, "EVASIVE {who}"),
            Self::Silent { .. } => write!(f, "SILENT {who}"),
            Self::Join { group, .. } => write!(f, "JOIN {who} joined {group:?}"),
            Self::Leave { group, .. } => write!(f, "LEAVE {who} left {group:?}"),
            Self::Whisper { frames, .. } => {
                write!(f, "WHISPER from {who}: {:?}", self.msg().unwrap_or_default())?;
                if frames.len() > 1 {
                    write!(f, " (+{} frames)", frames.len() - 1)?;
                }
                Ok(())
            }
            Self::Shout { group, frames, .. } => {
                write!(f, "SHOUT from {who} to {group:?}: {:?}", self.msg().unwrap_or_default())?;
                if frames.len() > 1 {
                    write!(f, " (+{} frames)", frames.len() - 1)?;
                }
                Ok(())
            }
            Self::Stop { .. } => write!(f, "STOP {who}"),
        }
    }
}

// ── Synthesis fields ────────────────────────────────────────────────

/// Optional fields for [`Event::synthesize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub peer_name: Option<String>,
    pub peer_addr: Option<String>,
    pub headers: IndexMap<String, String>,
    pub group: Option<String>,
    pub frames: Option<Vec<Bytes>>,
}

impl EventFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = Some(name.into());
        self
    }

    pub fn peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// A single-frame text message.
    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.frames = Some(vec![Bytes::from(msg.into())]);
        self
    }

    /// A multi-part message.
    pub fn frames<I, F>(mut self, parts: I) -> Result<Self, MurmurError>
    where
        I: IntoIterator<Item = F>,
        F: IntoFrame,
    {
        self.frames = Some(collect_frames(parts)?);
        Ok(self)
    }
}

// ── Matching ────────────────────────────────────────────────────────

/// Field values an event must have to match. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCriteria {
    pub kind: Option<EventType>,
    pub peer_uuid: Option<String>,
    pub peer_name: Option<String>,
    pub peer_addr: Option<String>,
    pub group: Option<String>,
    pub msg: Option<String>,
}

impl EventCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn peer_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.peer_uuid = Some(uuid.into());
        self
    }

    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = Some(name.into());
        self
    }

    pub fn peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_parses_case_insensitively() {
        assert_eq!("enter".parse::<EventType>().unwrap(), EventType::Enter);
        assert_eq!("Shout".parse::<EventType>().unwrap(), EventType::Shout);
        assert_eq!("STOP".parse::<EventType>().unwrap(), EventType::Stop);
        assert!(matches!(
            "leader".parse::<EventType>(),
            Err(MurmurError::UnknownEventType(_))
        ));
    }

    #[test]
    fn event_type_display_roundtrips() {
        for kind in EventType::ALL {
            assert_eq!(kind.to_string().parse::<EventType>().unwrap(), kind);
        }
    }

    #[test]
    fn synthesize_enter() {
        let event = Event::synthesize(
            EventType::Enter,
            "uuid-1",
            EventFields::new().peer_addr("tcp://127.0.0.1:9000"),
        )
        .unwrap();
        assert_eq!(event.kind(), EventType::Enter);
        assert_eq!(event.peer_uuid(), "uuid-1");
        assert_eq!(event.peer_addr(), Some("tcp://127.0.0.1:9000"));
        assert_eq!(event.group(), None);
        assert_eq!(event.msg(), None);
        assert!(event.headers().unwrap().is_empty());
    }

    #[test]
    fn synthesize_default_peer_name() {
        let event =
            Event::synthesize(EventType::Exit, "0123456789ABCDEF", EventFields::new()).unwrap();
        assert_eq!(event.peer_name(), "S-012345");
    }

    #[test]
    fn synthesize_names_missing_field() {
        let err = Event::synthesize(EventType::Join, "uuid-1", EventFields::new()).unwrap_err();
        assert!(matches!(err, MurmurError::MissingField { field: "group" }));

        let err = Event::synthesize(EventType::Enter, "uuid-1", EventFields::new()).unwrap_err();
        assert!(matches!(err, MurmurError::MissingField { field: "peer_addr" }));

        let err = Event::synthesize(EventType::Whisper, "uuid-1", EventFields::new()).unwrap_err();
        assert!(matches!(err, MurmurError::MissingField { field: "msg" }));

        let err = Event::synthesize(EventType::Shout, "uuid-1", EventFields::new().msg("hi"))
            .unwrap_err();
        assert!(matches!(err, MurmurError::MissingField { field: "group" }));
    }

    #[test]
    fn msg_is_first_frame_only() {
        let event = Event::synthesize(
            EventType::Whisper,
            "uuid-1",
            EventFields::new().frames(["first", "second"]).unwrap(),
        )
        .unwrap();
        assert_eq!(event.msg().as_deref(), Some("first"));
        assert_eq!(event.frames().len(), 2);
        assert!(event.is_multipart());
    }

    #[test]
    fn empty_message_has_no_text() {
        let event = Event::synthesize(
            EventType::Whisper,
            "uuid-1",
            EventFields::new().frames(Vec::<&str>::new()).unwrap(),
        )
        .unwrap();
        assert_eq!(event.msg(), None);
        assert!(!event.is_multipart());
    }

    #[test]
    fn inapplicable_accessors_are_absent() {
        let event = Event::synthesize(EventType::Stop, "uuid-1", EventFields::new()).unwrap();
        assert_eq!(event.peer_addr(), None);
        assert_eq!(event.headers(), None);
        assert_eq!(event.header("X-ANY"), None);
        assert_eq!(event.group(), None);
        assert!(event.frames().is_empty());
    }

    #[test]
    fn header_lookup() {
        let event = Event::synthesize(
            EventType::Enter,
            "uuid-1",
            EventFields::new()
                .peer_addr("inproc://a")
                .header("X-HELLO", "World"),
        )
        .unwrap();
        assert_eq!(event.header("X-HELLO"), Some("World"));
        assert_eq!(event.header("X-NOPE"), None);
    }

    #[test]
    fn matches_on_subset_of_fields() {
        let event = Event::synthesize(
            EventType::Shout,
            "uuid-1",
            EventFields::new().group("news").msg("extra!"),
        )
        .unwrap();

        assert!(event.matches(&EventCriteria::new()));
        assert!(event.matches(&EventCriteria::new().kind(EventType::Shout).group("news")));
        assert!(event.matches(&EventCriteria::new().msg("extra!").peer_uuid("uuid-1")));
        assert!(!event.matches(&EventCriteria::new().group("sports")));
        assert!(!event.matches(&EventCriteria::new().kind(EventType::Whisper)));
        assert!(!event.matches(&EventCriteria::new().peer_addr("inproc://a")));
    }

    #[test]
    fn display_is_one_line() {
        let event = Event::synthesize(
            EventType::Join,
            "ABCDEF1234",
            EventFields::new().peer_name("alpha").group("news"),
        )
        .unwrap();
        assert_eq!(event.to_string(), "JOIN alpha (ABCDEF1234) joined \"news\"");
    }
}
