/// Errors returned by nodes, events and pollers.
///
/// Wraps transport and certificate errors and adds the node lifecycle and
/// event construction failures.
#[derive(Debug, thiserror::Error)]
pub enum MurmurError {
    #[error("transport error: {0}")]
    Transport(#[from] murmur_transport::TransportError),

    #[error("certificate error: {0}")]
    Cert(#[from] murmur_base::CertError),

    #[error("missing required field :{field}")]
    MissingField { field: &'static str },

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("message part {index} cannot be sent: {source}")]
    InvalidFrame {
        index: usize,
        #[source]
        source: crate::frame::FrameError,
    },

    #[error("node is already started")]
    AlreadyStarted,

    #[error("node is not started")]
    NotStarted,

    #[error("node has been stopped")]
    Terminated,

    #[error("gossip discovery needs an endpoint; call set_endpoint before start")]
    MissingEndpoint,

    #[error("certificate has no secret key")]
    NoSecretKey,

    #[error("wait interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_missing_field() {
        let err = MurmurError::MissingField { field: "group" };
        assert_eq!(err.to_string(), "missing required field :group");
    }

    #[test]
    fn test_display_unknown_event_type() {
        let err = MurmurError::UnknownEventType("BOGUS".into());
        assert_eq!(err.to_string(), "unknown event type: BOGUS");
    }

    #[test]
    fn test_display_invalid_frame() {
        let err = MurmurError::InvalidFrame {
            index: 2,
            source: crate::frame::FrameError("not valid UTF-8".into()),
        };
        assert_eq!(
            err.to_string(),
            "message part 2 cannot be sent: not valid UTF-8"
        );
    }

    #[test]
    fn test_display_interrupted() {
        assert_eq!(MurmurError::Interrupted.to_string(), "wait interrupted");
    }

    #[test]
    fn test_transport_error_wraps() {
        let err: MurmurError =
            murmur_transport::TransportError::InvalidEndpoint("nope".into()).into();
        assert_eq!(err.to_string(), "transport error: invalid endpoint: nope");
    }
}
