use bytes::Bytes;

use super::protocol;
use super::protocol::Request;
use super::protocol::Response;
use super::protocol::Verb;
use crate::Cas;
use crate::ClientError;
use crate::ErrorCode;
use crate::Event;

#[test]
fn test_request_frame_decodes_to_same_request() {
    let request = Request {
        tag: 7,
        verb: Verb::Set {
            path: "/a/b".into(),
            cas: Cas::Rev(3),
            body: Bytes::from_static(b"v"),
        },
    };
    let frame = protocol::encode(&request).unwrap();
    assert_eq!(protocol::decode::<Request>(&frame).unwrap(), request);
}

#[test]
fn test_garbage_frame_is_an_error() {
    assert!(protocol::decode::<Request>(&[0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
}

#[test]
fn test_error_responses_map_back_to_client_errors() {
    let cases = vec![
        ClientError::PreconditionFailed { current: Cas::Rev(9) },
        ClientError::NotFound("/gone".into()),
        ClientError::InvalidSnapshot(4),
        ClientError::InvalidCas(Cas::Dir),
        ClientError::ReadOnly("/ping".into()),
        ClientError::IsDirectory("/d".into()),
        ClientError::PayloadTooLarge { size: 10, max: 5 },
        ClientError::JoinRejected("node 3 is already a member".into()),
    ];
    for error in cases {
        let response = Response::error(1, &error);
        assert!(response.is_done());
        assert!(!response.is_valid());
        assert_eq!(response.into_result().unwrap_err(), error);
    }
}

#[test]
fn test_pattern_errors_keep_the_pattern() {
    let error = ClientError::InvalidPattern {
        pattern: "a/**/b".into(),
        reason: "must start with '/'",
    };
    let decoded = Response::error(2, &error).into_result().unwrap_err();
    assert!(matches!(decoded, ClientError::InvalidPattern { pattern, .. } if pattern == "a/**/b"));
}

#[test]
fn test_unavailable_keeps_detail() {
    let response = Response::error(3, &ClientError::Unavailable("no quorum".into()));
    assert_eq!(response.err.as_ref().unwrap().code, ErrorCode::Unavailable);
    let decoded = response.into_result().unwrap_err();
    assert_eq!(decoded, ClientError::Unavailable("no quorum".into()));
    assert_eq!(decoded.to_string(), "Service unavailable: no quorum");
}

#[test]
fn test_message_errors_cross_the_wire_unchanged() {
    for error in [
        ClientError::Unavailable("proposal 1/2/3 timed out".into()),
        ClientError::JoinRejected("node 2 is already a member".into()),
        ClientError::Internal("unexpected outcome".into()),
    ] {
        let decoded = Response::error(4, &error).into_result().unwrap_err();
        assert_eq!(decoded, error);
        assert_eq!(decoded.to_string(), error.to_string());
    }
}

#[test]
fn test_event_response_is_not_final() {
    let event = Event {
        path: "/x".into(),
        body: Bytes::from_static(b"1"),
        cas: Cas::Rev(5),
        rev: 5,
    };
    let response = Response::event(11, event.clone());
    assert!(response.is_valid());
    assert!(!response.is_done());
    assert_eq!(response.to_event(), event);
}

#[test]
fn test_unknown_verb_is_internal_on_the_client() {
    let response = Response::unknown_verb("bad frame".into());
    assert_eq!(response.tag, 0);
    assert!(matches!(response.into_result(), Err(ClientError::Internal(_))));
}
