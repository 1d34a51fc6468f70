//! Wire format of client sessions.
//!
//! Every frame is a length-delimited bincode value. Clients send
//! [`Request`]s; the server answers each with one or more [`Response`]s
//! carrying the same tag. The last response of a request has [`DONE`] set.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::codec::LengthDelimitedCodec;

use crate::Cas;
use crate::ClientError;
use crate::ErrorCode;
use crate::Event;
use crate::JoinTicket;
use crate::Member;
use crate::ReadResult;
use crate::Result;
use crate::SerializationError;

/// Response carries a value (a read result or one streamed event)
pub const VALID: u8 = 1;
/// Final response for its tag
pub const DONE: u8 = 2;

/// Reason attached to pattern and path errors decoded from the wire
const REMOTE_REASON: &str = "rejected by server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    Noop,
    /// `snap_id` 0 reads the current head
    Get {
        path: String,
        snap_id: u32,
    },
    Set {
        path: String,
        cas: Cas,
        body: Bytes,
    },
    Del {
        path: String,
        cas: Cas,
    },
    Snap,
    DelSnap {
        snap_id: u32,
    },
    Watch {
        pattern: String,
    },
    Walk {
        pattern: String,
    },
    /// Stops the request tagged `target` on the same connection
    Cancel {
        target: u32,
    },
    Join {
        member: Member,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub tag: u32,
    pub verb: Verb,
}

/// Error carried by a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub detail: String,
    /// `(size, max)` of a rejected payload
    pub limit: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    pub tag: u32,
    pub flags: u8,
    pub path: String,
    pub body: Bytes,
    pub cas: Cas,
    pub rev: u64,
    pub snap_id: u32,
    pub err: Option<WireError>,
    pub join: Option<Box<JoinTicket>>,
}

impl Response {
    /// Final response without payload
    pub fn done(tag: u32) -> Self {
        Self {
            tag,
            flags: DONE,
            ..Default::default()
        }
    }

    /// Final response carrying a value
    pub fn valid(tag: u32) -> Self {
        Self {
            tag,
            flags: VALID | DONE,
            ..Default::default()
        }
    }

    pub fn read(
        tag: u32,
        read: ReadResult,
    ) -> Self {
        Self {
            body: read.body,
            cas: read.cas,
            ..Self::valid(tag)
        }
    }

    /// One streamed event; more responses follow under the same tag
    pub fn event(
        tag: u32,
        event: Event,
    ) -> Self {
        Self {
            tag,
            flags: VALID,
            path: event.path,
            body: event.body,
            cas: event.cas,
            rev: event.rev,
            ..Default::default()
        }
    }

    pub fn error(
        tag: u32,
        error: &ClientError,
    ) -> Self {
        let mut response = Self::done(tag);
        let mut limit = None;
        match error {
            ClientError::PreconditionFailed { current } => response.cas = *current,
            ClientError::InvalidCas(cas) => response.cas = *cas,
            ClientError::InvalidSnapshot(id) => response.snap_id = *id,
            ClientError::NotFound(path) | ClientError::ReadOnly(path) | ClientError::IsDirectory(path) => {
                response.path = path.clone()
            }
            ClientError::InvalidPath { path, .. } => response.path = path.clone(),
            ClientError::InvalidPattern { pattern, .. } => response.path = pattern.clone(),
            ClientError::PayloadTooLarge { size, max } => limit = Some((*size, *max)),
            ClientError::Unavailable(_) | ClientError::JoinRejected(_) | ClientError::Internal(_) => {}
        }
        // the receiving side rebuilds the Display prefix from the code
        let detail = match error {
            ClientError::Unavailable(msg) | ClientError::JoinRejected(msg) | ClientError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };
        response.err = Some(WireError {
            code: error.code(),
            detail,
            limit,
        });
        response
    }

    /// Answer to a frame that could not be decoded
    pub fn unknown_verb(detail: String) -> Self {
        Self {
            err: Some(WireError {
                code: ErrorCode::UnknownVerb,
                detail,
                limit: None,
            }),
            ..Self::done(0)
        }
    }

    pub fn is_done(&self) -> bool {
        self.flags & DONE != 0
    }

    pub fn is_valid(&self) -> bool {
        self.flags & VALID != 0
    }

    /// Rebuilds the client error a response carries, if any
    pub fn into_result(self) -> std::result::Result<Self, ClientError> {
        let Some(err) = self.err.as_ref() else {
            return Ok(self);
        };
        let e = match err.code {
            ErrorCode::PreconditionFailed => ClientError::PreconditionFailed { current: self.cas },
            ErrorCode::NotFound => ClientError::NotFound(self.path.clone()),
            ErrorCode::InvalidSnapshot => ClientError::InvalidSnapshot(self.snap_id),
            ErrorCode::InvalidPattern => ClientError::InvalidPattern {
                pattern: self.path.clone(),
                reason: REMOTE_REASON,
            },
            ErrorCode::InvalidPath => ClientError::InvalidPath {
                path: self.path.clone(),
                reason: REMOTE_REASON,
            },
            ErrorCode::InvalidCas => ClientError::InvalidCas(self.cas),
            ErrorCode::ReadOnly => ClientError::ReadOnly(self.path.clone()),
            ErrorCode::IsDirectory => ClientError::IsDirectory(self.path.clone()),
            ErrorCode::PayloadTooLarge => {
                let (size, max) = err.limit.unwrap_or_default();
                ClientError::PayloadTooLarge { size, max }
            }
            ErrorCode::Unavailable => ClientError::Unavailable(err.detail.clone()),
            ErrorCode::JoinRejected => ClientError::JoinRejected(err.detail.clone()),
            ErrorCode::UnknownVerb | ErrorCode::Internal => ClientError::Internal(err.detail.clone()),
        };
        Err(e)
    }

    /// The event a streamed response carries
    pub fn to_event(&self) -> Event {
        Event {
            path: self.path.clone(),
            body: self.body.clone(),
            cas: self.cas,
            rev: self.rev,
        }
    }
}

/// Frame codec shared by the session server and client
pub fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec()
}

pub fn encode<M: Serialize>(message: &M) -> Result<Bytes> {
    let buf = bincode::serialize(message).map_err(SerializationError::Bincode)?;
    Ok(Bytes::from(buf))
}

pub fn decode<M: DeserializeOwned>(frame: &[u8]) -> Result<M> {
    let message = bincode::deserialize(frame).map_err(SerializationError::Bincode)?;
    Ok(message)
}
