//! # Wire Messages
//!
//! Framing on a Vesper connection is one tag byte followed by a
//! tag-specific payload. The secure channel already handles length
//! delimiting and encryption, so this codec never sees partial frames --
//! it only decides what a complete frame *means*.
//!
//! Two tag families exist today: `0x60` carries UTF-8 chat text, and
//! `0x70..=0x7F` is reserved for the channel protocol, whose payloads we
//! forward opaquely to whatever handler the node was wired with.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::config::{self, MSG_TEXT_CHAT};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from decoding an inbound frame.
#[derive(Debug, Error)]
pub enum WireError {
    /// Zero-length frame: there is not even a tag to dispatch on.
    #[error("empty frame")]
    EmptyFrame,

    /// A chat frame whose payload is not valid UTF-8.
    #[error("chat payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A tag byte outside every known family.
    #[error("unknown message tag 0x{0:02x}")]
    UnknownTag(u8),
}

impl WireError {
    /// Whether this error should terminate the connection.
    ///
    /// An unknown tag is a peer speaking a newer dialect; we skip the frame
    /// and keep listening. Everything else means the stream is corrupt.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WireError::UnknownTag(_))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Human-to-human text, tag `0x60`.
    Chat {
        /// The chat line, UTF-8.
        text: String,
    },

    /// Channel-protocol frame, tags `0x70..=0x7F`. The payload is opaque
    /// at this layer.
    Channel {
        /// Which channel-family tag this frame carries.
        tag: u8,
        /// The raw payload, handed to the channel handler untouched.
        payload: Bytes,
    },
}

impl Message {
    /// Build a chat message.
    pub fn chat(text: impl Into<String>) -> Self {
        Message::Chat { text: text.into() }
    }

    /// Decode one complete frame.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let (&tag, payload) = frame.split_first().ok_or(WireError::EmptyFrame)?;
        match tag {
            MSG_TEXT_CHAT => Ok(Message::Chat {
                text: String::from_utf8(payload.to_vec())?,
            }),
            t if config::is_channel_tag(t) => Ok(Message::Channel {
                tag: t,
                payload: Bytes::copy_from_slice(payload),
            }),
            other => Err(WireError::UnknownTag(other)),
        }
    }

    /// Encode into a single frame ready for [`Connection::send`].
    ///
    /// [`Connection::send`]: crate::network::transport::Connection::send
    pub fn encode(&self) -> Bytes {
        match self {
            Message::Chat { text } => {
                let mut buf = BytesMut::with_capacity(1 + text.len());
                buf.put_u8(MSG_TEXT_CHAT);
                buf.put_slice(text.as_bytes());
                buf.freeze()
            }
            Message::Channel { tag, payload } => {
                let mut buf = BytesMut::with_capacity(1 + payload.len());
                buf.put_u8(*tag);
                buf.put_slice(payload);
                buf.freeze()
            }
        }
    }

    /// The tag byte this message travels under.
    pub fn tag(&self) -> u8 {
        match self {
            Message::Chat { .. } => MSG_TEXT_CHAT,
            Message::Channel { tag, .. } => *tag,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
