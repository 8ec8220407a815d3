//! Just enough routing-message framing to key the gossip message store.
//!
//! A stored message is `u16 type | body`. Only `AnnounceSignatures` has a
//! full codec; other gossip types are carried as opaque bytes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::codec::{put_u16, put_u64, Reader};
use crate::{CodecError, Vertex};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MessageType(pub u16);

impl MessageType {
    pub const CHANNEL_ANNOUNCEMENT: Self = Self(256);
    pub const NODE_ANNOUNCEMENT: Self = Self(257);
    pub const CHANNEL_UPDATE: Self = Self(258);
    pub const ANNOUNCE_SIGNATURES: Self = Self(259);

    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::CHANNEL_ANNOUNCEMENT => f.write_str("channel_announcement"),
            Self::NODE_ANNOUNCEMENT => f.write_str("node_announcement"),
            Self::CHANNEL_UPDATE => f.write_str("channel_update"),
            Self::ANNOUNCE_SIGNATURES => f.write_str("announce_signatures"),
            Self(other) => write!(f, "unknown({other})"),
        }
    }
}

/// Reads the type tag off the front of a framed message.
pub fn read_message_type(message: &[u8]) -> Result<MessageType, CodecError> {
    Reader::new(message, "message type").read_u16().map(MessageType)
}

/// Block height, transaction index and output index of a funding output,
/// packed into a u64 as `height(3) | tx_index(3) | position(2)`.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ShortChannelId {
    pub block_height: u32,
    pub tx_index: u32,
    pub tx_position: u16,
}

impl ShortChannelId {
    // Fields are masked before narrowing.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_u64(value: u64) -> Self {
        Self {
            block_height: (value >> 40) as u32,
            tx_index: ((value >> 16) & 0x00ff_ffff) as u32,
            tx_position: (value & 0xffff) as u16,
        }
    }

    #[must_use]
    pub fn to_u64(self) -> u64 {
        (u64::from(self.block_height & 0x00ff_ffff) << 40)
            | (u64::from(self.tx_index & 0x00ff_ffff) << 16)
            | u64::from(self.tx_position)
    }
}

impl Display for ShortChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.block_height, self.tx_index, self.tx_position)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AnnounceSignatures {
    pub channel_id: [u8; 32],
    pub short_channel_id: ShortChannelId,
    pub node_signature: [u8; 64],
    pub bitcoin_signature: [u8; 64],
}

impl AnnounceSignatures {
    /// Framed encoding including the type tag.
    #[must_use]
    pub fn encode_message(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 32 + 8 + 64 + 64);
        put_u16(&mut out, MessageType::ANNOUNCE_SIGNATURES.0);
        out.extend_from_slice(&self.channel_id);
        put_u64(&mut out, self.short_channel_id.to_u64());
        out.extend_from_slice(&self.node_signature);
        out.extend_from_slice(&self.bitcoin_signature);
        out
    }

    pub fn decode_message(message: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(message, "announce_signatures");
        let actual = reader.read_u16()?;
        if actual != MessageType::ANNOUNCE_SIGNATURES.0 {
            return Err(CodecError::UnexpectedMessageType {
                expected: MessageType::ANNOUNCE_SIGNATURES.0,
                actual,
            });
        }
        let decoded = Self {
            channel_id: reader.read_array()?,
            short_channel_id: ShortChannelId::from_u64(reader.read_u64()?),
            node_signature: reader.read_array()?,
            bitcoin_signature: reader.read_array()?,
        };
        reader.finish()?;
        Ok(decoded)
    }
}

pub const LEGACY_MESSAGE_STORE_KEY_LEN: usize = Vertex::LEN + 8;

/// `pubkey || scid`, the key layout that could collide across message types.
#[must_use]
pub fn legacy_message_store_key(peer: &Vertex, scid: ShortChannelId) -> Vec<u8> {
    let mut key = Vec::with_capacity(LEGACY_MESSAGE_STORE_KEY_LEN);
    key.extend_from_slice(peer.as_bytes());
    put_u64(&mut key, scid.to_u64());
    key
}

#[must_use]
pub fn message_store_key(peer: &Vertex, scid: ShortChannelId, msg_type: MessageType) -> Vec<u8> {
    let mut key = legacy_message_store_key(peer, scid);
    put_u16(&mut key, msg_type.0);
    key
}
