use crate::codec::{put_u64, Reader};
use crate::wire::ShortChannelId;
use crate::{CodecError, PaymentHash};

/// Offset of the payment hash inside a persisted circuit: a 10-byte add
/// reference followed by the 16-byte incoming circuit key.
pub const CIRCUIT_PAYMENT_HASH_OFFSET: usize = 26;

/// Identifies an HTLC by the channel it arrived on and its index there.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CircuitKey {
    pub chan_id: ShortChannelId,
    pub htlc_id: u64,
}

impl CircuitKey {
    pub const LEN: usize = 16;

    /// The zero channel id stands for the local node as the origin.
    #[must_use]
    pub fn is_locally_sourced(&self) -> bool {
        self.chan_id.to_u64() == 0
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = Vec::with_capacity(Self::LEN);
        put_u64(&mut out, self.chan_id.to_u64());
        put_u64(&mut out, self.htlc_id);
        let mut key = [0_u8; Self::LEN];
        key.copy_from_slice(&out);
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::LEN {
            return Err(CodecError::InvalidLength {
                context: "circuit key",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut reader = Reader::new(bytes, "circuit key");
        Ok(Self {
            chan_id: ShortChannelId::from_u64(reader.read_u64()?),
            htlc_id: reader.read_u64()?,
        })
    }
}

/// Extracts the payment hash from a persisted circuit value.
pub fn circuit_payment_hash(value: &[u8]) -> Result<PaymentHash, CodecError> {
    let mut reader = Reader::new(value, "circuit");
    reader.read_bytes(CIRCUIT_PAYMENT_HASH_OFFSET)?;
    Ok(PaymentHash(reader.read_array()?))
}
