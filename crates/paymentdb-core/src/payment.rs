//! Outgoing payment records: the legacy flat encoding and the split
//! creation/attempt fields stored under each payment hash.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::codec::{count_u32, put_bool, put_timestamp, put_u32, put_u64, put_var_bytes, Reader};
use crate::identifiers::hex_bytes;
use crate::{CodecError, PaymentHash, PaymentStatus, Preimage, Vertex};

/// What the caller knew about the payment when it was first dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PaymentCreationInfo {
    pub payment_hash: PaymentHash,
    pub value_msat: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: OffsetDateTime,
    #[serde(with = "hex_bytes")]
    pub payment_request: Vec<u8>,
}

impl PaymentCreationInfo {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(32 + 8 + 8 + 1 + self.payment_request.len());
        out.extend_from_slice(self.payment_hash.as_bytes());
        put_u64(&mut out, self.value_msat);
        put_timestamp(&mut out, self.creation_date)?;
        put_var_bytes(&mut out, &self.payment_request);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes, "payment creation info");
        let info = Self {
            payment_hash: PaymentHash(reader.read_array()?),
            value_msat: reader.read_u64()?,
            creation_date: reader.read_timestamp()?,
            payment_request: reader.read_var_bytes()?,
        };
        reader.finish()?;
        Ok(info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Hop {
    pub pub_key: Vertex,
    pub channel_id: u64,
    pub outgoing_time_lock: u32,
    pub amt_to_forward_msat: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Route {
    pub total_time_lock: u32,
    pub total_amount_msat: u64,
    pub source_pub_key: Vertex,
    pub hops: Vec<Hop>,
}

impl Route {
    /// Everything sent minus what reaches the final hop.
    #[must_use]
    pub fn total_fees_msat(&self) -> u64 {
        self.hops.last().map_or(0, |last| {
            self.total_amount_msat
                .saturating_sub(last.amt_to_forward_msat)
        })
    }

    /// Rebuilds a route from a legacy record, which only kept the hop keys
    /// and the total fee. The final hop receives the payment value so the
    /// total fee still adds up.
    #[must_use]
    pub fn from_legacy(legacy: &LegacyOutgoingPayment, source_pub_key: Vertex) -> Self {
        let total_amount_msat = legacy.value_msat.saturating_add(legacy.fee_msat);
        let last = legacy.path.len().saturating_sub(1);
        let hops = legacy
            .path
            .iter()
            .enumerate()
            .map(|(index, pub_key)| Hop {
                pub_key: *pub_key,
                channel_id: 0,
                outgoing_time_lock: 0,
                amt_to_forward_msat: if index == last {
                    legacy.value_msat
                } else {
                    total_amount_msat
                },
            })
            .collect();
        Self {
            total_time_lock: legacy.time_lock_length,
            total_amount_msat,
            source_pub_key,
            hops,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PaymentAttemptInfo {
    pub payment_id: u64,
    pub route: Route,
}

impl PaymentAttemptInfo {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let route = &self.route;
        let mut out = Vec::with_capacity(8 + 4 + 8 + 33 + 4 + route.hops.len() * 53);
        put_u64(&mut out, self.payment_id);
        put_u32(&mut out, route.total_time_lock);
        put_u64(&mut out, route.total_amount_msat);
        out.extend_from_slice(route.source_pub_key.as_bytes());
        put_u32(&mut out, count_u32("route hops", route.hops.len())?);
        for hop in &route.hops {
            out.extend_from_slice(hop.pub_key.as_bytes());
            put_u64(&mut out, hop.channel_id);
            put_u32(&mut out, hop.outgoing_time_lock);
            put_u64(&mut out, hop.amt_to_forward_msat);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes, "payment attempt info");
        let payment_id = reader.read_u64()?;
        let total_time_lock = reader.read_u32()?;
        let total_amount_msat = reader.read_u64()?;
        let source_pub_key = Vertex(reader.read_array()?);
        let hop_count = reader.read_u32()?;

        let mut hops = Vec::new();
        for _ in 0..hop_count {
            hops.push(Hop {
                pub_key: Vertex(reader.read_array()?),
                channel_id: reader.read_u64()?,
                outgoing_time_lock: reader.read_u32()?,
                amt_to_forward_msat: reader.read_u64()?,
            });
        }
        reader.finish()?;

        Ok(Self {
            payment_id,
            route: Route {
                total_time_lock,
                total_amount_msat,
                source_pub_key,
                hops,
            },
        })
    }
}

/// Flat record kept by nodes before payments had their own buckets.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LegacyOutgoingPayment {
    pub memo: Vec<u8>,
    pub receipt: Vec<u8>,
    pub payment_request: Vec<u8>,
    pub creation_date: OffsetDateTime,
    pub settle_date: OffsetDateTime,
    pub value_msat: u64,
    pub settled: bool,
    pub fee_msat: u64,
    pub path: Vec<Vertex>,
    pub time_lock_length: u32,
    pub preimage: Preimage,
}

impl LegacyOutgoingPayment {
    #[must_use]
    pub fn payment_hash(&self) -> PaymentHash {
        self.preimage.hash()
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        put_var_bytes(&mut out, &self.memo);
        put_var_bytes(&mut out, &self.receipt);
        put_var_bytes(&mut out, &self.payment_request);
        put_timestamp(&mut out, self.creation_date)?;
        put_timestamp(&mut out, self.settle_date)?;
        put_u64(&mut out, self.value_msat);
        put_bool(&mut out, self.settled);
        put_u64(&mut out, self.fee_msat);
        put_u32(&mut out, count_u32("legacy payment path", self.path.len())?);
        for vertex in &self.path {
            out.extend_from_slice(vertex.as_bytes());
        }
        put_u32(&mut out, self.time_lock_length);
        out.extend_from_slice(self.preimage.as_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes, "legacy outgoing payment");
        let memo = reader.read_var_bytes()?;
        let receipt = reader.read_var_bytes()?;
        let payment_request = reader.read_var_bytes()?;
        let creation_date = reader.read_timestamp()?;
        let settle_date = reader.read_timestamp()?;
        let value_msat = reader.read_u64()?;
        let settled = reader.read_bool()?;
        let fee_msat = reader.read_u64()?;

        let path_len = reader.read_u32()?;
        let mut path = Vec::new();
        for _ in 0..path_len {
            path.push(Vertex(reader.read_array()?));
        }

        let time_lock_length = reader.read_u32()?;
        let preimage = Preimage(reader.read_array()?);
        reader.finish()?;

        Ok(Self {
            memo,
            receipt,
            payment_request,
            creation_date,
            settle_date,
            value_msat,
            settled,
            fee_msat,
            path,
            time_lock_length,
            preimage,
        })
    }
}

/// A payment as read back from its hash bucket (or a duplicate entry).
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Payment {
    pub sequence_num: u64,
    pub status: PaymentStatus,
    pub info: PaymentCreationInfo,
    pub attempt: Option<PaymentAttemptInfo>,
    pub preimage: Option<Preimage>,
}
