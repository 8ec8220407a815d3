//! Channel close summaries, in the legacy length-delimited layout and the
//! current layout with a presence marker before every optional field.

use crate::codec::{put_bool, put_u16, put_u32, put_u64, Reader};
use crate::wire::ShortChannelId;
use crate::{CodecError, Vertex};

pub const CLOSE_SUMMARY_PREFIX_LEN: usize = 171;
pub const CHANNEL_CONFIG_LEN: usize = 201;

const LEGACY_WITH_REVOCATION: usize = Vertex::LEN;
const LEGACY_WITH_CONFIG: usize = LEGACY_WITH_REVOCATION + CHANNEL_CONFIG_LEN;
const LEGACY_WITH_NEXT_REVOCATION: usize = LEGACY_WITH_CONFIG + Vertex::LEN;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub index: u32,
}

impl OutPoint {
    /// Key of the summary inside the closed-channel bucket.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        out.extend_from_slice(&self.txid);
        put_u32(&mut out, self.index);
        out
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CloseType {
    Cooperative,
    LocalForce,
    RemoteForce,
    Breach,
    FundingCanceled,
    Abandoned,
}

impl CloseType {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Cooperative => 0,
            Self::LocalForce => 1,
            Self::RemoteForce => 2,
            Self::Breach => 3,
            Self::FundingCanceled => 4,
            Self::Abandoned => 5,
        }
    }

    pub fn from_byte(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Cooperative),
            1 => Ok(Self::LocalForce),
            2 => Ok(Self::RemoteForce),
            3 => Ok(Self::Breach),
            4 => Ok(Self::FundingCanceled),
            5 => Ok(Self::Abandoned),
            other => Err(CodecError::UnknownCloseType(other)),
        }
    }
}

/// Local side constraints and base points of a channel.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChannelConfig {
    pub dust_limit_sat: u64,
    pub max_pending_amount_msat: u64,
    pub chan_reserve_sat: u64,
    pub min_htlc_msat: u64,
    pub max_accepted_htlcs: u16,
    pub csv_delay: u16,
    pub multisig_key: Vertex,
    pub revocation_basepoint: Vertex,
    pub payment_basepoint: Vertex,
    pub delay_basepoint: Vertex,
    pub htlc_basepoint: Vertex,
}

impl ChannelConfig {
    fn write(&self, out: &mut Vec<u8>) {
        put_u64(out, self.dust_limit_sat);
        put_u64(out, self.max_pending_amount_msat);
        put_u64(out, self.chan_reserve_sat);
        put_u64(out, self.min_htlc_msat);
        put_u16(out, self.max_accepted_htlcs);
        put_u16(out, self.csv_delay);
        for point in [
            &self.multisig_key,
            &self.revocation_basepoint,
            &self.payment_basepoint,
            &self.delay_basepoint,
            &self.htlc_basepoint,
        ] {
            out.extend_from_slice(point.as_bytes());
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            dust_limit_sat: reader.read_u64()?,
            max_pending_amount_msat: reader.read_u64()?,
            chan_reserve_sat: reader.read_u64()?,
            min_htlc_msat: reader.read_u64()?,
            max_accepted_htlcs: reader.read_u16()?,
            csv_delay: reader.read_u16()?,
            multisig_key: Vertex(reader.read_array()?),
            revocation_basepoint: Vertex(reader.read_array()?),
            payment_basepoint: Vertex(reader.read_array()?),
            delay_basepoint: Vertex(reader.read_array()?),
            htlc_basepoint: Vertex(reader.read_array()?),
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChannelCloseSummary {
    pub chan_point: OutPoint,
    pub short_chan_id: ShortChannelId,
    pub chain_hash: [u8; 32],
    pub closing_txid: [u8; 32],
    pub close_height: u32,
    pub remote_pub: Vertex,
    pub capacity_sat: u64,
    pub settled_balance_sat: u64,
    pub time_locked_balance_sat: u64,
    pub close_type: CloseType,
    pub is_pending: bool,
    pub remote_current_revocation: Option<Vertex>,
    pub local_chan_config: Option<ChannelConfig>,
    pub remote_next_revocation: Option<Vertex>,
}

impl ChannelCloseSummary {
    /// Current layout: a boolean marker precedes each optional field.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.encode_prefix();

        put_bool(&mut out, self.remote_current_revocation.is_some());
        if let Some(point) = &self.remote_current_revocation {
            out.extend_from_slice(point.as_bytes());
        }
        put_bool(&mut out, self.local_chan_config.is_some());
        if let Some(config) = &self.local_chan_config {
            config.write(&mut out);
        }
        put_bool(&mut out, self.remote_next_revocation.is_some());
        if let Some(point) = &self.remote_next_revocation {
            out.extend_from_slice(point.as_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes, "channel close summary");
        let mut summary = Self::read_prefix(&mut reader)?;

        if reader.read_bool()? {
            summary.remote_current_revocation = Some(Vertex(reader.read_array()?));
        }
        if reader.read_bool()? {
            summary.local_chan_config = Some(ChannelConfig::read(&mut reader)?);
        }
        if reader.read_bool()? {
            summary.remote_next_revocation = Some(Vertex(reader.read_array()?));
        }
        reader.finish()?;
        Ok(summary)
    }

    /// Legacy layout: optional fields appended without markers, so only a
    /// present prefix of them can be expressed.
    pub fn encode_legacy(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = self.encode_prefix();
        let mut absent_seen = false;

        match &self.remote_current_revocation {
            Some(point) => out.extend_from_slice(point.as_bytes()),
            None => absent_seen = true,
        }
        match &self.local_chan_config {
            Some(_) if absent_seen => {
                return Err(CodecError::NonCumulativeOptionalFields {
                    field: "local_chan_config",
                })
            }
            Some(config) => config.write(&mut out),
            None => absent_seen = true,
        }
        match &self.remote_next_revocation {
            Some(_) if absent_seen => {
                return Err(CodecError::NonCumulativeOptionalFields {
                    field: "remote_next_revocation",
                })
            }
            Some(point) => out.extend_from_slice(point.as_bytes()),
            None => {}
        }
        Ok(out)
    }

    /// Infers which optional fields are present from the bytes left after
    /// the fixed prefix.
    pub fn decode_legacy(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes, "legacy channel close summary");
        let mut summary = Self::read_prefix(&mut reader)?;

        let present = match reader.remaining() {
            0 => 0,
            LEGACY_WITH_REVOCATION => 1,
            LEGACY_WITH_CONFIG => 2,
            LEGACY_WITH_NEXT_REVOCATION => 3,
            other => return Err(CodecError::LegacyCloseSummaryLength(other)),
        };
        if present >= 1 {
            summary.remote_current_revocation = Some(Vertex(reader.read_array()?));
        }
        if present >= 2 {
            summary.local_chan_config = Some(ChannelConfig::read(&mut reader)?);
        }
        if present >= 3 {
            summary.remote_next_revocation = Some(Vertex(reader.read_array()?));
        }
        reader.finish()?;
        Ok(summary)
    }

    fn encode_prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLOSE_SUMMARY_PREFIX_LEN + 3 + LEGACY_WITH_NEXT_REVOCATION);
        out.extend_from_slice(&self.chan_point.encode());
        put_u64(&mut out, self.short_chan_id.to_u64());
        out.extend_from_slice(&self.chain_hash);
        out.extend_from_slice(&self.closing_txid);
        put_u32(&mut out, self.close_height);
        out.extend_from_slice(self.remote_pub.as_bytes());
        put_u64(&mut out, self.capacity_sat);
        put_u64(&mut out, self.settled_balance_sat);
        put_u64(&mut out, self.time_locked_balance_sat);
        out.push(self.close_type.to_byte());
        put_bool(&mut out, self.is_pending);
        out
    }

    fn read_prefix(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            chan_point: OutPoint {
                txid: reader.read_array()?,
                index: reader.read_u32()?,
            },
            short_chan_id: ShortChannelId::from_u64(reader.read_u64()?),
            chain_hash: reader.read_array()?,
            closing_txid: reader.read_array()?,
            close_height: reader.read_u32()?,
            remote_pub: Vertex(reader.read_array()?),
            capacity_sat: reader.read_u64()?,
            settled_balance_sat: reader.read_u64()?,
            time_locked_balance_sat: reader.read_u64()?,
            close_type: CloseType::from_byte(reader.read_u8()?)?,
            is_pending: reader.read_bool()?,
            remote_current_revocation: None,
            local_chan_config: None,
            remote_next_revocation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    fn fixture_config() -> ChannelConfig {
        ChannelConfig {
            dust_limit_sat: 573,
            max_pending_amount_msat: 990_000_000,
            chan_reserve_sat: 10_000,
            min_htlc_msat: 1_000,
            max_accepted_htlcs: 483,
            csv_delay: 144,
            multisig_key: Vertex([10; 33]),
            revocation_basepoint: Vertex([11; 33]),
            payment_basepoint: Vertex([12; 33]),
            delay_basepoint: Vertex([13; 33]),
            htlc_basepoint: Vertex([14; 33]),
        }
    }

    fn fixture_summary(present: usize) -> ChannelCloseSummary {
        ChannelCloseSummary {
            chan_point: OutPoint {
                txid: [1; 32],
                index: 0,
            },
            short_chan_id: ShortChannelId::from_u64(0x0009_0000_0100_0002),
            chain_hash: [6; 32],
            closing_txid: [7; 32],
            close_height: 100,
            remote_pub: Vertex([3; 33]),
            capacity_sat: 1_000_000,
            settled_balance_sat: 50_000,
            time_locked_balance_sat: 0,
            close_type: CloseType::RemoteForce,
            is_pending: true,
            remote_current_revocation: (present >= 1).then_some(Vertex([4; 33])),
            local_chan_config: (present >= 2).then(fixture_config),
            remote_next_revocation: (present >= 3).then_some(Vertex([5; 33])),
        }
    }

    #[test]
    fn prefix_and_config_have_fixed_widths() {
        let legacy = must_ok(fixture_summary(0).encode_legacy());
        assert_eq!(legacy.len(), CLOSE_SUMMARY_PREFIX_LEN);

        let mut config = Vec::new();
        fixture_config().write(&mut config);
        assert_eq!(config.len(), CHANNEL_CONFIG_LEN);
    }

    #[test]
    fn legacy_length_determines_present_fields() {
        for present in 0..=3 {
            let summary = fixture_summary(present);
            let legacy = must_ok(summary.encode_legacy());
            let decoded = must_ok(ChannelCloseSummary::decode_legacy(&legacy));
            assert_eq!(decoded, summary, "present = {present}");

            let current = decoded.encode();
            assert_eq!(current.len(), legacy.len() + 3);
            assert_eq!(must_ok(ChannelCloseSummary::decode(&current)), summary);
        }
    }

    #[test]
    fn legacy_length_off_boundary_is_rejected() {
        let mut legacy = must_ok(fixture_summary(1).encode_legacy());
        legacy.push(0);
        assert_eq!(
            ChannelCloseSummary::decode_legacy(&legacy),
            Err(CodecError::LegacyCloseSummaryLength(34))
        );
    }

    #[test]
    fn current_layout_allows_gaps_legacy_does_not() {
        let mut summary = fixture_summary(3);
        summary.local_chan_config = None;

        let current = summary.encode();
        assert_eq!(must_ok(ChannelCloseSummary::decode(&current)), summary);
        assert_eq!(
            summary.encode_legacy(),
            Err(CodecError::NonCumulativeOptionalFields {
                field: "remote_next_revocation",
            })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_current_layout_carries_any_presence(mask in 0u8..8, height in any::<u32>()) {
            let mut summary = fixture_summary(3);
            summary.close_height = height;
            if mask & 1 == 0 {
                summary.remote_current_revocation = None;
            }
            if mask & 2 == 0 {
                summary.local_chan_config = None;
            }
            if mask & 4 == 0 {
                summary.remote_next_revocation = None;
            }
            let decoded = must_ok(ChannelCloseSummary::decode(&summary.encode()));
            prop_assert_eq!(decoded, summary);
        }
    }

    #[test]
    fn unknown_close_type_is_rejected() {
        let mut legacy = must_ok(fixture_summary(0).encode_legacy());
        legacy[CLOSE_SUMMARY_PREFIX_LEN - 2] = 9;
        assert_eq!(
            ChannelCloseSummary::decode_legacy(&legacy),
            Err(CodecError::UnknownCloseType(9))
        );
    }
}
