//! Big-endian field readers and writers shared by every record codec.
//!
//! Variable-length byte strings use the Bitcoin `CompactSize` length prefix,
//! which is the only little-endian integer in the persisted formats.

use time::OffsetDateTime;

use crate::CodecError;

/// Cursor over a borrowed record. Every read either consumes exactly the
/// requested bytes or fails without allocating.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    context: &'static str,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8], context: &'static str) -> Self {
        Self { buf, context }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < len {
            return Err(CodecError::UnexpectedEof {
                context: self.context,
                needed: len,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0_u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidBool {
                context: self.context,
                value,
            }),
        }
    }

    pub fn read_timestamp(&mut self) -> Result<OffsetDateTime, CodecError> {
        let nanos = self.read_i64()?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|err| CodecError::TimestampOutOfRange(err.to_string()))
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let declared = self.read_compact_size()?;
        let len = usize::try_from(declared).map_err(|_| CodecError::TooManyElements {
            context: self.context,
            count: usize::MAX,
        })?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn read_compact_size(&mut self) -> Result<u64, CodecError> {
        match self.read_u8()? {
            0xfd => Ok(u64::from(u16::from_le_bytes(self.read_array()?))),
            0xfe => Ok(u64::from(u32::from_le_bytes(self.read_array()?))),
            0xff => Ok(u64::from_le_bytes(self.read_array()?)),
            small => Ok(u64::from(small)),
        }
    }

    /// Fails if any bytes are left unread.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                context: self.context,
                count: self.buf.len(),
            })
        }
    }
}

pub fn put_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_timestamp(out: &mut Vec<u8>, value: OffsetDateTime) -> Result<(), CodecError> {
    let nanos = i64::try_from(value.unix_timestamp_nanos())
        .map_err(|_| CodecError::TimestampOutOfRange(value.to_string()))?;
    out.extend_from_slice(&nanos.to_be_bytes());
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
pub fn put_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len() as u64;
    match len {
        0..=0xfc => out.push(len as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&len.to_le_bytes());
        }
    }
    out.extend_from_slice(bytes);
}

/// Length prefix for a list that is stored with a `u32` element count.
pub fn count_u32(context: &'static str, count: usize) -> Result<u32, CodecError> {
    u32::try_from(count).map_err(|_| CodecError::TooManyElements { context, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn var_bytes_switches_to_wide_prefix_past_252_bytes() {
        let payload = vec![7_u8; 300];
        let mut out = Vec::new();
        put_var_bytes(&mut out, &payload);

        assert_eq!(out[0], 0xfd);
        assert_eq!(&out[1..3], &300_u16.to_le_bytes());

        let mut reader = Reader::new(&out, "test");
        assert_eq!(must_ok(reader.read_var_bytes()), payload);
        must_ok(reader.finish());
    }

    #[test]
    fn truncated_var_bytes_reports_shortfall() {
        let mut out = Vec::new();
        put_var_bytes(&mut out, &[1, 2, 3, 4]);
        out.truncate(3);

        let mut reader = Reader::new(&out, "memo");
        assert_eq!(
            reader.read_var_bytes(),
            Err(CodecError::UnexpectedEof {
                context: "memo",
                needed: 4,
                available: 2,
            })
        );
    }

    #[test]
    fn boolean_marker_rejects_values_above_one() {
        let mut reader = Reader::new(&[2], "marker");
        assert_eq!(
            reader.read_bool(),
            Err(CodecError::InvalidBool {
                context: "marker",
                value: 2,
            })
        );
    }

    #[test]
    fn finish_flags_unread_bytes() {
        let mut reader = Reader::new(&[0, 0, 0, 1, 9], "status");
        assert_eq!(must_ok(reader.read_u32()), 1);
        assert_eq!(
            reader.finish(),
            Err(CodecError::TrailingBytes {
                context: "status",
                count: 1,
            })
        );
    }
}
