//! Order-preserving key/value codecs.
//!
//! Every codec encodes its item into bytes whose raw ordering equals the
//! item's natural ordering (integers are big-endian for exactly this
//! reason). That lets [`Mapping`](crate::Mapping) keep a single comparison
//! path — plain byte order — for point lookups, iteration and ranges.
//!
//! Each codec carries a textual tag (e.g. `"bytes"`, `"be-u32"`,
//! `"(be-u64,be-u16)"`) that is written into the persisted mapping header;
//! opening a mapping with different codecs fails instead of silently
//! reinterpreting stored data.

use crate::IndexError;
use byteorder::{BigEndian, ByteOrder};
use std::marker::PhantomData;

/// An order-preserving encoding for one item type.
pub trait Codec {
    type Item;

    /// Codec identity, persisted with the mapping and checked on open.
    fn tag() -> String;

    /// Encoded width when fixed, `None` for variable-width codecs.
    fn width() -> Option<usize>;

    fn encode(item: &Self::Item, buf: &mut Vec<u8>);

    /// Decodes an item from exactly `bytes`.
    ///
    /// # Errors
    ///
    /// [`IndexError::Decode`] when `bytes` is not a well-formed encoding —
    /// never truncates or reinterprets.
    fn decode(bytes: &[u8]) -> Result<Self::Item, IndexError>;
}

/// Raw bytes, compared as-is. The natural key codec for UTF-8 words.
pub struct RawBytes;

impl Codec for RawBytes {
    type Item = Vec<u8>;

    fn tag() -> String {
        "bytes".into()
    }

    fn width() -> Option<usize> {
        None
    }

    fn encode(item: &Vec<u8>, buf: &mut Vec<u8>) {
        buf.extend_from_slice(item);
    }

    fn decode(bytes: &[u8]) -> Result<Vec<u8>, IndexError> {
        Ok(bytes.to_vec())
    }
}

macro_rules! be_uint_codec {
    ($name:ident, $ty:ty, $width:expr, $tag:expr, $read:path, $write:path) => {
        #[doc = concat!("Fixed-width big-endian `", stringify!($ty), "`.")]
        pub struct $name;

        impl Codec for $name {
            type Item = $ty;

            fn tag() -> String {
                $tag.into()
            }

            fn width() -> Option<usize> {
                Some($width)
            }

            fn encode(item: &$ty, buf: &mut Vec<u8>) {
                let mut raw = [0u8; $width];
                $write(&mut raw, *item);
                buf.extend_from_slice(&raw);
            }

            fn decode(bytes: &[u8]) -> Result<$ty, IndexError> {
                if bytes.len() != $width {
                    return Err(IndexError::Decode(format!(
                        "expected {} bytes for {}, got {}",
                        $width,
                        $tag,
                        bytes.len()
                    )));
                }
                Ok($read(bytes))
            }
        }
    };
}

be_uint_codec!(BeU16, u16, 2, "be-u16", BigEndian::read_u16, BigEndian::write_u16);
be_uint_codec!(BeU32, u32, 4, "be-u32", BigEndian::read_u32, BigEndian::write_u32);
be_uint_codec!(BeU64, u64, 8, "be-u64", BigEndian::read_u64, BigEndian::write_u64);

/// Length-prefixed bytes (`u16` big-endian length + payload), for use as a
/// trailing field inside [`Pair`] where the field boundary must be
/// recoverable.
///
/// Note: the length prefix participates in ordering, so items sort by
/// (length, bytes) rather than purely lexicographically. Fine for composite
/// keys whose leading field dominates the order.
///
/// Items longer than the prefix can address (65535 bytes) are encoded as
/// their leading 65535 bytes; the prefix never wraps.
pub struct LenBytes;

impl Codec for LenBytes {
    type Item = Vec<u8>;

    fn tag() -> String {
        "len-bytes".into()
    }

    fn width() -> Option<usize> {
        None
    }

    fn encode(item: &Vec<u8>, buf: &mut Vec<u8>) {
        let item = &item[..item.len().min(u16::MAX as usize)];
        let mut raw = [0u8; 2];
        BigEndian::write_u16(&mut raw, item.len() as u16);
        buf.extend_from_slice(&raw);
        buf.extend_from_slice(item);
    }

    fn decode(bytes: &[u8]) -> Result<Vec<u8>, IndexError> {
        if bytes.len() < 2 {
            return Err(IndexError::Decode("truncated len-bytes field".into()));
        }
        let len = BigEndian::read_u16(&bytes[..2]) as usize;
        if bytes.len() != 2 + len {
            return Err(IndexError::Decode(format!(
                "len-bytes declares {} bytes but {} remain",
                len,
                bytes.len() - 2
            )));
        }
        Ok(bytes[2..].to_vec())
    }
}

/// Structured two-field codec. The first field must be fixed-width so the
/// boundary between fields is known; the second takes the remainder.
///
/// The dictionary indexes use `Pair<BeU64, BeU16>` for their
/// `(descriptor, position)` values; history uses `Pair<BeU64, LenBytes>`
/// keys.
pub struct Pair<A, B>(PhantomData<(A, B)>);

impl<A: Codec, B: Codec> Codec for Pair<A, B> {
    type Item = (A::Item, B::Item);

    fn tag() -> String {
        format!("({},{})", A::tag(), B::tag())
    }

    fn width() -> Option<usize> {
        match (A::width(), B::width()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        }
    }

    fn encode(item: &(A::Item, B::Item), buf: &mut Vec<u8>) {
        A::encode(&item.0, buf);
        B::encode(&item.1, buf);
    }

    fn decode(bytes: &[u8]) -> Result<(A::Item, B::Item), IndexError> {
        let split = A::width().ok_or_else(|| {
            IndexError::Decode(format!(
                "first field of {} must be fixed-width",
                Self::tag()
            ))
        })?;
        if bytes.len() < split {
            return Err(IndexError::Decode(format!(
                "truncated {}: {} bytes",
                Self::tag(),
                bytes.len()
            )));
        }
        let a = A::decode(&bytes[..split])?;
        let b = B::decode(&bytes[split..])?;
        Ok((a, b))
    }
}
