use std::fmt;

use num_bigint::BigUint;
use num_traits::One;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// A position on the ring, always reduced mod 2^m.
///
/// The same reduction discipline applies to node identifiers, finger ids and
/// bucket keys alike, so `between` comparisons are consistent across the
/// cluster.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(BigUint);

impl Identifier {
    pub fn to_decimal(&self) -> String {
        self.0.to_str_radix(10)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl From<u64> for Identifier {
    fn from(n: u64) -> Self {
        Identifier(BigUint::from(n))
    }
}

// Identifiers cross the wire as decimal strings, which keeps the JSON frames
// readable regardless of m.
impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let n = BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("not a decimal identifier: {s:?}")))?;
        Ok(Identifier(n))
    }
}

/// The identifier space of one ring: the integers mod 2^m.
///
/// `m` is fixed at construction and must agree across every node of a ring.
#[derive(Debug, Clone)]
pub struct IdSpace {
    bits: u32,
    modulus: BigUint,
}

impl IdSpace {
    pub fn new(bits: u32) -> Self {
        IdSpace {
            bits,
            modulus: BigUint::one() << bits,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// SHA-1 of the UTF-8 bytes of `s`, big-endian, reduced mod 2^m.
    pub fn hash(&self, s: &str) -> Identifier {
        let digest = Sha1::digest(s.as_bytes());
        Identifier(BigUint::from_bytes_be(&digest) % &self.modulus)
    }

    /// `(id + 2^i) mod 2^m`, the ring position of finger slot `i`.
    pub fn finger_offset(&self, id: &Identifier, i: u32) -> Identifier {
        Identifier((&id.0 + (BigUint::one() << i)) % &self.modulus)
    }
}

/// Tests whether `elt` lies on the clockwise arc from `start` to `end`.
///
/// When `end > start` the arc is the open interval `(start, end)`; when
/// `end <= start` it wraps around zero. `inclusive` extends the arc to
/// include `end`; `start` is never included.
pub fn between(start: &Identifier, elt: &Identifier, end: &Identifier, inclusive: bool) -> bool {
    if end > start {
        (start < elt && elt < end) || (inclusive && elt == end)
    } else {
        start < elt || elt < end || (inclusive && elt == end)
    }
}
