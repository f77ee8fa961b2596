//! Scalar and vector types of generated kernels.

use crate::rng::GenRng;
use serde::{Deserialize, Serialize};

/// Widths a vector type may take.
pub const VECTOR_LENGTHS: [u8; 5] = [2, 3, 4, 8, 16];

/// Integer element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
}

impl ScalarKind {
    pub const ALL: [Self; 8] = [
        Self::Char,
        Self::UChar,
        Self::Short,
        Self::UShort,
        Self::Int,
        Self::UInt,
        Self::Long,
        Self::ULong,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::UChar => "uchar",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Long => "long",
            Self::ULong => "ulong",
        }
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Char | Self::Short | Self::Int | Self::Long)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Char | Self::UChar => 8,
            Self::Short | Self::UShort => 16,
            Self::Int | Self::UInt => 32,
            Self::Long | Self::ULong => 64,
        }
    }

    /// Reduce `value` to the range of this kind (two's complement wrap).
    #[must_use]
    pub const fn wrap(self, value: i64) -> i64 {
        let bits = self.bits();
        if bits == 64 {
            return value;
        }
        let shift = 64 - bits;
        if self.is_signed() {
            (value << shift) >> shift
        } else {
            ((value as u64) << shift >> shift) as i64
        }
    }

    /// C literal for `value` of this kind.
    #[must_use]
    pub fn literal(self, value: i64) -> String {
        let value = self.wrap(value);
        match self {
            Self::UInt => format!("{}U", value as u64),
            Self::ULong => format!("{}UL", value as u64),
            Self::UChar | Self::UShort => format!("({}){}U", self.name(), value as u64),
            Self::Int if value >= 0 => value.to_string(),
            Self::Long if value >= 0 => format!("{value}L"),
            _ if value >= 0 => format!("({}){}", self.name(), value),
            // -2^63 has no positive counterpart
            Self::Long if value == i64::MIN => "(long)0x8000000000000000UL".to_string(),
            _ => format!("({})(-{})", self.name(), value.unsigned_abs()),
        }
    }
}

/// Type of a variable, buffer element or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Scalar(ScalarKind),
    Vector { elem: ScalarKind, len: u8 },
}

impl Type {
    #[must_use]
    pub const fn int() -> Self {
        Self::Scalar(ScalarKind::Int)
    }

    #[must_use]
    pub const fn uint() -> Self {
        Self::Scalar(ScalarKind::UInt)
    }

    #[must_use]
    pub const fn ulong() -> Self {
        Self::Scalar(ScalarKind::ULong)
    }

    #[must_use]
    pub const fn vector(elem: ScalarKind, len: u8) -> Self {
        Self::Vector { elem, len }
    }

    #[must_use]
    pub const fn is_vector(self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    #[must_use]
    pub const fn element(self) -> ScalarKind {
        match self {
            Self::Scalar(kind) | Self::Vector { elem: kind, .. } => kind,
        }
    }

    #[must_use]
    pub const fn vector_length(self) -> Option<u8> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector { len, .. } => Some(len),
        }
    }

    /// Lane count: 1 for scalars.
    #[must_use]
    pub const fn lanes(self) -> u8 {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector { len, .. } => len,
        }
    }

    /// Element type of a vector; scalars map to themselves.
    #[must_use]
    pub const fn demote(self) -> Self {
        Self::Scalar(self.element())
    }

    /// Vector of `len` lanes over this type's element.
    #[must_use]
    pub const fn promote(self, len: u8) -> Self {
        Self::Vector {
            elem: self.element(),
            len,
        }
    }

    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Scalar(kind) => kind.name().to_string(),
            Self::Vector { elem, len } => format!("{}{}", elem.name(), len),
        }
    }

    /// Name of the vector constructor, e.g. `make_uint4`.
    #[must_use]
    pub fn make_fn(self) -> String {
        format!("make_{}", self.name())
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Qualifier set attached to variables and buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Qualifiers {
    /// Plain mutable storage.
    #[must_use]
    pub const fn mutable() -> Self {
        Self {
            is_const: false,
            is_volatile: false,
        }
    }
}

/// Random vector width no larger than `max`; `max == 0` means any width.
///
/// Falls back to the narrowest width when `max` admits none.
pub fn random_vector_length(rng: &mut GenRng, max: u8) -> u8 {
    let allowed: Vec<u8> = VECTOR_LENGTHS
        .iter()
        .copied()
        .filter(|&len| max == 0 || len <= max)
        .collect();
    rng.choose(&allowed).copied().unwrap_or(VECTOR_LENGTHS[0])
}

pub fn random_scalar_kind(rng: &mut GenRng) -> ScalarKind {
    ScalarKind::ALL[rng.rnd_upto(ScalarKind::ALL.len() as u32) as usize]
}

/// Named half/parity selector of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuffixAccess {
    Hi,
    Lo,
    Even,
    Odd,
}

impl SuffixAccess {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hi => "hi",
            Self::Lo => "lo",
            Self::Even => "even",
            Self::Odd => "odd",
        }
    }

    /// Runtime-header helper that performs this selection.
    #[must_use]
    pub const fn helper(self) -> &'static str {
        match self {
            Self::Hi => "vec_hi",
            Self::Lo => "vec_lo",
            Self::Even => "vec_even",
            Self::Odd => "vec_odd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Seed;

    #[test]
    fn type_names() {
        assert_eq!(Type::uint().name(), "uint");
        assert_eq!(Type::vector(ScalarKind::UChar, 16).name(), "uchar16");
        assert_eq!(Type::vector(ScalarKind::Int, 4).make_fn(), "make_int4");
    }

    #[test]
    fn promote_demote() {
        let v = Type::uint().promote(8);
        assert_eq!(v.vector_length(), Some(8));
        assert_eq!(v.demote(), Type::uint());
        assert_eq!(Type::uint().demote(), Type::uint());
        assert_eq!(Type::int().lanes(), 1);
    }

    #[test]
    fn literal_wraps_to_kind() {
        assert_eq!(ScalarKind::UChar.literal(300), "(uchar)44U");
        assert_eq!(ScalarKind::Char.literal(200), "(char)(-56)");
        assert_eq!(ScalarKind::UInt.literal(-1), "4294967295U");
        assert_eq!(ScalarKind::Int.literal(7), "7");
        assert_eq!(ScalarKind::Long.literal(i64::MIN), "(long)0x8000000000000000UL");
    }

    #[test]
    fn random_length_respects_max() {
        let mut rng = GenRng::new(Seed::from_u64(3));
        for _ in 0..200 {
            assert!(random_vector_length(&mut rng, 4) <= 4);
            assert!(VECTOR_LENGTHS.contains(&random_vector_length(&mut rng, 0)));
        }
        assert_eq!(random_vector_length(&mut rng, 1), 2);
    }

    #[test]
    fn suffix_helpers() {
        assert_eq!(SuffixAccess::Even.helper(), "vec_even");
        assert_eq!(SuffixAccess::Hi.as_str(), "hi");
    }
}
