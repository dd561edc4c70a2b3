// crates/metadata-single-core/src/core/identifiers.rs
// ============================================================================
// Module: Metadata Single Identifiers
// Description: Object types, object identifiers, and metadata keys.
// Purpose: Provide strongly typed identifiers that reject invalid input at construction.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the identifiers every metadata operation is addressed
//! by. Each type validates at its construction boundary so that an operation
//! holding one never needs to re-check it:
//! - [`ObjectType`] is a closed set; unknown names fail to parse.
//! - [`ObjectId`] is always in `1 ..= i64::MAX` so it fits an `INTEGER` column.
//! - [`MetaKey`] is never empty and never longer than [`MAX_META_KEY_LENGTH`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a metadata key in bytes.
pub const MAX_META_KEY_LENGTH: usize = 255;

/// Largest object identifier accepted (storage columns are signed 64-bit).
const MAX_OBJECT_ID: u64 = i64::MAX as u64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Object type name is not one of the supported types.
    #[error("unsupported object type: {0}")]
    UnsupportedObjectType(String),
    /// Object identifier is zero, negative, non-numeric, or out of range.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),
    /// Metadata key is empty or too long.
    #[error("invalid meta key: {0}")]
    InvalidMetaKey(String),
}

// ============================================================================
// SECTION: Object Type
// ============================================================================

/// Category of host entity that can own single-valued metadata.
///
/// # Invariants
/// - The set is closed; [`ObjectType::ALL`] lists every variant.
/// - [`ObjectType::as_str`] is the stable wire and naming form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// Posts.
    Post,
    /// Comments.
    Comment,
    /// Users.
    User,
}

impl ObjectType {
    /// Every supported object type, in registry order.
    pub const ALL: [Self; 3] = [Self::Post, Self::Comment, Self::User];

    /// Returns the stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::User => "user",
        }
    }

    /// Returns the position of the type within [`ObjectType::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Post => 0,
            Self::Comment => 1,
            Self::User => 2,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|object_type| object_type.as_str() == value)
            .ok_or_else(|| IdentifierError::UnsupportedObjectType(value.to_string()))
    }
}

// ============================================================================
// SECTION: Object Identifier
// ============================================================================

/// Identifier of one object instance.
///
/// # Invariants
/// - Always within `1 ..= i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ObjectId(NonZeroU64);

impl ObjectId {
    /// Creates an object identifier from a raw value.
    ///
    /// Returns `None` for zero or values above `i64::MAX`.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        if raw > MAX_OBJECT_ID {
            return None;
        }
        match NonZeroU64::new(raw) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Creates an object identifier from a signed value (returns `None` if not positive).
    #[must_use]
    pub fn from_signed(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().and_then(Self::from_raw)
    }

    /// Parses a decimal object identifier, rejecting zero, negative, and non-numeric input.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidObjectId`] when the text is not a positive integer.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let trimmed = text.trim();
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(Self::from_raw)
            .ok_or_else(|| IdentifierError::InvalidObjectId(trimmed.to_string()))
    }

    /// Parses a comma-delimited identifier list such as `"1, 2,3"`.
    ///
    /// Characters other than digits and commas are dropped, empty segments are
    /// skipped, and duplicates collapse. The result is sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidObjectId`] when a segment is zero or out of range.
    pub fn parse_list(text: &str) -> Result<Vec<Self>, IdentifierError> {
        let cleaned: String =
            text.chars().filter(|ch| ch.is_ascii_digit() || *ch == ',').collect();
        let mut ids = BTreeSet::new();
        for segment in cleaned.split(',').filter(|segment| !segment.is_empty()) {
            ids.insert(Self::parse(segment)?);
        }
        Ok(ids.into_iter().collect())
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the identifier as a signed storage integer.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, reason = "Construction bounds the value to i64::MAX.")]
    pub const fn as_i64(self) -> i64 {
        self.0.get() as i64
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

impl TryFrom<u64> for ObjectId {
    type Error = IdentifierError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or_else(|| IdentifierError::InvalidObjectId(value.to_string()))
    }
}

impl From<ObjectId> for u64 {
    fn from(value: ObjectId) -> Self {
        value.get()
    }
}

impl FromStr for ObjectId {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

// ============================================================================
// SECTION: Metadata Key
// ============================================================================

/// Metadata key, unique per object.
///
/// # Invariants
/// - Non-empty and at most [`MAX_META_KEY_LENGTH`] bytes.
/// - No normalization is applied; keys compare byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetaKey(String);

impl MetaKey {
    /// Creates a metadata key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidMetaKey`] when the key is empty or too long.
    pub fn new(key: impl Into<String>) -> Result<Self, IdentifierError> {
        let key = key.into();
        if key.is_empty() {
            return Err(IdentifierError::InvalidMetaKey("meta key must not be empty".to_string()));
        }
        if key.len() > MAX_META_KEY_LENGTH {
            return Err(IdentifierError::InvalidMetaKey(format!(
                "meta key exceeds {MAX_META_KEY_LENGTH} bytes"
            )));
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for MetaKey {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for MetaKey {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MetaKey> for String {
    fn from(value: MetaKey) -> Self {
        value.0
    }
}

impl AsRef<str> for MetaKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
