// crates/metadata-single-core/src/core/value.rs
// ============================================================================
// Module: Metadata Values
// Description: Typed metadata values and the codec used at the storage boundary.
// Purpose: Round-trip structured values through a flat text column.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Callers work with [`MetaValue`]; storage and the cache only ever see
//! [`RawMetaValue`], the encoded text form. A [`ValueCodec`] converts between
//! the two and is applied on every write and every keyed read. The default
//! [`JsonValueCodec`] stores values as compact JSON text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Value codec errors.
///
/// # Invariants
/// - Messages never embed the raw value payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("meta value encode failed: {0}")]
    Encode(String),
    /// Stored text could not be decoded.
    #[error("meta value decode failed: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// Metadata value as seen by callers.
///
/// # Invariants
/// - Any JSON-representable shape: scalar, array, or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaValue(serde_json::Value);

impl MetaValue {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Builds a value from any serializable type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the type cannot be represented as JSON.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    /// Converts the value into a typed representation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the value does not match `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        T::deserialize(&self.0).map_err(|err| CodecError::Decode(err.to_string()))
    }

    /// Returns the underlying JSON value.
    #[must_use]
    pub const fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Returns the string content when the value is a JSON string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Consumes the wrapper and returns the JSON value.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for MetaValue {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self(serde_json::Value::String(value))
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self(serde_json::Value::Bool(value))
    }
}

/// Encoded metadata value as stored in the `meta_value` column.
///
/// # Invariants
/// - Produced by a [`ValueCodec`]; opaque to everything except that codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetaValue(String);

impl RawMetaValue {
    /// Wraps stored text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the stored text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the stored text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RawMetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Full metadata mapping for one object, keyed by meta key, in raw form.
pub type ObjectMeta = BTreeMap<String, RawMetaValue>;

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Serialize/deserialize contract applied at the storage boundary.
pub trait ValueCodec: Send + Sync {
    /// Encodes a value for storage.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the value cannot be encoded.
    fn encode(&self, value: &MetaValue) -> Result<RawMetaValue, CodecError>;

    /// Decodes stored text into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the stored text is malformed.
    fn decode(&self, raw: &RawMetaValue) -> Result<MetaValue, CodecError>;
}

/// Compact JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueCodec;

impl ValueCodec for JsonValueCodec {
    fn encode(&self, value: &MetaValue) -> Result<RawMetaValue, CodecError> {
        serde_json::to_string(&value.0)
            .map(RawMetaValue)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, raw: &RawMetaValue) -> Result<MetaValue, CodecError> {
        serde_json::from_str(&raw.0).map(MetaValue).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
