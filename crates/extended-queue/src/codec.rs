//! Conversion between entities and queue message bytes.
//!
//! Encoding serializes an entity to text (strings pass through untouched) and
//! then runs the bytes through an ordered chain of transforms. Decoding runs
//! the chain in reverse and deserializes the text, unless the caller asked
//! for the raw `String`.
//!
//! ```rust
//! use extended_queue::codec::{Codec, GzipTransform, Base64Transform};
//!
//! let codec = Codec::new()
//!     .with_transform(GzipTransform::new())
//!     .with_transform(Base64Transform);
//!
//! let bytes = codec.encode(&vec![1, 2, 3]).unwrap();
//! let decoded: Vec<i32> = codec.decode(bytes).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

use crate::error::CodecError;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::sync::Arc;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

// ============================================================================
// Serializers
// ============================================================================

/// Converts structured values to and from their text form
pub trait Serializer: Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize(&self, value: &serde_json::Value) -> Result<String, CodecError>;

    fn deserialize(&self, text: &str) -> Result<serde_json::Value, CodecError>;
}

/// Compact JSON serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &serde_json::Value) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, text: &str) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// YAML serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn serialize(&self, value: &serde_json::Value) -> Result<String, CodecError> {
        Ok(serde_yaml::to_string(value)?)
    }

    fn deserialize(&self, text: &str) -> Result<serde_json::Value, CodecError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

// ============================================================================
// Byte Transforms
// ============================================================================

/// A reversible transformation of encoded message bytes.
///
/// `reverse(apply(x)) == x` must hold for every input.
pub trait ByteTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, input: Bytes) -> Result<Bytes, CodecError>;

    fn reverse(&self, input: Bytes) -> Result<Bytes, CodecError>;
}

/// Default cap on the size of decompressed contents
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Gzip compression
#[derive(Debug, Clone)]
pub struct GzipTransform {
    level: Compression,
    max_decompressed_size: usize,
}

impl GzipTransform {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Set the compression level (0-9)
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Reject inputs that decompress to more than `max` bytes
    pub fn with_max_decompressed_size(mut self, max: usize) -> Self {
        self.max_decompressed_size = max;
        self
    }

    fn failure(&self, message: impl Into<String>) -> CodecError {
        CodecError::Transform {
            transform: self.name().to_string(),
            message: message.into(),
        }
    }
}

impl Default for GzipTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteTransform for GzipTransform {
    fn name(&self) -> &str {
        "gzip"
    }

    fn apply(&self, input: Bytes) -> Result<Bytes, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(&input)
            .map_err(|e| self.failure(e.to_string()))?;
        encoder
            .finish()
            .map(Bytes::from)
            .map_err(|e| self.failure(e.to_string()))
    }

    fn reverse(&self, input: Bytes) -> Result<Bytes, CodecError> {
        let mut decoder = GzDecoder::new(input.as_ref());
        let mut decompressed = Vec::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = decoder
                .read(&mut buffer)
                .map_err(|e| self.failure(e.to_string()))?;

            if bytes_read == 0 {
                break;
            }

            if decompressed.len() + bytes_read > self.max_decompressed_size {
                return Err(self.failure(format!(
                    "decompressed size exceeds {} bytes",
                    self.max_decompressed_size
                )));
            }

            decompressed.extend_from_slice(&buffer[..bytes_read]);
        }

        Ok(Bytes::from(decompressed))
    }
}

/// Standard base64 text encoding, for backends that require text bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Transform;

impl ByteTransform for Base64Transform {
    fn name(&self) -> &str {
        "base64"
    }

    fn apply(&self, input: Bytes) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(general_purpose::STANDARD.encode(&input)))
    }

    fn reverse(&self, input: Bytes) -> Result<Bytes, CodecError> {
        general_purpose::STANDARD
            .decode(&input)
            .map(Bytes::from)
            .map_err(|e| CodecError::Transform {
                transform: self.name().to_string(),
                message: e.to_string(),
            })
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Serializer plus ordered transform chain
#[derive(Clone)]
pub struct Codec {
    serializer: Arc<dyn Serializer>,
    transforms: Vec<Arc<dyn ByteTransform>>,
}

impl Codec {
    /// Create a JSON codec without transforms
    pub fn new() -> Self {
        Self {
            serializer: Arc::new(JsonSerializer),
            transforms: Vec::new(),
        }
    }

    /// Replace the serializer
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Append a transform; transforms run in the order they were added
    pub fn with_transform(mut self, transform: impl ByteTransform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    /// Names of the configured transforms, in application order
    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Encode an entity; text types are used as-is instead of being serialized
    pub fn encode<T>(&self, entity: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + Any,
    {
        if let Some(text) = as_text(entity) {
            return self.encode_str(text);
        }

        let value = serde_json::to_value(entity)?;
        let text = self.serializer.serialize(&value)?;
        self.encode_str(&text)
    }

    /// Encode already serialized text
    pub fn encode_str(&self, text: &str) -> Result<Bytes, CodecError> {
        self.transforms
            .iter()
            .try_fold(Bytes::copy_from_slice(text.as_bytes()), |bytes, transform| {
                transform.apply(bytes)
            })
    }

    /// Decode bytes into an entity; decoding into `String` skips deserialization
    pub fn decode<T>(&self, bytes: Bytes) -> Result<T, CodecError>
    where
        T: DeserializeOwned + Any,
    {
        let text = self.decode_string(bytes)?;

        let target = TypeId::of::<T>();
        let passthrough: Option<Box<dyn Any>> = if target == TypeId::of::<String>() {
            Some(Box::new(text.clone()))
        } else if target == TypeId::of::<Box<str>>() {
            Some(Box::new(text.clone().into_boxed_str()))
        } else if target == TypeId::of::<Cow<'static, str>>() {
            Some(Box::new(Cow::<'static, str>::Owned(text.clone())))
        } else {
            None
        };

        if let Some(boxed) = passthrough {
            return boxed
                .downcast::<T>()
                .map(|entity| *entity)
                .map_err(|_| CodecError::TypeMismatch);
        }

        let value = self.serializer.deserialize(&text)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Undo the transform chain and return the serialized text
    pub fn decode_string(&self, bytes: Bytes) -> Result<String, CodecError> {
        let raw = self
            .transforms
            .iter()
            .rev()
            .try_fold(bytes, |bytes, transform| transform.reverse(bytes))?;

        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Borrow the text of string-like entities
fn as_text<T: Any>(entity: &T) -> Option<&str> {
    let entity = entity as &dyn Any;

    if let Some(text) = entity.downcast_ref::<String>() {
        Some(text.as_str())
    } else if let Some(text) = entity.downcast_ref::<&'static str>() {
        Some(*text)
    } else if let Some(text) = entity.downcast_ref::<Box<str>>() {
        Some(&**text)
    } else {
        entity
            .downcast_ref::<Cow<'static, str>>()
            .map(|text| text.as_ref())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("serializer", &self.serializer.name())
            .field("transforms", &self.transform_names())
            .finish()
    }
}
