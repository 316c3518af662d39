// src/config/bundle.rs

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ConfigError;

/// Magic prefix of every persisted bundle stream
pub const BUNDLE_MAGIC: [u8; 4] = *b"VMCB";

/// Upper bound on the encoded size of a bundle read from a stream
const MAX_BUNDLE_BYTES: u64 = 1024 * 1024; // 1 MiB

/// A typed value stored under a bundle key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleValue {
    /// 32-bit signed integer
    Int(i32),

    /// Boolean flag
    Bool(bool),

    /// UTF-8 string
    String(String),

    /// Ordered array of UTF-8 strings
    StringArray(Vec<String>),
}

impl BundleValue {
    fn type_name(&self) -> &'static str {
        match self {
            BundleValue::Int(_) => "int",
            BundleValue::Bool(_) => "bool",
            BundleValue::String(_) => "string",
            BundleValue::StringArray(_) => "string array",
        }
    }
}

/// Self-describing key/value container used as the on-disk format.
///
/// Each value carries its own type tag, so a reader can tell an absent key
/// from a key stored with an unexpected type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    entries: BTreeMap<String, BundleValue>,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_BUNDLE_BYTES)
}

fn type_mismatch(key: &str, expected: &str, found: &BundleValue) -> ConfigError {
    ConfigError::MalformedField {
        key: key.to_string(),
        reason: format!("expected {}, found {}", expected, found.type_name()),
    }
}

fn read_error(error: io::Error) -> ConfigError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        ConfigError::Corrupt("stream ended unexpectedly".to_string())
    } else {
        ConfigError::Io(error)
    }
}

impl Bundle {
    /// Creates an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle stores no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the value stored under `key`
    pub fn remove(&mut self, key: &str) -> Option<BundleValue> {
        self.entries.remove(key)
    }

    /// Stores an integer under `key`
    pub fn put_int(&mut self, key: &str, value: i32) {
        self.entries.insert(key.to_string(), BundleValue::Int(value));
    }

    /// Stores a boolean under `key`
    pub fn put_bool(&mut self, key: &str, value: bool) {
        self.entries.insert(key.to_string(), BundleValue::Bool(value));
    }

    /// Stores a string under `key`
    pub fn put_string(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), BundleValue::String(value.into()));
    }

    /// Stores a string array under `key`
    pub fn put_string_array(&mut self, key: &str, value: Vec<String>) {
        self.entries.insert(key.to_string(), BundleValue::StringArray(value));
    }

    /// Reads an integer; `Ok(None)` when the key is absent
    pub fn get_int(&self, key: &str) -> Result<Option<i32>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(BundleValue::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(type_mismatch(key, "int", other)),
        }
    }

    /// Reads a boolean; `Ok(None)` when the key is absent
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(BundleValue::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(type_mismatch(key, "bool", other)),
        }
    }

    /// Reads a string; `Ok(None)` when the key is absent
    pub fn get_string(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(BundleValue::String(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(type_mismatch(key, "string", other)),
        }
    }

    /// Reads a string array; `Ok(None)` when the key is absent
    pub fn get_string_array(&self, key: &str) -> Result<Option<&[String]>, ConfigError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(BundleValue::StringArray(value)) => Ok(Some(value.as_slice())),
            Some(other) => Err(type_mismatch(key, "string array", other)),
        }
    }

    /// Writes the stream header (magic and schema version) followed by the
    /// encoded bundle
    pub fn write_to_stream<W: Write>(&self, version: i32, mut writer: W) -> Result<(), ConfigError> {
        writer.write_all(&BUNDLE_MAGIC)?;
        writer.write_all(&version.to_le_bytes())?;

        codec().serialize_into(&mut writer, self).map_err(|e| match *e {
            bincode::ErrorKind::Io(io) => ConfigError::Io(io),
            other => ConfigError::Corrupt(other.to_string()),
        })?;

        writer.flush()?;
        debug!(version, keys = self.len(), "Bundle written");

        Ok(())
    }

    /// Reads the stream header and returns the schema version it carries.
    ///
    /// The header has a fixed layout in every schema version, so a reader can
    /// reject a newer stream before touching the encoded entries.
    pub fn read_header<R: Read>(reader: &mut R) -> Result<i32, ConfigError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(read_error)?;

        if magic != BUNDLE_MAGIC {
            return Err(ConfigError::Corrupt(format!(
                "bad magic {:02x?}",
                magic
            )));
        }

        let mut version = [0u8; 4];
        reader.read_exact(&mut version).map_err(read_error)?;

        Ok(i32::from_le_bytes(version))
    }

    /// Decodes the entries that follow the stream header
    pub fn read_entries<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let bundle: Bundle = codec().deserialize_from(reader).map_err(|e| match *e {
            bincode::ErrorKind::Io(io) => read_error(io),
            other => ConfigError::Corrupt(other.to_string()),
        })?;

        debug!(keys = bundle.len(), "Bundle read");

        Ok(bundle)
    }

    /// Reads a stream written by [`Bundle::write_to_stream`], returning the
    /// header version and the bundle
    pub fn read_from_stream<R: Read>(mut reader: R) -> Result<(i32, Self), ConfigError> {
        let version = Self::read_header(&mut reader)?;
        let bundle = Self::read_entries(reader)?;
        Ok((version, bundle))
    }
}
