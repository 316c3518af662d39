// src/config/persist.rs

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::bundle::Bundle;
use super::certificate::Certificate;
use super::{ConfigError, VirtualMachineConfig};

// Schema of the persisted config file.

/// Highest schema version this build reads and the version it writes
pub const CONFIG_VERSION: i32 = 1;

/// Schema version (int, also carried in the stream header)
pub const KEY_VERSION: &str = "version";
/// Code bundle path (string)
pub const KEY_APK_PATH: &str = "apkPath";
/// Signing certificates in canonical text form (string array)
pub const KEY_CERTS: &str = "certs";
/// Payload config path within the code bundle (string)
pub const KEY_PAYLOAD_CONFIG_PATH: &str = "payloadConfigPath";
/// Debug mode (bool, false when absent)
pub const KEY_DEBUG_MODE: &str = "debugMode";
/// Requested RAM in MiB (int, only stored when positive)
pub const KEY_MEMORY_MIB: &str = "memoryMib";

fn check_version(version: i32) -> Result<(), ConfigError> {
    if version > CONFIG_VERSION {
        warn!(version, supported = CONFIG_VERSION, "Refusing newer config schema");
        return Err(ConfigError::SchemaTooNew {
            found: version,
            supported: CONFIG_VERSION,
        });
    }
    Ok(())
}

/// Sibling path used while saving: `<file name>.tmp` next to `path`
fn temp_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} does not name a file", path.display()),
            )
        })?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

impl VirtualMachineConfig {
    /// Converts this config into its persisted bundle form.
    ///
    /// `memoryMib` is only stored when positive; its absence means "use the
    /// default" on load.
    pub fn to_bundle(&self) -> Bundle {
        let mut b = Bundle::new();
        b.put_int(KEY_VERSION, CONFIG_VERSION);
        b.put_string(KEY_APK_PATH, self.apk_path.as_str());
        b.put_string_array(
            KEY_CERTS,
            self.certificates.iter().map(Certificate::to_chars_string).collect(),
        );
        b.put_string(KEY_PAYLOAD_CONFIG_PATH, self.payload_config_path.as_str());
        b.put_bool(KEY_DEBUG_MODE, self.debug_mode);
        if self.memory_mib > 0 {
            b.put_int(KEY_MEMORY_MIB, self.memory_mib);
        }
        b
    }

    /// Rebuilds a config from its persisted bundle form
    pub fn from_bundle(b: &Bundle) -> Result<Self, ConfigError> {
        // The version is checked before anything else so that a newer schema
        // is always reported as such, whatever else it contains.
        let version = b
            .get_int(KEY_VERSION)?
            .ok_or(ConfigError::MissingField(KEY_VERSION))?;
        check_version(version)?;

        let apk_path = match b.get_string(KEY_APK_PATH)? {
            Some(path) if !path.is_empty() => path,
            _ => return Err(ConfigError::MissingField(KEY_APK_PATH)),
        };

        let cert_strings = match b.get_string_array(KEY_CERTS)? {
            Some(certs) if !certs.is_empty() => certs,
            _ => return Err(ConfigError::MissingField(KEY_CERTS)),
        };
        let certificates = cert_strings
            .iter()
            .map(|s| Certificate::from_chars(s))
            .collect::<Result<Vec<_>, _>>()?;

        let payload_config_path = match b.get_string(KEY_PAYLOAD_CONFIG_PATH)? {
            Some(path) if !path.is_empty() => path,
            _ => return Err(ConfigError::MissingField(KEY_PAYLOAD_CONFIG_PATH)),
        };

        let debug_mode = b.get_bool(KEY_DEBUG_MODE)?.unwrap_or(false);
        let memory_mib = b.get_int(KEY_MEMORY_MIB)?.unwrap_or(0);

        VirtualMachineConfig::new(
            apk_path,
            certificates,
            payload_config_path,
            debug_mode,
            memory_mib,
        )
    }

    /// Persists this config to a stream, for example a file
    pub fn serialize<W: Write>(&self, output: W) -> Result<(), ConfigError> {
        self.to_bundle().write_to_stream(CONFIG_VERSION, output)
    }

    /// Loads a config from a stream, for example a file.
    ///
    /// The header version is checked before the entries are decoded, so a
    /// stream from a newer schema is refused even when this build cannot
    /// decode its entries.
    pub fn from_reader<R: Read>(mut input: R) -> Result<Self, ConfigError> {
        let version = Bundle::read_header(&mut input)?;
        check_version(version)?;

        let bundle = Bundle::read_entries(input)?;
        if let Some(stored) = bundle.get_int(KEY_VERSION)? {
            if stored != version {
                return Err(ConfigError::Corrupt(format!(
                    "header version {} does not match stored version {}",
                    version, stored
                )));
            }
        }

        Self::from_bundle(&bundle)
    }

    /// Saves this config to a file, replacing any previous contents.
    ///
    /// The file has a single owner; concurrent writers must be serialized by
    /// the caller.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let tmp = temp_path(path)?;

        let result = self
            .write_file(&tmp)
            .and_then(|()| fs::rename(&tmp, path).map_err(ConfigError::from));
        if let Err(e) = result {
            warn!("Failed to save configuration to {}: {}", path.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        info!("Configuration saved to {}", path.display());

        Ok(())
    }

    fn write_file(&self, path: &Path) -> Result<(), ConfigError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.serialize(&mut writer)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }

    /// Loads a config from a file written by [`VirtualMachineConfig::save_to_file`]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config = Self::from_reader(BufReader::new(file))?;

        debug!(
            certificates = config.certificates.len(),
            debug_mode = config.debug_mode,
            "Configuration loaded from {}",
            path.display()
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BundleValue;

    fn config(memory_mib: i32) -> VirtualMachineConfig {
        VirtualMachineConfig::new(
            "/data/app/foo.apk",
            vec![Certificate::from_chars("AABB").unwrap()],
            "vm_config.json",
            true,
            memory_mib,
        )
        .unwrap()
    }

    fn encode(b: &Bundle) -> Vec<u8> {
        let mut buf = Vec::new();
        b.write_to_stream(b.get_int(KEY_VERSION).unwrap().unwrap_or(0), &mut buf).unwrap();
        buf
    }

    #[test]
    fn round_trips_through_a_stream() {
        let c = config(256);
        let mut buf = Vec::new();
        c.serialize(&mut buf).unwrap();

        let loaded = VirtualMachineConfig::from_reader(buf.as_slice()).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn writes_every_required_key() {
        let b = config(256).to_bundle();
        assert_eq!(b.get_int(KEY_VERSION).unwrap(), Some(CONFIG_VERSION));
        assert_eq!(b.get_string(KEY_APK_PATH).unwrap(), Some("/data/app/foo.apk"));
        assert_eq!(b.get_string_array(KEY_CERTS).unwrap(), Some(&["aabb".to_string()][..]));
        assert_eq!(b.get_string(KEY_PAYLOAD_CONFIG_PATH).unwrap(), Some("vm_config.json"));
        assert_eq!(b.get_bool(KEY_DEBUG_MODE).unwrap(), Some(true));
        assert_eq!(b.get_int(KEY_MEMORY_MIB).unwrap(), Some(256));
    }

    #[test]
    fn omits_non_positive_memory() {
        for memory_mib in [0, -1, i32::MIN] {
            let c = config(memory_mib);
            assert!(!c.to_bundle().contains_key(KEY_MEMORY_MIB));

            let loaded = VirtualMachineConfig::from_bundle(&c.to_bundle()).unwrap();
            assert_eq!(loaded.memory_mib(), 0);
        }
    }

    #[test]
    fn rejects_newer_schema_before_other_checks() {
        let mut b = Bundle::new();
        b.put_int(KEY_VERSION, CONFIG_VERSION + 1);

        let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SchemaTooNew { found: 2, supported: 1 }
        ));
    }

    #[test]
    fn accepts_older_schema() {
        let mut b = config(0).to_bundle();
        b.put_int(KEY_VERSION, 0);
        assert!(VirtualMachineConfig::from_bundle(&b).is_ok());
    }

    #[test]
    fn missing_version_is_missing_field() {
        let mut b = config(0).to_bundle();
        b.remove(KEY_VERSION);

        let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("version")));
    }

    #[test]
    fn missing_required_fields() {
        for key in [KEY_APK_PATH, KEY_CERTS, KEY_PAYLOAD_CONFIG_PATH] {
            let mut b = config(0).to_bundle();
            b.remove(key);

            let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingField(k) if k == key),
                "unexpected error for {}: {:?}",
                key,
                err
            );
        }
    }

    #[test]
    fn empty_required_fields_are_missing() {
        let mut b = config(0).to_bundle();
        b.put_string_array(KEY_CERTS, vec![]);
        assert!(matches!(
            VirtualMachineConfig::from_bundle(&b).unwrap_err(),
            ConfigError::MissingField("certs")
        ));

        let mut b = config(0).to_bundle();
        b.put_string(KEY_APK_PATH, "");
        assert!(matches!(
            VirtualMachineConfig::from_bundle(&b).unwrap_err(),
            ConfigError::MissingField("apkPath")
        ));

        let mut b = config(0).to_bundle();
        b.put_string(KEY_PAYLOAD_CONFIG_PATH, "");
        assert!(matches!(
            VirtualMachineConfig::from_bundle(&b).unwrap_err(),
            ConfigError::MissingField("payloadConfigPath")
        ));
    }

    #[test]
    fn missing_debug_mode_defaults_to_false() {
        let mut b = config(0).to_bundle();
        assert_eq!(b.remove(KEY_DEBUG_MODE), Some(BundleValue::Bool(true)));

        let loaded = VirtualMachineConfig::from_bundle(&b).unwrap();
        assert!(!loaded.debug_mode());
    }

    #[test]
    fn malformed_certificate_text() {
        let mut b = config(0).to_bundle();
        b.put_string_array(KEY_CERTS, vec!["not hex".to_string()]);

        let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedField { .. }));
    }

    #[test]
    fn empty_certificate_text_is_invalid_identity() {
        let mut b = config(0).to_bundle();
        b.put_string_array(KEY_CERTS, vec![String::new()]);

        let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentity(_)));
    }

    #[test]
    fn wrongly_typed_field_is_malformed() {
        let mut b = config(0).to_bundle();
        b.put_string(KEY_DEBUG_MODE, "yes");

        let err = VirtualMachineConfig::from_bundle(&b).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedField { ref key, .. } if key == "debugMode"));
    }

    #[test]
    fn from_reader_reports_newer_schema() {
        let mut b = config(0).to_bundle();
        b.put_int(KEY_VERSION, 42);

        let err = VirtualMachineConfig::from_reader(encode(&b).as_slice()).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaTooNew { found: 42, .. }));
    }

    #[test]
    fn newer_stream_with_unknown_value_type_is_schema_too_new() {
        use bincode::Options;
        use serde::Serialize;
        use std::collections::BTreeMap;

        // A later writer that grew a value type this build does not know.
        #[derive(Serialize)]
        enum NewerValue {
            Int(i32),
            Bool(bool),
            String(String),
            StringArray(Vec<String>),
            Long(i64),
        }

        let mut entries = BTreeMap::new();
        entries.insert("apkPath", NewerValue::String("/data/app/foo.apk".to_string()));
        entries.insert("certs", NewerValue::StringArray(vec!["aabb".to_string()]));
        entries.insert("cpuAffinityMask", NewerValue::Long(7));
        entries.insert("debugMode", NewerValue::Bool(false));
        entries.insert("payloadConfigPath", NewerValue::String("vm_config.json".to_string()));
        entries.insert("version", NewerValue::Int(2));

        let mut stream = b"VMCB".to_vec();
        stream.extend_from_slice(&2i32.to_le_bytes());
        bincode::DefaultOptions::new()
            .serialize_into(&mut stream, &entries)
            .unwrap();

        let err = VirtualMachineConfig::from_reader(stream.as_slice()).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaTooNew { found: 2, supported: 1 }));
    }

    #[test]
    fn newer_header_wins_over_undecodable_entries() {
        let mut stream = b"VMCB".to_vec();
        stream.extend_from_slice(&5i32.to_le_bytes());
        stream.extend_from_slice(&[0xff; 16]);

        let err = VirtualMachineConfig::from_reader(stream.as_slice()).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaTooNew { found: 5, .. }));
    }

    #[test]
    fn header_and_stored_version_must_agree() {
        let b = config(0).to_bundle();
        let mut buf = Vec::new();
        b.write_to_stream(0, &mut buf).unwrap();

        let err = VirtualMachineConfig::from_reader(buf.as_slice()).unwrap_err();
        assert!(matches!(err, ConfigError::Corrupt(_)));
    }

    #[test]
    fn temp_path_appends_to_the_file_name() {
        assert_eq!(temp_path(Path::new("/a/cfg.bin")).unwrap(), Path::new("/a/cfg.bin.tmp"));
        assert_eq!(temp_path(Path::new("/a/cfg.json")).unwrap(), Path::new("/a/cfg.json.tmp"));
        assert_eq!(temp_path(Path::new("/a/x.tmp")).unwrap(), Path::new("/a/x.tmp.tmp"));
        assert!(temp_path(Path::new("/")).is_err());
    }

    #[test]
    fn save_leaves_sibling_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let sibling = dir.path().join("cfg.tmp");
        fs::write(&sibling, b"keep").unwrap();

        config(0).save_to_file(dir.path().join("cfg.bin")).unwrap();

        assert_eq!(fs::read(&sibling).unwrap(), b"keep");
    }

    #[test]
    fn failed_save_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file.
        let target = dir.path().join("cfg.bin");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), b"x").unwrap();

        assert!(config(0).save_to_file(&target).is_err());
        assert!(!dir.path().join("cfg.bin.tmp").exists());
        assert!(target.is_dir());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm_config.bin");

        let c = config(512);
        c.save_to_file(&path).unwrap();
        assert!(!dir.path().join("vm_config.bin.tmp").exists());

        let loaded = VirtualMachineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VirtualMachineConfig::load_from_file(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
