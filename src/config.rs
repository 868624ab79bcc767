//! Declarative tee configuration.
//!
//! A tee is described by a small key/value tree. The tree is plain serde
//! data, so it can come from JSON, TOML or any other serde format:
//!
//! ```
//! use pcm_tee::{ConfigNode, ConfigValue, SinkTarget, TeeConfig};
//!
//! let mut node = ConfigNode::new();
//! node.insert("type".into(), ConfigValue::String("file".into()));
//! node.insert("sname".into(), ConfigValue::String("hw:0".into()));
//! node.insert("file".into(), ConfigValue::String("/tmp/out.raw".into()));
//!
//! let config = TeeConfig::from_node(&node).unwrap();
//! assert_eq!(config.slave, "hw:0");
//! assert_eq!(config.target, SinkTarget::Path("/tmp/out.raw".into()));
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::{ConfigError, SinkTarget};

/// Keys accepted and ignored.
const IGNORED_KEYS: &[&str] = &["comment", "type", "stream"];

/// One value in a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// An integer.
    Integer(i64),
    /// A string.
    String(String),
    /// A nested node.
    Compound(ConfigNode),
}

impl ConfigValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Compound(_) => "compound",
        }
    }
}

/// A configuration node: keys mapped to values.
pub type ConfigNode = BTreeMap<String, ConfigValue>;

/// What a configuration node asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeeConfig {
    /// Name of the stream to wrap.
    pub slave: String,
    /// Where the durable copy goes.
    pub target: SinkTarget,
}

impl TeeConfig {
    /// Reads a tee description from `node`.
    ///
    /// `sname` names the wrapped stream and is required. `file` is either a
    /// path (string) or an open descriptor (non-negative integer).
    /// `comment`, `type` and `stream` are ignored. Any other key is rejected.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found while walking the node.
    pub fn from_node(node: &ConfigNode) -> Result<Self, ConfigError> {
        let mut slave = None;
        let mut path = None;
        let mut descriptor = None;

        for (key, value) in node {
            match (key.as_str(), value) {
                (k, _) if IGNORED_KEYS.contains(&k) => {}
                ("sname", ConfigValue::String(name)) => slave = Some(name.clone()),
                ("sname", other) => {
                    tracing::debug!(key = %key, kind = other.kind(), "rejecting slave name");
                    return Err(ConfigError::InvalidValue {
                        key: key.clone(),
                        expected: "string",
                    });
                }
                ("file", ConfigValue::String(name)) => path = Some(PathBuf::from(name)),
                ("file", ConfigValue::Integer(fd)) => descriptor = Some(*fd),
                ("file", other) => {
                    tracing::debug!(key = %key, kind = other.kind(), "rejecting file value");
                    return Err(ConfigError::InvalidValue {
                        key: key.clone(),
                        expected: "string or integer",
                    });
                }
                _ => return Err(ConfigError::UnknownKey { key: key.clone() }),
            }
        }

        let slave = slave.ok_or(ConfigError::MissingSlave)?;
        let target = match (path, descriptor) {
            (Some(path), _) => SinkTarget::Path(path),
            (None, Some(fd)) if fd >= 0 => {
                let fd = i32::try_from(fd).map_err(|_| ConfigError::InvalidValue {
                    key: "file".into(),
                    expected: "descriptor number",
                })?;
                SinkTarget::Descriptor(fd)
            }
            _ => return Err(ConfigError::MissingFile),
        };

        tracing::debug!(slave = %slave, target = %target, "tee configuration parsed");
        Ok(Self { slave, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(json: &str) -> ConfigNode {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_path_target() {
        let config =
            TeeConfig::from_node(&node(r#"{"sname": "hw:0", "file": "/tmp/a.raw"}"#)).unwrap();
        assert_eq!(config.slave, "hw:0");
        assert_eq!(config.target, SinkTarget::Path("/tmp/a.raw".into()));
    }

    #[test]
    fn test_descriptor_target() {
        let config = TeeConfig::from_node(&node(r#"{"sname": "hw:0", "file": 7}"#)).unwrap();
        assert_eq!(config.target, SinkTarget::Descriptor(7));
    }

    #[test]
    fn test_ignored_keys() {
        let config = TeeConfig::from_node(&node(
            r#"{"type": "file", "stream": "playback", "comment": {"note": "x"},
                "sname": "default", "file": 3}"#,
        ))
        .unwrap();
        assert_eq!(config.slave, "default");
    }

    #[test]
    fn test_unknown_key() {
        let err =
            TeeConfig::from_node(&node(r#"{"sname": "hw:0", "file": 3, "format": "raw"}"#))
                .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownKey {
                key: "format".into()
            }
        );
        assert_eq!(err.to_string(), "unknown field format");
    }

    #[test]
    fn test_missing_slave() {
        let err = TeeConfig::from_node(&node(r#"{"file": "/tmp/a.raw"}"#)).unwrap_err();
        assert_eq!(err, ConfigError::MissingSlave);
    }

    #[test]
    fn test_missing_or_negative_file() {
        assert_eq!(
            TeeConfig::from_node(&node(r#"{"sname": "hw:0"}"#)).unwrap_err(),
            ConfigError::MissingFile
        );
        assert_eq!(
            TeeConfig::from_node(&node(r#"{"sname": "hw:0", "file": -1}"#)).unwrap_err(),
            ConfigError::MissingFile
        );
    }

    #[test]
    fn test_wrong_value_kinds() {
        let err = TeeConfig::from_node(&node(r#"{"sname": 4, "file": 3}"#)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "sname"));

        let err =
            TeeConfig::from_node(&node(r#"{"sname": "hw:0", "file": {"path": "x"}}"#)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "file"));
    }
}
