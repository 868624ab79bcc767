//! Building a tee from a configuration node.

use crate::transport::{Direction, Transport};
use crate::{ConfigNode, FileSink, PcmError, TeeConfig, TeeStream};

/// Opens the stream a tee configuration names.
///
/// Implemented for closures of the shape
/// `FnMut(&str, Direction, bool) -> Result<T, PcmError>`.
pub trait TransportOpener {
    /// The stream type produced.
    type Transport: Transport;

    /// Opens the stream called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PcmError::NotFound`] for unknown names, or whatever the
    /// backend reports.
    fn open(
        &mut self,
        name: &str,
        direction: Direction,
        nonblocking: bool,
    ) -> Result<Self::Transport, PcmError>;
}

impl<F, T> TransportOpener for F
where
    F: FnMut(&str, Direction, bool) -> Result<T, PcmError>,
    T: Transport,
{
    type Transport = T;

    fn open(
        &mut self,
        name: &str,
        direction: Direction,
        nonblocking: bool,
    ) -> Result<T, PcmError> {
        self(name, direction, nonblocking)
    }
}

/// Builds a tee from `node`.
///
/// The stream named by `sname` is opened through `opener` and owned by the
/// tee. If the sink cannot be opened the stream is closed again before the
/// error is returned.
///
/// # Errors
///
/// Returns [`PcmError::Config`] for a malformed node, the opener's error if
/// the stream cannot be opened, and [`PcmError::Sink`] if the sink cannot.
///
/// # Example
///
/// ```
/// use pcm_tee::{
///     open_from_config, ConfigNode, Direction, MemoryTransport, MemoryTransportConfig,
///     PcmError, Transport,
/// };
///
/// let dir = tempfile::tempdir().unwrap();
/// let node: ConfigNode = serde_json::from_value(serde_json::json!({
///     "type": "file",
///     "sname": "mem",
///     "file": dir.path().join("out.raw").to_str().unwrap(),
/// }))
/// .unwrap();
///
/// let mut opener = |name: &str, direction: Direction, _nonblocking: bool| -> Result<_, PcmError> {
///     MemoryTransport::from_config(name, direction, &MemoryTransportConfig::default())
/// };
/// let tee = open_from_config(&node, Direction::Playback, false, &mut opener).unwrap();
/// assert_eq!(tee.name(), "mem");
/// ```
pub fn open_from_config<O: TransportOpener>(
    node: &ConfigNode,
    direction: Direction,
    nonblocking: bool,
    opener: &mut O,
) -> Result<TeeStream<O::Transport>, PcmError> {
    let config = TeeConfig::from_node(node)?;
    let slave = opener.open(&config.slave, direction, nonblocking)?;

    match FileSink::open(&config.target) {
        Ok(sink) => Ok(TeeStream::new(slave, sink, true)),
        Err(err) => {
            tracing::debug!(slave = %config.slave, error = %err, "sink open failed, closing slave");
            if let Err(close_err) = <O::Transport as Transport>::close(Box::new(slave)) {
                tracing::warn!(error = %close_err, "slave close failed");
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, MemoryTransportConfig};
    use crate::ConfigError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn node(json: serde_json::Value) -> ConfigNode {
        serde_json::from_value(json).unwrap()
    }

    /// Opener that only knows "mem" and remembers the last close probe.
    struct Registry {
        probe: Option<Arc<AtomicBool>>,
        opened: Vec<(String, Direction, bool)>,
    }

    impl TransportOpener for Registry {
        type Transport = MemoryTransport;

        fn open(
            &mut self,
            name: &str,
            direction: Direction,
            nonblocking: bool,
        ) -> Result<MemoryTransport, PcmError> {
            if name != "mem" {
                return Err(PcmError::NotFound { name: name.into() });
            }
            let mut pcm =
                MemoryTransport::from_config(name, direction, &MemoryTransportConfig::default())?;
            pcm.set_nonblocking(nonblocking)?;
            self.probe = Some(pcm.close_probe());
            self.opened.push((name.into(), direction, nonblocking));
            Ok(pcm)
        }
    }

    fn registry() -> Registry {
        Registry {
            probe: None,
            opened: Vec::new(),
        }
    }

    #[test]
    fn test_opens_slave_and_sink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tee.raw");
        let mut opener = registry();

        let tee = open_from_config(
            &node(serde_json::json!({"sname": "mem", "file": path.to_str().unwrap()})),
            Direction::Capture,
            true,
            &mut opener,
        )
        .unwrap();

        assert_eq!(opener.opened, vec![("mem".into(), Direction::Capture, true)]);
        assert_eq!(tee.direction(), Direction::Capture);
        assert!(tee.slave().is_nonblocking());
        assert!(path.exists());

        // The tee owns the slave.
        assert!(tee.close().unwrap().is_none());
        assert!(opener.probe.unwrap().load(Ordering::SeqCst));
    }

    #[test]
    fn test_unknown_slave() {
        let mut opener = registry();
        let err = open_from_config(
            &node(serde_json::json!({"sname": "hw:9", "file": "/tmp/never.raw"})),
            Direction::Playback,
            false,
            &mut opener,
        )
        .unwrap_err();
        assert!(matches!(err, PcmError::NotFound { ref name } if name == "hw:9"));
    }

    #[test]
    fn test_bad_config_opens_nothing() {
        let mut opener = registry();
        let err = open_from_config(
            &node(serde_json::json!({"sname": "mem"})),
            Direction::Playback,
            false,
            &mut opener,
        )
        .unwrap_err();
        assert!(matches!(err, PcmError::Config(ConfigError::MissingFile)));
        assert!(opener.opened.is_empty());
    }

    #[test]
    fn test_sink_failure_closes_slave() {
        let mut opener = registry();
        let err = open_from_config(
            &node(serde_json::json!({
                "sname": "mem",
                "file": "/nonexistent/directory/tee.raw",
            })),
            Direction::Playback,
            false,
            &mut opener,
        )
        .unwrap_err();

        assert!(err.is_sink_failure());
        assert!(opener.probe.unwrap().load(Ordering::SeqCst));
    }

    #[test]
    fn test_closure_opener() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("closure.raw");
        let mut calls = 0;
        let mut opener = |name: &str, direction: Direction, _nonblocking: bool| {
            calls += 1;
            MemoryTransport::from_config(name, direction, &MemoryTransportConfig::default())
        };

        let tee = open_from_config(
            &node(serde_json::json!({"sname": "mem", "file": path.to_str().unwrap()})),
            Direction::Playback,
            false,
            &mut opener,
        )
        .unwrap();
        drop(tee);
        assert_eq!(calls, 1);
    }
}
