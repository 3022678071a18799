use std::ops::RangeInclusive;

use crate::{
    config::{ConfigError, ConfigMap},
    consts::{PORT_STATSD, SNAPLEN},
};

/// Read-only snapshot of the capture settings consulted while encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Base number of payload bytes kept for data buffers.
    pub snaplen: u32,
    /// Enable the protocol aware snaplen classifier.
    pub dynamic_snaplen: bool,
    /// Ports whose traffic is captured with the largest snaplen.
    pub fullcapture_ports: Option<RangeInclusive<u16>>,
    /// Port of the metrics daemon.
    pub statsd_port: u16,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            snaplen: SNAPLEN,
            dynamic_snaplen: false,
            fullcapture_ports: None,
            statsd_port: PORT_STATSD,
        }
    }
}

impl CaptureSettings {
    pub fn is_fullcapture_port(&self, port: u16) -> bool {
        self.fullcapture_ports
            .as_ref()
            .is_some_and(|range| range.contains(&port))
    }
}

impl TryFrom<&ConfigMap> for CaptureSettings {
    type Error = ConfigError;

    fn try_from(config: &ConfigMap) -> Result<Self, Self::Error> {
        let start: u16 = config.with_default("fullcapture_port_range_start", 0)?;
        let end: u16 = config.with_default("fullcapture_port_range_end", 0)?;
        // An end port of 0 disables full capture.
        let fullcapture_ports = match (start, end) {
            (_, 0) => None,
            (start, end) if start <= end => Some(start..=end),
            (start, end) => {
                return Err(ConfigError::InvalidValue {
                    field: "fullcapture_port_range_start".to_string(),
                    value: start.to_string(),
                    err: format!("greater than range end {end}"),
                });
            }
        };
        Ok(Self {
            snaplen: config.with_default("snaplen", SNAPLEN)?,
            dynamic_snaplen: config.with_default("dynamic_snaplen", false)?,
            fullcapture_ports,
            statsd_port: config.with_default("statsd_port", PORT_STATSD)?,
        })
    }
}
