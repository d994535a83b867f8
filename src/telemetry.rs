//! Metrics reporting behind a small trait so the scanner does not care where
//! counters end up.

use std::net::UdpSocket;
use std::panic::RefUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use cadence::prelude::*;
use cadence::{BufferedUdpMetricSink, MetricSink, QueuingMetricSink, StatsdClient};
use log::{debug, info};

use crate::settings::TelemetryConfig;

pub type Tags<'a> = &'a [(&'a str, &'a str)];

pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn increment(&self, name: &str, tags: Tags<'_>);
    fn gauge(&self, name: &str, value: f64, tags: Tags<'_>);
    /// Push out anything buffered. Called once at shutdown.
    fn flush(&self) {}
}

/// A sink that drops everything, used when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

impl MetricsSink for NopSink {
    fn increment(&self, _name: &str, _tags: Tags<'_>) {}
    fn gauge(&self, _name: &str, _value: f64, _tags: Tags<'_>) {}
}

/// DogStatsD metrics through a cadence client.
pub struct StatsdSink {
    client: StatsdClient,
}

impl std::fmt::Debug for StatsdSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdSink").finish_non_exhaustive()
    }
}

impl StatsdSink {
    /// Buffered UDP sink drained by a background queue, so metric calls never
    /// block a scan.
    pub fn connect(host: &str, port: u16, prefix: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let udp_sink = BufferedUdpMetricSink::from((host, port), socket)?;
        info!("-- sending metrics to {}:{}", host, port);
        Ok(Self::from_sink(prefix, QueuingMetricSink::from(udp_sink)))
    }

    pub fn from_sink<T>(prefix: &str, sink: T) -> Self
    where
        T: MetricSink + Sync + Send + RefUnwindSafe + 'static,
    {
        let client = StatsdClient::builder(prefix, sink)
            .with_error_handler(|e| debug!("Dropped metric: {}", e))
            .build();
        StatsdSink { client }
    }
}

impl MetricsSink for StatsdSink {
    fn increment(&self, name: &str, tags: Tags<'_>) {
        let mut builder = self.client.count_with_tags(name, 1i64);
        for &(key, value) in tags {
            builder = builder.with_tag(key, value);
        }
        builder.send();
    }

    fn gauge(&self, name: &str, value: f64, tags: Tags<'_>) {
        let mut builder = self.client.gauge_with_tags(name, value);
        for &(key, tag_value) in tags {
            builder = builder.with_tag(key, tag_value);
        }
        builder.send();
    }

    fn flush(&self) {
        if let Err(e) = self.client.flush() {
            debug!("Cannot flush metrics: {}", e);
        }
    }
}

pub fn build_sink(config: &TelemetryConfig) -> Result<Arc<dyn MetricsSink>> {
    if !config.enabled {
        return Ok(Arc::new(NopSink));
    }
    Ok(Arc::new(StatsdSink::connect(&config.host, config.port, &config.prefix)?))
}

#[cfg(test)]
pub use recording::{RecordedMetric, RecordingSink};
