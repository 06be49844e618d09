//! Prometheus metrics for the connection pool

use prometheus::{IntCounter, IntGauge, Registry};

/// Per-pool metrics instance
pub struct PoolMetrics {
    pub registry: Registry,

    // Lifecycle counters
    pub connections_created: IntCounter,
    pub connections_reused: IntCounter,
    pub connections_released: IntCounter,
    pub connections_closed: IntCounter,
    pub close_errors: IntCounter,
    pub connect_errors: IntCounter,
    pub refused_releases: IntCounter,
    pub discarded: IntCounter,
    pub exhausted: IntCounter,

    // Occupancy
    pub idle_connections: IntGauge,
    pub live_connections: IntGauge,
}

impl PoolMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_created = IntCounter::new(
            "mcpool_connections_created_total",
            "Connections opened because no idle connection matched",
        )
        .unwrap();
        let connections_reused = IntCounter::new(
            "mcpool_connections_reused_total",
            "Acquires served from the idle list",
        )
        .unwrap();
        let connections_released = IntCounter::new(
            "mcpool_connections_released_total",
            "Connections returned to the idle list",
        )
        .unwrap();
        let connections_closed =
            IntCounter::new("mcpool_connections_closed_total", "Connections shut down").unwrap();
        let close_errors = IntCounter::new(
            "mcpool_close_errors_total",
            "Connections that failed to shut down cleanly",
        )
        .unwrap();
        let connect_errors =
            IntCounter::new("mcpool_connect_errors_total", "Failed connection attempts").unwrap();
        let refused_releases = IntCounter::new(
            "mcpool_refused_releases_total",
            "Releases of a connection already in the idle list",
        )
        .unwrap();
        let discarded = IntCounter::new(
            "mcpool_connections_discarded_total",
            "Connections retired on release because they were no longer usable",
        )
        .unwrap();
        let exhausted = IntCounter::new(
            "mcpool_exhausted_total",
            "Acquires rejected because max_total was reached",
        )
        .unwrap();

        let idle_connections =
            IntGauge::new("mcpool_idle_connections", "Connections waiting in the pool").unwrap();
        let live_connections = IntGauge::new(
            "mcpool_live_connections",
            "Connections open (idle + bound)",
        )
        .unwrap();

        // Register all metrics
        registry
            .register(Box::new(connections_created.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_reused.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_released.clone()))
            .unwrap();
        registry
            .register(Box::new(connections_closed.clone()))
            .unwrap();
        registry.register(Box::new(close_errors.clone())).unwrap();
        registry.register(Box::new(connect_errors.clone())).unwrap();
        registry
            .register(Box::new(refused_releases.clone()))
            .unwrap();
        registry.register(Box::new(discarded.clone())).unwrap();
        registry.register(Box::new(exhausted.clone())).unwrap();
        registry
            .register(Box::new(idle_connections.clone()))
            .unwrap();
        registry
            .register(Box::new(live_connections.clone()))
            .unwrap();

        Self {
            registry,
            connections_created,
            connections_reused,
            connections_released,
            connections_closed,
            close_errors,
            connect_errors,
            refused_releases,
            discarded,
            exhausted,
            idle_connections,
            live_connections,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PoolMetrics::new();
        metrics.connections_created.inc();
        metrics.idle_connections.set(3);

        let output = metrics.gather();
        assert!(output.contains("mcpool_connections_created_total 1"));
        assert!(output.contains("mcpool_idle_connections 3"));
    }

    #[test]
    fn test_independent_registries() {
        let a = PoolMetrics::new();
        let b = PoolMetrics::new();
        a.connections_closed.inc();
        assert_eq!(a.connections_closed.get(), 1);
        assert_eq!(b.connections_closed.get(), 0);
    }
}
