/// Configuration for an engine run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of worker threads for basin/branch fan-out. Default: number of CPUs.
    pub worker_threads: usize,
    /// Optional cap on basin size during materialization. `None` = unbounded.
    /// When hit, the basin is truncated and flagged, not failed.
    pub basin_node_budget: Option<u64>,
    /// Maximum path length collected by `trace` point queries. Default: 1000.
    pub trace_max_steps: u32,
    /// Dominance ratio below which the dominant upstream chain stops. Default: 0.5.
    pub dominance_threshold: f64,
    /// Constant factor in the tunnel-importance score. Default: 10.0.
    pub tunnel_score_constant: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            basin_node_budget: None,
            trace_max_steps: 1000,
            dominance_threshold: 0.5,
            tunnel_score_constant: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert!(config.worker_threads >= 1);
        assert!(config.basin_node_budget.is_none());
        assert_eq!(config.trace_max_steps, 1000);
        assert!((config.dominance_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.tunnel_score_constant - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn custom_config() {
        let config = EngineConfig {
            worker_threads: 2,
            basin_node_budget: Some(1_000_000),
            ..EngineConfig::default()
        };
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.basin_node_budget, Some(1_000_000));
    }
}
