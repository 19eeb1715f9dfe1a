//! The run plan: which N values, which cycles, which outputs.

use std::path::PathBuf;

use basin_common::{BasinError, BasinResult};
use basin_sink::OutputFormat;

/// Which cycles get basin/branch materialization at each N.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleSelection {
    /// Layer tables only; no per-cycle artifacts.
    None,
    /// The k largest basins at each N (size descending, id ascending).
    TopBySize(usize),
    /// Explicit cycle identity page ids. Ids that do not name a cycle at a
    /// given N are skipped with a warning.
    Pages(Vec<i64>),
}

#[derive(Clone, Debug)]
pub struct RunPlan {
    pub n_set: Vec<u32>,
    pub selection: CycleSelection,
    /// Also emit the trunkiness decomposition for every entry of each
    /// selected cycle.
    pub decompose_branches: bool,
    pub out_dir: PathBuf,
    pub format: OutputFormat,
    /// Skip N values whose artifacts already exist and pass a schema check.
    pub resume: bool,
}

impl RunPlan {
    pub fn validate(&self) -> BasinResult<()> {
        if self.n_set.is_empty() {
            return Err(BasinError::Internal("plan has an empty N set".into()));
        }
        if self.n_set.iter().any(|&n| n < 1) {
            return Err(BasinError::Internal("N values must be >= 1".into()));
        }
        if let CycleSelection::TopBySize(0) = self.selection {
            return Err(BasinError::Internal(
                "top-by-size selection needs k >= 1".into(),
            ));
        }
        Ok(())
    }

    /// N values, ascending and deduplicated.
    pub fn sorted_n_set(&self) -> Vec<u32> {
        let mut ns = self.n_set.clone();
        ns.sort_unstable();
        ns.dedup();
        ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> RunPlan {
        RunPlan {
            n_set: vec![3, 2, 3],
            selection: CycleSelection::TopBySize(4),
            decompose_branches: true,
            out_dir: PathBuf::from("/tmp/out"),
            format: OutputFormat::Parquet,
            resume: false,
        }
    }

    #[test]
    fn valid_plan() {
        assert!(plan().validate().is_ok());
    }

    #[test]
    fn sorted_n_set_dedups() {
        assert_eq!(plan().sorted_n_set(), vec![2, 3]);
    }

    #[test]
    fn empty_n_set_rejected() {
        let mut p = plan();
        p.n_set.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn zero_n_rejected() {
        let mut p = plan();
        p.n_set.push(0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let mut p = plan();
        p.selection = CycleSelection::TopBySize(0);
        assert!(p.validate().is_err());
    }
}
