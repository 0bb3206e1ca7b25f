//! Process-tree resource sampling.

use std::collections::HashSet;
use tracing::trace;

use crate::domain::models::ResourceSample;
use crate::domain::ports::ProcessProbe;

/// Sum CPU and memory over `pid` and all of its descendants.
///
/// Lookups that fail for a single id are skipped. Returns `None` only when no
/// id in the tree could be read, which callers treat as a failed probe rather
/// than a zero reading. Expects the probe to have been refreshed.
pub fn sample_process_tree(probe: &dyn ProcessProbe, pid: u32) -> Option<ResourceSample> {
    let mut seen = HashSet::from([pid]);
    let mut pending = vec![pid];
    let mut total = ResourceSample::default();
    let mut readings = 0usize;

    while let Some(current) = pending.pop() {
        match probe.process_usage(current) {
            Ok(sample) => {
                total += sample;
                readings += 1;
            }
            Err(e) => trace!(pid = current, error = %e, "skipping process in resource sample"),
        }

        pending.extend(
            probe
                .child_pids(current)
                .into_iter()
                .filter(|child| seen.insert(*child)),
        );
    }

    (readings > 0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ProbeError;
    use crate::domain::models::HostStats;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TableProbe {
        usage: HashMap<u32, ResourceSample>,
        children: HashMap<u32, Vec<u32>>,
    }

    impl ProcessProbe for TableProbe {
        fn refresh(&self) {}

        fn process_usage(&self, pid: u32) -> Result<ResourceSample, ProbeError> {
            self.usage.get(&pid).copied().ok_or(ProbeError::NotFound(pid))
        }

        fn child_pids(&self, pid: u32) -> Vec<u32> {
            self.children.get(&pid).cloned().unwrap_or_default()
        }

        fn host_stats(&self) -> Result<HostStats, ProbeError> {
            Ok(HostStats::default())
        }
    }

    fn sample(cpu: f64, mem: f64) -> ResourceSample {
        ResourceSample {
            cpu_percent: cpu,
            memory_mb: mem,
        }
    }

    #[test]
    fn test_sums_whole_tree() {
        let probe = TableProbe {
            usage: HashMap::from([
                (10, sample(1.0, 10.0)),
                (11, sample(2.0, 20.0)),
                (12, sample(4.0, 40.0)),
            ]),
            children: HashMap::from([(10, vec![11]), (11, vec![12])]),
        };

        assert_eq!(sample_process_tree(&probe, 10), Some(sample(7.0, 70.0)));
    }

    #[test]
    fn test_failed_child_lookup_is_excluded() {
        let probe = TableProbe {
            usage: HashMap::from([(10, sample(1.0, 10.0))]),
            children: HashMap::from([(10, vec![11, 12])]),
        };

        assert_eq!(sample_process_tree(&probe, 10), Some(sample(1.0, 10.0)));
    }

    #[test]
    fn test_unreadable_tree_is_none() {
        let probe = TableProbe::default();
        assert_eq!(sample_process_tree(&probe, 42), None);
    }

    #[test]
    fn test_child_cycles_terminate() {
        let probe = TableProbe {
            usage: HashMap::from([(1, sample(1.0, 1.0)), (2, sample(1.0, 1.0))]),
            children: HashMap::from([(1, vec![2]), (2, vec![1])]),
        };

        assert_eq!(sample_process_tree(&probe, 1), Some(sample(2.0, 2.0)));
    }
}
