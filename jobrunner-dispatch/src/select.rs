use std::collections::HashSet;

use jobrunner_core::{LoopConfig, QueueId, ReadyMap};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::priority::Priority;

const WILDCARD: &str = "*";

/// Pick a (type, tenant) for one free slot, or nothing if the loop's
/// filters leave no ready queue. Sampling is uniform over the flattened
/// (type, tenant) tuples so tenants with few types are not starved, and
/// peer runners spread load without coordinating.
pub fn select_queue(
    cfg: &LoopConfig,
    priority: Priority,
    ready: &ReadyMap,
    rng: &mut impl Rng,
) -> Option<QueueId> {
    let mut include: Vec<&str> = cfg.include.iter().map(String::as_str).collect();
    let mut exclude: HashSet<&str> = cfg.exclude.iter().map(String::as_str).collect();

    // At high priority the low-priority types sit out; at low priority
    // they are the whole point of the turn.
    match priority {
        Priority::High => exclude.extend(cfg.low_priority.iter().map(String::as_str)),
        Priority::Low => include.extend(cfg.low_priority.iter().map(String::as_str)),
    }

    if include.contains(&WILDCARD) {
        include.extend(ready.types());
    }

    let mut candidates: Vec<QueueId> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for job_type in include {
        if job_type == WILDCARD || exclude.contains(job_type) || !seen.insert(job_type) {
            continue;
        }
        for tenant in ready.tenants_of(job_type) {
            candidates.push(QueueId::new(job_type, tenant));
        }
    }

    // Hash-map iteration order would otherwise leak into the draw
    candidates.sort_unstable_by(|a, b| {
        (&a.job_type, &a.tenant).cmp(&(&b.job_type, &b.tenant))
    });

    candidates.choose(rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ready(entries: &[(&str, &str)]) -> ReadyMap {
        let mut map = ReadyMap::default();
        for (job_type, tenant) in entries {
            map.insert(&QueueId::new(*job_type, *tenant), 100);
        }
        map
    }

    fn cfg(include: &[&str], exclude: &[&str], low_priority: &[&str]) -> LoopConfig {
        LoopConfig {
            runners: 1,
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            low_priority: low_priority.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn wildcard_expands_and_filters_apply() {
        // include={*}, exclude={z}, low-priority={y}, at high priority:
        // only "a" survives, and t1 is its lone tenant.
        let cfg = cfg(&["*"], &["z"], &["y"]);
        let ready = ready(&[("a", "t1"), ("y", "t1"), ("z", "t1")]);
        let mut rng = StdRng::seed_from_u64(0);

        let picked = select_queue(&cfg, Priority::High, &ready, &mut rng).unwrap();
        assert_eq!(picked, QueueId::new("a", "t1"));
    }

    #[test]
    fn low_priority_types_join_at_low_priority() {
        let cfg = cfg(&[], &[], &["y"]);
        let ready = ready(&[("a", "t1"), ("y", "t1")]);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(select_queue(&cfg, Priority::High, &ready, &mut rng).is_none());
        let picked = select_queue(&cfg, Priority::Low, &ready, &mut rng).unwrap();
        assert_eq!(picked, QueueId::new("y", "t1"));
    }

    #[test]
    fn no_candidates_means_none() {
        let empty_ready = cfg(&["a"], &[], &[]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_queue(&empty_ready, Priority::High, &ReadyMap::default(), &mut rng).is_none());

        // Present type, but excluded
        let excluded = cfg(&["a"], &["a"], &[]);
        let ready = ready(&[("a", "t1")]);
        assert!(select_queue(&excluded, Priority::High, &ready, &mut rng).is_none());
    }

    #[test]
    fn same_seed_same_pick() {
        let cfg = cfg(&["*"], &[], &[]);
        let ready = ready(&[
            ("a", "t1"),
            ("a", "t2"),
            ("b", "t1"),
            ("b", "t3"),
            ("c", "t9"),
        ]);

        let first = select_queue(&cfg, Priority::High, &ready, &mut StdRng::seed_from_u64(42));
        let second = select_queue(&cfg, Priority::High, &ready, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn every_tuple_is_reachable() {
        let cfg = cfg(&["*"], &[], &[]);
        let ready = ready(&[("a", "t1"), ("a", "t2"), ("b", "t1")]);

        let mut seen = HashSet::new();
        for seed in 0..200 {
            let picked =
                select_queue(&cfg, Priority::High, &ready, &mut StdRng::seed_from_u64(seed))
                    .unwrap();
            seen.insert(picked.encode());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn duplicate_includes_do_not_skew_the_draw() {
        let cfg = cfg(&["a", "a", "a", "b"], &[], &[]);
        let ready = ready(&[("a", "t1"), ("b", "t1")]);

        let mut a_picks = 0;
        for seed in 0..400 {
            let picked =
                select_queue(&cfg, Priority::High, &ready, &mut StdRng::seed_from_u64(seed))
                    .unwrap();
            if picked.job_type == "a" {
                a_picks += 1;
            }
        }
        // Two candidates; a triple-listed "a" should still land near half
        assert!((120..=280).contains(&a_picks), "a picked {a_picks}/400");
    }
}
