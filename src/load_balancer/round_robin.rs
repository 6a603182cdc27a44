// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use std::sync::{Arc, Mutex};

/// Health-aware round robin. The cursor moves one slot per inspected
/// backend and a single call inspects at most `backends.len()` slots.
pub struct RoundRobinBalancer {
    cursor: Mutex<usize>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(0),
        }
    }

    /// Index the next selection starts from.
    pub fn cursor(&self) -> usize {
        match self.cursor.lock() {
            Ok(cursor) => *cursor,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        // The whole scan holds the lock so concurrent callers never see the
        // same starting slot.
        let mut cursor = match self.cursor.lock() {
            Ok(cursor) => cursor,
            Err(poisoned) => poisoned.into_inner(),
        };
        let len = backends.len();
        *cursor %= len;

        for _ in 0..len {
            let backend = &backends[*cursor];
            *cursor = (*cursor + 1) % len;

            if backend.is_healthy() {
                return Some(backend.clone());
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(health: &[bool]) -> Vec<Arc<Backend>> {
        health
            .iter()
            .enumerate()
            .map(|(i, healthy)| Arc::new(Backend::new("127.0.0.1", 9000 + i as u16, *healthy)))
            .collect()
    }

    fn ports(selected: &[Option<Arc<Backend>>]) -> Vec<Option<u16>> {
        selected.iter().map(|b| b.as_ref().map(|b| b.port())).collect()
    }

    #[test]
    fn test_all_healthy_visits_in_order() {
        let backends = pool(&[true, true, true]);
        let balancer = RoundRobinBalancer::new();

        let picks: Vec<_> = (0..6).map(|_| balancer.select_backend(&backends)).collect();
        assert_eq!(
            ports(&picks),
            vec![Some(9000), Some(9001), Some(9002), Some(9000), Some(9001), Some(9002)]
        );
    }

    #[test]
    fn test_skips_unhealthy() {
        let backends = pool(&[true, false, true]);
        let balancer = RoundRobinBalancer::new();

        let picks: Vec<_> = (0..4).map(|_| balancer.select_backend(&backends)).collect();
        assert_eq!(
            ports(&picks),
            vec![Some(9000), Some(9002), Some(9000), Some(9002)]
        );
    }

    #[test]
    fn test_all_unhealthy_returns_none_and_wraps() {
        let backends = pool(&[false, false, false]);
        let balancer = RoundRobinBalancer::new();

        balancer.select_backend(&pool(&[true, true, true]));
        assert_eq!(balancer.cursor(), 1);

        assert!(balancer.select_backend(&backends).is_none());
        // N steps from 1 lands back on 1.
        assert_eq!(balancer.cursor(), 1);
    }

    #[test]
    fn test_flap_within_scan_window_does_not_skip_others() {
        let backends = pool(&[true, true, true]);
        let balancer = RoundRobinBalancer::new();

        assert_eq!(balancer.select_backend(&backends).map(|b| b.port()), Some(9000));
        backends[2].swap_health(false);
        backends[2].swap_health(true);
        assert_eq!(balancer.select_backend(&backends).map(|b| b.port()), Some(9001));
        assert_eq!(balancer.select_backend(&backends).map(|b| b.port()), Some(9002));
        assert_eq!(balancer.select_backend(&backends).map(|b| b.port()), Some(9000));
    }

    #[test]
    fn test_empty_pool() {
        let balancer = RoundRobinBalancer::new();
        assert!(balancer.select_backend(&[]).is_none());
        assert_eq!(balancer.name(), "round_robin");
    }

    proptest! {
        #[test]
        fn prop_all_healthy_each_backend_once_per_round(n in 1usize..12, warmup in 0usize..24) {
            let backends = pool(&vec![true; n]);
            let balancer = RoundRobinBalancer::new();
            for _ in 0..warmup {
                balancer.select_backend(&backends);
            }

            let start = balancer.cursor();
            let round: Vec<u16> = (0..n)
                .map(|_| balancer.select_backend(&backends).unwrap().port())
                .collect();
            let expected: Vec<u16> = (0..n).map(|i| 9000 + ((start + i) % n) as u16).collect();
            prop_assert_eq!(round, expected);
        }

        #[test]
        fn prop_healthy_backends_share_turns(health in proptest::collection::vec(any::<bool>(), 1..12)) {
            let backends = pool(&health);
            let balancer = RoundRobinBalancer::new();
            let healthy: Vec<u16> = backends
                .iter()
                .filter(|b| b.is_healthy())
                .map(|b| b.port())
                .collect();

            let picks: Vec<Option<u16>> = (0..healthy.len().max(1))
                .map(|_| balancer.select_backend(&backends).map(|b| b.port()))
                .collect();

            if healthy.is_empty() {
                prop_assert_eq!(picks, vec![None]);
                prop_assert_eq!(balancer.cursor(), 0);
            } else {
                let mut seen: Vec<u16> = picks.into_iter().map(|p| p.unwrap()).collect();
                seen.sort_unstable();
                prop_assert_eq!(seen, healthy);
            }
        }

        #[test]
        fn prop_cursor_stays_in_range(health in proptest::collection::vec(any::<bool>(), 1..12), calls in 0usize..40) {
            let backends = pool(&health);
            let balancer = RoundRobinBalancer::new();
            for _ in 0..calls {
                balancer.select_backend(&backends);
                prop_assert!(balancer.cursor() < backends.len());
            }
        }
    }
}
