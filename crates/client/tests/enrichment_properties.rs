//! Enrichment output order under arbitrary completion orders

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use stratus_client::testing::{FakeResolver, guest, node};
use stratus_client::{Address, Enricher, ResourceKind};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_follows_input_for_any_delays_and_failures(
        guests in prop::collection::vec((0u64..250, any::<bool>(), any::<bool>()), 1..24),
        workers in 1usize..8,
    ) {
        let mut resolver = FakeResolver::new();
        let mut rows = vec![node("pve1")];
        let mut expected = vec![Address::Skipped];

        for (i, (delay_ms, running, fails)) in guests.iter().copied().enumerate() {
            let vmid = 100 + i as u32;
            let kind = if i % 2 == 0 { ResourceKind::Qemu } else { ResourceKind::Lxc };
            let status = if running { "running" } else { "stopped" };
            rows.push(guest(kind, vmid, "pve1", status));

            resolver = resolver.delay_for(vmid, Duration::from_millis(delay_ms));
            if fails {
                resolver = resolver.fail_for(vmid);
            }
            expected.push(match (running, fails) {
                (false, _) => Address::Skipped,
                (true, true) => Address::Unavailable,
                (true, false) => Address::Resolved(format!("10.0.0.{}", vmid % 256)),
            });
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let out = runtime.block_on(Enricher::new(workers).enrich(Arc::new(resolver), rows));

        prop_assert_eq!(out.iter().map(|r| r.resource.id.clone()).collect::<Vec<_>>(), ids);
        prop_assert_eq!(out.into_iter().map(|r| r.address).collect::<Vec<_>>(), expected);
    }
}
