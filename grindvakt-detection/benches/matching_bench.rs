use std::net::Ipv4Addr;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grindvakt_core::{Direction, MemoryRuleStore, Rule};
use grindvakt_detection::MatchingEngine;
use grindvakt_prevention::{EnforcementError, Enforcer};
use grindvakt_protocols::{PacketObservation, PacketSink};

struct NullEnforcer;

impl Enforcer for NullEnforcer {
    fn block(&self, _target: &str, _direction: Direction) -> Result<(), EnforcementError> {
        Ok(())
    }

    fn unblock(&self, _target: &str, _direction: Direction) -> Result<(), EnforcementError> {
        Ok(())
    }
}

fn engine(rule_count: u32) -> MatchingEngine {
    let rules = (0..rule_count).map(|i| {
        let addr = Ipv4Addr::from(0x0a00_0000 + i);
        Rule::ip_block(u64::from(i), addr.to_string(), Direction::Both)
    });
    MatchingEngine::new(rules, Arc::new(NullEnforcer), Arc::new(MemoryRuleStore::new()))
}

fn on_packet_benchmark(c: &mut Criterion) {
    let engine = engine(10_000);
    let miss = PacketObservation::new(Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2));
    c.bench_function("on_packet_no_match", |b| {
        b.iter(|| engine.on_packet(black_box(&miss)))
    });

    // After the first delivery every call is a de-duplicated hit.
    let hit = PacketObservation::new(Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::new(10, 0, 0, 8));
    engine.on_packet(&hit);
    c.bench_function("on_packet_already_enforced", |b| {
        b.iter(|| engine.on_packet(black_box(&hit)))
    });
}

criterion_group!(benches, on_packet_benchmark);
criterion_main!(benches);
