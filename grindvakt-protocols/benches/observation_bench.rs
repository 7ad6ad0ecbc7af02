#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};

use grindvakt_protocols::{observe, LinkType};

// Ethernet II frame carrying a minimal IPv4/TCP header.
const IPV4_FRAME: &[u8] = &[
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Destination MAC
    0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, // Source MAC
    0x08, 0x00, // Ethertype IPv4
    0x45, 0x00, 0x00, 0x28, // Version/IHL, DSCP, Total length
    0x1c, 0x46, 0x40, 0x00, // Identification, Flags
    0x40, 0x06, 0x00, 0x00, // TTL, Protocol (TCP), Checksum
    0xcb, 0x00, 0x71, 0x05, // Source 203.0.113.5
    0x0a, 0x00, 0x00, 0x01, // Destination 10.0.0.1
];

// Ethernet II frame carrying an IPv6 header (2001:db8::1 -> 2001:db8::2).
const IPV6_FRAME: &[u8] = &[
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0x86, 0xdd, 0x60,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x11, 0x40, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
];

fn benchmark_ipv4_observation(c: &mut Criterion) {
    c.bench_function("ipv4_observation", |b| {
        b.iter(|| {
            black_box(observe(LinkType::Ethernet, black_box(IPV4_FRAME))).unwrap();
        })
    });
}

fn benchmark_ipv6_observation(c: &mut Criterion) {
    c.bench_function("ipv6_observation", |b| {
        b.iter(|| {
            black_box(observe(LinkType::Ethernet, black_box(IPV6_FRAME))).unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_ipv4_observation,
    benchmark_ipv6_observation
);
criterion_main!(benches);
