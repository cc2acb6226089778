//! Resolve path benchmarks
//!
//! Measures the lookup-and-copy fast path against resolved entries and the
//! cost of queueing behind an incomplete entry.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sonic_ndcache::{
    AddressFamily, CacheTable, DomainConfig, DomainRegistry, Interface, LinkAddr, NdDomain,
    NdParams, NdState, Packet, PacketList, ReclaimedEntry, RouteKind,
};
use std::hint::black_box;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

/// Domain that discards everything
struct NullDomain;

impl NdDomain for NullDomain {
    fn send_probe(&self, _: &Interface, _: &IpAddr, _: Option<LinkAddr>, _: Option<IpAddr>) {}
    fn notify_missed(&self, _: &Interface, _: &IpAddr, _: NdState, _: Option<PacketList>) {}
    fn output(&self, _: &Interface, _: &LinkAddr, _: PacketList) {}
    fn reclaim(&self, _: &Interface, _: ReclaimedEntry, _: bool) {}
}

fn neighbor(index: usize) -> IpAddr {
    IpAddr::V6(Ipv6Addr::new(
        0x2001,
        0xdb8,
        0,
        0,
        0,
        0,
        (index >> 16) as u16,
        index as u16,
    ))
}

fn table(params: NdParams) -> Arc<CacheTable> {
    let mut registry = DomainRegistry::new();
    let domain = registry.register_domain(
        AddressFamily::Inet6,
        DomainConfig::new(params, Arc::new(NullDomain)),
    );
    CacheTable::new(domain, Interface::new(1, "Ethernet0")).expect("table")
}

fn bench_fast_path(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = runtime.enter();

    let mut group = c.benchmark_group("resolve_fast_path");
    for size in [16usize, 1024, 16384] {
        let table = table(NdParams::default());
        for index in 0..size {
            let mac = LinkAddr::ethernet([0x02, 0, 0, (index >> 16) as u8, (index >> 8) as u8, index as u8]);
            table.add_static(neighbor(index), mac);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut index = 0;
            let mut buf = [0u8; 6];
            b.iter(|| {
                index = (index + 1) % size;
                let result = table.resolve_into(
                    neighbor(index),
                    Packet::new(vec![0u8; 64]),
                    RouteKind::Direct,
                    &mut buf,
                );
                black_box(result.is_ok())
            });
        });
    }
    group.finish();
}

fn bench_queueing(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = runtime.enter();
    let table = table(NdParams::default());
    let target = neighbor(1);

    c.bench_function("resolve_incomplete_enqueue", |b| {
        b.iter(|| {
            black_box(table.resolve(target, Packet::new(vec![0u8; 64]), RouteKind::Direct))
        });
    });
}

criterion_group!(benches, bench_fast_path, bench_queueing);
criterion_main!(benches);
