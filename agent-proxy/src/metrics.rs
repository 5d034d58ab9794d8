//! Per-component counters and a shared option struct (C10), built on
//! `prometheus-client` the way the teacher threads a `Metrics` struct
//! through `ProxyInputs` rather than reaching for free-floating global
//! counters.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum Direction {
    DownstreamToUpstream,
    UpstreamToDownstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct ProtoLabel {
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct CopyLabel {
    pub protocol: Protocol,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct EvictionLabel {
    pub reason: &'static str,
}

pub struct Metrics {
    pub downstream_connections_total: Family<ProtoLabel, Counter>,
    pub tunnels_created_total: Family<ProtoLabel, Counter>,
    pub tunnels_closed_total: Family<ProtoLabel, Counter>,
    pub bytes_copied_total: Family<CopyLabel, Counter>,
    pub pool_size: Gauge,
    pub pool_evictions_total: Counter,
    pub udp_flows_active: Gauge,
    pub udp_flow_evictions_total: Family<EvictionLabel, Counter>,
    pub backend_requests_total: Family<ProtoLabel, Counter>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let downstream_connections_total = Family::default();
        registry.register(
            "downstream_connections",
            "Local connections/sources accepted",
            downstream_connections_total.clone(),
        );

        let tunnels_created_total = Family::default();
        registry.register(
            "tunnels_created",
            "HTTP/3 tunnels successfully opened",
            tunnels_created_total.clone(),
        );

        let tunnels_closed_total = Family::default();
        registry.register(
            "tunnels_closed",
            "HTTP/3 tunnels torn down",
            tunnels_closed_total.clone(),
        );

        let bytes_copied_total = Family::default();
        registry.register(
            "bytes_copied",
            "Bytes copied between downstream and upstream",
            bytes_copied_total.clone(),
        );

        let pool_size = Gauge::default();
        registry.register("pool_size", "Entries currently in the HTTP/3 client pool", pool_size.clone());

        let pool_evictions_total = Counter::default();
        registry.register(
            "pool_evictions",
            "Idle pool entries evicted",
            pool_evictions_total.clone(),
        );

        let udp_flows_active = Gauge::default();
        registry.register("udp_flows_active", "Entries in the UDP flow table", udp_flows_active.clone());

        let udp_flow_evictions_total = Family::default();
        registry.register(
            "udp_flow_evictions",
            "UDP flow table entries removed",
            udp_flow_evictions_total.clone(),
        );

        let backend_requests_total = Family::default();
        registry.register(
            "backend_requests",
            "Requests served by the backend handler",
            backend_requests_total.clone(),
        );

        Metrics {
            downstream_connections_total,
            tunnels_created_total,
            tunnels_closed_total,
            bytes_copied_total,
            pool_size,
            pool_evictions_total,
            udp_flows_active,
            udp_flow_evictions_total,
            backend_requests_total,
        }
    }
}
