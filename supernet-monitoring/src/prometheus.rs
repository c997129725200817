//! Prometheus text-format exporter for [`crate::MetricsSnapshot`].

use crate::MetricsSnapshot;

/// Encode a metrics snapshot into Prometheus text exposition format.
pub fn encode(snap: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(4096);

    write_gauge(&mut out, "supernet_peers_connected", "Currently connected peers", snap.peers_connected);
    write_counter(
        &mut out,
        "supernet_handshake_failures_total",
        "Handshakes rejected (bad version, signature, or clock skew)",
        snap.handshake_failures,
    );
    write_counter(&mut out, "supernet_bytes_sent_total", "Bytes written to peer sockets", snap.bytes_sent);
    write_counter(&mut out, "supernet_bytes_received_total", "Bytes read from peer sockets", snap.bytes_received);

    write_counter(
        &mut out,
        "supernet_messages_routed_high_total",
        "Messages dispatched on the high-priority queue",
        snap.messages_routed_high,
    );
    write_counter(
        &mut out,
        "supernet_messages_routed_low_total",
        "Messages dispatched on the low-priority queue",
        snap.messages_routed_low,
    );
    write_counter(
        &mut out,
        "supernet_messages_routed_sync_total",
        "Messages dispatched on the sync-priority queue",
        snap.messages_routed_sync,
    );
    write_counter(
        &mut out,
        "supernet_messages_dropped_total",
        "Messages dropped (queue full, past deadline, unknown chain)",
        snap.messages_dropped,
    );
    write_counter(
        &mut out,
        "supernet_query_timeouts_total",
        "Outstanding requests that fired a synthetic failure",
        snap.query_timeouts,
    );

    write_gauge(&mut out, "supernet_benched_peers", "Peers currently on the benchlist", snap.benched_peers);

    write_histogram(
        &mut out,
        "supernet_consensus_rounds_to_finalize",
        "Poll rounds needed to finalize one item",
        &snap.consensus_rounds_buckets,
        snap.consensus_rounds_sum,
        snap.consensus_rounds_count,
    );
    write_histogram(
        &mut out,
        "supernet_finality_latency_ms",
        "Wall-clock time from item add to acceptance, in milliseconds",
        &snap.finality_latency_buckets,
        snap.finality_latency_sum,
        snap.finality_latency_count,
    );
    write_counter(&mut out, "supernet_items_accepted_total", "Blocks/vertices accepted", snap.items_accepted);
    write_counter(&mut out, "supernet_items_rejected_total", "Blocks/vertices rejected", snap.items_rejected);

    write_gauge(
        &mut out,
        "supernet_bootstrap_progress_permille",
        "Bootstrap progress fraction in permille (1000 = done)",
        snap.bootstrap_progress,
    );
    write_counter(
        &mut out,
        "supernet_chains_bootstrapped_total",
        "Chains that have finished bootstrapping",
        snap.chains_bootstrapped,
    );

    write_gauge(&mut out, "supernet_validator_count", "Validators in the active set", snap.validator_count);
    write_gauge(&mut out, "supernet_total_stake", "Total validator weight", snap.total_stake);
    write_gauge(
        &mut out,
        "supernet_uptime_tracked_nodes",
        "Nodes with an active uptime tracker",
        snap.uptime_tracked_nodes,
    );

    out
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: i64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_histogram(out: &mut String, name: &str, help: &str, buckets: &[(f64, u64)], sum: f64, count: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} histogram\n"));
    for (bound, cumulative_count) in buckets {
        out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {cumulative_count}\n"));
    }
    out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {count}\n"));
    out.push_str(&format!("{name}_sum {sum}\n"));
    out.push_str(&format!("{name}_count {count}\n\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SupernetMetrics;

    #[test]
    fn test_encode_produces_valid_output() {
        let metrics = SupernetMetrics::new();
        metrics.peers_connected.set(3);
        metrics.items_accepted.add(42);
        metrics.finality_latency_ms.observe(120.0);

        let text = encode(&metrics.snapshot());
        assert!(text.contains("# TYPE supernet_peers_connected gauge"));
        assert!(text.contains("supernet_peers_connected 3"));
        assert!(text.contains("# TYPE supernet_items_accepted_total counter"));
        assert!(text.contains("supernet_items_accepted_total 42"));
        assert!(text.contains("# TYPE supernet_finality_latency_ms histogram"));
        assert!(text.contains("supernet_finality_latency_ms_count 1"));
    }

    #[test]
    fn test_encode_all_metrics_present() {
        let metrics = SupernetMetrics::new();
        let text = encode(&metrics.snapshot());
        for name in [
            "supernet_peers_connected",
            "supernet_handshake_failures_total",
            "supernet_messages_dropped_total",
            "supernet_query_timeouts_total",
            "supernet_benched_peers",
            "supernet_consensus_rounds_to_finalize",
            "supernet_finality_latency_ms",
            "supernet_bootstrap_progress_permille",
            "supernet_validator_count",
            "supernet_total_stake",
            "supernet_uptime_tracked_nodes",
        ] {
            assert!(text.contains(&format!("# HELP {name}")), "missing HELP for {name}");
        }
    }
}
