use clap::Parser;
use routeconv::{Args, Report, report::Measure};
use routeconv_core::phase::PhaseError;
use std::path::PathBuf;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
}

fn replay(extra: &[&str]) -> Report {
    let trace = demo("diamond.json");
    let mut argv = vec!["routeconv", "--trace", trace.to_str().unwrap()];
    argv.extend_from_slice(extra);

    routeconv::run(&Args::parse_from(argv)).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn rip_fault_cycle() {
    let report = replay(&[]);

    let convergence: Vec<_> = report
        .phases
        .iter()
        .map(|phase| phase.convergence)
        .collect();
    assert_eq!(convergence.len(), 3);
    assert_close(convergence[0], 2.4);
    assert_close(convergence[1], 5.3);
    assert_close(convergence[2], 3.1);
    assert_eq!(report.phases[1].changes, 3);
    assert_eq!(report.phases[2].changes, 2);

    let instants: Vec<_> = report.flows.iter().map(|flows| flows.at).collect();
    assert_eq!(instants, vec![100.0, 200.0, 300.0]);

    let end = &report.flows[2];
    assert_eq!(end.flows, 1);
    assert_eq!(end.lost_packets, 40);
    assert_close(end.metrics.packet_loss_ratio, 0.016);
    assert_close(end.metrics.average_packet_size, 1052.0);
    assert_close(end.metrics.throughput_mbps, 2_587_920.0 * 8.0 / 300.0 / 1e6);
    assert_close(end.metrics.mean_delay, 10.2 / 2460.0);
    assert_close(end.metrics.mean_jitter, 0.5 / 2459.0);
}

#[test]
fn olsr_fault_cycle() {
    let report = replay(&["--routing-protocol", "olsr"]);

    assert_close(report.phases[0].convergence, 4.1);
    assert_close(report.phases[1].convergence, 2.1);
    assert_close(report.phases[2].convergence, 1.2);
}

#[test]
fn stop_at_fault() {
    let report = replay(&["--layout", "stop-at-fault", "--per-flow"]);

    assert_eq!(report.phases.len(), 1);
    assert_eq!(report.phases[0].measure, Measure::StabilizedAt);
    assert_close(report.phases[0].convergence, 2.4);
    assert_eq!(report.phases[0].end, Some(100.0));

    assert_eq!(report.flows.len(), 1);
    assert_eq!(report.flows[0].per_flow.len(), 2);
}

#[test]
fn coarser_polling() {
    let report = replay(&["--poll-interval", "1s"]);

    // changes are only seen at the next whole second
    assert_close(report.phases[0].convergence, 3.0);
    assert_close(report.phases[1].convergence, 6.0);
    assert_close(report.phases[2].convergence, 4.0);
}

#[test]
fn zero_poll_interval() {
    let trace = demo("diamond.json");
    let args = Args::parse_from([
        "routeconv",
        "--trace",
        trace.to_str().unwrap(),
        "--poll-interval",
        "0s",
    ]);

    assert_eq!(args.plan(&[]), Err(PhaseError::ZeroPollInterval));
    assert!(routeconv::run(&args).is_err());
}

#[test]
fn missing_trace_file() {
    let trace = demo("missing.json");
    let args = Args::parse_from(["routeconv", "--trace", trace.to_str().unwrap()]);

    assert!(routeconv::run(&args).is_err());
}

#[test]
fn json_report() {
    let report = replay(&[]);
    let dir = std::env::temp_dir().join(format!("routeconv-replay-{}", std::process::id()));

    let path = report.write_json(&dir).unwrap();
    assert_eq!(path, dir.join("diamond_rip.json"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["trace"], "diamond");
    assert_eq!(written["phases"].as_array().map(Vec::len), Some(3));

    std::fs::remove_dir_all(&dir).unwrap();
}
