/*!
# Routing convergence replay

Replays a recorded network trace through the [`routeconv_core`] experiment
machinery: the convergence of the routing is measured before, during and
after a link failure, and the flow statistics are sampled around it.

*/

pub mod config;
pub mod report;
pub mod trace;

pub use self::{
    config::{Args, Layout, RoutingProtocol},
    report::Report,
    trace::{Trace, TraceNetwork},
};

use anyhow::{Context as _, Result};
use routeconv_core::{Experiment, FlowStatsAggregator, PhaseScheduler};

/// Run the experiment described by `args`.
pub fn run(args: &Args) -> Result<Report> {
    let trace = Trace::load(&args.trace)?;
    let setup = trace
        .setup(args.routing_protocol)
        .with_context(|| format!("Invalid trace {}", args.trace.display()))?;

    let plan = args.plan(&setup.faults)?;
    let mut experiment = Experiment::new(
        setup.network,
        setup.links,
        setup.routers,
        FlowStatsAggregator::new(args.window()),
    )?
    .with_flow_filter(setup.flow_filter)
    .with_per_flow(args.per_flow);

    log::info!(
        "replaying `{}' with {} until {}",
        trace.name,
        args.routing_protocol,
        args.horizon
    );

    let mut scheduler = PhaseScheduler::new(plan)?;
    scheduler.install(&mut experiment)?;
    scheduler.run(&mut experiment)?;

    Ok(Report::new(
        trace.name,
        args.routing_protocol,
        args.layout,
        args.poll_interval.into_duration(),
        &experiment.report(),
    ))
}
