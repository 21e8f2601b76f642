use anyhow::{Context, Result, bail};
use arq_abstract::{
    Message, ProtocolConfig, ProtocolEntity, SimConfig, TestAction, TestAssertion, TestScenario,
};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

/// Builds the entity pair for a scenario run. Called with the protocol
/// config the scenario resolves to, so overrides in the file reach the
/// entities and not just the report.
pub type EntityFactory =
    Box<dyn FnOnce(&ProtocolConfig) -> (Box<dyn ProtocolEntity>, Box<dyn ProtocolEntity>)>;

/// Load a TOML scenario from disk and run it.
pub fn run_scenario_file(
    path: impl AsRef<Path>,
    entities: EntityFactory,
) -> Result<SimulationReport> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&raw)
        .with_context(|| format!("parsing scenario file {}", path.display()))?;
    run_scenario(&scenario, entities)
}

/// Merged configuration a scenario resolves to before running.
pub fn scenario_configs(scenario: &TestScenario) -> Result<(SimConfig, ProtocolConfig)> {
    let mut sim = SimConfig::default();
    let mut protocol = ProtocolConfig::default();
    scenario.config.apply_to(&mut sim, &mut protocol);
    protocol
        .validate()
        .with_context(|| format!("scenario '{}' has an invalid config", scenario.name))?;
    Ok((sim, protocol))
}

/// Run one scenario to quiescence and check its assertions.
pub fn run_scenario(scenario: &TestScenario, entities: EntityFactory) -> Result<SimulationReport> {
    info!("Running scenario '{}': {}", scenario.name, scenario.description);
    let (sim_config, protocol_config) = scenario_configs(scenario)?;
    let (sender, receiver) = entities(&protocol_config);
    let mut simulator = Simulator::new(sim_config, protocol_config, sender, receiver);

    for action in &scenario.actions {
        match action {
            TestAction::AppSend { time, data } => {
                let message = Message::from_bytes(data.as_bytes())
                    .with_context(|| format!("app_send payload '{data}'"))?;
                simulator.schedule_app_send(*time, message);
            }
            TestAction::DropNextDataSeq { seq } => simulator.add_drop_data_seq_once(*seq),
            TestAction::DropNextAckNum { ack } => simulator.add_drop_ack_once(*ack),
        }
    }

    simulator.run_until_complete();
    let report = simulator.export_report();
    check_assertions(scenario, &report)?;
    Ok(report)
}

fn check_assertions(scenario: &TestScenario, report: &SimulationReport) -> Result<()> {
    for assertion in &scenario.assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let expected = Message::from_bytes(data.as_bytes())?;
                let found = report
                    .delivered_data
                    .iter()
                    .any(|payload| payload.as_slice() == expected.as_bytes());
                if !found {
                    bail!("scenario '{}': payload '{data}' was never delivered", scenario.name);
                }
            }
            TestAssertion::DeliveredCount { count } => {
                if report.delivered_data.len() != *count {
                    bail!(
                        "scenario '{}': expected {count} deliveries, saw {}",
                        scenario.name,
                        report.delivered_data.len()
                    );
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                let actual = report.sender_packet_count;
                if actual < *min || max.is_some_and(|m| actual > m) {
                    bail!(
                        "scenario '{}': sender packet count {actual} outside [{min}, {max:?}]",
                        scenario.name
                    );
                }
            }
            TestAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    bail!(
                        "scenario '{}': ran for {}ms, limit {ms}ms",
                        scenario.name,
                        report.duration_ms
                    );
                }
            }
        }
    }
    Ok(())
}
