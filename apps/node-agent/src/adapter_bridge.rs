use af_adapters::AgentDescriptor;
use af_protocol::adapter::RunSpec;
use af_protocol::run_snapshot::RunSnapshot;

pub fn descriptor_for(snapshot: &RunSnapshot) -> AgentDescriptor {
    AgentDescriptor {
        agent_type: snapshot.agent.agent_type.clone(),
        image: snapshot
            .image
            .clone()
            .unwrap_or_else(|| format!("af-agents/{}:latest", snapshot.agent.agent_type)),
    }
}

pub fn run_spec_from_snapshot(snapshot: &RunSnapshot) -> RunSpec {
    RunSpec::from_snapshot(
        snapshot.run_id.clone(),
        &snapshot.agent,
        snapshot.prompt.clone(),
        snapshot.workspace.clone(),
    )
}
