//! Demo CLI for the cluster state registry.
//!
//! Wires an in-memory fake cloud provider and a fixed node snapshot through
//! one `UpdateNodes` cycle, then prints the resulting status as a pretty
//! table (`prettytable-rs`) or JSON (`serde_json`) depending on `--format`.

use clap::{Parser, ValueEnum};
use cluster_state_registry::cloud_provider::{CloudProviderError, Instance, NodeGroup};
use cluster_state_registry::node::{ConditionStatus, Node, ReadyCondition};
use cluster_state_registry::{
    ClusterStateRegistry, ClusterStateRegistryConfig, CloudProvider, GroupId,
};
use prettytable::{row, Table};

#[derive(Parser)]
#[command(name = "csr-demo")]
#[command(about = "Runs one cluster-state-registry reconciliation cycle against fixture data")]
struct Cli {
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Number of ready nodes to simulate in the single demo node group.
    #[arg(long, default_value_t = 3)]
    ready_nodes: u64,

    /// Target size of the demo node group, as reported by the fake provider.
    #[arg(long, default_value_t = 5)]
    target_size: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

struct FixtureGroup {
    id: GroupId,
    target_size: u64,
    instance_ids: Vec<String>,
}

impl NodeGroup for FixtureGroup {
    fn id(&self) -> GroupId {
        self.id.clone()
    }
    fn min_size(&self) -> u64 {
        0
    }
    fn max_size(&self) -> u64 {
        10
    }
    fn target_size(&self) -> u64 {
        self.target_size
    }
    fn instances(&self) -> Result<Vec<Instance>, CloudProviderError> {
        Ok(self
            .instance_ids
            .iter()
            .map(|id| Instance { provider_id: id.clone() })
            .collect())
    }
}

struct FixtureProvider {
    groups: Vec<FixtureGroup>,
}

impl CloudProvider for FixtureProvider {
    fn node_groups(&self) -> Vec<Box<dyn NodeGroup>> {
        self.groups
            .iter()
            .map(|g| {
                Box::new(FixtureGroup {
                    id: g.id.clone(),
                    target_size: g.target_size,
                    instance_ids: g.instance_ids.clone(),
                }) as Box<dyn NodeGroup>
            })
            .collect()
    }

    fn node_group_for_node(&self, node: &Node) -> Option<GroupId> {
        let provider_id = node.provider_id.as_deref()?;
        self.groups
            .iter()
            .find(|g| provider_id.starts_with(&format!("{}-", g.id.0)))
            .map(|g| g.id.clone())
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let group = GroupId::from("demo-ng");
    let instance_ids: Vec<String> = (0..cli.target_size).map(|i| format!("demo-ng-{i}")).collect();
    let provider = FixtureProvider {
        groups: vec![FixtureGroup {
            id: group.clone(),
            target_size: cli.target_size,
            instance_ids: instance_ids.clone(),
        }],
    };

    let registry = ClusterStateRegistry::new(ClusterStateRegistryConfig::default(), Box::new(provider))
        .expect("demo config is valid");

    let now = chrono::Utc::now();
    let nodes: Vec<Node> = instance_ids
        .iter()
        .enumerate()
        .map(|(i, provider_id)| Node {
            name: provider_id.clone(),
            provider_id: Some(provider_id.clone()),
            creation_time: now - chrono::Duration::minutes(10),
            ready: ReadyCondition {
                status: if (i as u64) < cli.ready_nodes {
                    ConditionStatus::True
                } else {
                    ConditionStatus::False
                },
                last_transition: now,
            },
            taints: vec![],
        })
        .collect();

    registry
        .update_nodes(Some(&nodes), Some(&[]), now)
        .expect("nodes and pods are non-nil");

    let status = registry.get_status(now);
    let readiness = registry.get_cluster_readiness();

    match cli.format {
        OutputFormat::Table => print_table(&status, &readiness),
        OutputFormat::Json => print_json(&status, &readiness),
    }
}

fn print_table(
    status: &cluster_state_registry::Status,
    readiness: &cluster_state_registry::ReadinessReport,
) {
    let mut readiness_table = Table::new();
    readiness_table.add_row(row!["Bucket", "Count"]);
    readiness_table.add_row(row!["Ready", readiness.ready.len()]);
    readiness_table.add_row(row!["Unready", readiness.unready.len()]);
    readiness_table.add_row(row!["NotStarted", readiness.not_started.len()]);
    readiness_table.add_row(row!["LongUnregistered", readiness.long_unregistered.len()]);
    readiness_table.add_row(row!["Deleted", readiness.deleted.len()]);
    readiness_table.printstd();

    let mut status_table = Table::new();
    status_table.add_row(row!["Scope", "Condition", "Status"]);
    for condition in &status.clusterwide_conditions {
        status_table.add_row(row![
            "cluster",
            format!("{:?}", condition.condition_type),
            format!("{:?}", condition.status)
        ]);
    }
    for group_status in &status.node_group_statuses {
        for condition in &group_status.conditions {
            status_table.add_row(row![
                group_status.group.0,
                format!("{:?}", condition.condition_type),
                format!("{:?}", condition.status)
            ]);
        }
    }
    status_table.printstd();
}

fn print_json(
    status: &cluster_state_registry::Status,
    readiness: &cluster_state_registry::ReadinessReport,
) {
    let payload = serde_json::json!({
        "readiness": readiness,
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&payload).expect("status serializes"));
}
