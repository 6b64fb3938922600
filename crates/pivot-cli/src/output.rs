//! Terminal rendering of topology snapshots and failover outcomes

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use pivot_core::{HostAvailability, HostRole, HostSpec, Topology};
use pivot_failover::FailoverResult;

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn role_label(role: HostRole) -> &'static str {
    match role {
        HostRole::Writer => "writer",
        HostRole::Reader => "reader",
        HostRole::Unknown => "unknown",
    }
}

fn availability_label(availability: HostAvailability) -> &'static str {
    match availability {
        HostAvailability::Available => "available",
        HostAvailability::Unavailable => "unavailable",
    }
}

fn port_label(host: &HostSpec) -> String {
    host.port().map(|p| p.to_string()).unwrap_or_else(|| "-".into())
}

pub fn topology_table(topology: &Topology) -> Table {
    let mut table = table();
    table.set_header(vec!["Host", "Port", "Role", "Availability", "Last updated"]);
    for host in topology.hosts() {
        table.add_row(vec![
            host.host().to_string(),
            port_label(host),
            role_label(host.role()).to_string(),
            availability_label(host.availability()).to_string(),
            host.last_updated()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
                .unwrap_or_else(|| "-".into()),
        ]);
    }
    table
}

pub fn result_table(result: &FailoverResult) -> Table {
    let mut table = table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Task", result.task_name()]);
    table.add_row(vec![
        "Outcome",
        if result.is_connected() { "connected" } else { "failed" },
    ]);
    if let Some(host) = result.host() {
        table.add_row(vec!["Host".to_string(), host.to_string()]);
        table.add_row(vec![
            "New host".to_string(),
            if result.is_new_host() { "yes" } else { "no" }.to_string(),
        ]);
    }
    if let Some(writer) = result.topology().and_then(Topology::writer) {
        table.add_row(vec!["Writer".to_string(), writer.to_string()]);
    }
    if let Some(error) = result.error() {
        table.add_row(vec!["Error".to_string(), error.to_string()]);
    }
    table.add_row(vec![
        "Elapsed".to_string(),
        format!("{} ms", result.elapsed().as_millis()),
    ]);
    table
}
