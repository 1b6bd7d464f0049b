use super::{decode, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::source::with_max_time;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerStatus {
    pub uptime: f64,
    pub uptime_estimate: f64,
    pub asserts: Option<Asserts>,
    pub connections: Option<Connections>,
    pub opcounters: Option<OpCounters>,
    pub opcounters_repl: Option<OpCounters>,
    pub mem: Option<Memory>,
    pub network: Option<Network>,
    pub global_lock: Option<GlobalLock>,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Asserts {
    pub regular: f64,
    pub warning: f64,
    pub msg: f64,
    pub user: f64,
    pub rollovers: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connections {
    pub current: f64,
    pub available: f64,
    pub total_created: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpCounters {
    pub insert: f64,
    pub query: f64,
    pub update: f64,
    pub delete: f64,
    pub getmore: f64,
    pub command: f64,
}

impl OpCounters {
    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("insert", self.insert),
            ("query", self.query),
            ("update", self.update),
            ("delete", self.delete),
            ("getmore", self.getmore),
            ("command", self.command),
        ]
    }
}

/// Sizes in MiB, as the server reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Memory {
    pub resident: f64,
    #[serde(rename = "virtual")]
    pub virtual_size: f64,
    pub mapped: Option<f64>,
    pub mapped_with_journal: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Network {
    pub bytes_in: f64,
    pub bytes_out: f64,
    pub num_requests: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalLock {
    pub current_queue: Option<ClientCounts>,
    pub active_clients: Option<ClientCounts>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientCounts {
    pub total: f64,
    pub readers: f64,
    pub writers: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub cursor: Option<CursorMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CursorMetrics {
    pub timed_out: f64,
    pub open: Option<OpenCursors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenCursors {
    pub no_timeout: f64,
    pub pinned: f64,
    pub total: f64,
}

struct ServerStatusFamilies {
    uptime: GaugeFamily,
    uptime_estimate: GaugeFamily,
    asserts: GaugeFamily,
    connections: GaugeFamily,
    connections_created: GaugeFamily,
    op_counters: GaugeFamily,
    op_counters_repl: GaugeFamily,
    memory: GaugeFamily,
    network_bytes: GaugeFamily,
    network_requests: GaugeFamily,
    lock_queue: GaugeFamily,
    lock_clients: GaugeFamily,
    cursor_timed_out: GaugeFamily,
    cursor_open: GaugeFamily,
}

impl ServerStatusFamilies {
    fn new() -> Result<Self> {
        Ok(Self {
            uptime: GaugeFamily::new(
                "instance",
                "uptime_seconds",
                "The value of the uptime field corresponds to the number of seconds that the mongos or mongod process has been active.",
                &[],
            )?,
            uptime_estimate: GaugeFamily::new(
                "instance",
                "uptime_estimate_seconds",
                "uptimeEstimate provides the uptime as calculated from MongoDB's internal course-grained time keeping system.",
                &[],
            )?,
            asserts: GaugeFamily::new(
                "",
                "asserts_total",
                "The asserts document reports the number of asserts on the database, by type.",
                &["type"],
            )?,
            connections: GaugeFamily::new(
                "",
                "connections",
                "The connections sub document data regarding the current status of incoming connections and availability of the database server.",
                &["state"],
            )?,
            connections_created: GaugeFamily::new(
                "connections_metrics",
                "created_total",
                "totalCreated provides a count of all incoming connections created to the server. This number includes connections that have since closed.",
                &[],
            )?,
            op_counters: GaugeFamily::new(
                "",
                "op_counters_total",
                "The opcounters data structure provides an overview of database operations by type and makes it possible to analyze the load on the database in more granular manner.",
                &["type"],
            )?,
            op_counters_repl: GaugeFamily::new(
                "",
                "op_counters_repl_total",
                "The opcountersRepl data structure, similar to the opcounters data structure, provides an overview of database replication operations by type.",
                &["type"],
            )?,
            memory: GaugeFamily::new(
                "",
                "memory",
                "The mem data structure holds information regarding the target system architecture of mongod and current memory use, in MiB.",
                &["type"],
            )?,
            network_bytes: GaugeFamily::new(
                "",
                "network_bytes_total",
                "The network data structure contains data regarding MongoDB's network use.",
                &["state"],
            )?,
            network_requests: GaugeFamily::new(
                "network_metrics",
                "num_requests_total",
                "The numRequests field is a counter of the total number of distinct requests that the server has received.",
                &[],
            )?,
            lock_queue: GaugeFamily::new(
                "global_lock",
                "current_queue",
                "The currentQueue data structure value provides more granular information concerning the number of operations queued because of a lock.",
                &["type"],
            )?,
            lock_clients: GaugeFamily::new(
                "global_lock",
                "client",
                "The activeClients data structure provides more granular information about the number of connected clients and the operation types performed by these clients.",
                &["type"],
            )?,
            cursor_timed_out: GaugeFamily::new(
                "metrics_cursor",
                "timed_out_total",
                "timedOut provides the total number of cursors that have timed out since the server process started.",
                &[],
            )?,
            cursor_open: GaugeFamily::new(
                "metrics_cursor",
                "open",
                "The open is an embedded document that contains data regarding open cursors.",
                &["state"],
            )?,
        })
    }
}

impl FamilyGroup for ServerStatusFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.uptime,
            &self.uptime_estimate,
            &self.asserts,
            &self.connections,
            &self.connections_created,
            &self.op_counters,
            &self.op_counters_repl,
            &self.memory,
            &self.network_bytes,
            &self.network_requests,
            &self.lock_queue,
            &self.lock_clients,
            &self.cursor_timed_out,
            &self.cursor_open,
        ]
    }
}

pub struct ServerStatusCollector {
    gauges: SnapshotGaugeSet<ServerStatusFamilies>,
}

impl ServerStatusCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            gauges: SnapshotGaugeSet::new(ServerStatusFamilies::new()?),
        })
    }
}

fn fill(g: &ServerStatusFamilies, status: &ServerStatus) {
    g.uptime.set_values(&[], status.uptime);
    g.uptime_estimate.set_values(&[], status.uptime_estimate);

    if let Some(asserts) = &status.asserts {
        g.asserts.set_values(&["regular"], asserts.regular);
        g.asserts.set_values(&["warning"], asserts.warning);
        g.asserts.set_values(&["msg"], asserts.msg);
        g.asserts.set_values(&["user"], asserts.user);
        g.asserts.set_values(&["rollovers"], asserts.rollovers);
    }

    if let Some(connections) = &status.connections {
        g.connections.set_values(&["current"], connections.current);
        g.connections.set_values(&["available"], connections.available);
        g.connections_created.set_values(&[], connections.total_created);
    }

    if let Some(counters) = &status.opcounters {
        for (op, value) in counters.entries() {
            g.op_counters.set_values(&[op], value);
        }
    }
    if let Some(counters) = &status.opcounters_repl {
        for (op, value) in counters.entries() {
            g.op_counters_repl.set_values(&[op], value);
        }
    }

    if let Some(mem) = &status.mem {
        g.memory.set_values(&["resident"], mem.resident);
        g.memory.set_values(&["virtual"], mem.virtual_size);
        // Only reported by MMAPv1-era servers.
        if let Some(mapped) = mem.mapped {
            g.memory.set_values(&["mapped"], mapped);
        }
        if let Some(mapped) = mem.mapped_with_journal {
            g.memory.set_values(&["mapped_with_journal"], mapped);
        }
    }

    if let Some(network) = &status.network {
        g.network_bytes.set_values(&["in_bytes"], network.bytes_in);
        g.network_bytes.set_values(&["out_bytes"], network.bytes_out);
        g.network_requests.set_values(&[], network.num_requests);
    }

    if let Some(lock) = &status.global_lock {
        if let Some(queue) = &lock.current_queue {
            g.lock_queue.set_values(&["reader"], queue.readers);
            g.lock_queue.set_values(&["writer"], queue.writers);
        }
        if let Some(clients) = &lock.active_clients {
            g.lock_clients.set_values(&["reader"], clients.readers);
            g.lock_clients.set_values(&["writer"], clients.writers);
        }
    }

    if let Some(cursor) = status.metrics.as_ref().and_then(|m| m.cursor.as_ref()) {
        g.cursor_timed_out.set_values(&[], cursor.timed_out);
        if let Some(open) = &cursor.open {
            g.cursor_open.set_values(&["timed_out"], open.no_timeout);
            g.cursor_open.set_values(&["pinned"], open.pinned);
            g.cursor_open.set_values(&["total"], open.total);
        }
    }
}

#[async_trait]
impl SubCollector for ServerStatusCollector {
    type Payload = ServerStatus;

    fn kind(&self) -> CollectorKind {
        CollectorKind::ServerStatus
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ServerStatus> {
        let command = with_max_time(doc! { "serverStatus": 1 }, timeout);
        let reply = session.run_command("admin", command, timeout).await?;
        decode(reply)
    }

    async fn export(&self, payload: ServerStatus) -> Snapshot {
        self.gauges.publish(|g| fill(g, &payload)).await
    }
}
