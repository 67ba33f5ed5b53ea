//! Structural snapshots of the active graph.
//!
//! A [`Snapshot`] is a plain-data view of every *active* entity: nodes with
//! their ports and equations, boundary streams, and connectors addressed by
//! owner plus port symbol. Restoring drives the same factory and command
//! paths used interactively and yields a single batch command, so an import
//! is one undo step.
//!
//! [`FlowsheetDoc`] wraps a snapshot for on-disk storage: a binary format
//! with magic bytes and a format version, plus JSON for interchange.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::canvas::Canvas;
use crate::editor::commands::{CommandKind, EditorCommand};
use crate::model::{Direction, Handle, HandleId, HandleOwner, NodeId, Point};

// ────────────────────────────────────────────────────────────────────────────
// Snapshot data
// ────────────────────────────────────────────────────────────────────────────

/// One port of a node or stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub symbol: String,
    pub label: String,
    #[serde(default)]
    pub units: String,
    /// Category label; resolved against the target document's registry.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub sigma: Option<String>,
    #[serde(default)]
    pub minimum: Option<String>,
    #[serde(default)]
    pub maximum: Option<String>,
    #[serde(default)]
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub symbol: String,
    pub label: String,
    pub position: Point,
    #[serde(default)]
    pub equations: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<PortSnapshot>,
    #[serde(default)]
    pub outputs: Vec<PortSnapshot>,
    #[serde(default)]
    pub parameters: Vec<PortSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub label: String,
    pub direction: Direction,
    pub position: Point,
    pub port: PortSnapshot,
}

/// Who owns a connector endpoint. Nodes are addressed by their canvas
/// symbol, streams by their position in [`Snapshot::streams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum EndpointOwner {
    Node { symbol: String },
    Stream { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorEndpoint {
    pub owner: EndpointOwner,
    /// Port symbol within the owner.
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSnapshot {
    pub origin: ConnectorEndpoint,
    pub target: ConnectorEndpoint,
}

/// Structural view of all active entities on a canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub streams: Vec<StreamSnapshot>,
    pub connectors: Vec<ConnectorSnapshot>,
}

// ────────────────────────────────────────────────────────────────────────────
// Capture
// ────────────────────────────────────────────────────────────────────────────

fn capture_port(canvas: &Canvas, handle: &Handle) -> PortSnapshot {
    PortSnapshot {
        symbol: handle.entity.symbol.clone(),
        label: handle.entity.label.clone(),
        units: handle.entity.units.clone(),
        category: handle
            .entity
            .category
            .and_then(|c| canvas.categories.get(c))
            .map(|c| c.label.clone()),
        value: handle.entity.value.clone(),
        sigma: handle.entity.sigma.clone(),
        minimum: handle.entity.minimum.clone(),
        maximum: handle.entity.maximum.clone(),
        position: handle.position,
    }
}

impl Snapshot {
    /// Capture every active entity on the canvas. Hidden entities awaiting
    /// cleanup are invisible to the snapshot.
    pub fn capture(canvas: &Canvas) -> Self {
        let mut snapshot = Snapshot::default();

        let capture_ports = |ids: &[HandleId]| -> Vec<PortSnapshot> {
            ids.iter()
                .filter_map(|h| canvas.handle(*h))
                .filter(|h| h.is_active())
                .map(|h| capture_port(canvas, h))
                .collect()
        };

        for (_, node) in canvas.active_nodes() {
            snapshot.nodes.push(NodeSnapshot {
                symbol: node.entity.symbol.clone(),
                label: node.entity.label.clone(),
                position: node.position,
                equations: node.equations.clone(),
                inputs: capture_ports(node.inputs()),
                outputs: capture_ports(node.outputs()),
                parameters: capture_ports(node.parameters()),
            });
        }

        let mut stream_index = HashMap::new();
        for (id, stream) in canvas.active_streams() {
            let Some(port) = canvas.handle(stream.handle()) else {
                continue;
            };
            stream_index.insert(id, snapshot.streams.len());
            snapshot.streams.push(StreamSnapshot {
                label: stream.label.clone(),
                direction: port.direction,
                position: stream.position,
                port: capture_port(canvas, port),
            });
        }

        for (_, connector) in canvas.active_connectors() {
            let origin = endpoint_of(canvas, connector.origin(), &stream_index);
            let target = endpoint_of(canvas, connector.target(), &stream_index);
            match (origin, target) {
                (Some(origin), Some(target)) => {
                    snapshot.connectors.push(ConnectorSnapshot { origin, target });
                }
                _ => warn!(
                    connector = %connector.symbol,
                    "connector endpoint not captureable, skipping"
                ),
            }
        }

        snapshot
    }
}

fn endpoint_of(
    canvas: &Canvas,
    handle_id: HandleId,
    stream_index: &HashMap<crate::model::StreamId, usize>,
) -> Option<ConnectorEndpoint> {
    let handle = canvas.handle(handle_id)?;
    let owner = match handle.owner {
        HandleOwner::Node(node) => EndpointOwner::Node {
            symbol: canvas.node(node)?.entity.symbol.clone(),
        },
        HandleOwner::Stream(stream) => EndpointOwner::Stream {
            index: *stream_index.get(&stream)?,
        },
    };
    Some(ConnectorEndpoint {
        owner,
        port: handle.entity.symbol.clone(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Restore
// ────────────────────────────────────────────────────────────────────────────

/// Result of a snapshot restore.
#[derive(Debug)]
pub struct RestoreOutcome {
    /// Batch making the whole import one undo step. Hand it to
    /// [`EditorHistory::apply`](crate::editor::EditorHistory::apply).
    pub command: EditorCommand,
    /// Connectors that could not be resolved and were skipped.
    pub skipped_connectors: usize,
}

impl Snapshot {
    /// Rebuild the snapshot's entities on a canvas.
    ///
    /// Node and connector symbols are regenerated by the canvas allocator;
    /// port symbols are preserved (equations reference them). A connector
    /// whose endpoints cannot be resolved is skipped with a log entry while
    /// the rest of the load proceeds.
    pub fn restore(&self, canvas: &mut Canvas) -> RestoreOutcome {
        let mut commands = Vec::new();
        let mut node_ports: HashMap<String, HashMap<String, HandleId>> = HashMap::new();
        let mut stream_ports: Vec<(String, HandleId)> = Vec::new();

        for node_snapshot in &self.nodes {
            let node_id = canvas.insert_node(&node_snapshot.label, node_snapshot.position);
            if let Some(node) = canvas.node_mut(node_id) {
                node.equations = node_snapshot.equations.clone();
            }
            commands.push(EditorCommand::new(CommandKind::CreateNode { node: node_id }));

            let mut ports = HashMap::new();
            for (direction, snapshots) in [
                (Direction::Input, &node_snapshot.inputs),
                (Direction::Output, &node_snapshot.outputs),
                (Direction::Parameter, &node_snapshot.parameters),
            ] {
                for port in snapshots {
                    let Some(handle) = restore_port(canvas, node_id, direction, port) else {
                        continue;
                    };
                    commands.push(EditorCommand::new(CommandKind::CreateHandle { handle }));
                    ports.insert(port.symbol.clone(), handle);
                }
            }
            node_ports.insert(node_snapshot.symbol.clone(), ports);
        }

        for stream_snapshot in &self.streams {
            let stream_id = canvas.insert_stream(
                &stream_snapshot.label,
                stream_snapshot.direction,
                stream_snapshot.position,
            );
            let handle = canvas.stream(stream_id).map(|s| s.handle());
            if let Some(handle) = handle {
                apply_port_snapshot(canvas, handle, &stream_snapshot.port);
                stream_ports.push((stream_snapshot.port.symbol.clone(), handle));
            }
            commands.push(EditorCommand::new(CommandKind::CreateStream { stream: stream_id }));
        }

        let mut skipped = 0usize;
        for connector in &self.connectors {
            let origin = resolve_endpoint(&connector.origin, &node_ports, &stream_ports);
            let target = resolve_endpoint(&connector.target, &node_ports, &stream_ports);
            let (Some(origin), Some(target)) = (origin, target) else {
                warn!(?connector, "connector endpoint unresolved, skipping");
                skipped += 1;
                continue;
            };
            match canvas.link(origin, target, true) {
                Ok(id) => commands.push(EditorCommand::new(CommandKind::Connect { connector: id })),
                Err(err) => {
                    warn!(%err, ?connector, "connector rejected, skipping");
                    skipped += 1;
                }
            }
        }

        RestoreOutcome {
            command: EditorCommand::new(CommandKind::Batch(commands)),
            skipped_connectors: skipped,
        }
    }
}

fn restore_port(
    canvas: &mut Canvas,
    node: NodeId,
    direction: Direction,
    snapshot: &PortSnapshot,
) -> Option<HandleId> {
    let handle = canvas.insert_handle(node, direction, snapshot.position)?;
    apply_port_snapshot(canvas, handle, snapshot);
    Some(handle)
}

fn apply_port_snapshot(canvas: &mut Canvas, handle: HandleId, snapshot: &PortSnapshot) {
    let category = snapshot
        .category
        .as_deref()
        .map(|label| canvas.categories.find_or_create(label));
    if let Some(h) = canvas.handle_mut(handle) {
        h.entity.symbol = snapshot.symbol.clone();
        h.entity.label = snapshot.label.clone();
        h.entity.units = snapshot.units.clone();
        h.entity.category = category;
        h.entity.value = snapshot.value.clone();
        h.entity.sigma = snapshot.sigma.clone();
        h.entity.minimum = snapshot.minimum.clone();
        h.entity.maximum = snapshot.maximum.clone();
        h.position = snapshot.position;
    }
}

fn resolve_endpoint(
    endpoint: &ConnectorEndpoint,
    node_ports: &HashMap<String, HashMap<String, HandleId>>,
    stream_ports: &[(String, HandleId)],
) -> Option<HandleId> {
    match &endpoint.owner {
        EndpointOwner::Node { symbol } => node_ports.get(symbol)?.get(&endpoint.port).copied(),
        EndpointOwner::Stream { index } => {
            let (symbol, handle) = stream_ports.get(*index)?;
            (symbol == &endpoint.port).then_some(*handle)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FlowsheetDoc – on-disk document wrapper
// ────────────────────────────────────────────────────────────────────────────

const MAGIC: &[u8; 9] = b"FLOWSHEET";
const FORMAT_VERSION: u32 = 1;

/// A complete flowsheet document for on-disk storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsheetDoc {
    pub snapshot: Snapshot,
}

impl FlowsheetDoc {
    /// Save the document to a binary file with magic bytes and versioning.
    pub fn save_to_binary<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        std::io::Write::write_all(&mut writer, MAGIC)?;
        std::io::Write::write_all(&mut writer, &FORMAT_VERSION.to_le_bytes())?;
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    /// Load a document from a binary file, checking magic bytes and version.
    pub fn load_from_binary<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let mut magic = [0u8; 9];
        std::io::Read::read_exact(&mut reader, &mut magic)?;
        if &magic != MAGIC {
            anyhow::bail!("Invalid magic bytes: expected 'FLOWSHEET'");
        }
        let mut version_bytes = [0u8; 4];
        std::io::Read::read_exact(&mut reader, &mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != FORMAT_VERSION {
            anyhow::bail!("Unsupported version: {}", version);
        }
        let doc: FlowsheetDoc =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(doc)
    }

    /// Serialize the document as pretty-printed JSON.
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document from JSON.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::history::EditorHistory;
    use crate::editor::operations;

    #[test]
    fn test_capture_skips_hidden_entities() {
        let mut canvas = Canvas::new();
        let mut history = EditorHistory::new(10);
        let visible = operations::add_node(&mut canvas, "visible", Point::default(), 1, 0, 0);
        history.apply(&mut canvas, visible);
        // Inserted but never shown: must not appear in the snapshot.
        let _hidden = canvas.insert_node("hidden", Point::default());

        let snapshot = Snapshot::capture(&canvas);
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].label, "visible");
        assert_eq!(snapshot.nodes[0].inputs.len(), 1);
    }

    #[test]
    fn test_json_round_trip_preserves_snapshot() {
        let mut canvas = Canvas::new();
        let mut history = EditorHistory::new(10);
        let cmd = operations::add_node(&mut canvas, "reactor", Point::new(10.0, 20.0), 1, 1, 1);
        history.apply(&mut canvas, cmd);
        let cmd = operations::add_stream(
            &mut canvas,
            "feed",
            Direction::Output,
            Point::new(-50.0, 0.0),
        );
        history.apply(&mut canvas, cmd);

        let doc = FlowsheetDoc {
            snapshot: Snapshot::capture(&canvas),
        };
        let json = doc.to_json_string().expect("serialize");
        let parsed = FlowsheetDoc::from_json_str(&json).expect("parse");
        assert_eq!(parsed.snapshot, doc.snapshot);
    }

    #[test]
    fn test_unresolved_connector_is_skipped() {
        let snapshot = Snapshot {
            nodes: vec![NodeSnapshot {
                symbol: "u0".to_string(),
                label: "pump".to_string(),
                position: Point::default(),
                equations: Vec::new(),
                inputs: Vec::new(),
                outputs: vec![PortSnapshot {
                    symbol: "out0".to_string(),
                    label: "out0".to_string(),
                    units: String::new(),
                    category: None,
                    value: None,
                    sigma: None,
                    minimum: None,
                    maximum: None,
                    position: Point::default(),
                }],
                parameters: Vec::new(),
            }],
            streams: Vec::new(),
            connectors: vec![ConnectorSnapshot {
                origin: ConnectorEndpoint {
                    owner: EndpointOwner::Node {
                        symbol: "u0".to_string(),
                    },
                    port: "out0".to_string(),
                },
                target: ConnectorEndpoint {
                    owner: EndpointOwner::Node {
                        symbol: "no-such-node".to_string(),
                    },
                    port: "in0".to_string(),
                },
            }],
        };

        let mut canvas = Canvas::new();
        let mut history = EditorHistory::new(10);
        let outcome = snapshot.restore(&mut canvas);
        assert_eq!(outcome.skipped_connectors, 1);
        history.apply(&mut canvas, outcome.command);
        assert_eq!(canvas.active_nodes().count(), 1);
        assert_eq!(canvas.connectors().count(), 0);
    }
}
