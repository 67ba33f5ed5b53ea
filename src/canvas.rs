//! The canvas: owning container for all graph entities.
//!
//! The canvas holds one generational arena per entity kind and is the only
//! component allowed to physically create or destroy entities. Commands and
//! the serialization layer go through its factory and lifecycle methods;
//! nothing else mutates connectivity or visibility flags.
//!
//! Physical presence in an arena does not imply usability: each entity
//! carries an [`Lifecycle`] flag, and a hidden entity is invisible to every
//! "active" iterator while still occupying its display symbol until the
//! command that created it is cleaned up.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::warn;

use crate::model::{
    CategoryRegistry, Connector, ConnectorId, Direction, Entity, EntityRef, Handle, HandleId,
    HandleOwner, Lifecycle, Link, Node, NodeId, Point, Stream, StreamId,
};

// ────────────────────────────────────────────────────────────────────────────
// Generational arena
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Plain generational arena: stale references resolve to `None` instead of
/// whatever entity happens to occupy a reused slot.
#[derive(Debug, Clone)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> EntityRef {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                EntityRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                EntityRef {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn get(&self, r: EntityRef) -> Option<&T> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn get_mut(&mut self, r: EntityRef) -> Option<&mut T> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Remove the entity, bumping the slot generation so every outstanding
    /// reference to it fails closed from now on.
    fn remove(&mut self, r: EntityRef) -> Option<T> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index);
        Some(value)
    }

    fn iter(&self) -> impl Iterator<Item = (EntityRef, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    EntityRef {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    v,
                )
            })
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Link errors
// ────────────────────────────────────────────────────────────────────────────

/// Rejection reasons for a connection attempt. All are detected before any
/// state is created, so a failed attempt leaves the canvas untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("port reference is no longer valid")]
    StaleHandle,
    #[error("parameter ports cannot be connected")]
    ParameterPort,
    #[error("both ports belong to the same node or stream")]
    SameParent,
    #[error("a connection needs exactly one output port and one input port")]
    DirectionMismatch,
    #[error("port is already connected")]
    AlreadyConnected,
}

// ────────────────────────────────────────────────────────────────────────────
// Symbol allocation
// ────────────────────────────────────────────────────────────────────────────

/// Smallest non-negative integer suffix not present in `symbols` for the
/// given prefix. Hidden entities still occupy their suffix, so the scan runs
/// over all resident symbols of the scope.
fn smallest_free_suffix<'a>(prefix: &str, symbols: impl Iterator<Item = &'a str>) -> u32 {
    let used: BTreeSet<u32> = symbols
        .filter_map(|s| s.strip_prefix(prefix).and_then(|rest| rest.parse().ok()))
        .collect();
    let mut n = 0u32;
    while used.contains(&n) {
        n += 1;
    }
    n
}

// ────────────────────────────────────────────────────────────────────────────
// Canvas
// ────────────────────────────────────────────────────────────────────────────

/// Owning container for nodes, streams, connectors and handles, plus the
/// document-scoped category registry.
#[derive(Debug, Clone)]
pub struct Canvas {
    nodes: Arena<Node>,
    streams: Arena<Stream>,
    connectors: Arena<Connector>,
    handles: Arena<Handle>,
    pub categories: CategoryRegistry,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            streams: Arena::new(),
            connectors: Arena::new(),
            handles: Arena::new(),
            categories: CategoryRegistry::new(),
        }
    }

    // ── factories ───────────────────────────────────────────────────────

    /// Create a node in the hidden state. The node becomes visible when its
    /// create command executes.
    pub fn insert_node(&mut self, label: &str, position: Point) -> NodeId {
        let symbol = format!("u{}", self.next_node_suffix());
        NodeId(self.nodes.insert(Node {
            entity: Entity::named(symbol, label),
            position,
            equations: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            lifecycle: Lifecycle::Hidden,
        }))
    }

    /// Create a handle on a node, in the hidden state. Returns `None` if the
    /// node reference is stale.
    pub fn insert_handle(
        &mut self,
        node: NodeId,
        direction: Direction,
        position: Point,
    ) -> Option<HandleId> {
        let symbol = {
            let owner = self.nodes.get(node.0)?;
            let suffix = smallest_free_suffix(
                direction.symbol_prefix(),
                owner
                    .collection(direction)
                    .iter()
                    .filter_map(|h| self.handles.get(h.0))
                    .map(|h| h.entity.symbol.as_str()),
            );
            format!("{}{}", direction.symbol_prefix(), suffix)
        };
        let label = symbol.clone();
        let id = HandleId(self.handles.insert(Handle {
            entity: Entity::named(symbol, &label),
            direction,
            owner: HandleOwner::Node(node),
            position,
            lifecycle: Lifecycle::Hidden,
            link: None,
        }));
        self.nodes
            .get_mut(node.0)?
            .collection_mut(direction)
            .push(id);
        Some(id)
    }

    /// Create a boundary stream and its single handle, both hidden.
    ///
    /// `direction` is the handle's class: `Output` makes the stream a source
    /// feeding the process, `Input` a sink.
    pub fn insert_stream(&mut self, label: &str, direction: Direction, position: Point) -> StreamId {
        // Inserted with a placeholder handle reference, patched right below
        // once the handle exists and can point back at the stream.
        let stream_id = StreamId(self.streams.insert(Stream {
            label: label.to_string(),
            position,
            handle: HandleId(EntityRef {
                index: u32::MAX,
                generation: u32::MAX,
            }),
            lifecycle: Lifecycle::Hidden,
        }));
        let symbol = format!("{}0", direction.symbol_prefix());
        let handle_id = HandleId(self.handles.insert(Handle {
            entity: Entity::named(symbol, label),
            direction,
            owner: HandleOwner::Stream(stream_id),
            position: Point::default(),
            lifecycle: Lifecycle::Hidden,
            link: None,
        }));
        if let Some(stream) = self.streams.get_mut(stream_id.0) {
            stream.handle = handle_id;
        }
        stream_id
    }

    // ── connection protocol ─────────────────────────────────────────────

    /// Validate a connection attempt and create the connector for it.
    ///
    /// The connector starts hidden and unlocked; the connect command locks
    /// both endpoints when it executes. Argument order does not matter: the
    /// output-class handle becomes the origin, the input-class handle the
    /// target. Unless `replay` is set (structural replay of data that is
    /// already authoritative on both sides, e.g. deserialization or paste),
    /// the target's shared attributes are overwritten from the origin's.
    pub fn link(
        &mut self,
        a: HandleId,
        b: HandleId,
        replay: bool,
    ) -> Result<ConnectorId, LinkError> {
        let ha = self.handles.get(a.0).ok_or(LinkError::StaleHandle)?;
        let hb = self.handles.get(b.0).ok_or(LinkError::StaleHandle)?;
        if ha.direction.is_parameter() || hb.direction.is_parameter() {
            return Err(LinkError::ParameterPort);
        }
        if ha.owner == hb.owner {
            return Err(LinkError::SameParent);
        }
        let (origin, target) = match (ha.direction, hb.direction) {
            (Direction::Output, Direction::Input) => (a, b),
            (Direction::Input, Direction::Output) => (b, a),
            _ => return Err(LinkError::DirectionMismatch),
        };
        if ha.link.is_some() || hb.link.is_some() {
            return Err(LinkError::AlreadyConnected);
        }

        if !replay {
            // Origin is authoritative for the shared attributes.
            let shared = self
                .handles
                .get(origin.0)
                .map(|h| h.entity.clone())
                .ok_or(LinkError::StaleHandle)?;
            if let Some(t) = self.handles.get_mut(target.0) {
                t.entity.copy_shared_from(&shared);
            }
        }

        let symbol = format!("s{}", self.next_connector_suffix());
        Ok(ConnectorId(self.connectors.insert(Connector {
            symbol,
            origin,
            target,
            lifecycle: Lifecycle::Hidden,
        })))
    }

    /// Lock both endpoints of a connector to each other and activate it.
    ///
    /// Re-locking an already locked connector is a no-op. Returns false if
    /// the connector or either endpoint no longer resolves, or if an
    /// endpoint is meanwhile connected to a different connector.
    pub(crate) fn lock_connector(&mut self, id: ConnectorId) -> bool {
        let Some(connector) = self.connectors.get(id.0) else {
            return false;
        };
        let (origin, target) = (connector.origin, connector.target);
        for endpoint in [origin, target] {
            match self.handles.get(endpoint.0) {
                None => return false,
                Some(h) => {
                    if h.link.is_some_and(|l| l.connector != id) {
                        warn!(
                            connector = %self.connectors.get(id.0).map(|c| c.symbol.as_str()).unwrap_or("?"),
                            "endpoint already locked to a different connector"
                        );
                        return false;
                    }
                }
            }
        }
        if let Some(h) = self.handles.get_mut(origin.0) {
            h.link = Some(Link {
                conjugate: target,
                connector: id,
            });
        }
        if let Some(h) = self.handles.get_mut(target.0) {
            h.link = Some(Link {
                conjugate: origin,
                connector: id,
            });
        }
        if let Some(connector) = self.connectors.get_mut(id.0) {
            connector.lifecycle = Lifecycle::Active;
        }
        true
    }

    /// Free both endpoints of a connector and hide it.
    ///
    /// The symmetric inverse of [`Canvas::lock_connector`]: both endpoints
    /// lose their conjugate and connector references in one place, so no
    /// code path can leave one side half-connected.
    pub(crate) fn free_connector(&mut self, id: ConnectorId) -> bool {
        let Some(connector) = self.connectors.get_mut(id.0) else {
            return false;
        };
        connector.lifecycle = Lifecycle::Hidden;
        let (origin, target) = (connector.origin, connector.target);
        for endpoint in [origin, target] {
            if let Some(h) = self.handles.get_mut(endpoint.0) {
                if h.link.is_some_and(|l| l.connector == id) {
                    h.link = None;
                }
            }
        }
        true
    }

    // ── lifecycle flags ─────────────────────────────────────────────────

    pub(crate) fn set_node_lifecycle(&mut self, id: NodeId, lifecycle: Lifecycle) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(node) => {
                node.lifecycle = lifecycle;
                true
            }
            None => false,
        }
    }

    /// A stream and its single handle show and hide together.
    pub(crate) fn set_stream_lifecycle(&mut self, id: StreamId, lifecycle: Lifecycle) -> bool {
        let Some(stream) = self.streams.get_mut(id.0) else {
            return false;
        };
        stream.lifecycle = lifecycle;
        let handle = stream.handle;
        if let Some(h) = self.handles.get_mut(handle.0) {
            h.lifecycle = lifecycle;
        }
        true
    }

    pub(crate) fn set_handle_lifecycle(&mut self, id: HandleId, lifecycle: Lifecycle) -> bool {
        match self.handles.get_mut(id.0) {
            Some(handle) => {
                handle.lifecycle = lifecycle;
                true
            }
            None => false,
        }
    }

    // ── physical destruction ────────────────────────────────────────────

    /// Irreversibly destroy a connector, freeing both endpoints first.
    pub fn destroy_connector(&mut self, id: ConnectorId) {
        self.free_connector(id);
        self.connectors.remove(id.0);
    }

    /// Irreversibly destroy a handle: sever its connection if any, detach it
    /// from the owning node's collection, and free the slot.
    pub fn destroy_handle(&mut self, id: HandleId) {
        let Some(handle) = self.handles.get(id.0) else {
            return;
        };
        let owner = handle.owner;
        let direction = handle.direction;
        if let Some(link) = handle.link {
            self.free_connector(link.connector);
        }
        if let HandleOwner::Node(node) = owner {
            if let Some(node) = self.nodes.get_mut(node.0) {
                node.collection_mut(direction).retain(|h| *h != id);
            }
        }
        self.handles.remove(id.0);
    }

    /// Irreversibly destroy a node, cascading to all owned handles.
    pub fn destroy_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        let owned: Vec<HandleId> = node.handles().collect();
        for handle in owned {
            self.destroy_handle(handle);
        }
        self.nodes.remove(id.0);
    }

    /// Irreversibly destroy a stream and its handle.
    pub fn destroy_stream(&mut self, id: StreamId) {
        let Some(stream) = self.streams.get(id.0) else {
            return;
        };
        let handle = stream.handle;
        self.destroy_handle(handle);
        self.streams.remove(id.0);
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(id.0)
    }

    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(id.0)
    }

    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.get(id.0)
    }

    pub fn handle_mut(&mut self, id: HandleId) -> Option<&mut Handle> {
        self.handles.get_mut(id.0)
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(id.0)
    }

    /// All resident nodes, hidden ones included.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(r, n)| (NodeId(r), n))
    }

    pub fn streams(&self) -> impl Iterator<Item = (StreamId, &Stream)> {
        self.streams.iter().map(|(r, s)| (StreamId(r), s))
    }

    pub fn connectors(&self) -> impl Iterator<Item = (ConnectorId, &Connector)> {
        self.connectors.iter().map(|(r, c)| (ConnectorId(r), c))
    }

    pub fn handles(&self) -> impl Iterator<Item = (HandleId, &Handle)> {
        self.handles.iter().map(|(r, h)| (HandleId(r), h))
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.is_active())
    }

    pub fn active_streams(&self) -> impl Iterator<Item = (StreamId, &Stream)> {
        self.streams().filter(|(_, s)| s.is_active())
    }

    pub fn active_connectors(&self) -> impl Iterator<Item = (ConnectorId, &Connector)> {
        self.connectors().filter(|(_, c)| c.is_active())
    }

    // ── symbol scopes ───────────────────────────────────────────────────

    fn next_node_suffix(&self) -> u32 {
        smallest_free_suffix("u", self.nodes.iter().map(|(_, n)| n.entity.symbol.as_str()))
    }

    fn next_connector_suffix(&self) -> u32 {
        smallest_free_suffix(
            "s",
            self.connectors.iter().map(|(_, c)| c.symbol.as_str()),
        )
    }
}
