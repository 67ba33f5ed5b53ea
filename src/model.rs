use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::color::{palette_color, parse_color};

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A 2D position in model coordinates.
///
/// Node and stream positions are absolute; handle positions are relative to
/// their owner, so moving a node never has to touch its handles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// This point shifted by the given delta.
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entity references
// ────────────────────────────────────────────────────────────────────────────

/// Generation-checked reference into one of the canvas arenas.
///
/// A reference may outlive the entity it points to; resolving it afterwards
/// yields `None` rather than another entity that reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntityRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) EntityRef);
    };
}

entity_id!(
    /// Reference to a [`Node`] on the canvas.
    NodeId
);
entity_id!(
    /// Reference to a [`Stream`] on the canvas.
    StreamId
);
entity_id!(
    /// Reference to a [`Handle`] on the canvas.
    HandleId
);
entity_id!(
    /// Reference to a [`Connector`] on the canvas.
    ConnectorId
);

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle / direction
// ────────────────────────────────────────────────────────────────────────────

/// Resident lifecycle state of an entity.
///
/// `Hidden` entities are logically removed but kept alive so that an undo can
/// bring them back; they still occupy their display symbol. The third state
/// of the lifecycle, destruction, is physical removal from the arena: a
/// destroyed entity's reference no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    Hidden,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        self == Lifecycle::Active
    }
}

/// Port class of a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
    Parameter,
}

impl Direction {
    pub fn is_parameter(self) -> bool {
        self == Direction::Parameter
    }

    /// Symbol prefix used when allocating handle symbols of this class.
    pub fn symbol_prefix(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
            Direction::Parameter => "par",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Categories
// ────────────────────────────────────────────────────────────────────────────

/// Index into the canvas-scoped [`CategoryRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub(crate) u32);

/// A color-coded resource grouping (e.g. "water", "steam", "power").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    /// Display color as a hex string.
    pub color: String,
}

/// Find-or-create registry of categories, owned by the canvas.
///
/// The registry is document-scoped: it lives and dies with the canvas it
/// belongs to and is handed to factories explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRegistry {
    entries: IndexMap<String, Category>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a category by label, creating it with the next palette color
    /// if it does not exist yet.
    pub fn find_or_create(&mut self, label: &str) -> CategoryId {
        if let Some(index) = self.entries.get_index_of(label) {
            return CategoryId(index as u32);
        }
        let index = self.entries.len();
        self.entries.insert(
            label.to_string(),
            Category {
                label: label.to_string(),
                color: palette_color(index).to_string(),
            },
        );
        CategoryId(index as u32)
    }

    /// Look up an existing category by label.
    pub fn find(&self, label: &str) -> Option<CategoryId> {
        self.entries.get_index_of(label).map(|i| CategoryId(i as u32))
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.entries.get_index(id.0 as usize).map(|(_, c)| c)
    }

    /// Override a category's color. Accepts hex, named colors, or `[r,g,b]`
    /// float triplets; returns false if the color cannot be parsed or the
    /// id is unknown.
    pub fn recolor(&mut self, id: CategoryId, color: &str) -> bool {
        let Some(parsed) = parse_color(color) else {
            return false;
        };
        match self.entries.get_index_mut(id.0 as usize) {
            Some((_, category)) => {
                category.color = parsed;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.entries.values()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entity – shared attribute bag
// ────────────────────────────────────────────────────────────────────────────

/// Attributes shared by everything that shows up in a generated model:
/// a display symbol, a label, physical units, a category and numeric bounds.
///
/// The numeric fields are kept as free-form text until the model is solved,
/// so symbolic and unset values survive editing untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    /// Display symbol, unique within the owning scope.
    pub symbol: String,
    pub label: String,
    pub units: String,
    pub category: Option<CategoryId>,
    pub value: Option<String>,
    pub sigma: Option<String>,
    pub minimum: Option<String>,
    pub maximum: Option<String>,
}

impl Entity {
    pub fn named(symbol: String, label: &str) -> Self {
        Self {
            symbol,
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Overwrite the shared attributes (everything except symbol and label)
    /// from another entity. Used when a connection makes the origin side
    /// authoritative for the target.
    pub(crate) fn copy_shared_from(&mut self, origin: &Entity) {
        self.units = origin.units.clone();
        self.category = origin.category;
        self.value = origin.value.clone();
        self.sigma = origin.sigma.clone();
        self.minimum = origin.minimum.clone();
        self.maximum = origin.maximum.clone();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

/// Which node or stream a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOwner {
    Node(NodeId),
    Stream(StreamId),
}

/// Present exactly while a handle is connected.
///
/// Keeping the conjugate and connector references in one optional field makes
/// `connected ⇔ conjugate present ⇔ connector present` hold by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// The handle at the other end of the connector.
    pub conjugate: HandleId,
    /// The connector that owns this connection.
    pub connector: ConnectorId,
}

/// A typed connection point owned by a node or stream.
#[derive(Debug, Clone)]
pub struct Handle {
    pub entity: Entity,
    pub direction: Direction,
    pub owner: HandleOwner,
    /// Position relative to the owner.
    pub position: Point,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) link: Option<Link>,
}

impl Handle {
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<Link> {
        self.link
    }

    pub fn conjugate(&self) -> Option<HandleId> {
        self.link.map(|l| l.conjugate)
    }

    pub fn connector(&self) -> Option<ConnectorId> {
        self.link.map(|l| l.connector)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connector
// ────────────────────────────────────────────────────────────────────────────

/// A directed link between one output-class handle (origin) and one
/// input-class handle (target).
#[derive(Debug, Clone)]
pub struct Connector {
    /// Display symbol, unique among resident connectors on the canvas.
    pub symbol: String,
    pub(crate) origin: HandleId,
    pub(crate) target: HandleId,
    pub(crate) lifecycle: Lifecycle,
}

impl Connector {
    /// The output-class endpoint.
    pub fn origin(&self) -> HandleId {
        self.origin
    }

    /// The input-class endpoint.
    pub fn target(&self) -> HandleId {
        self.target
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node
// ────────────────────────────────────────────────────────────────────────────

/// A process unit: an aggregate of handles partitioned by direction, plus the
/// equations that relate them.
///
/// Handles never outlive their node; destroying the node destroys them first.
#[derive(Debug, Clone)]
pub struct Node {
    pub entity: Entity,
    pub position: Point,
    /// Free-text equations referencing handle and parameter symbols.
    pub equations: Vec<String>,
    pub(crate) inputs: Vec<HandleId>,
    pub(crate) outputs: Vec<HandleId>,
    pub(crate) parameters: Vec<HandleId>,
    pub(crate) lifecycle: Lifecycle,
}

impl Node {
    pub fn inputs(&self) -> &[HandleId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[HandleId] {
        &self.outputs
    }

    pub fn parameters(&self) -> &[HandleId] {
        &self.parameters
    }

    /// All owned handles, inputs first, then outputs, then parameters.
    pub fn handles(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.parameters.iter())
            .copied()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub(crate) fn collection(&self, direction: Direction) -> &Vec<HandleId> {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
            Direction::Parameter => &self.parameters,
        }
    }

    pub(crate) fn collection_mut(&mut self, direction: Direction) -> &mut Vec<HandleId> {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
            Direction::Parameter => &mut self.parameters,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stream
// ────────────────────────────────────────────────────────────────────────────

/// A process boundary: a pseudo-node wrapping exactly one handle.
///
/// A stream whose handle is output-class feeds material into the process
/// (a source); an input-class handle makes it a sink.
#[derive(Debug, Clone)]
pub struct Stream {
    pub label: String,
    pub position: Point,
    pub(crate) handle: HandleId,
    pub(crate) lifecycle: Lifecycle,
}

impl Stream {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_shared_keeps_identity() {
        let mut registry = CategoryRegistry::new();
        let cat = registry.find_or_create("water");

        let mut origin = Entity::named("out0".to_string(), "feed");
        origin.units = "kg/h".to_string();
        origin.category = Some(cat);
        origin.value = Some("12.5".to_string());
        origin.minimum = Some("0".to_string());

        let mut target = Entity::named("in0".to_string(), "inlet");
        target.copy_shared_from(&origin);

        assert_eq!(target.symbol, "in0");
        assert_eq!(target.label, "inlet");
        assert_eq!(target.units, "kg/h");
        assert_eq!(target.category, Some(cat));
        assert_eq!(target.value.as_deref(), Some("12.5"));
        assert_eq!(target.minimum.as_deref(), Some("0"));
    }

    #[test]
    fn test_category_find_or_create_dedup() {
        let mut registry = CategoryRegistry::new();
        let a = registry.find_or_create("steam");
        let b = registry.find_or_create("steam");
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("steam"), Some(a));
        assert_eq!(registry.find("power"), None);
    }

    #[test]
    fn test_category_palette_and_recolor() {
        let mut registry = CategoryRegistry::new();
        let a = registry.find_or_create("a");
        let b = registry.find_or_create("b");
        let color_a = registry.get(a).map(|c| c.color.clone());
        let color_b = registry.get(b).map(|c| c.color.clone());
        assert!(color_a.is_some());
        assert_ne!(color_a, color_b);

        assert!(registry.recolor(a, "red"));
        assert_eq!(registry.get(a).map(|c| c.color.as_str()), Some("#ff0000"));
        assert!(!registry.recolor(a, ""));
    }

    #[test]
    fn test_direction_prefixes() {
        assert_eq!(Direction::Input.symbol_prefix(), "in");
        assert_eq!(Direction::Output.symbol_prefix(), "out");
        assert_eq!(Direction::Parameter.symbol_prefix(), "par");
        assert!(Direction::Parameter.is_parameter());
        assert!(!Direction::Input.is_parameter());
    }
}
