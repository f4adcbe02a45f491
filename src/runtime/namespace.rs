//! Shape-based variable storage.
//!
//! A [`Namespace`] keeps its values in a flat vector and delegates the
//! name-to-slot mapping to a [`Shape`]. Shapes live in a shared
//! [`ShapeTable`] arena and form a transition tree rooted at the empty shape:
//! adding a name to a namespace moves it to the child shape for that name,
//! creating the child the first time only. Namespaces that add the same names
//! in the same order therefore end up on the same [`ShapeId`].

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::lang::value::Value;
use crate::runtime::runtime_error::PanicKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(usize);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Shape {
    attribute_indexes: FxHashMap<String, usize>,
    transitions: FxHashMap<String, ShapeId>,
}

impl Shape {
    pub fn attribute_count(&self) -> usize {
        self.attribute_indexes.len()
    }
}

/// Arena of every shape created so far. Shapes are never removed.
#[derive(Debug, Clone)]
pub struct ShapeTable {
    shapes: Vec<Shape>,
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeTable {
    pub fn new() -> Self {
        ShapeTable {
            shapes: vec![Shape::default()],
        }
    }

    pub fn root(&self) -> ShapeId {
        ShapeId(0)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn index_of(&self, shape: ShapeId, name: &str) -> Option<usize> {
        self.shapes[shape.0].attribute_indexes.get(name).copied()
    }

    pub fn attribute_count(&self, shape: ShapeId) -> usize {
        self.shapes[shape.0].attribute_count()
    }

    /// The shape reached from `shape` by adding `name`.
    ///
    /// Returns `shape` itself when it already maps `name`. Transitions are
    /// memoized, so repeated calls hand back the same id.
    pub fn with_attribute(&mut self, shape: ShapeId, name: &str) -> ShapeId {
        let current = &self.shapes[shape.0];
        if current.attribute_indexes.contains_key(name) {
            return shape;
        }
        if let Some(&child) = current.transitions.get(name) {
            return child;
        }

        let mut attribute_indexes = current.attribute_indexes.clone();
        attribute_indexes.insert(name.to_string(), attribute_indexes.len());

        let child = ShapeId(self.shapes.len());
        self.shapes.push(Shape {
            attribute_indexes,
            transitions: FxHashMap::default(),
        });
        self.shapes[shape.0]
            .transitions
            .insert(name.to_string(), child);

        trace!(from = shape.0, to = child.0, name, "shape transition");
        child
    }
}

/// Variable storage backed by a shape.
#[derive(Debug, Clone)]
pub struct Namespace {
    shapes: Rc<RefCell<ShapeTable>>,
    shape: ShapeId,
    storage: Vec<Value>,
    parent: Option<Rc<RefCell<Namespace>>>,
}

impl Namespace {
    pub fn new(shapes: Rc<RefCell<ShapeTable>>) -> Self {
        let shape = shapes.borrow().root();
        Namespace {
            shapes,
            shape,
            storage: Vec::new(),
            parent: None,
        }
    }

    /// A namespace whose lookups fall back to `parent`.
    pub fn with_parent(shapes: Rc<RefCell<ShapeTable>>, parent: Rc<RefCell<Namespace>>) -> Self {
        Namespace {
            parent: Some(parent),
            ..Namespace::new(shapes)
        }
    }

    pub fn get(&self, name: &str) -> Result<Value, PanicKind> {
        let index = self.shapes.borrow().index_of(self.shape, name);
        match (index, &self.parent) {
            (Some(i), _) => Ok(self.storage[i].clone()),
            (None, Some(parent)) => parent.borrow().get(name),
            (None, None) => Err(PanicKind::UnknownVariable(name.to_string())),
        }
    }

    /// Overwrite `name` in place, or add it by moving to the next shape.
    pub fn set(&mut self, name: &str, value: Value) {
        let index = self.shapes.borrow().index_of(self.shape, name);
        match index {
            Some(i) => self.storage[i] = value,
            None => {
                self.shape = self.shapes.borrow_mut().with_attribute(self.shape, name);
                self.storage.push(value);
            }
        }
        debug_assert_eq!(
            self.storage.len(),
            self.shapes.borrow().attribute_count(self.shape)
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes.borrow().index_of(self.shape, name).is_some()
    }

    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
