use std::collections::{HashMap, HashSet};

use super::{DataType, ElementClass, SchemaError, CRC32_ID, VOID_ID};

///
/// Where a master element renders its CRC-32 pseudo-element relative to its children.
///
/// This is a format convention: Matroska requires the checksum to be the first child, which is also the default.
///
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum ChecksumPlacement {
    #[default]
    First,
    Last,
}

///
/// A single legal child of a master element class.
///
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ChildRule {
    pub id: u64,
    pub mandatory: bool,
    pub has_default: bool,
    pub max_occurs: Option<usize>,
}

///
/// The semantic context of a master element class: its legal children in canonical sibling order.
///
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Context {
    id: u64,
    children: Vec<ChildRule>,
}

impl Context {
    pub fn id(&self) -> u64 {
        self.id
    }

    ///
    /// Children in canonical sibling order.
    ///
    pub fn children(&self) -> &[ChildRule] {
        &self.children
    }

    pub fn rule(&self, id: u64) -> Option<&ChildRule> {
        self.children.iter().find(|rule| rule.id == id)
    }

    ///
    /// Sibling priority of a child class.  Lower values sort first; ids not declared in this context sort last.
    ///
    pub fn priority(&self, id: u64) -> usize {
        self.children.iter().position(|rule| rule.id == id).unwrap_or(usize::MAX)
    }
}

///
/// Immutable description of every element class in a format.
///
/// Registries are built once with a [`SchemaBuilder`] before any document tree exists and are then shared by reference for the lifetime of the process.  Use [`SchemaRegistry::leak`] or a `static` [`std::sync::OnceLock`] to obtain the `&'static` reference that master elements hold.
///
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    classes: HashMap<u64, ElementClass>,
    contexts: HashMap<u64, Context>,
    roots: Vec<u64>,
    globals: Vec<u64>,
    checksum_placement: ChecksumPlacement,
}

impl SchemaRegistry {
    pub fn class(&self, id: u64) -> Option<&ElementClass> {
        self.classes.get(&id)
    }

    pub fn data_type(&self, id: u64) -> Option<DataType> {
        self.classes.get(&id).map(|class| class.data_type)
    }

    ///
    /// Human readable name of a class.  Ids that aren't in the schema are rendered in hex.
    ///
    pub fn name(&self, id: u64) -> String {
        match self.classes.get(&id) {
            Some(class) => class.name.clone(),
            None => format!("{:#x}", id),
        }
    }

    ///
    /// The context of a master element class, `None` if `id` isn't a master in this schema.
    ///
    pub fn context(&self, id: u64) -> Option<&Context> {
        self.contexts.get(&id)
    }

    pub fn parent_of(&self, id: u64) -> Option<u64> {
        self.classes.get(&id).and_then(|class| class.parent)
    }

    ///
    /// Returns whether `child` is legal directly under the master class `master`.  Global elements are legal everywhere.
    ///
    pub fn allows(&self, master: u64, child: u64) -> bool {
        self.is_global(child) || self.contexts.get(&master).map_or(false, |context| context.rule(child).is_some())
    }

    pub fn is_root(&self, id: u64) -> bool {
        self.roots.contains(&id)
    }

    pub fn is_global(&self, id: u64) -> bool {
        self.globals.contains(&id)
    }

    pub fn roots(&self) -> &[u64] {
        &self.roots
    }

    pub fn checksum_placement(&self) -> ChecksumPlacement {
        self.checksum_placement
    }

    ///
    /// Moves the registry to the heap for the rest of the process and returns the `'static` reference master elements are bound to.
    ///
    pub fn leak(self) -> &'static SchemaRegistry {
        Box::leak(Box::new(self))
    }
}

///
/// Collects [`ElementClass`] declarations and validates them into a [`SchemaRegistry`].
///
/// The EBML global elements Void and CRC-32 are always declared.  Sibling order is the order in which children are passed to [`SchemaBuilder::element`].
///
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    classes: Vec<ElementClass>,
    checksum_placement: ChecksumPlacement,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        SchemaBuilder::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder {
            classes: vec![
                ElementClass::new(VOID_ID, "Void", DataType::Binary).global(),
                ElementClass::new(CRC32_ID, "CRC-32", DataType::Binary).global(),
            ],
            checksum_placement: ChecksumPlacement::default(),
        }
    }

    pub fn element(mut self, class: ElementClass) -> Self {
        self.classes.push(class);
        self
    }

    pub fn checksum_placement(mut self, placement: ChecksumPlacement) -> Self {
        self.checksum_placement = placement;
        self
    }

    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut classes: HashMap<u64, ElementClass> = HashMap::with_capacity(self.classes.len());
        let mut order: Vec<u64> = Vec::with_capacity(self.classes.len());
        for class in self.classes {
            if !is_valid_id(class.id) {
                return Err(SchemaError::InvalidId(class.id));
            }
            if let Some(default) = &class.default {
                if class.data_type == DataType::Master || default.data_type() != class.data_type {
                    return Err(SchemaError::DefaultMismatch { id: class.id, expected: class.data_type, found: default.data_type() });
                }
            }
            let id = class.id;
            if classes.insert(id, class).is_some() {
                return Err(SchemaError::DuplicateId(id));
            }
            order.push(id);
        }

        for id in &order {
            let class = &classes[id];
            if let Some(parent) = class.parent {
                match classes.get(&parent) {
                    None => return Err(SchemaError::MissingParent { id: *id, parent }),
                    Some(p) if p.data_type != DataType::Master => return Err(SchemaError::ParentNotMaster { id: *id, parent }),
                    Some(_) => {},
                }
            }

            let mut visited = HashSet::new();
            let mut current = Some(*id);
            while let Some(cur) = current {
                if !visited.insert(cur) {
                    return Err(SchemaError::CircularParent(*id));
                }
                current = classes.get(&cur).and_then(|c| c.parent);
            }
        }

        let mut contexts: HashMap<u64, Context> = order.iter()
            .filter(|id| classes[*id].data_type == DataType::Master)
            .map(|id| (*id, Context { id: *id, children: Vec::new() }))
            .collect();

        for id in &order {
            let class = &classes[id];
            if let Some(context) = class.parent.and_then(|parent| contexts.get_mut(&parent)) {
                context.children.push(ChildRule {
                    id: class.id,
                    mandatory: class.mandatory,
                    has_default: class.has_default(),
                    max_occurs: class.max_occurs,
                });
            }
        }

        let roots = order.iter().copied().filter(|id| classes[id].parent.is_none() && !classes[id].global).collect();
        let globals = order.iter().copied().filter(|id| classes[id].global).collect();

        Ok(SchemaRegistry {
            classes,
            contexts,
            roots,
            globals,
            checksum_placement: self.checksum_placement,
        })
    }
}

///
/// An EBML id keeps its vint marker bit and is at most 4 bytes long.  All-ones ids are reserved.
///
pub fn is_valid_id(id: u64) -> bool {
    if id == 0 || id > 0xFFFF_FFFF {
        return false;
    }
    let length = (64 - id.leading_zeros() as usize + 7) / 8;
    let marker = 1u64 << (8 * length - length);
    let value_mask = marker - 1;
    id & !value_mask == marker && id & value_mask != value_mask
}
