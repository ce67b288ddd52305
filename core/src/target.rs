use std::cell::{Ref, RefCell};
use std::rc::Rc;

use fnv::FnvHashMap;

use crate::Value;

// TARGET
// ================================================================================================

/// Lists refuse to grow past this many items.
pub const LIST_ITEM_LIMIT: usize = 200_000;

/// The data store the data primitives (and the compiler's inlined variable accesses) operate on.
///
/// A target owns its variables and lists; sprite-local lookups fall back to the stage. Everything
/// here is single-threaded shared state, hence `Rc`/`RefCell`.
#[derive(Debug)]
pub struct Target {
    pub name: Rc<str>,
    pub is_stage: bool,
    variables: RefCell<FnvHashMap<Rc<str>, Rc<Variable>>>,
    lists: RefCell<FnvHashMap<Rc<str>, Rc<List>>>,
}

#[derive(Debug)]
pub struct Variable {
    pub id: Rc<str>,
    pub name: Rc<str>,
    pub value: RefCell<Value>,
    pub is_cloud: bool,
}

#[derive(Debug)]
pub struct List {
    pub id: Rc<str>,
    pub name: Rc<str>,
    pub items: RefCell<Vec<Value>>,
}

impl Target {
    pub fn new(name: impl AsRef<str>, is_stage: bool) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name.as_ref()),
            is_stage,
            variables: RefCell::new(FnvHashMap::default()),
            lists: RefCell::new(FnvHashMap::default()),
        })
    }

    // VARIABLES
    // --------------------------------------------------------------------------------------------

    pub fn variable(&self, id: &str) -> Option<Rc<Variable>> {
        self.variables.borrow().get(id).cloned()
    }

    /// Creates a variable on this target. An existing variable with the same id is replaced.
    pub fn create_variable(&self, id: impl AsRef<str>, name: impl AsRef<str>, value: Value) -> Rc<Variable> {
        self.create_variable_with_cloud(id, name, value, false)
    }

    pub fn create_variable_with_cloud(
        &self,
        id: impl AsRef<str>,
        name: impl AsRef<str>,
        value: Value,
        is_cloud: bool,
    ) -> Rc<Variable> {
        let id: Rc<str> = Rc::from(id.as_ref());
        let variable = Rc::new(Variable {
            id: id.clone(),
            name: Rc::from(name.as_ref()),
            value: RefCell::new(value),
            is_cloud,
        });
        self.variables.borrow_mut().insert(id, variable.clone());
        variable
    }

    // LISTS
    // --------------------------------------------------------------------------------------------

    pub fn list(&self, id: &str) -> Option<Rc<List>> {
        self.lists.borrow().get(id).cloned()
    }

    pub fn create_list(&self, id: impl AsRef<str>, name: impl AsRef<str>) -> Rc<List> {
        let id: Rc<str> = Rc::from(id.as_ref());
        let list = Rc::new(List {
            id: id.clone(),
            name: Rc::from(name.as_ref()),
            items: RefCell::new(Vec::new()),
        });
        self.lists.borrow_mut().insert(id, list.clone());
        list
    }
}

impl Variable {
    pub fn get(&self) -> Ref<'_, Value> {
        self.value.borrow()
    }

    pub fn set(&self, value: Value) {
        *self.value.borrow_mut() = value;
    }
}

impl List {
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Appends an item, refusing past [`LIST_ITEM_LIMIT`].
    pub fn push(&self, value: Value) {
        let mut items = self.items.borrow_mut();
        if items.len() < LIST_ITEM_LIMIT {
            items.push(value);
        }
    }
}

// LOOKUP HELPERS
// ================================================================================================

/// Looks a variable up on `target`, falling back to `stage`, creating it on `target` when neither
/// has it. Matches by id first, then by name.
pub fn lookup_or_create_variable(
    target: &Rc<Target>,
    stage: Option<&Rc<Target>>,
    id: &str,
    name: &str,
) -> Rc<Variable> {
    if let Some(variable) = target.variable(id) {
        return variable;
    }
    if let Some(stage) = stage {
        if let Some(variable) = stage.variable(id) {
            return variable;
        }
    }
    target.create_variable(id, name, Value::Num(0.0))
}

/// List analog of [`lookup_or_create_variable`].
pub fn lookup_or_create_list(
    target: &Rc<Target>,
    stage: Option<&Rc<Target>>,
    id: &str,
    name: &str,
) -> Rc<List> {
    if let Some(list) = target.list(id) {
        return list;
    }
    if let Some(stage) = stage {
        if let Some(list) = stage.list(id) {
            return list;
        }
    }
    target.create_list(id, name)
}
