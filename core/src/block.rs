use std::rc::Rc;

use crate::Value;

// AUTHORED BLOCK MODEL
// ================================================================================================

/// The id of an authored block. Ids are opaque strings owned by the authoring layer.
pub type BlockId = Rc<str>;

/// One authored block: an opcode plus named fields, named input sockets, an optional mutation,
/// and next/branch links. Blocks are immutable during execution; an edit invalidates every cached
/// operation built from the script that contains them.
#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    pub opcode: Rc<str>,
    pub fields: Vec<(Rc<str>, Field)>,
    pub inputs: Vec<(Rc<str>, Input)>,
    pub mutation: Option<Rc<Mutation>>,
    pub next: Option<BlockId>,
    pub branches: [Option<BlockId>; 2],
}

/// A named field: a static value, optionally carrying the id of the variable/list/broadcast it
/// refers to.
#[derive(Clone, Debug)]
pub struct Field {
    pub value: Value,
    pub id: Option<Rc<str>>,
}

/// A named input socket: the plugged block (if any) and the shadow block that sits under it.
/// When `block == shadow` the socket holds only its inline default.
#[derive(Clone, Debug, Default)]
pub struct Input {
    pub block: Option<BlockId>,
    pub shadow: Option<BlockId>,
}

/// Procedure metadata attached to definition and call blocks.
#[derive(Clone, Debug, Default)]
pub struct Mutation {
    pub proccode: Option<Rc<str>>,
    pub warp: bool,
    pub argument_ids: Vec<Rc<str>>,
    pub argument_names: Vec<Rc<str>>,
    pub argument_defaults: Vec<Value>,
}

impl Block {
    /// Returns a new block with the given id and opcode and nothing else attached.
    pub fn new(id: impl AsRef<str>, opcode: impl AsRef<str>) -> Self {
        Self {
            id: Rc::from(id.as_ref()),
            opcode: Rc::from(opcode.as_ref()),
            fields: Vec::new(),
            inputs: Vec::new(),
            mutation: None,
            next: None,
            branches: [None, None],
        }
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|(n, _)| &**n == name).map(|(_, input)| input)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| &**n == name).map(|(_, field)| field)
    }

    /// Returns the branch link for `branch_num` in `{1, 2}`.
    pub fn branch(&self, branch_num: u8) -> Option<&BlockId> {
        match branch_num {
            1 => self.branches[0].as_ref(),
            2 => self.branches[1].as_ref(),
            _ => None,
        }
    }

    // BUILDERS
    // --------------------------------------------------------------------------------------------

    pub fn with_input(mut self, name: impl AsRef<str>, input: Input) -> Self {
        self.inputs.push((Rc::from(name.as_ref()), input));
        self
    }

    /// Attaches an input socket holding only a shadow block.
    pub fn with_shadow_input(self, name: impl AsRef<str>, shadow: impl AsRef<str>) -> Self {
        let id: BlockId = Rc::from(shadow.as_ref());
        self.with_input(name, Input { block: Some(id.clone()), shadow: Some(id) })
    }

    /// Attaches an input socket with a reporter plugged over a shadow.
    pub fn with_block_input(self, name: impl AsRef<str>, block: impl AsRef<str>) -> Self {
        self.with_input(name, Input { block: Some(Rc::from(block.as_ref())), shadow: None })
    }

    pub fn with_field(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.fields.push((Rc::from(name.as_ref()), Field { value: value.into(), id: None }));
        self
    }

    pub fn with_ref_field(
        mut self,
        name: impl AsRef<str>,
        id: impl AsRef<str>,
        value: impl Into<Value>,
    ) -> Self {
        self.fields.push((
            Rc::from(name.as_ref()),
            Field { value: value.into(), id: Some(Rc::from(id.as_ref())) },
        ));
        self
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = Some(Rc::new(mutation));
        self
    }

    pub fn with_next(mut self, next: impl AsRef<str>) -> Self {
        self.next = Some(Rc::from(next.as_ref()));
        self
    }

    pub fn with_branch(mut self, branch_num: u8, first: impl AsRef<str>) -> Self {
        debug_assert!(branch_num == 1 || branch_num == 2);
        self.branches[(branch_num - 1) as usize] = Some(Rc::from(first.as_ref()));
        self
    }
}
