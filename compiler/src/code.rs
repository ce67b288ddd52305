//! The compiled artifact: a compact bytecode program executed by the processor's switch loop.
//!
//! The program shares the cached sequence's argument bundles and primitive handles, so a
//! compiled run is observationally identical to the interpreted one; inlined accesses (variables,
//! lists, math, argument reporters) bypass the registry entirely.

use std::rc::Rc;

use blockvm_core::Value;

// INSTRUCTIONS
// ================================================================================================

/// Binary operations over the value stack. Comparison pushes `-1 | 0 | 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Compare,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Join,
    LetterOf,
    TextContains,
}

/// Unary operations over the value stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnOp {
    ToNumber,
    ToBoolean,
    ToText,
    Not,
    Round,
    Abs,
    Floor,
    Ceiling,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ln,
    Log,
    Exp,
    Pow10,
    TextLength,
}

/// One bytecode instruction. `op` fields index into the owning sequence's op arena; `var`/`list`
/// fields index the hoisted reference tables of the [`CodeChunk`].
#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    PushConst(u32),
    /// Read a slot of an op's argument bundle.
    PushArg { op: u32, slot: u32 },
    PushVar(u32),
    SetVar(u32),
    PushParam { name: u32, default: u32 },
    ListAdd(u32),
    ListDelete(u32),
    ListDeleteAll(u32),
    ListReplace(u32),
    PushListItem(u32),
    PushListLength(u32),
    PushListContains(u32),
    BinOp(BinOp),
    UnOp(UnOp),
    /// Pop into an op's argument bundle slot.
    StoreArg { op: u32, slot: u32 },
    /// Call the op's primitive and push its report.
    CallPrimitive { op: u32 },
    /// Call the op's primitive and discard its report.
    CallCommand { op: u32 },
    CastString { op: u32 },
    DoStack { op: u32 },
    ReportHat { op: u32 },
    ReportStackClick { op: u32 },
    ReportMonitor { op: u32 },
    /// The generic command tail: expect-check, advance or mark the boundary.
    MayContinue { op: u32 },
    /// Statically-safe command tail: advance straight to the chain successor.
    Advance { op: u32 },
    /// Statically-known sequence boundary.
    SequenceEnd { op: u32 },
    CheckStatus,
    Jump(u32),
    JumpIfFalse(u32),
    Pop,
    Retire,
}

// CODE CHUNK
// ================================================================================================

/// A hoisted variable or list reference, resolved against the running target (with stage
/// fallback) once per entry instead of per access.
#[derive(Clone, Debug)]
pub struct DataRef {
    pub id: Rc<str>,
    pub name: Rc<str>,
    /// True when writes must raise a cloud notification.
    pub cloud_check: bool,
}

/// The compiled program for one cached sequence.
#[derive(Debug)]
pub struct CodeChunk {
    pub insts: Vec<Inst>,
    pub consts: Vec<Value>,
    pub var_refs: Vec<DataRef>,
    pub list_refs: Vec<DataRef>,
}

/// A compiled sequence bundle: the executable chunk plus the printed factory body kept for
/// diagnostics.
#[derive(Debug)]
pub struct CompiledScript {
    pub name: String,
    pub code: CodeChunk,
    pub source: String,
}
