//! Lowering of the optimized factory IR to bytecode.
//!
//! The node vocabulary reaching this point is closed: whatever the passes produced either maps
//! to a stack-machine instruction or is a structural wrapper. Jumps are patched to absolute
//! instruction indices.

use blockvm_core::{CachedSequence, OpIdx, Value};

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::code::{BinOp, CodeChunk, DataRef, Inst, UnOp};
use crate::errors::CompileError;

// LOWERER
// ================================================================================================

pub(crate) fn lower(
    arena: &AstArena,
    factory: NodeId,
    seq: &CachedSequence,
    var_refs: Vec<DataRef>,
    list_refs: Vec<DataRef>,
) -> Result<CodeChunk, CompileError> {
    let mut lowerer = Lowerer { arena, seq, insts: Vec::new(), consts: Vec::new() };
    let chunks = arena.child(factory, "chunks");
    for chunk in arena.children(chunks) {
        lowerer.statement(*chunk)?;
    }
    Ok(CodeChunk { insts: lowerer.insts, consts: lowerer.consts, var_refs, list_refs })
}

struct Lowerer<'a> {
    arena: &'a AstArena,
    seq: &'a CachedSequence,
    insts: Vec<Inst>,
    consts: Vec<Value>,
}

impl Lowerer<'_> {
    fn const_index(&mut self, value: Value) -> u32 {
        if let Some(idx) = self.consts.iter().position(|existing| *existing == value) {
            return idx as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    fn op_of(&self, node: NodeId) -> u32 {
        self.arena.op_index(node)
    }

    /// Resolves `aN.KEY` to the bundle slot of op `N`.
    fn bundle_slot(&self, op: u32, key: &str) -> Result<u32, CompileError> {
        self.seq
            .op(OpIdx(op))
            .args
            .position(key)
            .map(|slot| slot as u32)
            .ok_or(CompileError::MalformedPlan(op))
    }

    // STATEMENTS
    // --------------------------------------------------------------------------------------------

    fn statement(&mut self, node: NodeId) -> Result<(), CompileError> {
        match self.arena.kind(node) {
            NodeKind::Chunk => {
                let children: Vec<NodeId> = self.arena.children(node).to_vec();
                for child in children {
                    self.statement(child)?;
                }
            },
            NodeKind::ExpressionStatement => {
                let expr = self.arena.child(node, "expr");
                self.effect(expr)?;
            },
            NodeKind::IfStatement => {
                let test = self.arena.child(node, "test");
                let body = self.arena.child(node, "expr");
                self.expr(test)?;
                let patch = self.insts.len();
                self.insts.push(Inst::JumpIfFalse(u32::MAX));
                self.statement(body)?;
                self.insts[patch] = Inst::JumpIfFalse(self.insts.len() as u32);
            },
            NodeKind::CheckStatus => self.insts.push(Inst::CheckStatus),
            NodeKind::StoreArg => {
                let name = self.arena.child(node, "name");
                let key = self.arena.child(node, "key");
                let expr = self.arena.child(node, "expr");
                self.expr(expr)?;
                let op = parse_binding(self.arena.text(name), 'a')
                    .ok_or(CompileError::MalformedPlan(0))?;
                let slot = self.bundle_slot(op, self.arena.text(key))?;
                self.insts.push(Inst::StoreArg { op, slot });
            },
            NodeKind::StoreVar => {
                let expr = self.arena.child(node, "expr");
                self.expr(expr)?;
                self.insts.push(Inst::Pop);
            },
            _ => {
                self.expr(node)?;
                self.insts.push(Inst::Pop);
            },
        }
        Ok(())
    }

    /// A call in statement position: control helpers, data mutations, commands.
    fn effect(&mut self, node: NodeId) -> Result<(), CompileError> {
        match self.arena.kind(node) {
            NodeKind::CallBlock => {
                self.insts.push(Inst::CallCommand { op: self.op_of(node) });
            },
            NodeKind::CallArgs => {
                // Promise hand-off bookkeeping lives in the executor's call instruction.
            },
            NodeKind::CallFunction => {
                let func = self.arena.child(node, "func");
                let args = self.arena.child(node, "args");
                let arg_nodes: Vec<NodeId> = self.arena.children(args).to_vec();
                let op = self.op_of(node);
                match self.arena.text(func) {
                    "vm_mayContinue" => self.insts.push(Inst::MayContinue { op }),
                    "vm_advance" => self.insts.push(Inst::Advance { op }),
                    "vm_sequenceEnd" => self.insts.push(Inst::SequenceEnd { op }),
                    "vm_doStack" => self.insts.push(Inst::DoStack { op }),
                    "vm_reportHat" => self.insts.push(Inst::ReportHat { op }),
                    "vm_reportStackClick" => self.insts.push(Inst::ReportStackClick { op }),
                    "vm_reportMonitor" => self.insts.push(Inst::ReportMonitor { op }),
                    "vm_castString" => self.insts.push(Inst::CastString { op }),
                    "vm_retire" => self.insts.push(Inst::Retire),
                    "setVar" => {
                        let var = parse_binding(self.arena.text(arg_nodes[0]), 'v')
                            .ok_or(CompileError::MalformedPlan(op))?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::SetVar(var));
                    },
                    "listAdd" | "listDelete" | "listDeleteAll" | "listReplace" => {
                        let list = parse_binding(self.arena.text(arg_nodes[0]), 'l')
                            .ok_or(CompileError::MalformedPlan(op))?;
                        for arg in &arg_nodes[1..] {
                            self.expr(*arg)?;
                        }
                        let inst = match self.arena.text(func) {
                            "listAdd" => Inst::ListAdd(list),
                            "listDelete" => Inst::ListDelete(list),
                            "listDeleteAll" => Inst::ListDeleteAll(list),
                            _ => Inst::ListReplace(list),
                        };
                        self.insts.push(inst);
                    },
                    _ => {
                        self.expr(node)?;
                        self.insts.push(Inst::Pop);
                    },
                }
            },
            _ => {
                self.expr(node)?;
                self.insts.push(Inst::Pop);
            },
        }
        Ok(())
    }

    // EXPRESSIONS
    // --------------------------------------------------------------------------------------------

    fn expr(&mut self, node: NodeId) -> Result<(), CompileError> {
        match self.arena.kind(node) {
            NodeKind::Null => {
                let idx = self.const_index(Value::Num(0.0));
                self.insts.push(Inst::PushConst(idx));
            },
            NodeKind::BooleanLit | NodeKind::NumberLit | NodeKind::StringLit => {
                let value = self.arena.literal_value(node).unwrap_or_default();
                let idx = self.const_index(value);
                self.insts.push(Inst::PushConst(idx));
            },
            NodeKind::Property => {
                let lhs = self.arena.child(node, "lhs");
                let member = self.arena.child(node, "member");
                let lhs_name = self.arena.text(lhs);
                let member_name = self.arena.text(member);
                if let Some(var) = parse_binding(lhs_name, 'v') {
                    self.insts.push(Inst::PushVar(var));
                } else if let Some(op) = parse_binding(lhs_name, 'a') {
                    let slot = self.bundle_slot(op, member_name)?;
                    self.insts.push(Inst::PushArg { op, slot });
                } else {
                    let idx = self.const_index(Value::Num(0.0));
                    self.insts.push(Inst::PushConst(idx));
                }
            },
            NodeKind::BinaryOperator => {
                let operator = self.arena.child(node, "operator");
                let input1 = self.arena.child(node, "input1");
                let input2 = self.arena.child(node, "input2");
                self.expr(input1)?;
                self.expr(input2)?;
                let bin_op = match self.arena.text(operator) {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    "%" => BinOp::Mod,
                    "<" => BinOp::Lt,
                    ">" => BinOp::Gt,
                    "===" => BinOp::Eq,
                    "&&" => BinOp::And,
                    "||" => BinOp::Or,
                    _ => return Err(CompileError::MalformedPlan(0)),
                };
                self.insts.push(Inst::BinOp(bin_op));
            },
            NodeKind::Cast => {
                let expect = self.arena.child(node, "expect");
                let value = self.arena.child(node, "value");
                self.expr(value)?;
                let un_op = match self.arena.text(expect) {
                    "toNumber" => UnOp::ToNumber,
                    "toBoolean" => UnOp::ToBoolean,
                    "toText" => UnOp::ToText,
                    "not" => UnOp::Not,
                    "round" => UnOp::Round,
                    "math_abs" => UnOp::Abs,
                    "math_floor" => UnOp::Floor,
                    "math_ceiling" => UnOp::Ceiling,
                    "math_sqrt" => UnOp::Sqrt,
                    "math_sin" => UnOp::Sin,
                    "math_cos" => UnOp::Cos,
                    "math_tan" => UnOp::Tan,
                    "math_asin" => UnOp::Asin,
                    "math_acos" => UnOp::Acos,
                    "math_atan" => UnOp::Atan,
                    "math_ln" => UnOp::Ln,
                    "math_log" => UnOp::Log,
                    "math_exp" => UnOp::Exp,
                    "math_pow10" => UnOp::Pow10,
                    _ => return Err(CompileError::MalformedPlan(0)),
                };
                self.insts.push(Inst::UnOp(un_op));
            },
            NodeKind::CastArgs => {
                let expect = self.arena.child(node, "expect");
                let name = self.arena.child(node, "name");
                let key = self.arena.child(node, "key");
                let op = parse_binding(self.arena.text(name), 'a')
                    .ok_or(CompileError::MalformedPlan(0))?;
                let slot = self.bundle_slot(op, self.arena.text(key))?;
                self.insts.push(Inst::PushArg { op, slot });
                if self.arena.text(expect) == "toNumber" {
                    self.insts.push(Inst::UnOp(UnOp::ToNumber));
                }
            },
            NodeKind::IfElse => {
                let test = self.arena.child(node, "test");
                let if_true = self.arena.child(node, "ifTrue");
                let if_false = self.arena.child(node, "ifFalse");
                self.expr(test)?;
                let to_false = self.insts.len();
                self.insts.push(Inst::JumpIfFalse(u32::MAX));
                self.expr(if_true)?;
                let to_end = self.insts.len();
                self.insts.push(Inst::Jump(u32::MAX));
                self.insts[to_false] = Inst::JumpIfFalse(self.insts.len() as u32);
                self.expr(if_false)?;
                self.insts[to_end] = Inst::Jump(self.insts.len() as u32);
            },
            NodeKind::CallBlock => {
                self.insts.push(Inst::CallPrimitive { op: self.op_of(node) });
            },
            NodeKind::CallFunction => {
                let func = self.arena.child(node, "func");
                let args = self.arena.child(node, "args");
                let arg_nodes: Vec<NodeId> = self.arena.children(args).to_vec();
                let op = self.op_of(node);
                match self.arena.text(func) {
                    "compare" => {
                        self.expr(arg_nodes[0])?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::BinOp(BinOp::Compare));
                    },
                    "join" => {
                        self.expr(arg_nodes[0])?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::BinOp(BinOp::Join));
                    },
                    "letterOf" => {
                        self.expr(arg_nodes[0])?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::BinOp(BinOp::LetterOf));
                    },
                    "textContains" => {
                        self.expr(arg_nodes[0])?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::BinOp(BinOp::TextContains));
                    },
                    "textLength" => {
                        self.expr(arg_nodes[0])?;
                        self.insts.push(Inst::UnOp(UnOp::TextLength));
                    },
                    "getParam" => {
                        let name = self
                            .arena
                            .literal_value(arg_nodes[0])
                            .ok_or(CompileError::MalformedPlan(op))?;
                        let default = self
                            .arena
                            .literal_value(arg_nodes[1])
                            .ok_or(CompileError::MalformedPlan(op))?;
                        let name = self.const_index(name);
                        let default = self.const_index(default);
                        self.insts.push(Inst::PushParam { name, default });
                    },
                    "listItem" => {
                        let list = parse_binding(self.arena.text(arg_nodes[0]), 'l')
                            .ok_or(CompileError::MalformedPlan(op))?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::PushListItem(list));
                    },
                    "listLength" => {
                        let list = parse_binding(self.arena.text(arg_nodes[0]), 'l')
                            .ok_or(CompileError::MalformedPlan(op))?;
                        self.insts.push(Inst::PushListLength(list));
                    },
                    "listContains" => {
                        let list = parse_binding(self.arena.text(arg_nodes[0]), 'l')
                            .ok_or(CompileError::MalformedPlan(op))?;
                        self.expr(arg_nodes[1])?;
                        self.insts.push(Inst::PushListContains(list));
                    },
                    _ => return Err(CompileError::MalformedPlan(op)),
                }
            },
            _ => {
                let idx = self.const_index(Value::Num(0.0));
                self.insts.push(Inst::PushConst(idx));
            },
        }
        Ok(())
    }
}

// BINDING NAMES
// ================================================================================================

/// Parses a binding name of the shape `<prefix><index>`.
fn parse_binding(name: &str, prefix: char) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?;
    rest.parse::<u32>().ok()
}
