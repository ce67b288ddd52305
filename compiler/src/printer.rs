//! Renders the optimized factory IR as a host-language function body.
//!
//! The printed text is the diagnostic artifact of a compile: the executable form is the lowered
//! bytecode, but the factory body is what humans (and the compiler's own tests) read. Identifier
//! renames from the mangler apply here and only here.

use std::rc::Rc;

use fnv::FnvHashMap;
use itertools::Itertools;

use blockvm_core::cast;

use crate::ast::{AstArena, NodeId, NodeKind, Payload};

// PRINTER
// ================================================================================================

pub(crate) struct Printer<'a> {
    arena: &'a AstArena,
    renames: &'a FnvHashMap<Rc<str>, String>,
}

impl<'a> Printer<'a> {
    pub(crate) fn new(arena: &'a AstArena, renames: &'a FnvHashMap<Rc<str>, String>) -> Self {
        Self { arena, renames }
    }

    pub(crate) fn print_factory(&self, factory: NodeId) -> String {
        let debug_name = self.arena.child(factory, "debugName");
        let bindings = self.arena.child(factory, "bindings");
        let chunks = self.arena.child(factory, "chunks");
        let name = self.arena.text(debug_name).to_string();

        let mut out = String::new();
        out.push_str(&format!("function factory_{name}(bindings) {{\n"));
        for binding in self.arena.children(bindings).iter().unique_by(|b| self.arena.text(**b)) {
            let original = self.arena.text(*binding);
            let renamed = self.rename(original);
            out.push_str(&format!("  const {renamed} = bindings.{original};\n"));
        }
        out.push_str(&format!("  return function {name}() {{\n"));
        for chunk in self.arena.children(chunks) {
            for statement in self.arena.children(*chunk) {
                out.push_str("    ");
                out.push_str(&self.statement(*statement));
                out.push('\n');
            }
        }
        out.push_str("  };\n}\n");
        out
    }

    fn rename(&self, name: &str) -> String {
        self.renames.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    // STATEMENTS
    // --------------------------------------------------------------------------------------------

    fn statement(&self, node: NodeId) -> String {
        match self.arena.kind(node) {
            NodeKind::ExpressionStatement => {
                let expr = self.arena.child(node, "expr");
                format!("{};", self.expr(expr))
            },
            NodeKind::IfStatement => {
                let test = self.arena.child(node, "test");
                let expr = self.arena.child(node, "expr");
                format!("if ({}) {{ {} }}", self.expr(test), self.statement(expr))
            },
            NodeKind::CheckStatus => {
                format!("if ({}.status !== 0) return;", self.rename("thread"))
            },
            NodeKind::StoreArg => {
                let name = self.arena.child(node, "name");
                let key = self.arena.child(node, "key");
                let expr = self.arena.child(node, "expr");
                format!(
                    "{}{} = {};",
                    self.expr(name),
                    member_access(self.arena.text(key)),
                    self.expr(expr)
                )
            },
            NodeKind::StoreVar => {
                let name = self.arena.child(node, "name");
                let expr = self.arena.child(node, "expr");
                format!("{} = {};", self.expr(name), self.expr(expr))
            },
            NodeKind::Chunk => self
                .arena
                .children(node)
                .iter()
                .map(|child| self.statement(*child))
                .join(" "),
            _ => format!("{};", self.expr(node)),
        }
    }

    // EXPRESSIONS
    // --------------------------------------------------------------------------------------------

    fn expr(&self, node: NodeId) -> String {
        match self.arena.kind(node) {
            NodeKind::Null => "null".to_string(),
            NodeKind::BooleanLit => match &self.arena.node(node).payload {
                Payload::Bool(true) => "true".to_string(),
                _ => "false".to_string(),
            },
            NodeKind::NumberLit => cast::number_to_text(self.arena.num(node)),
            NodeKind::StringLit => quote(self.arena.text(node)),
            NodeKind::ArrayLit => {
                let items =
                    self.arena.children(node).iter().map(|item| self.expr(*item)).join(", ");
                format!("[{items}]")
            },
            NodeKind::Id => self.rename(self.arena.text(node)),
            NodeKind::Token | NodeKind::Whitespace => self.arena.text(node).to_string(),
            NodeKind::Property => {
                let lhs = self.arena.child(node, "lhs");
                let member = self.arena.child(node, "member");
                format!("{}{}", self.expr(lhs), member_access(self.arena.text(member)))
            },
            NodeKind::BinaryOperator => {
                let operator = self.arena.child(node, "operator");
                let lhs = self.arena.child(node, "input1");
                let rhs = self.arena.child(node, "input2");
                format!(
                    "({} {} {})",
                    self.expr(lhs),
                    self.arena.text(operator),
                    self.expr(rhs)
                )
            },
            NodeKind::Cast => {
                let expect = self.arena.child(node, "expect");
                let value = self.arena.child(node, "value");
                format!("{}({})", self.rename(self.arena.text(expect)), self.expr(value))
            },
            NodeKind::Cast2 => {
                let expect = self.arena.child(node, "expect");
                let input1 = self.arena.child(node, "input1");
                let input2 = self.arena.child(node, "input2");
                format!(
                    "{}({}, {})",
                    self.rename(self.arena.text(expect)),
                    self.expr(input1),
                    self.expr(input2)
                )
            },
            NodeKind::CastArgs => {
                let expect = self.arena.child(node, "expect");
                let name = self.arena.child(node, "name");
                let key = self.arena.child(node, "key");
                format!(
                    "{}({}{})",
                    self.rename(self.arena.text(expect)),
                    self.expr(name),
                    member_access(self.arena.text(key))
                )
            },
            NodeKind::IfElse => {
                let test = self.arena.child(node, "test");
                let if_true = self.arena.child(node, "ifTrue");
                let if_false = self.arena.child(node, "ifFalse");
                format!(
                    "({} ? {} : {})",
                    self.expr(test),
                    self.expr(if_true),
                    self.expr(if_false)
                )
            },
            NodeKind::CallBlock => {
                let context = self.arena.child(node, "context");
                let func = self.arena.child(node, "func");
                let args = self.arena.child(node, "args");
                format!(
                    "{}.call({}, {})",
                    self.expr(func),
                    self.expr(context),
                    self.expr(args)
                )
            },
            NodeKind::CallArgs => {
                let func = self.arena.child(node, "func");
                let args = self.arena.child(node, "args");
                format!("{}({})", self.expr(func), self.expr(args))
            },
            NodeKind::CallFunction => {
                let func = self.arena.child(node, "func");
                let args = self.arena.child(node, "args");
                let rendered =
                    self.arena.children(args).iter().map(|arg| self.expr(*arg)).join(", ");
                format!("{}({})", self.expr(func), rendered)
            },
            _ => String::new(),
        }
    }
}

// LEXICAL HELPERS
// ================================================================================================

fn ident_safe(s: &str) -> bool {
    !s.is_empty()
        && !s.as_bytes()[0].is_ascii_digit()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

fn member_access(member: &str) -> String {
    if ident_safe(member) {
        format!(".{member}")
    } else {
        format!("[{}]", quote(member))
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
