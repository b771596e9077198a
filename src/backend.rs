//! The backend contract (spec.md §6) and a bundled reference
//! implementation that renders pseudo-assembly and Graphviz `dot`.
//!
//! Real instruction selection and object emission are external-sink work
//! this crate deliberately stops short of (spec.md §1: "the compiler ends
//! at a backend contract"); [`TextBackend::emit_object`] returns
//! [`BackendError::Unimplemented`] rather than faking machine code.

use crate::context::TranslationUnit;
use crate::ir::{Definition, ImmValue, Op, OperandKind, Opcode};
use crate::types::{IntKind, Type, TypeId};
use std::fmt::Write as _;

#[derive(Debug)]
pub enum BackendError {
    /// A `Definition` the backend can't render, e.g. refers to a block id
    /// outside its own arena.
    Logic(String),
    Format(std::fmt::Error),
    /// Work this backend intentionally does not implement.
    Unimplemented(&'static str),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Logic(s) => write!(f, "{}", s),
            BackendError::Format(e) => write!(f, "IR rendering error: {}", e),
            BackendError::Unimplemented(what) => write!(f, "{} is not implemented by this backend", what),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::fmt::Error> for BackendError {
    fn from(e: std::fmt::Error) -> Self {
        BackendError::Format(e)
    }
}

/// What every backend must provide to consume this crate's IR (spec.md §6:
/// "a traversal of all reachable blocks, in any order reachable from the
/// entry, plus enough type/symbol metadata to pick operand representations").
pub trait Backend {
    fn emit_assembly(&self, tu: &TranslationUnit) -> Result<String, BackendError>;
    fn emit_dot(&self, tu: &TranslationUnit) -> Result<String, BackendError>;
    fn emit_object(&self, tu: &TranslationUnit) -> Result<Vec<u8>, BackendError>;
}

/// Reference backend: renders three-address ops as a readable pseudo-asm
/// listing, or the same CFG as a Graphviz `dot` graph. Ships with the
/// compiler so `-S`/`--emit-dot` work without an external assembler.
#[derive(Debug, Default)]
pub struct TextBackend;

impl TextBackend {
    pub fn new() -> Self {
        TextBackend
    }
}

impl Backend for TextBackend {
    fn emit_assembly(&self, tu: &TranslationUnit) -> Result<String, BackendError> {
        let mut out = String::new();
        for def in &tu.definitions {
            let name = tu.interner.resolve(tu.symbols.ordinary.get(def.symbol).name);
            writeln!(out, "{}:", name)?;
            for id in def.reachable_blocks() {
                let block = def.block(id);
                writeln!(out, "{}:", block.label)?;
                for op in &block.ops {
                    writeln!(out, "    {}", render_op(tu, op))?;
                }
                match (block.left, block.right) {
                    (Some(l), Some(r)) => {
                        let cond = block.terminator.as_ref().map(|t| render_operand(tu, t)).unwrap_or_default();
                        writeln!(out, "    brcond {}, {}, {}", cond, def.block(r).label, def.block(l).label)?;
                    }
                    (Some(l), None) => writeln!(out, "    jmp {}", def.block(l).label)?,
                    (None, _) => {
                        let ret = block.terminator.as_ref().map(|t| render_operand(tu, t)).unwrap_or_else(|| "void".to_string());
                        writeln!(out, "    ret {}", ret)?;
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(out)
    }

    fn emit_dot(&self, tu: &TranslationUnit) -> Result<String, BackendError> {
        let mut out = String::new();
        writeln!(out, "digraph cfg {{")?;
        for def in &tu.definitions {
            let name = tu.interner.resolve(tu.symbols.ordinary.get(def.symbol).name);
            writeln!(out, "  subgraph cluster_{} {{", sanitize(name))?;
            writeln!(out, "    label = \"{}\";", name)?;
            for id in def.reachable_blocks() {
                let block = def.block(id);
                let node = format!("{}_{}", sanitize(name), sanitize(&block.label));
                let ops_label = block
                    .ops
                    .iter()
                    .map(|op| render_op(tu, op))
                    .collect::<Vec<_>>()
                    .join("\\n");
                writeln!(out, "    {} [shape=box, label=\"{}\\n{}\"];", node, block.label, ops_label)?;
                if let Some(l) = block.left {
                    writeln!(out, "    {} -> {}_{};", node, sanitize(name), sanitize(&def.block(l).label))?;
                }
                if let Some(r) = block.right {
                    writeln!(out, "    {} -> {}_{} [label=\"true\"];", node, sanitize(name), sanitize(&def.block(r).label))?;
                }
            }
            writeln!(out, "  }}")?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    fn emit_object(&self, _tu: &TranslationUnit) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::Unimplemented("object-file emission"))
    }
}

fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

fn render_op(tu: &TranslationUnit, op: &Op) -> String {
    let mut s = String::new();
    if let Some(dst) = &op.dst {
        s.push_str(&render_operand(tu, dst));
        s.push_str(" = ");
    }
    s.push_str(opcode_mnemonic(op.opcode));
    if op.opcode == Opcode::Call {
        if let Some(callee) = op.callee {
            s.push(' ');
            s.push_str(tu.interner.resolve(tu.symbols.ordinary.get(callee).name));
        }
        s.push_str(" (");
        s.push_str(
            &op.call_args
                .iter()
                .map(|a| render_operand(tu, a))
                .collect::<Vec<_>>()
                .join(", "),
        );
        s.push(')');
        return s;
    }
    if let Some(src1) = &op.src1 {
        s.push(' ');
        s.push_str(&render_operand(tu, src1));
    }
    if let Some(src2) = &op.src2 {
        s.push_str(", ");
        s.push_str(&render_operand(tu, src2));
    }
    s
}

fn opcode_mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Load => "load",
        Opcode::Store => "store",
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div => "div",
        Opcode::Mod => "mod",
        Opcode::FAdd => "fadd",
        Opcode::FSub => "fsub",
        Opcode::FMul => "fmul",
        Opcode::FDiv => "fdiv",
        Opcode::BitAnd => "and",
        Opcode::BitOr => "or",
        Opcode::BitXor => "xor",
        Opcode::Shl => "shl",
        Opcode::Shr => "shr",
        Opcode::CmpEq => "cmpeq",
        Opcode::CmpNe => "cmpne",
        Opcode::CmpLt => "cmplt",
        Opcode::CmpLe => "cmple",
        Opcode::CmpGt => "cmpgt",
        Opcode::CmpGe => "cmpge",
        Opcode::Convert(_) => "convert",
        Opcode::AddressOf => "addrof",
        Opcode::Deref => "deref",
        Opcode::Call => "call",
        Opcode::Return => "ret",
        Opcode::Param => "param",
        Opcode::Memcpy => "memcpy",
        Opcode::Alloca => "alloca",
        Opcode::VaStart => "va_start",
        Opcode::VaArg => "va_arg",
    }
}

fn render_operand(tu: &TranslationUnit, operand: &crate::ir::Operand) -> String {
    match &operand.kind {
        OperandKind::Immediate(ImmValue::Int(v)) => v.to_string(),
        OperandKind::Immediate(ImmValue::UInt(v)) => format!("{}u", v),
        OperandKind::Immediate(ImmValue::Float(v)) => v.to_string(),
        OperandKind::Direct(sym) => format!("%{}", tu.interner.resolve(tu.symbols.ordinary.get(*sym).name)),
        OperandKind::Indirect { base, offset, .. } => {
            format!("[%{}+{}]", tu.interner.resolve(tu.symbols.ordinary.get(*base).name), offset)
        }
        OperandKind::AddressOf(sym) => format!("&%{}", tu.interner.resolve(tu.symbols.ordinary.get(*sym).name)),
        OperandKind::StringLiteral(sym) => format!("{:?}", tu.interner.resolve(*sym)),
        OperandKind::Void => "void".to_string(),
    }
}

/// Renders a type handle back to a C spelling, used only for diagnostics
/// and pseudo-asm comments (spec.md has no canonical type-printer; this is
/// a convenience, not part of the type identity machinery in `types.rs`).
pub fn type_name(tu: &TranslationUnit, ty: TypeId) -> String {
    match tu.types.get(ty) {
        Type::Void => "void".to_string(),
        Type::Int(kind) => int_kind_name(*kind).to_string(),
        Type::Float(crate::types::FloatKind::Float) => "float".to_string(),
        Type::Float(crate::types::FloatKind::Double) => "double".to_string(),
        Type::Float(crate::types::FloatKind::LongDouble) => "long double".to_string(),
        Type::Pointer(inner) => format!("{}*", type_name(tu, *inner)),
        Type::Array(elem, Some(n)) => format!("{}[{}]", type_name(tu, *elem), n),
        Type::Array(elem, None) => format!("{}[]", type_name(tu, *elem)),
        Type::Function { ret, params, variadic } => {
            let mut p: Vec<String> = params.iter().map(|t| type_name(tu, *t)).collect();
            if *variadic {
                p.push("...".to_string());
            }
            format!("{}({})", type_name(tu, *ret), p.join(", "))
        }
        Type::Struct(idx) => format!("struct#{}", idx),
        Type::Union(idx) => format!("union#{}", idx),
        Type::Enum(idx) => format!("enum#{}", idx),
        Type::Qualified(inner, _) => type_name(tu, *inner),
    }
}

fn int_kind_name(kind: IntKind) -> &'static str {
    match kind {
        IntKind::Bool => "_Bool",
        IntKind::Char => "char",
        IntKind::SChar => "signed char",
        IntKind::UChar => "unsigned char",
        IntKind::Short => "short",
        IntKind::UShort => "unsigned short",
        IntKind::Int => "int",
        IntKind::UInt => "unsigned int",
        IntKind::Long => "long",
        IntKind::ULong => "unsigned long",
        IntKind::LongLong => "long long",
        IntKind::ULongLong => "unsigned long long",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::ir::{Definition, Operand};
    use crate::location::{FileId, SourceLocation};
    use crate::symtab::{Linkage, StorageClass, SymKind};

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    fn sample_tu() -> TranslationUnit {
        let config = Config::default();
        let mut tu = TranslationUnit::new(&config);
        let name = tu.interner.intern("main");
        let sym = tu.symbols.ordinary.add(name, tu.types.int_ty, SymKind::Static, Linkage::External, StorageClass::None, loc());
        let mut def = Definition::new(sym);
        def.push_op(
            def.entry,
            Op::new(Opcode::Load, loc())
                .with_dst(Operand::direct(sym, tu.types.int_ty))
                .with_src1(Operand::immediate(ImmValue::Int(42), tu.types.int_ty)),
        );
        def.block_mut(def.entry).terminator = Some(Operand::direct(sym, tu.types.int_ty));
        tu.definitions.push(def);
        tu
    }

    #[test]
    fn emit_assembly_names_the_function_and_its_return() {
        let tu = sample_tu();
        let backend = TextBackend::new();
        let asm = backend.emit_assembly(&tu).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains("load"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn emit_dot_produces_a_well_formed_digraph() {
        let tu = sample_tu();
        let backend = TextBackend::new();
        let dot = backend.emit_dot(&tu).unwrap();
        assert!(dot.starts_with("digraph cfg {"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn emit_object_is_an_explicit_external_sink() {
        let tu = sample_tu();
        let backend = TextBackend::new();
        assert!(backend.emit_object(&tu).is_err());
    }

    #[test]
    fn type_name_renders_pointer_to_int() {
        let config = Config::default();
        let mut tu = TranslationUnit::new(&config);
        let ptr = tu.types.pointer_to(tu.types.int_ty);
        assert_eq!(type_name(&tu, ptr), "int*");
    }
}
