//! The three-address IR: `Var`-like operands, `Op`, `BasicBlock`, and
//! `Definition` (spec.md §3, §9 "Cyclic ownership").
//!
//! Blocks live in a flat arena owned by their `Definition` and reference
//! each other by index, so back edges (loops) need no reference counting or
//! interior mutability — the definition's lifetime is the arena's lifetime.

use crate::intern::Symbol;
use crate::location::SourceLocation;
use crate::symtab::SymId;
use crate::types::{ConversionOp, TypeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImmValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    Immediate(ImmValue),
    Direct(SymId),
    Indirect { base: SymId, offset: i64, elem_size: u32 },
    AddressOf(SymId),
    StringLiteral(Symbol),
    Void,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub ty: TypeId,
}

impl Operand {
    pub fn immediate(value: ImmValue, ty: TypeId) -> Self {
        Operand { kind: OperandKind::Immediate(value), ty }
    }

    pub fn direct(sym: SymId, ty: TypeId) -> Self {
        Operand { kind: OperandKind::Direct(sym), ty }
    }

    pub fn void(ty: TypeId) -> Self {
        Operand { kind: OperandKind::Void, ty }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self.kind, OperandKind::Immediate(_))
    }

    pub fn as_immediate(&self) -> Option<ImmValue> {
        match self.kind {
            OperandKind::Immediate(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FAdd,
    FSub,
    FMul,
    FDiv,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    Convert(ConversionOp),
    AddressOf,
    Deref,
    Call,
    Return,
    Param,
    Memcpy,
    Alloca,
    VaStart,
    VaArg,
}

impl Opcode {
    /// Ops the dead-code pass must never remove even when their destination
    /// is dead: anything that can be observed outside the defined value
    /// (spec.md §4.7 rule 2).
    pub fn has_side_effects(self) -> bool {
        matches!(self, Opcode::Store | Opcode::Call | Opcode::VaStart | Opcode::VaArg | Opcode::Memcpy | Opcode::Alloca)
    }

    pub fn is_pure_copy(self) -> bool {
        matches!(self, Opcode::Load)
    }
}

#[derive(Debug, Clone)]
pub struct Op {
    pub opcode: Opcode,
    pub dst: Option<Operand>,
    pub src1: Option<Operand>,
    pub src2: Option<Operand>,
    /// Populated only for `Opcode::Call`; the ordinary two-source shape
    /// can't hold a variable-length argument list.
    pub call_args: Vec<Operand>,
    pub callee: Option<SymId>,
    pub location: SourceLocation,
}

impl Op {
    pub fn new(opcode: Opcode, location: SourceLocation) -> Self {
        Op { opcode, dst: None, src1: None, src2: None, call_args: Vec::new(), callee: None, location }
    }

    pub fn with_dst(mut self, dst: Operand) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_src1(mut self, src: Operand) -> Self {
        self.src1 = Some(src);
        self
    }

    pub fn with_src2(mut self, src: Operand) -> Self {
        self.src2 = Some(src);
        self
    }
}

/// A block index within a `Definition`'s arena. Used instead of a raw
/// pointer so successor links survive the `Vec<BasicBlock>` growing.
pub type BlockId = usize;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub ops: Vec<Op>,
    /// For a two-successor block, the boolean-typed branch condition; for a
    /// terminal block, the function's return value (`None` ~ void return).
    pub terminator: Option<Operand>,
    /// Fall-through / unconditional successor.
    pub left: Option<BlockId>,
    /// Branch-if-true successor; `None` means this block has at most one
    /// successor.
    pub right: Option<BlockId>,
}

impl BasicBlock {
    pub fn new(label: String) -> Self {
        BasicBlock { label, ops: Vec::new(), terminator: None, left: None, right: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Monotonic counter for synthesized block labels (spec.md §9 Open
/// Question: label format is an implementation choice; `.LBB<n>` here).
#[derive(Debug, Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        LabelAllocator { next: 0 }
    }

    pub fn next_label(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!(".LBB{}", n)
    }
}

#[derive(Debug)]
pub struct Definition {
    pub symbol: SymId,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub locals: Vec<SymId>,
}

impl Definition {
    pub fn new(symbol: SymId) -> Self {
        let entry_block = BasicBlock::new(".LBB0".to_string());
        Definition { symbol, blocks: vec![entry_block], entry: 0, locals: Vec::new() }
    }

    pub fn new_block(&mut self, labels: &mut LabelAllocator) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock::new(labels.next_label()));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    pub fn push_op(&mut self, block: BlockId, op: Op) {
        self.blocks[block].ops.push(op);
    }

    /// Reachable blocks from the entry, depth-first, for traversal by the
    /// backend contract (spec.md §6: "a traversal of all reachable
    /// blocks"). Handles back edges via a visited set.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;
            order.push(id);
            let block = &self.blocks[id];
            if let Some(r) = block.right {
                stack.push(r);
            }
            if let Some(l) = block.left {
                stack.push(l);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FileId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    #[test]
    fn back_edge_is_representable_without_leaking_reference_cycles() {
        let mut labels = LabelAllocator::new();
        let mut def = Definition::new(SymId(0));
        let cond = def.new_block(&mut labels);
        let body = def.new_block(&mut labels);
        let exit = def.new_block(&mut labels);
        def.block_mut(def.entry).left = Some(cond);
        def.block_mut(cond).left = Some(exit);
        def.block_mut(cond).right = Some(body);
        def.block_mut(body).left = Some(cond); // back edge
        let order = def.reachable_blocks();
        assert!(order.contains(&cond));
        assert!(order.contains(&body));
        assert!(order.contains(&exit));
    }

    #[test]
    fn terminal_block_has_no_successors() {
        let def = Definition::new(SymId(0));
        assert!(def.block(def.entry).is_terminal());
    }

    #[test]
    fn label_allocator_produces_unique_monotonic_names() {
        let mut labels = LabelAllocator::new();
        let a = labels.next_label();
        let b = labels.next_label();
        assert_ne!(a, b);
        assert_eq!(a, ".LBB0");
        assert_eq!(b, ".LBB1");
    }

    #[test]
    fn op_builder_sets_operands() {
        let op = Op::new(Opcode::Add, loc())
            .with_dst(Operand::void(crate::types::TypeId(0)))
            .with_src1(Operand::void(crate::types::TypeId(0)));
        assert!(op.dst.is_some());
        assert!(op.src1.is_some());
        assert!(op.src2.is_none());
    }
}
