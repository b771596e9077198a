//! IR-to-IR optimization passes (spec.md §4.7), gated by `-O0`..`-O3`.
//!
//! Every pass operates on one [`Definition`] at a time and reports whether
//! it changed anything; `optimize` reruns the whole pipeline until a fixed
//! point (or a small iteration cap, since a pathological input could in
//! theory oscillate if a future pass violated monotonicity).

use crate::ir::{Definition, Op, OperandKind, Opcode};
use crate::symtab::SymId;
use std::collections::HashSet;

const MAX_ITERATIONS: u32 = 16;

/// Runs the pass pipeline appropriate for `opt_level` to a fixed point.
/// `-O0` runs nothing (spec.md §4.7: optimization is opt-in per level).
pub fn optimize(def: &mut Definition, opt_level: u8) {
    if opt_level == 0 {
        return;
    }
    for iteration in 0..MAX_ITERATIONS {
        let mut changed = false;
        changed |= copy_propagation(def);
        changed |= algebraic_simplification(def);
        changed |= dead_store_elimination(def);
        if opt_level >= 2 {
            changed |= empty_block_elimination(def);
        }
        tracing::trace!(iteration, changed, "optimizer pass iteration");
        if !changed {
            break;
        }
    }
}

/// Backward liveness: which locals are read on some path out of each block.
/// Used by dead-store elimination rather than exposed as its own pass,
/// since nothing else in this crate consumes liveness sets yet.
fn compute_live_out(def: &Definition) -> Vec<HashSet<SymId>> {
    let n = def.blocks.len();
    let mut live_in = vec![HashSet::new(); n];
    let mut live_out = vec![HashSet::new(); n];
    loop {
        let mut changed = false;
        for id in (0..n).rev() {
            let mut out = HashSet::new();
            if let Some(l) = def.blocks[id].left {
                out.extend(live_in[l].iter().copied());
            }
            if let Some(r) = def.blocks[id].right {
                out.extend(live_in[r].iter().copied());
            }
            let mut inn = out.clone();
            if let Some(term) = &def.blocks[id].terminator {
                mark_used(term, &mut inn);
            }
            for op in def.blocks[id].ops.iter().rev() {
                if let Some(dst) = &op.dst {
                    if let OperandKind::Direct(s) = &dst.kind {
                        inn.remove(s);
                    }
                }
                for src in [&op.src1, &op.src2] {
                    if let Some(o) = src {
                        mark_used(o, &mut inn);
                    }
                }
            }
            if out != live_out[id] {
                live_out[id] = out;
                changed = true;
            }
            if inn != live_in[id] {
                live_in[id] = inn;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    live_out
}

fn mark_used(operand: &crate::ir::Operand, set: &mut HashSet<SymId>) {
    match &operand.kind {
        OperandKind::Direct(s) | OperandKind::AddressOf(s) => {
            set.insert(*s);
        }
        OperandKind::Indirect { base, .. } => {
            set.insert(*base);
        }
        _ => {}
    }
}

/// Removes `Store`/`Load`-style defs whose destination is provably dead at
/// block exit and that have no observable side effect (spec.md §4.7 rule 2:
/// side-effecting ops are never removed regardless of liveness).
fn dead_store_elimination(def: &mut Definition) -> bool {
    let live_out = compute_live_out(def);
    let mut changed = false;
    for (id, block) in def.blocks.iter_mut().enumerate() {
        let mut live = live_out[id].clone();
        if let Some(term) = &block.terminator {
            mark_used(term, &mut live);
        }
        let mut keep = Vec::with_capacity(block.ops.len());
        for op in block.ops.drain(..).rev() {
            let dead_dst = match &op.dst {
                Some(d) => match &d.kind {
                    OperandKind::Direct(s) => !live.contains(s),
                    _ => false,
                },
                None => false,
            };
            if dead_dst && !op.opcode.has_side_effects() {
                changed = true;
                continue;
            }
            if let Some(dst) = &op.dst {
                if let OperandKind::Direct(s) = &dst.kind {
                    live.remove(s);
                }
            }
            for src in [&op.src1, &op.src2] {
                if let Some(o) = src {
                    mark_used(o, &mut live);
                }
            }
            keep.push(op);
        }
        keep.reverse();
        block.ops = keep;
    }
    changed
}

/// Replaces uses of a destination that was just copied from another operand
/// (`Load` of a direct value with no conversion) with the original operand,
/// so later passes see through the copy.
fn copy_propagation(def: &mut Definition) -> bool {
    let mut changed = false;
    for block in &mut def.blocks {
        let mut copies: std::collections::HashMap<SymId, crate::ir::Operand> = std::collections::HashMap::new();
        for op in &mut block.ops {
            for slot in 0..2 {
                let src = if slot == 0 { &op.src1 } else { &op.src2 };
                let replacement = match src.as_ref().map(|o| &o.kind) {
                    Some(OperandKind::Direct(s)) => copies.get(s).cloned(),
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    if slot == 0 {
                        op.src1 = Some(replacement);
                    } else {
                        op.src2 = Some(replacement);
                    }
                    changed = true;
                }
            }
            if op.opcode == Opcode::Load {
                if let (Some(dst), Some(src1)) = (&op.dst, &op.src1) {
                    if let OperandKind::Direct(d) = &dst.kind {
                        copies.insert(*d, src1.clone());
                    }
                }
            } else if let Some(dst) = &op.dst {
                if let OperandKind::Direct(d) = &dst.kind {
                    copies.remove(d);
                }
            }
        }
    }
    changed
}

/// Folds pointwise identities (`x + 0`, `x * 1`, `x * 0`, `x - 0`) that copy
/// propagation or constant folding at parse time didn't already catch,
/// e.g. where one side became a known immediate only after propagation.
fn algebraic_simplification(def: &mut Definition) -> bool {
    let mut changed = false;
    for block in &mut def.blocks {
        for op in &mut block.ops {
            let simplified = match op.opcode {
                Opcode::Add | Opcode::Sub => identity_operand(&op.src2, 0).or_else(|| {
                    if op.opcode == Opcode::Add {
                        identity_operand(&op.src1, 0)
                    } else {
                        None
                    }
                }),
                Opcode::Mul => {
                    if is_immediate_zero(&op.src1) || is_immediate_zero(&op.src2) {
                        Some(op.src1.clone().unwrap())
                    } else {
                        identity_operand(&op.src2, 1).or_else(|| identity_operand(&op.src1, 1))
                    }
                }
                _ => None,
            };
            if op.dst.is_some() {
                if let Some(replacement) = simplified {
                    op.src1 = Some(pick_non_identity(&*op, replacement));
                    op.opcode = Opcode::Load;
                    op.src2 = None;
                    changed = true;
                }
            }
        }
    }
    changed
}

fn pick_non_identity(op: &Op, fallback: crate::ir::Operand) -> crate::ir::Operand {
    match &op.src1 {
        Some(s) if !is_identity_value(s) => s.clone(),
        _ => match &op.src2 {
            Some(s) if !is_identity_value(s) => s.clone(),
            _ => fallback,
        },
    }
}

fn is_identity_value(o: &crate::ir::Operand) -> bool {
    matches!(o.as_immediate(), Some(crate::ir::ImmValue::Int(0)) | Some(crate::ir::ImmValue::Int(1)))
}

fn identity_operand(operand: &Option<crate::ir::Operand>, value: i64) -> Option<crate::ir::Operand> {
    match operand {
        Some(o) => match o.as_immediate() {
            Some(crate::ir::ImmValue::Int(v)) if v == value => Some(o.clone()),
            _ => None,
        },
        None => None,
    }
}

fn is_immediate_zero(operand: &Option<crate::ir::Operand>) -> bool {
    matches!(
        operand.as_ref().and_then(|o| o.as_immediate()),
        Some(crate::ir::ImmValue::Int(0))
    )
}

/// Splices out blocks with no ops and a single fallthrough successor,
/// retargeting any predecessor that pointed at them (spec.md §4.7 rule 4:
/// "control-flow simplification ... never applied at `-O0`/`-O1`").
fn empty_block_elimination(def: &mut Definition) -> bool {
    let mut redirect = std::collections::HashMap::new();
    for (id, block) in def.blocks.iter().enumerate() {
        if id != def.entry && block.ops.is_empty() && block.terminator.is_none() && block.right.is_none() {
            if let Some(target) = block.left {
                redirect.insert(id, target);
            }
        }
    }
    if redirect.is_empty() {
        return false;
    }
    let resolve = |mut id: usize| -> usize {
        let mut seen = HashSet::new();
        while let Some(&next) = redirect.get(&id) {
            if !seen.insert(id) {
                break;
            }
            id = next;
        }
        id
    };
    let mut changed = false;
    for block in &mut def.blocks {
        if let Some(l) = block.left {
            let r = resolve(l);
            if r != l {
                block.left = Some(r);
                changed = true;
            }
        }
        if let Some(r) = block.right {
            let resolved = resolve(r);
            if resolved != r {
                block.right = Some(resolved);
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ImmValue, Operand};
    use crate::location::{FileId, SourceLocation};
    use crate::types::TypeId;

    fn loc() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    fn int_ty() -> TypeId {
        TypeId(0)
    }

    #[test]
    fn dead_store_with_no_later_use_is_removed() {
        let mut def = Definition::new(SymId(0));
        let dead = SymId(10);
        def.push_op(
            def.entry,
            Op::new(Opcode::Load, loc())
                .with_dst(Operand::direct(dead, int_ty()))
                .with_src1(Operand::immediate(ImmValue::Int(5), int_ty())),
        );
        assert_eq!(def.block(def.entry).ops.len(), 1);
        dead_store_elimination(&mut def);
        assert!(def.block(def.entry).ops.is_empty());
    }

    #[test]
    fn store_is_kept_even_when_destination_is_otherwise_dead() {
        let mut def = Definition::new(SymId(0));
        def.push_op(
            def.entry,
            Op::new(Opcode::Store, loc())
                .with_dst(Operand::direct(SymId(1), int_ty()))
                .with_src1(Operand::immediate(ImmValue::Int(7), int_ty())),
        );
        dead_store_elimination(&mut def);
        assert_eq!(def.block(def.entry).ops.len(), 1);
    }

    #[test]
    fn optimize_at_o0_changes_nothing() {
        let mut def = Definition::new(SymId(0));
        let dead = SymId(10);
        def.push_op(
            def.entry,
            Op::new(Opcode::Load, loc())
                .with_dst(Operand::direct(dead, int_ty()))
                .with_src1(Operand::immediate(ImmValue::Int(5), int_ty())),
        );
        optimize(&mut def, 0);
        assert_eq!(def.block(def.entry).ops.len(), 1);
    }

    #[test]
    fn optimize_reaches_a_fixed_point_without_looping_forever() {
        let mut def = Definition::new(SymId(0));
        for i in 0..5 {
            def.push_op(
                def.entry,
                Op::new(Opcode::Load, loc())
                    .with_dst(Operand::direct(SymId(20 + i), int_ty()))
                    .with_src1(Operand::immediate(ImmValue::Int(i as i64), int_ty())),
            );
        }
        optimize(&mut def, 2);
        assert!(def.block(def.entry).ops.is_empty());
    }
}
