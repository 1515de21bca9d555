//! Local cleanup passes over lifted functions.
//!
//! After the semantic body is recursively inlined into a native wrapper,
//! a fixed pipeline runs once over the result:
//!
//! 1. control-flow simplification
//! 2. memory-to-register promotion
//! 3. reassociation
//! 4. dead store elimination
//! 5. dead code elimination
//! 6. scalar replacement of aggregates
//! 7. dead code elimination
//! 8. instruction combining
//!
//! This is deliberately not a fixpoint scheduler: the sequence is part of
//! the lifter's contract, and anything further is the business of the
//! caller's optimization pipeline.

mod combine;
mod dce;
mod dse;
mod inline;
mod mem2reg;
mod reassociate;
mod simplify;
mod sroa;

pub use inline::inline_all;

use crate::ir::Function;

/// Runs the fixed local cleanup pipeline over `func`.
pub fn run_local_cleanup(func: &mut Function) {
    simplify::run(func);
    mem2reg::run(func);
    reassociate::run(func);
    dse::run(func);
    dce::run(func);
    sroa::run(func);
    dce::run(func);
    combine::run(func);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, Linkage, Op, Terminator, Type};

    #[test]
    fn test_pipeline_dissolves_state_like_code() {
        // A miniature wrapper shape: struct slot, zero fill, field write,
        // field read, return.
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let state_ty = Type::Struct(vec![Type::Int(64), Type::Int(64)]);
        let state = func
            .push(
                entry,
                Op::Alloca {
                    ty: state_ty.clone(),
                },
            )
            .unwrap();
        let zero = func.zero(state_ty.clone());
        func.push(
            entry,
            Op::Store {
                ptr: state,
                value: zero,
            },
        );
        let field = func
            .push(
                entry,
                Op::FieldPtr {
                    base: state,
                    base_ty: state_ty,
                    index: 0,
                },
            )
            .unwrap();
        let arg = func.arg(0);
        func.push(
            entry,
            Op::Store {
                ptr: field,
                value: arg,
            },
        );
        let out = func
            .push(
                entry,
                Op::Load {
                    ptr: field,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(out) });

        run_local_cleanup(&mut func);

        assert_eq!(func.blocks.len(), 1);
        assert!(func.blocks[0].insts.is_empty());
        assert_eq!(func.blocks[0].term, Terminator::Ret { value: Some(arg) });
    }
}
