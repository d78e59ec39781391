//! Interrupt-vector hash builder (spec.md §4.F): a power-of-two-sized,
//! open-addressed table with slot 0 reserved for the timer (`src_node == 0`).

use crate::constants::{DAMSONRT_HASH_A, DAMSONRT_HASH_C};
use crate::error::{LoaderError, Result};
use crate::linker::InterruptDecl;

/// One populated slot of the interrupt hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSlot {
    pub src_node: u32,
    pub code_offset: u32,
    pub count: u32,
}

impl InterruptSlot {
    const EMPTY: Self = Self { src_node: 0, code_offset: 0, count: 0 };
}

/// The built interrupt hash for one core.
#[derive(Debug, Clone)]
pub struct InterruptHash {
    pub slots: Vec<Option<InterruptSlot>>,
}

/// Smallest power of two `>= 2*n`, per §8's boundary laws
/// (`next_pow2(0) = next_pow2(1) = 1`).
#[must_use]
pub fn next_pow2(n: u32) -> u32 {
    if n <= 1 {
        return 1;
    }
    1_u32 << (32 - (n - 1).leading_zeros())
}

fn hash(n: u32) -> u32 {
    n.wrapping_mul(DAMSONRT_HASH_A).wrapping_add(DAMSONRT_HASH_C)
}

/// Builds the per-core interrupt hash from a flat interrupt declaration list.
///
/// Timer subscriptions (`src_node == 0`) all collapse into slot 0, last
/// writer wins on `code_offset`, with `count` incremented each time. Every
/// other subscription linear-probes `[1, H-1]` starting at
/// `(hash(src_node) mod (H-1)) + 1`.
///
/// # Errors
/// [`LoaderError::InterruptHashOverflow`] if no empty slot is found in the
/// `[1, H-1]` probe region for a given `node_id` (used only for the error
/// message; the hash table itself has no notion of node ids).
pub fn build_interrupt_hash(interrupts: &[InterruptDecl], node_id: u32) -> Result<InterruptHash> {
    let h = next_pow2(2 * u32::try_from(interrupts.len()).unwrap_or(u32::MAX)) + 1;
    let mut slots: Vec<Option<InterruptSlot>> = vec![None; h as usize];

    for decl in interrupts {
        if decl.src_node == 0 {
            let slot = slots[0].get_or_insert(InterruptSlot::EMPTY);
            slot.count += 1;
            slot.code_offset = decl.code_offset;
            continue;
        }

        let probe_size = h - 1;
        let start = (hash(decl.src_node) % probe_size) + 1;
        let mut placed = false;
        for step in 0..probe_size {
            let idx = 1 + ((start - 1 + step) % probe_size);
            match &mut slots[idx as usize] {
                Some(existing) if existing.src_node == decl.src_node => {
                    existing.count += 1;
                    placed = true;
                    break;
                }
                Some(_) => continue,
                empty @ None => {
                    *empty = Some(InterruptSlot {
                        src_node: decl.src_node,
                        code_offset: decl.code_offset,
                        count: 1,
                    });
                    placed = true;
                    break;
                }
            }
        }
        if !placed {
            return Err(LoaderError::InterruptHashOverflow { node_id });
        }
    }

    Ok(InterruptHash { slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_boundary_laws() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(4), 4);
        assert_eq!(next_pow2(5), 8);
    }

    #[test]
    fn s4_interrupt_hashing() {
        let interrupts = vec![
            InterruptDecl { src_node: 0, code_offset: 0xA },
            InterruptDecl { src_node: 7, code_offset: 0xB },
            InterruptDecl { src_node: 15, code_offset: 0xC },
        ];
        let table = build_interrupt_hash(&interrupts, 1).unwrap();
        assert_eq!(table.slots.len(), 9); // next_pow2(6) + 1 = 9
        let slot0 = table.slots[0].unwrap();
        assert_eq!((slot0.src_node, slot0.code_offset, slot0.count), (0, 0xA, 1));

        let found_7 = table.slots[1..].iter().find_map(|s| s.filter(|s| s.src_node == 7));
        let found_15 = table.slots[1..].iter().find_map(|s| s.filter(|s| s.src_node == 15));
        assert_eq!(found_7.unwrap().code_offset, 0xB);
        assert_eq!(found_15.unwrap().code_offset, 0xC);
    }

    #[test]
    fn repeated_timer_increments_count_without_losing_offset() {
        let interrupts = vec![
            InterruptDecl { src_node: 0, code_offset: 1 },
            InterruptDecl { src_node: 0, code_offset: 2 },
        ];
        let table = build_interrupt_hash(&interrupts, 1).unwrap();
        let slot0 = table.slots[0].unwrap();
        assert_eq!(slot0.count, 2);
        assert_eq!(slot0.code_offset, 2);
    }

    #[test]
    fn repeated_source_increments_count_without_overwriting_offset() {
        let interrupts = vec![
            InterruptDecl { src_node: 3, code_offset: 1 },
            InterruptDecl { src_node: 3, code_offset: 2 },
        ];
        let table = build_interrupt_hash(&interrupts, 1).unwrap();
        let slot = table.slots[1..].iter().find_map(|s| s.filter(|s| s.src_node == 3)).unwrap();
        assert_eq!(slot.count, 2);
        assert_eq!(slot.code_offset, 1);
    }
}
