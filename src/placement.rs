//! Placement planner (spec.md §4.E) and the open-addressed, linear-probed
//! placement map (§3). The map uses `physical_id == 0` as its empty-slot
//! sentinel rather than a tombstone scheme, per §9 — node `(0,0,0)` never
//! exists, since core 0 is always the monitor and never assigned to a
//! logical node.

use std::collections::HashMap;

use crate::constants::{DAMSONRT_HASH_A, DAMSONRT_HASH_C, MAX_APPLICATION_CORE_ID, MIN_APPLICATION_CORE_ID};
use crate::error::{LoaderError, Result};

/// Packs a chip coordinate and core id into the wire-level physical id.
#[must_use]
pub const fn pack_physical_id(chip_x: u32, chip_y: u32, core_id: u32) -> u32 {
    (chip_x << 16) | (chip_y << 8) | core_id
}

/// Unpacks a physical id into `(chip_x, chip_y, core_id)`.
#[must_use]
pub const fn unpack_physical_id(physical_id: u32) -> (u32, u32, u32) {
    (physical_id >> 16, (physical_id >> 8) & 0xff, physical_id & 0xff)
}

fn hash(n: u32, size: usize) -> usize {
    let h = u64::from(n)
        .wrapping_mul(u64::from(DAMSONRT_HASH_A))
        .wrapping_add(u64::from(DAMSONRT_HASH_C));
    (h as usize) % size
}

#[derive(Debug, Clone, Copy, Default)]
struct MappingRecord {
    node_id: u32,
    physical_id: u32,
}

/// Bidirectional `node_id <-> physical_id` map, open-addressed and
/// linear-probed, sized to `2 * node_count` in each direction.
#[derive(Debug)]
pub struct PlacementMap {
    by_node: Vec<MappingRecord>,
    by_physical: Vec<MappingRecord>,
}

impl PlacementMap {
    /// Creates an empty map sized for `node_count` nodes.
    #[must_use]
    pub fn with_capacity(node_count: usize) -> Self {
        let size = (2 * node_count).max(2);
        Self {
            by_node: vec![MappingRecord::default(); size],
            by_physical: vec![MappingRecord::default(); size],
        }
    }

    /// Records a `node_id <-> physical_id` mapping.
    ///
    /// # Errors
    /// [`LoaderError::MappingHashOverflow`] if either table's probe
    /// sequence wraps all the way around without finding an empty slot.
    pub fn insert(&mut self, node_id: u32, physical_id: u32) -> Result<()> {
        let record = MappingRecord { node_id, physical_id };
        Self::probe_insert(&mut self.by_node, node_id, record)?;
        Self::probe_insert(&mut self.by_physical, physical_id, record)?;
        Ok(())
    }

    fn probe_insert(table: &mut [MappingRecord], key: u32, record: MappingRecord) -> Result<()> {
        let size = table.len();
        let start = hash(key, size);
        for step in 0..size {
            let slot = (start + step) % size;
            if table[slot].physical_id == 0 {
                table[slot] = record;
                return Ok(());
            }
        }
        Err(LoaderError::MappingHashOverflow)
    }

    /// Looks up the physical id placed for `node_id`.
    #[must_use]
    pub fn physical_id_of(&self, node_id: u32) -> Option<u32> {
        Self::probe_find(&self.by_node, node_id, |r| r.node_id == node_id).map(|r| r.physical_id)
    }

    /// Looks up the node id placed at `physical_id`.
    #[must_use]
    pub fn node_id_at(&self, physical_id: u32) -> Option<u32> {
        Self::probe_find(&self.by_physical, physical_id, |r| r.physical_id == physical_id).map(|r| r.node_id)
    }

    fn probe_find(
        table: &[MappingRecord],
        key: u32,
        matches: impl Fn(&MappingRecord) -> bool,
    ) -> Option<MappingRecord> {
        let size = table.len();
        let start = hash(key, size);
        for step in 0..size {
            let slot = (start + step) % size;
            if table[slot].physical_id == 0 {
                return None;
            }
            if matches(&table[slot]) {
                return Some(table[slot]);
            }
        }
        None
    }
}

/// One node's assigned location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub node_id: u32,
    pub chip_x: u32,
    pub chip_y: u32,
    pub core_id: u32,
    pub physical_id: u32,
}

/// The result of planning placement for a full node list.
#[derive(Debug)]
pub struct PlacementPlan {
    pub placements: Vec<Placement>,
    pub map: PlacementMap,
    /// Chip `(x,y) -> bitmask`, bit `i` set iff core `i` is populated.
    pub core_maps: HashMap<(u32, u32), u32>,
}

impl PlacementPlan {
    /// Finds a placed node's assignment by id.
    #[must_use]
    pub fn get(&self, node_id: u32) -> Option<&Placement> {
        self.placements.iter().find(|p| p.node_id == node_id)
    }
}

/// Assigns `(chip_x, chip_y, core_id)` to every node in `node_ids`, in order.
///
/// Starting state `(x=0, y=0, core=0)`; each node increments `core` first,
/// wraps to `core=1` and increments `x` past `MAX_APPLICATION_CORE_ID` (16),
/// wraps `x` to 0 and increments `y` past `grid_w - 1`. Running past
/// `grid_h - 1` is fatal. Core 0 (the monitor) is never assigned.
///
/// # Errors
/// [`LoaderError::OutOfCores`] if the node list does not fit the grid,
/// [`LoaderError::MappingHashOverflow`] if the placement map overflows.
pub fn plan_placement(node_ids: &[u32], grid_w: u32, grid_h: u32) -> Result<PlacementPlan> {
    let mut map = PlacementMap::with_capacity(node_ids.len());
    let mut core_maps: HashMap<(u32, u32), u32> = HashMap::new();
    let mut placements = Vec::with_capacity(node_ids.len());

    let mut x = 0_u32;
    let mut y = 0_u32;
    let mut core = MIN_APPLICATION_CORE_ID - 1;

    for &node_id in node_ids {
        core += 1;
        if core > MAX_APPLICATION_CORE_ID {
            core = MIN_APPLICATION_CORE_ID;
            x += 1;
        }
        if x > grid_w - 1 {
            x = 0;
            y += 1;
        }
        if y > grid_h - 1 {
            return Err(LoaderError::OutOfCores {
                node_count: node_ids.len(),
                grid_w,
                grid_h,
            });
        }

        let physical_id = pack_physical_id(x, y, core);
        map.insert(node_id, physical_id)?;
        *core_maps.entry((x, y)).or_insert(0) |= 1 << core;
        placements.push(Placement {
            node_id,
            chip_x: x,
            chip_y: y,
            core_id: core,
            physical_id,
        });
    }

    Ok(PlacementPlan { placements, map, core_maps })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_single_chip_two_nodes() {
        let plan = plan_placement(&[1, 2], 1, 1).unwrap();
        let p1 = plan.get(1).unwrap();
        let p2 = plan.get(2).unwrap();
        assert_eq!((p1.chip_x, p1.chip_y, p1.core_id), (0, 0, 1));
        assert_eq!((p2.chip_x, p2.chip_y, p2.core_id), (0, 0, 2));
        assert_eq!(plan.core_maps[&(0, 0)], 0b110);
    }

    #[test]
    fn placement_is_injective_and_queryable_both_ways() {
        let plan = plan_placement(&[10, 20, 30], 2, 2).unwrap();
        let mut seen = std::collections::HashSet::new();
        for p in &plan.placements {
            assert!(seen.insert(p.physical_id), "physical_id must be unique");
            assert_eq!(plan.map.physical_id_of(p.node_id), Some(p.physical_id));
            assert_eq!(plan.map.node_id_at(p.physical_id), Some(p.node_id));
            assert!((1..=16).contains(&p.core_id));
        }
    }

    #[test]
    fn seventeenth_core_on_last_chip_overflows() {
        // 1x1 grid: 16 cores fit (1..=16); the 17th node has nowhere to go.
        let ids: Vec<u32> = (1..=17).collect();
        let err = plan_placement(&ids, 1, 1).unwrap_err();
        assert!(matches!(err, LoaderError::OutOfCores { .. }));
    }

    #[test]
    fn wraps_to_next_chip_after_core_16() {
        let ids: Vec<u32> = (1..=17).collect();
        let plan = plan_placement(&ids, 2, 1).unwrap();
        let last = plan.get(17).unwrap();
        assert_eq!((last.chip_x, last.chip_y, last.core_id), (1, 0, 1));
    }
}
