//! Per-node memory layout, load sequence, and post-load validator
//! (spec.md §4.H, §3). Computes the sequential data-DTCM layout from a
//! node's declaration sizes, drives the zero/write/load sequence through
//! [`crate::control::ControlClient`], and can read every written region
//! back for comparison.

use std::collections::HashMap;
use std::path::Path;

use crate::constants::{
    damsonrt_ev_start, damsonrt_system_global_address, DAMSONRT_DTCM_DATA_MAX, DAMSONRT_DTCM_PROGRAM_START,
    DAMSONRT_DTCM_START, DAMSONRT_EV_SHARED_START, DAMSONRT_SYSTEM_RESERVED, DAMSONRT_SYSTEM_RESERVED_BYTES,
    MAX_LOG_ITEMS, RUNTIME_LOG_ITEM_BYTES, SYSGLOBAL_CHIP_COUNT, SYSGLOBAL_DEBUG_MODE, SYSGLOBAL_GV_SIZE,
    SYSGLOBAL_INTV_SIZE, SYSGLOBAL_INTV_START, SYSGLOBAL_LOGS_START, SYSGLOBAL_LOG_COUNT, SYSGLOBAL_NODE_ID,
    SYSGLOBAL_SNAPSHOTS_START, SYSGLOBAL_SNAPSHOT_COUNT,
};
use crate::control::{ControlClient, DeviceAddress};
use crate::error::{LoaderError, Result};
use crate::intvec::{build_interrupt_hash, next_pow2};
use crate::linker::{LogDecl, NodeRecord};
use crate::routing::RoutingTables;

/// Computed byte offsets and sizes for one node's per-core layout.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    pub gvusersize: u32,
    pub evsize: u32,
    pub intv_hash_size: u32,
    pub num_logs: u32,
    pub num_snapshots: u32,
    pub user_globals_start: u32,
    pub intv_start: u32,
    pub logs_start: u32,
    pub snapshots_start: u32,
    pub data_end: u32,
    pub ev_start: u32,
}

/// Computes the layout for `node` on `core_id`, from `(gvusersize, evsize,
/// intvsize, num_logs, num_snapshots)` exactly as listed in §3.
///
/// The overflow check sums only the sequential data-DTCM regions
/// (`gvusersize`, `intvsize`, `num_logs`, `num_snapshots`) — `evsize` is
/// excluded since the EV region is addressed separately at
/// `EV_START(core_id)`, not a row of the data-DTCM table; see `DESIGN.md`
/// decision 7.
///
/// # Errors
/// [`LoaderError::DtcmTooBig`] if that sum exceeds `DAMSONRT_DTCM_DATA_MAX`.
pub fn compute_layout(node: &NodeRecord, core_id: u32) -> Result<NodeLayout> {
    let gvusersize = node.gv.len() as u32 - 1;
    let evsize = node.ev.len() as u32;
    let intv_hash_size = next_pow2(2 * u32::try_from(node.interrupts.len()).unwrap_or(u32::MAX)) + 1;
    let num_logs = node.logs.len() as u32;
    let num_snapshots = node.snapshots.len() as u32;

    let budget =
        gvusersize * 4 + intv_hash_size * 12 + num_logs * RUNTIME_LOG_ITEM_BYTES + num_snapshots * RUNTIME_LOG_ITEM_BYTES;
    if budget > DAMSONRT_DTCM_DATA_MAX {
        return Err(LoaderError::DtcmTooBig { node_id: node.node_id, size: budget, max: DAMSONRT_DTCM_DATA_MAX });
    }

    let user_globals_start = DAMSONRT_DTCM_START + DAMSONRT_SYSTEM_RESERVED_BYTES;
    let intv_start = user_globals_start + gvusersize * 4;
    let logs_start = intv_start + intv_hash_size * 12;
    let snapshots_start = logs_start + num_logs * RUNTIME_LOG_ITEM_BYTES;
    let data_end = snapshots_start + num_snapshots * RUNTIME_LOG_ITEM_BYTES;

    Ok(NodeLayout {
        gvusersize,
        evsize,
        intv_hash_size,
        num_logs,
        num_snapshots,
        user_globals_start,
        intv_start,
        logs_start,
        snapshots_start,
        data_end,
        ev_start: damsonrt_ev_start(core_id),
    })
}

/// Serializes one log/snapshot declaration into its fixed `RuntimeLogItem`
/// shape: `handle`, `log_items`, then `log_globals` zero-padded to
/// `MAX_LOG_ITEMS` (see `DESIGN.md` decision 6 for why `handle` is host-assigned).
fn serialize_log_record(decl: &LogDecl) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RUNTIME_LOG_ITEM_BYTES as usize);
    buf.extend_from_slice(&decl.handle.to_le_bytes());
    buf.extend_from_slice(&decl.log_items.to_le_bytes());
    for i in 0..MAX_LOG_ITEMS {
        let word = decl.log_globals.get(i).copied().unwrap_or(0);
        buf.extend_from_slice(&word.to_le_bytes());
    }
    buf
}

fn serialize_records(decls: &[LogDecl]) -> Vec<u8> {
    decls.iter().flat_map(serialize_log_record).collect()
}

/// The host-side byte buffers for every region a node's image load writes,
/// excluding the per-core system globals (written as individual words) and
/// the chip-shared area (core 1 only).
struct RegionBuffers {
    user_globals: Vec<u8>,
    ev_body: Vec<u8>,
    intv_hash: Vec<u8>,
    logs: Vec<u8>,
    snapshots: Vec<u8>,
}

fn build_region_buffers(node: &NodeRecord, layout: &NodeLayout) -> Result<RegionBuffers> {
    let user_globals: Vec<u8> = node.gv[1..].iter().flat_map(|w| w.to_le_bytes()).collect();
    let ev_body: Vec<u8> = node.ev.iter().flat_map(|w| w.to_le_bytes()).collect();

    let hash = build_interrupt_hash(&node.interrupts, node.node_id)?;
    let mut intv_hash = Vec::with_capacity(layout.intv_hash_size as usize * 12);
    for slot in &hash.slots {
        let (src_node, code_offset, count) = slot.map_or((0, 0, 0), |s| (s.src_node, s.code_offset, s.count));
        intv_hash.extend_from_slice(&src_node.to_le_bytes());
        intv_hash.extend_from_slice(&code_offset.to_le_bytes());
        intv_hash.extend_from_slice(&count.to_le_bytes());
    }

    Ok(RegionBuffers {
        user_globals,
        ev_body,
        intv_hash,
        logs: serialize_records(&node.logs),
        snapshots: serialize_records(&node.snapshots),
    })
}

/// Orders the global core-map into one word per chip, `y` outer, `x` inner.
#[must_use]
pub fn core_map_words(core_maps: &HashMap<(u32, u32), u32>, grid_w: u32, grid_h: u32) -> Vec<u32> {
    let mut words = Vec::with_capacity((grid_w * grid_h) as usize);
    for y in 0..grid_h {
        for x in 0..grid_w {
            words.push(core_maps.get(&(x, y)).copied().unwrap_or(0));
        }
    }
    words
}

/// Runs the full §4.H load sequence for one node already placed at `dev`.
///
/// # Errors
/// Anything the underlying `ControlClient` calls can raise, plus
/// [`LoaderError::InterruptHashOverflow`] from building the interrupt hash.
#[allow(clippy::too_many_arguments)]
pub fn load_node(
    control: &ControlClient,
    dev: DeviceAddress,
    node: &NodeRecord,
    layout: &NodeLayout,
    debug_mode: bool,
    chip_count: u32,
    grid_w: u32,
    grid_h: u32,
    core_maps: &HashMap<(u32, u32), u32>,
    routing_tables: &RoutingTables,
    prototype_dir: &Path,
) -> Result<()> {
    let buffers = build_region_buffers(node, layout)?;

    let data_region_len = layout.data_end - DAMSONRT_DTCM_START;
    control.aplx_fill(dev, &[(DAMSONRT_DTCM_START, data_region_len), (layout.ev_start, layout.evsize * 4 + 4)])?;

    let system_globals: [(u32, u32); 9] = [
        (SYSGLOBAL_GV_SIZE, DAMSONRT_SYSTEM_RESERVED + layout.gvusersize),
        (SYSGLOBAL_INTV_SIZE, layout.intv_hash_size),
        (SYSGLOBAL_LOG_COUNT, layout.num_logs),
        (SYSGLOBAL_SNAPSHOT_COUNT, layout.num_snapshots),
        (SYSGLOBAL_DEBUG_MODE, u32::from(debug_mode)),
        (SYSGLOBAL_INTV_START, layout.intv_start),
        (SYSGLOBAL_LOGS_START, layout.logs_start),
        (SYSGLOBAL_SNAPSHOTS_START, layout.snapshots_start),
        (SYSGLOBAL_CHIP_COUNT, chip_count),
    ];
    for (idx, value) in system_globals {
        control.write_memory(dev, damsonrt_system_global_address(idx), &value.to_le_bytes())?;
    }
    control.write_memory(dev, damsonrt_system_global_address(SYSGLOBAL_NODE_ID), &node.node_id.to_le_bytes())?;

    control.write_memory(dev, layout.ev_start, &layout.evsize.to_le_bytes())?;

    control.write_nonzero_memory(dev, layout.user_globals_start, &buffers.user_globals)?;
    control.write_nonzero_memory(dev, layout.ev_start + 4, &buffers.ev_body)?;
    control.write_nonzero_memory(dev, layout.intv_start, &buffers.intv_hash)?;
    control.write_nonzero_memory(dev, layout.logs_start, &buffers.logs)?;
    control.write_nonzero_memory(dev, layout.snapshots_start, &buffers.snapshots)?;

    if dev.core_id == 1 {
        let mut shared = Vec::new();
        for word in core_map_words(core_maps, grid_w, grid_h) {
            shared.extend_from_slice(&word.to_le_bytes());
        }
        let entries = routing_tables.table_for(dev.chip_x, dev.chip_y);
        shared.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for entry in entries {
            shared.extend_from_slice(&entry.key.to_le_bytes());
            shared.extend_from_slice(&entry.route.to_le_bytes());
        }
        control.write_memory(dev, DAMSONRT_EV_SHARED_START, &shared)?;
    }

    control.load_application_at(dev, DAMSONRT_DTCM_PROGRAM_START, &prototype_dir.join(&node.prototype_name))?;

    Ok(())
}

/// Reads every region [`load_node`] wrote and compares it against what
/// would be written again, returning one description string per mismatch.
/// Per §7, a non-empty result is not itself fatal — the caller decides.
///
/// # Errors
/// Anything the underlying `ControlClient` reads can raise.
pub fn validate_node(control: &ControlClient, dev: DeviceAddress, node: &NodeRecord, layout: &NodeLayout) -> Result<Vec<String>> {
    let buffers = build_region_buffers(node, layout)?;
    let mut mismatches = Vec::new();

    let regions: [(&str, u32, &[u8]); 4] = [
        ("user globals", layout.user_globals_start, &buffers.user_globals),
        ("interrupt hash", layout.intv_start, &buffers.intv_hash),
        ("log records", layout.logs_start, &buffers.logs),
        ("snapshot records", layout.snapshots_start, &buffers.snapshots),
    ];
    for (name, addr, expected) in regions {
        if expected.is_empty() {
            continue;
        }
        let actual = control.read_memory(dev, addr, expected.len() as u32)?;
        if actual != expected {
            mismatches.push(format!("{name} region mismatch at 0x{addr:08x}"));
        }
    }

    if !buffers.ev_body.is_empty() {
        let actual = control.read_memory(dev, layout.ev_start + 4, buffers.ev_body.len() as u32)?;
        if actual != buffers.ev_body {
            mismatches.push(format!("external vector body mismatch at 0x{:08x}", layout.ev_start + 4));
        }
    }

    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::{InterruptDecl, NodeRecord};

    fn node(gv: Vec<i32>, ev: Vec<i32>, interrupts: usize, logs: usize, snapshots: usize) -> NodeRecord {
        let mut full_gv = vec![0];
        full_gv.extend(gv);
        NodeRecord {
            node_id: 1,
            prototype_name: "proto.aplx".to_string(),
            gv: full_gv,
            ev,
            interrupts: (0..interrupts).map(|i| InterruptDecl { code_offset: i as u32, src_node: i as u32 + 1 }).collect(),
            logs: (0..logs)
                .map(|i| LogDecl {
                    handle: i as u32,
                    start_time: 0,
                    end_time: 0,
                    interval: 0,
                    log_items: 1,
                    log_globals: vec![DAMSONRT_DTCM_START],
                    format: "x=%f\n".to_string(),
                    filename: "out.log".to_string(),
                })
                .collect(),
            snapshots: (0..snapshots)
                .map(|i| LogDecl {
                    handle: (logs + i) as u32,
                    start_time: 0,
                    end_time: 0,
                    interval: 0,
                    log_items: 2,
                    log_globals: vec![DAMSONRT_DTCM_START, DAMSONRT_DTCM_START + 4],
                    format: "snap\n".to_string(),
                    filename: "snap.log".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn layout_offsets_are_sequential_and_nonoverlapping() {
        let n = node(vec![1, 2, 3], vec![9, 9], 1, 1, 1);
        let layout = compute_layout(&n, 1).unwrap();
        assert_eq!(layout.gvusersize, 3);
        assert_eq!(layout.evsize, 2);
        assert_eq!(layout.user_globals_start, DAMSONRT_DTCM_START + DAMSONRT_SYSTEM_RESERVED_BYTES);
        assert_eq!(layout.intv_start, layout.user_globals_start + 12);
        assert_eq!(layout.logs_start, layout.intv_start + layout.intv_hash_size * 12);
        assert_eq!(layout.snapshots_start, layout.logs_start + RUNTIME_LOG_ITEM_BYTES);
        assert_eq!(layout.data_end, layout.snapshots_start + RUNTIME_LOG_ITEM_BYTES);
    }

    #[test]
    fn oversized_layout_is_fatal() {
        let n = node(vec![0; 10_000], vec![], 0, 0, 0);
        let err = compute_layout(&n, 1);
        assert!(matches!(err, Err(LoaderError::DtcmTooBig { .. })));
    }

    #[test]
    fn region_buffers_have_fixed_record_shape() {
        let n = node(vec![1], vec![], 0, 2, 1);
        let layout = compute_layout(&n, 1).unwrap();
        let buffers = build_region_buffers(&n, &layout).unwrap();
        assert_eq!(buffers.logs.len(), 2 * RUNTIME_LOG_ITEM_BYTES as usize);
        assert_eq!(buffers.snapshots.len(), RUNTIME_LOG_ITEM_BYTES as usize);
        // handle + log_items + zero-padded globals
        assert_eq!(&buffers.logs[0..4], &0_u32.to_le_bytes());
        assert_eq!(&buffers.logs[4..8], &1_u32.to_le_bytes());
    }

    #[test]
    fn core_map_words_are_y_major() {
        let mut maps = HashMap::new();
        maps.insert((0, 0), 0b10);
        maps.insert((1, 0), 0b100);
        maps.insert((0, 1), 0b1000);
        let words = core_map_words(&maps, 2, 2);
        assert_eq!(words, vec![0b10, 0b100, 0b1000, 0]);
    }
}
