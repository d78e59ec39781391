//! Start ordering, shutdown wait, and log/snapshot drain (spec.md §4.I).

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::constants::{
    damsonrt_ev_start, damsonrt_system_global_address, DAMSONRT_DTCM_PROGRAM_START, MAX_APPLICATION_CORE_ID,
    MAX_LOG_ITEMS, MIN_APPLICATION_CORE_ID, SYSGLOBAL_LOG_DATA_END,
};
use crate::control::{ControlClient, DeviceAddress};
use crate::error::Result;
use crate::linker::NodeRecord;
use crate::logformat::format_log_line;
use crate::placement::{pack_physical_id, PlacementPlan};

/// How often the shutdown busy-wait polls the `running` flag.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Every `(chip_x, chip_y, core_id)` slot in the order §4.I's start/drain
/// loops visit them: chips from `(W-1,H-1)` down to `(0,0)`, cores
/// descending from `MAX_APPLICATION_CORE_ID` (16) down to `MIN_APPLICATION_CORE_ID`
/// (1) within each chip, matching the placement planner's own per-chip range.
#[must_use]
pub fn reverse_slot_order(grid_w: u32, grid_h: u32) -> Vec<(u32, u32, u32)> {
    let mut slots = Vec::with_capacity((grid_w * grid_h * MAX_APPLICATION_CORE_ID) as usize);
    for y in (0..grid_h).rev() {
        for x in (0..grid_w).rev() {
            for core in (MIN_APPLICATION_CORE_ID..=MAX_APPLICATION_CORE_ID).rev() {
                slots.push((x, y, core));
            }
        }
    }
    slots
}

/// Starts every populated core in reverse order, so chip `(0,0)` core 1
/// begins executing last.
///
/// # Errors
/// Anything [`ControlClient::start_application_at`] can raise.
pub fn start_all(control: &ControlClient, plan: &PlacementPlan, grid_w: u32, grid_h: u32) -> Result<()> {
    for (x, y, core) in reverse_slot_order(grid_w, grid_h) {
        let physical_id = pack_physical_id(x, y, core);
        if plan.map.node_id_at(physical_id).is_some() {
            let dev = DeviceAddress::new(x, y, core)?;
            control.start_application_at(dev, DAMSONRT_DTCM_PROGRAM_START)?;
        }
    }
    Ok(())
}

/// Busy-waits until `running` is cleared by the debug receiver's shutdown
/// handler. No further control traffic is sent while waiting.
pub fn wait_for_shutdown(running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }
}

/// One parsed `{handle, values}` record from a core's log ring, before it
/// has been matched against a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogRecordRaw {
    handle: u32,
    values: Vec<u32>,
}

/// Parses a log ring span into records. Returns `(records, corrupted)`;
/// `corrupted` is set and parsing stops as soon as a record's `n_items`
/// exceeds `MAX_LOG_ITEMS` (§4.I step 5). Running out of bytes mid-header
/// ends parsing quietly — the span's tail is unused padding, not corruption.
fn parse_log_span(span: &[u8]) -> (Vec<LogRecordRaw>, bool) {
    let mut records = Vec::new();
    let mut pos = 0_usize;
    while pos + 8 <= span.len() {
        let handle = u32::from_le_bytes(span[pos..pos + 4].try_into().expect("4 bytes"));
        let n_items = u32::from_le_bytes(span[pos + 4..pos + 8].try_into().expect("4 bytes"));
        pos += 8;
        if n_items as usize > MAX_LOG_ITEMS {
            return (records, true);
        }
        let values_len = n_items as usize * 4;
        if pos + values_len > span.len() {
            break;
        }
        let values = span[pos..pos + values_len]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        pos += values_len;
        records.push(LogRecordRaw { handle, values });
    }
    (records, false)
}

/// Matches parsed records against `node`'s log/snapshot declarations by
/// handle, formats each matched record, and groups the resulting lines by
/// declared filename. Unmatched handles and item-count mismatches are
/// reported as warning strings rather than failing the whole drain.
fn match_and_format(records: &[LogRecordRaw], node: &NodeRecord) -> (HashMap<String, Vec<String>>, Vec<String>) {
    let mut files: HashMap<String, Vec<String>> = HashMap::new();
    let mut warnings = Vec::new();

    for rec in records {
        let Some(decl) = node.logs.iter().chain(node.snapshots.iter()).find(|d| d.handle == rec.handle) else {
            warnings.push(format!("node {}: no log declaration for handle {}", node.node_id, rec.handle));
            continue;
        };
        if decl.log_items as usize != rec.values.len() {
            warnings.push(format!(
                "node {}: handle {} item count mismatch (declared {}, got {})",
                node.node_id,
                rec.handle,
                decl.log_items,
                rec.values.len()
            ));
            continue;
        }
        let line = format_log_line(&decl.format, &rec.values);
        files.entry(decl.filename.clone()).or_default().push(line);
    }

    (files, warnings)
}

/// Drains every populated core's log ring (reverse slot order, same as
/// start), formats recorded entries, and writes one text file per declared
/// filename. Corrupt rings and unmatched/mismatched records are warned
/// about and skipped rather than aborting the drain (§7).
///
/// # Errors
/// Anything [`ControlClient::read_memory`] can raise.
pub fn drain_all(control: &ControlClient, plan: &PlacementPlan, nodes: &[NodeRecord], grid_w: u32, grid_h: u32) -> Result<()> {
    for (x, y, core) in reverse_slot_order(grid_w, grid_h) {
        let physical_id = pack_physical_id(x, y, core);
        let Some(node_id) = plan.map.node_id_at(physical_id) else { continue };
        let Some(node) = nodes.iter().find(|n| n.node_id == node_id) else { continue };
        let dev = DeviceAddress::new(x, y, core)?;

        let ev_start = damsonrt_ev_start(core);
        let evsize_raw = control.read_memory(dev, ev_start, 4)?;
        let evsize_words = u32::from_le_bytes(evsize_raw.try_into().expect("4 bytes"));

        let log_data_end_raw = control.read_memory(dev, damsonrt_system_global_address(SYSGLOBAL_LOG_DATA_END), 4)?;
        let log_data_end = u32::from_le_bytes(log_data_end_raw.try_into().expect("4 bytes"));
        let log_data_start = ev_start + evsize_words * 4 + 4;

        if log_data_end <= log_data_start {
            continue;
        }
        let span = control.read_memory(dev, log_data_start, log_data_end - log_data_start)?;

        let (records, corrupted) = parse_log_span(&span);
        if corrupted {
            eprintln!("[WARN] node {node_id}: corrupt log ring (n_items exceeds MAX_LOG_ITEMS), truncating drain");
        }
        let (files, warnings) = match_and_format(&records, node);
        for warning in warnings {
            eprintln!("[WARN] {warning}");
        }
        for (filename, lines) in files {
            if let Err(e) = fs::write(&filename, lines.concat()) {
                eprintln!("[WARN] failed to write log file '{filename}': {e}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::LogDecl;

    fn decl(handle: u32, log_items: u32, format: &str, filename: &str) -> LogDecl {
        LogDecl {
            handle,
            start_time: 0,
            end_time: 0,
            interval: 0,
            log_items,
            log_globals: vec![],
            format: format.to_string(),
            filename: filename.to_string(),
        }
    }

    fn push_record(buf: &mut Vec<u8>, handle: u32, values: &[u32]) {
        buf.extend_from_slice(&handle.to_le_bytes());
        buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn reverse_slot_order_visits_last_chip_first() {
        let slots = reverse_slot_order(2, 2);
        assert_eq!(slots[0], (1, 1, MAX_APPLICATION_CORE_ID));
        assert_eq!(*slots.last().unwrap(), (0, 0, MIN_APPLICATION_CORE_ID));
    }

    #[test]
    fn parses_well_formed_span() {
        let mut buf = Vec::new();
        push_record(&mut buf, 0, &[0x0001_8000]);
        push_record(&mut buf, 1, &[1, 2]);
        let (records, corrupted) = parse_log_span(&buf);
        assert!(!corrupted);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].values, vec![1, 2]);
    }

    #[test]
    fn oversized_n_items_is_corruption_and_stops_parsing() {
        let mut buf = Vec::new();
        push_record(&mut buf, 0, &[1]);
        buf.extend_from_slice(&2_u32.to_le_bytes()); // handle
        buf.extend_from_slice(&((MAX_LOG_ITEMS as u32) + 1).to_le_bytes()); // n_items too big
        let (records, corrupted) = parse_log_span(&buf);
        assert!(corrupted);
        assert_eq!(records.len(), 1); // only the first well-formed record survives
    }

    #[test]
    fn match_and_format_groups_by_filename() {
        let node = NodeRecord {
            node_id: 9,
            prototype_name: "p".to_string(),
            gv: vec![0],
            ev: vec![],
            interrupts: vec![],
            logs: vec![decl(0, 1, "x=%f\n", "out.log")],
            snapshots: vec![decl(1, 1, "y=%d\n", "out.log")],
        };
        let records = vec![
            LogRecordRaw { handle: 0, values: vec![0x0001_8000] },
            LogRecordRaw { handle: 1, values: vec![7] },
        ];
        let (files, warnings) = match_and_format(&records, &node);
        assert!(warnings.is_empty());
        assert_eq!(files["out.log"], vec!["x=1.500000\n".to_string(), "y=7\n".to_string()]);
    }

    #[test]
    fn match_and_format_warns_on_unknown_handle() {
        let node = NodeRecord {
            node_id: 9,
            prototype_name: "p".to_string(),
            gv: vec![0],
            ev: vec![],
            interrupts: vec![],
            logs: vec![],
            snapshots: vec![],
        };
        let records = vec![LogRecordRaw { handle: 5, values: vec![] }];
        let (files, warnings) = match_and_format(&records, &node);
        assert!(files.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn match_and_format_warns_on_item_count_mismatch() {
        let node = NodeRecord {
            node_id: 9,
            prototype_name: "p".to_string(),
            gv: vec![0],
            ev: vec![],
            interrupts: vec![],
            logs: vec![decl(0, 2, "x=%d %d\n", "out.log")],
            snapshots: vec![],
        };
        let records = vec![LogRecordRaw { handle: 0, values: vec![1] }];
        let (files, warnings) = match_and_format(&records, &node);
        assert!(files.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
