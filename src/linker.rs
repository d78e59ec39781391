//! Reader for the binary linker file (spec.md §4.D): a big-endian 32-bit
//! word stream with NUL-terminated, 4-byte-padded strings, terminated by a
//! `node_id == 0` sentinel.
//!
//! §9 suggests that a language without convenient seek/rewind should slurp
//! the file into an indexable buffer and walk it with two cursors rather
//! than physically re-reading it twice. We go one step further: the whole
//! file is parsed once into a `Vec<NodeRecord>` that retains everything
//! both the placement pass and the image-load pass need, so the "two
//! passes" become two passes over that in-memory vector instead of two
//! physical file traversals. No information available to either original
//! pass is dropped.

use std::fs;
use std::path::Path;

use crate::constants::{DAMSONRT_DTCM_START, MAX_STRING_SIZE};
use crate::error::{LoaderError, Result};

/// One `{code_offset, src_node}` interrupt subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptDecl {
    pub code_offset: u32,
    pub src_node: u32,
}

/// A periodic log or snapshot declaration (spec.md §3 `LogDecl`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDecl {
    /// Identifies this declaration to the drain scan at shutdown. The wire
    /// format carries no explicit handle field; one is assigned as the
    /// declaration's sequential index within its owning node (logs and
    /// snapshots share one counter), matching how the on-device runtime
    /// numbers its own log records in declaration order.
    pub handle: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub interval: u32,
    pub log_items: u32,
    /// Byte addresses on device (already converted from the word-unit form
    /// on the wire via `word * 4 + DAMSONRT_DTCM_START`).
    pub log_globals: Vec<u32>,
    pub format: String,
    pub filename: String,
}

/// A fully parsed logical node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: u32,
    pub prototype_name: String,
    /// `gv_size + 1` words; index 0 is always 0 (the reserved slot gv[0]).
    pub gv: Vec<i32>,
    pub ev: Vec<i32>,
    pub interrupts: Vec<InterruptDecl>,
    pub logs: Vec<LogDecl>,
    pub snapshots: Vec<LogDecl>,
}

/// Cursor over an in-memory linker-file buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let word = self
            .buf
            .get(self.pos..end)
            .ok_or(LoaderError::LinkerUnexpectedEof)?;
        self.pos = end;
        Ok(u32::from_be_bytes(word.try_into().expect("4-byte slice")))
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|word| word as i32)
    }

    fn read_string(&mut self, what: &'static str) -> Result<String> {
        let start = self.pos;
        let mut len = 0_usize;
        loop {
            let byte = *self
                .buf
                .get(start + len)
                .ok_or(LoaderError::LinkerUnexpectedEof)?;
            if byte == 0 {
                break;
            }
            len += 1;
            if len >= MAX_STRING_SIZE {
                return Err(LoaderError::LinkerStringTooLong { what });
            }
        }
        let bytes_with_nul = len + 1;
        let padded = (bytes_with_nul + 3) / 4 * 4;
        let new_pos = start + padded;
        if new_pos > self.buf.len() {
            return Err(LoaderError::LinkerUnexpectedEof);
        }
        self.pos = new_pos;
        Ok(String::from_utf8_lossy(&self.buf[start..start + len]).into_owned())
    }
}

/// Converts a word-unit global address from the linker file into a device byte address.
fn global_address(word: u32) -> u32 {
    word * 4 + DAMSONRT_DTCM_START
}

fn read_log_record(cur: &mut Cursor<'_>, handle: u32) -> Result<(u32, LogDecl)> {
    let tag = cur.read_u32()?;
    let start_time = cur.read_u32()?;
    let end_time = cur.read_u32()?;
    let interval = cur.read_u32()?;
    let log_items = cur.read_u32()?;
    let mut log_globals = Vec::with_capacity(log_items as usize);
    for _ in 0..log_items {
        log_globals.push(global_address(cur.read_u32()?));
    }
    let format = cur.read_string("log format")?;
    let filename = cur.read_string("log filename")?;
    Ok((
        tag,
        LogDecl {
            handle,
            start_time,
            end_time,
            interval,
            log_items,
            log_globals,
            format,
            filename,
        },
    ))
}

fn read_node(cur: &mut Cursor<'_>) -> Result<Option<NodeRecord>> {
    let node_id = cur.read_u32()?;
    if node_id == 0 {
        return Ok(None);
    }
    let prototype_name = cur.read_string("prototype name")?;

    let gv_size = cur.read_u32()?;
    let mut gv = Vec::with_capacity(gv_size as usize + 1);
    for _ in 0..=gv_size {
        gv.push(cur.read_i32()?);
    }

    let ev_size = cur.read_u32()?;
    let mut ev = Vec::with_capacity(ev_size as usize);
    for _ in 0..ev_size {
        ev.push(cur.read_i32()?);
    }

    let n_interrupts = cur.read_u32()?;
    let mut interrupts = Vec::with_capacity(n_interrupts as usize);
    for _ in 0..n_interrupts {
        let code_offset = cur.read_u32()?;
        let src_node = cur.read_u32()?;
        interrupts.push(InterruptDecl { code_offset, src_node });
    }

    let n_logs = cur.read_u32()?;
    let mut logs = Vec::new();
    let mut snapshots = Vec::new();
    for handle in 0..n_logs {
        let (tag, decl) = read_log_record(cur, handle)?;
        match tag {
            1 => logs.push(decl),
            2 => snapshots.push(decl),
            other => return Err(LoaderError::LinkerBadTag { tag: other }),
        }
    }

    Ok(Some(NodeRecord {
        node_id,
        prototype_name,
        gv,
        ev,
        interrupts,
        logs,
        snapshots,
    }))
}

/// Reads every node record out of the raw bytes of a linker file.
///
/// # Errors
/// [`LoaderError::LinkerUnexpectedEof`] if a record is truncated,
/// [`LoaderError::LinkerStringTooLong`] if a string exceeds `MAX_STRING_SIZE`,
/// [`LoaderError::LinkerBadTag`] if a log record's tag is neither 1 nor 2.
pub fn parse_nodes(buf: &[u8]) -> Result<Vec<NodeRecord>> {
    let mut cur = Cursor::new(buf);
    let mut nodes = Vec::new();
    while let Some(node) = read_node(&mut cur)? {
        nodes.push(node);
    }
    Ok(nodes)
}

/// Reads a linker file from disk and parses every node record in it.
///
/// # Errors
/// [`LoaderError::LinkerFileOpen`] if `path` cannot be read, plus anything
/// [`parse_nodes`] can raise.
pub fn load_linker_file(path: &Path) -> Result<Vec<NodeRecord>> {
    let buf = fs::read(path).map_err(|source| LoaderError::LinkerFileOpen {
        path: path.display().to_string(),
        source,
    })?;
    parse_nodes(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, word: u32) {
        buf.extend_from_slice(&word.to_be_bytes());
    }

    fn push_string(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
        while buf.len() % 4 != 0 {
            buf.push(0xAA);
        }
    }

    #[test]
    fn parses_single_node_no_interrupts_no_logs() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 1); // node_id
        push_string(&mut buf, "proto");
        push_u32(&mut buf, 2); // gv_size
        push_u32(&mut buf, 0); // gv[0] reserved
        push_u32(&mut buf, 11);
        push_u32(&mut buf, 22);
        push_u32(&mut buf, 1); // ev_size
        push_u32(&mut buf, 99);
        push_u32(&mut buf, 0); // n_interrupts
        push_u32(&mut buf, 0); // n_logs
        push_u32(&mut buf, 0); // terminator

        let nodes = parse_nodes(&buf).unwrap();
        assert_eq!(nodes.len(), 1);
        let node = &nodes[0];
        assert_eq!(node.node_id, 1);
        assert_eq!(node.prototype_name, "proto");
        assert_eq!(node.gv, vec![0, 11, 22]);
        assert_eq!(node.ev, vec![99]);
        assert!(node.interrupts.is_empty());
        assert!(node.logs.is_empty());
    }

    #[test]
    fn parses_log_and_snapshot_with_address_conversion() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 7);
        push_string(&mut buf, "p");
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0); // ev_size
        push_u32(&mut buf, 0); // n_interrupts
        push_u32(&mut buf, 2); // n_logs
        // log record (tag=1)
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 1000);
        push_u32(&mut buf, 500);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 4); // word address 4
        push_string(&mut buf, "x=%f\n");
        push_string(&mut buf, "out.log");
        // snapshot record (tag=2)
        push_u32(&mut buf, 2);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 2000);
        push_u32(&mut buf, 1000);
        push_u32(&mut buf, 0);
        push_string(&mut buf, "snap\n");
        push_string(&mut buf, "snap.log");
        push_u32(&mut buf, 0); // terminator

        let nodes = parse_nodes(&buf).unwrap();
        let node = &nodes[0];
        assert_eq!(node.logs.len(), 1);
        assert_eq!(node.snapshots.len(), 1);
        assert_eq!(node.logs[0].handle, 0);
        assert_eq!(node.snapshots[0].handle, 1);
        assert_eq!(node.logs[0].log_globals, vec![4 * 4 + DAMSONRT_DTCM_START]);
        assert_eq!(node.logs[0].format, "x=%f\n");
    }

    #[test]
    fn truncated_record_is_fatal() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 1);
        // missing everything else
        assert!(matches!(parse_nodes(&buf), Err(LoaderError::LinkerUnexpectedEof)));
    }

    #[test]
    fn node_id_zero_terminates_immediately() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 0);
        assert_eq!(parse_nodes(&buf).unwrap().len(), 0);
    }
}
