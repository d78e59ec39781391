//! Fixed numeric constants from spec.md §3/§6, plus the device memory-map
//! constants named (but not numerically pinned) by the out-of-scope
//! firmware. See `DESIGN.md` for which of these are load-bearing for an
//! invariant and which are merely self-consistent choices.

use std::time::Duration;

/// UDP port the control (SDP) channel talks to.
pub const SPINNAKER_CMD_PORT: u16 = 17_893;
/// UDP port the debug receiver binds to.
pub const SPINNAKER_DEBUG_OUTPUT_PORT: u16 = 17_892;
/// UDP port the boot channel talks to.
pub const SPINNAKER_BOOT_PORT: u16 = 54_321;

/// Max payload bytes per control-channel read/write window.
pub const SDP_DATA_MAX: usize = 256;
/// Max payload bytes per boot-channel data packet.
pub const SPINNAKER_BOOT_DATA_MAX: usize = 1024;
/// Max total boot file size (32 blocks of `SPINNAKER_BOOT_DATA_MAX`).
pub const SPINNAKER_MAX_BOOT_SIZE: usize = SPINNAKER_BOOT_DATA_MAX * 32;

/// Throttling delay after every successful control-channel command.
pub const SPINNAKER_CMD_DELAY: Duration = Duration::from_millis(10);
/// Delay after the APLX-FILL zeroing trick, before the first data write.
pub const APLX_FILL_SETTLE_DELAY: Duration = Duration::from_millis(10);
/// Final delay after the boot image upload, before SDP traffic begins.
pub const BOOT_SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Response wait timeout for a single control-channel command.
pub const SDP_CMD_TIMEOUT: Duration = Duration::from_secs(1);

/// SDP boot op: START.
pub const BOOT_CMD_START: u32 = 1;
/// SDP boot op: DATA.
pub const BOOT_CMD_DATA: u32 = 3;
/// SDP boot op: END.
pub const BOOT_CMD_END: u32 = 5;
/// Boot protocol version sent in every boot header.
pub const BOOT_PROT_VER: u16 = 1;

/// SDP command: read version (yBoot `SVER`).
pub const CMD_SVER: u16 = 0;
/// SDP command: read memory.
pub const CMD_READ: u16 = 2;
/// SDP command: write memory.
pub const CMD_WRITE: u16 = 3;
/// SDP command: start application (APLX).
pub const CMD_APLX: u16 = 4;
/// SDP command: configure point-to-point routing.
pub const CMD_P2PC: u16 = 13;
/// SDP command: manage IP tags.
pub const CMD_IPTAG: u16 = 18;

/// IPTAG sub-operation: clear.
pub const IPTAG_CLR: u32 = 3;
/// IPTAG sub-operation: auto-assign.
pub const IPTAG_AUTO: u32 = 4;

/// Memory transfer element type: byte.
pub const TYPE_BYTE: u32 = 0;

/// Standard `tto` field value for every control request.
pub const SDP_DEFAULT_TTO: u8 = 8;
/// Standard `flags` field value for every control request.
pub const SDP_DEFAULT_FLAGS: u8 = 0x87;
/// Standard `tag` field value for every control request.
pub const SDP_DEFAULT_TAG: u8 = 255;
/// Standard `src_core` field value for every control request.
pub const SDP_DEFAULT_SRC_CORE: u8 = 255;

/// Scratch device address used for the APLX-FILL zeroing trick.
pub const APLX_FILL_SCRATCH_ADDRESS: u32 = 0xf500_0000;
/// APLX FILL opcode.
pub const APLX_OP_FILL: u32 = 0x3;
/// APLX descriptor-list terminator.
pub const APLX_TERMINATOR: u32 = 0xffff_ffff;

/// Monitor core id (never assigned to a logical node).
pub const MONITOR_CORE_ID: u32 = 0;
/// Lowest application core id on a chip.
pub const MIN_APPLICATION_CORE_ID: u32 = 1;
/// Highest application core id on a chip: wraps to the next chip when
/// `core > 16`, giving cores `1..=16` per chip (core 0 is the monitor).
pub const MAX_APPLICATION_CORE_ID: u32 = 16;
/// Total cores per chip, including the monitor.
pub const MAX_CORES_PER_CHIP: u32 = 18;

/// Outgoing link bit: East.
pub const LINK_EAST: u32 = 1 << 0;
/// Outgoing link bit: North-East.
pub const LINK_NORTH_EAST: u32 = 1 << 1;
/// Outgoing link bit: North.
pub const LINK_NORTH: u32 = 1 << 2;
/// Outgoing link bit: West.
pub const LINK_WEST: u32 = 1 << 3;
/// Outgoing link bit: South-West.
pub const LINK_SOUTH_WEST: u32 = 1 << 4;
/// Outgoing link bit: South.
pub const LINK_SOUTH: u32 = 1 << 5;
/// Number of link bits, i.e. the shift before the per-core delivery bits start.
pub const NUM_LINKS: u32 = 6;

/// Maximum routing table entries per chip.
pub const MAX_ROUTING_TABLE_ENTRIES: usize = 1024;

/// Record-array capacity shared by log and snapshot device records (§3/DESIGN.md decision 4).
pub const MAX_LOG_ITEMS: usize = 10;
/// Printf arity used when formatting a `log` (tag 1) entry.
pub const LOG_ARITY: usize = 5;
/// Printf arity used when formatting a `snapshot` (tag 2) entry.
pub const SNAPSHOT_ARITY: usize = 10;

/// Max string length (including NUL) for a format or filename string in the linker file.
pub const MAX_STRING_SIZE: usize = 128;

/// On-device byte size of one fixed-shape log/snapshot record
/// (`handle:u32` + `log_items:u32` + `log_globals:[u32; MAX_LOG_ITEMS]`).
/// The same record shape doubles as the shutdown drain's ring entry
/// (`{handle, n_items, values[]}`, §4.I) once the runtime has overwritten
/// the address slots with captured values.
pub const RUNTIME_LOG_ITEM_BYTES: u32 = 4 + 4 + (MAX_LOG_ITEMS as u32) * 4;

/// Multiplier in the placement/interrupt open-addressed hash (`h(n) = (n*A + C) mod size`).
pub const DAMSONRT_HASH_A: u32 = 1_103_515_245;
/// Additive constant in the placement/interrupt open-addressed hash.
pub const DAMSONRT_HASH_C: u32 = 12_345;

/// Bit shift applied to a source node id to form a routing-table key.
pub const DAMSONRT_PORT_BITS: u32 = 8;

/// Byte address of the start of each core's DTCM region.
pub const DAMSONRT_DTCM_START: u32 = 0x0040_0000;
/// Words reserved at the front of every core's global-vector area for the system-globals table.
pub const DAMSONRT_SYSTEM_RESERVED: u32 = 64;
/// Byte size of the system-reserved area (`DAMSONRT_SYSTEM_RESERVED` words).
pub const DAMSONRT_SYSTEM_RESERVED_BYTES: u32 = DAMSONRT_SYSTEM_RESERVED * 4;
/// Maximum bytes available for the data part of DTCM (gv + intv hash + logs + snapshots).
pub const DAMSONRT_DTCM_DATA_MAX: u32 = 32 * 1024;
/// Per-core budget for the external vector region.
const DAMSONRT_EV_MAX_BYTES: u32 = 4 * 1024;
/// Address where the loaded program image is written and started.
pub const DAMSONRT_DTCM_PROGRAM_START: u32 = 0x0060_0000;

/// Byte address of the external-vector region for a given core id.
#[must_use]
pub const fn damsonrt_ev_start(core_id: u32) -> u32 {
    DAMSONRT_DTCM_START + DAMSONRT_DTCM_DATA_MAX + core_id * DAMSONRT_EV_MAX_BYTES
}

/// Byte address of the chip-shared area (core map + routing table), written only by core 1.
pub const DAMSONRT_EV_SHARED_START: u32 =
    DAMSONRT_DTCM_START + DAMSONRT_DTCM_DATA_MAX + MAX_CORES_PER_CHIP * DAMSONRT_EV_MAX_BYTES;

/// Byte address of system-global word index `n` (within the system-reserved area).
#[must_use]
pub const fn damsonrt_system_global_address(n: u32) -> u32 {
    DAMSONRT_DTCM_START + n * 4
}

/// System-global index: gv size (user + reserved, in words).
pub const SYSGLOBAL_GV_SIZE: u32 = 0;
/// System-global index: interrupt hash size (entries).
pub const SYSGLOBAL_INTV_SIZE: u32 = 5;
/// System-global index: log count.
pub const SYSGLOBAL_LOG_COUNT: u32 = 8;
/// System-global index: snapshot count.
pub const SYSGLOBAL_SNAPSHOT_COUNT: u32 = 9;
/// System-global index: debug mode flag.
pub const SYSGLOBAL_DEBUG_MODE: u32 = 24;
/// System-global index: host-read log-ring end pointer.
pub const SYSGLOBAL_LOG_DATA_END: u32 = 25;
/// System-global index: interrupt hash start byte address.
pub const SYSGLOBAL_INTV_START: u32 = 40;
/// System-global index: log records start byte address.
pub const SYSGLOBAL_LOGS_START: u32 = 43;
/// System-global index: snapshot records start byte address.
pub const SYSGLOBAL_SNAPSHOTS_START: u32 = 44;
/// System-global index: total chip count.
pub const SYSGLOBAL_CHIP_COUNT: u32 = 48;
/// System-global index: this node's logical id.
pub const SYSGLOBAL_NODE_ID: u32 = 49;
