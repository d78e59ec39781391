//! Flat error taxonomy (spec.md §7). Every fatal condition named anywhere
//! in the component design surfaces as one of these variants; there is no
//! retry or recovery path for any of them beyond what a caller explicitly
//! treats as non-fatal (§7's validation-mismatch carve-out).

use std::fmt;
use std::io;

/// The complete set of fatal conditions the loader can raise.
#[derive(Debug)]
pub enum LoaderError {
    /// `spinnaker.ini` could not be opened.
    ConfigMissing { path: String, source: io::Error },
    /// `spinnaker.ini` was found but not in `"<ip> <grid_w> <grid_h>"` form.
    ConfigMalformed { path: String, detail: String },
    /// `boot.bin` could not be opened.
    BootFileMissing { path: String, source: io::Error },
    /// `boot.bin` exceeds `SPINNAKER_MAX_BOOT_SIZE`.
    BootFileTooLarge { size: u64, max: usize },
    /// Sending a boot packet failed.
    BootSend(io::Error),
    /// A UDP socket could not be created.
    SocketCreate(io::Error),
    /// A UDP socket could not be bound.
    SocketBind { addr: String, source: io::Error },
    /// The configured device IP address did not parse.
    BadIp(String),
    /// Sending an SDP request failed.
    SdpSend(io::Error),
    /// Receiving an SDP response failed.
    SdpRecv(io::Error),
    /// No SDP response arrived within the 1 s window.
    SdpTimeout { cmd: u16 },
    /// Receiving on the debug channel failed.
    DebugRecv(io::Error),
    /// A prototype object file could not be opened for `load_application_at`.
    LoadFileOpen { path: String, source: io::Error },
    /// `start_application_at` was asked to start core 0 (the monitor).
    StartAppOnMonitor { x: u32, y: u32 },
    /// A virtual port outside `[1, MAX_VIRTUAL_PORTS]` was requested.
    VirtualPortRange { port: u32 },
    /// A core id outside `[0, MAX_CORES_PER_CHIP)` was used in an address.
    CoreIdRange { core_id: u32 },
    /// The placement planner ran out of cores for the configured grid.
    OutOfCores { node_count: usize, grid_w: u32, grid_h: u32 },
    /// The placement (or reverse-placement) hash table overflowed its probe budget.
    MappingHashOverflow,
    /// A core's interrupt hash overflowed its probe budget.
    InterruptHashOverflow { node_id: u32 },
    /// A chip's routing table exceeded `MAX_ROUTING_TABLE_ENTRIES`.
    RoutingTableOverflow { chip_x: u32, chip_y: u32 },
    /// A node's computed DTCM data layout exceeds `DAMSONRT_DTCM_DATA_MAX`.
    DtcmTooBig { node_id: u32, size: u32, max: u32 },
    /// A post-load read-back did not match what was written.
    ValidationMismatch { node_id: u32, detail: String },
    /// The linker file ended before a record was fully read.
    LinkerUnexpectedEof,
    /// A string in the linker file exceeded `MAX_STRING_SIZE`.
    LinkerStringTooLong { what: &'static str },
    /// The linker file could not be opened.
    LinkerFileOpen { path: String, source: io::Error },
    /// A log record carried a tag other than 1 (log) or 2 (snapshot).
    LinkerBadTag { tag: u32 },
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissing { path, source } => {
                write!(f, "config file '{path}' does not exist: {source}")
            }
            Self::ConfigMalformed { path, detail } => {
                write!(f, "config file '{path}' is malformed: {detail}")
            }
            Self::BootFileMissing { path, source } => {
                write!(f, "boot file '{path}' not found: {source}")
            }
            Self::BootFileTooLarge { size, max } => {
                write!(f, "boot file size {size} exceeds limit {max}")
            }
            Self::BootSend(e) => write!(f, "failed to send boot packet: {e}"),
            Self::SocketCreate(e) => write!(f, "failed to create socket: {e}"),
            Self::SocketBind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            Self::BadIp(ip) => write!(f, "invalid device IP address '{ip}'"),
            Self::SdpSend(e) => write!(f, "failed to send SDP command: {e}"),
            Self::SdpRecv(e) => write!(f, "failed to receive SDP response: {e}"),
            Self::SdpTimeout { cmd } => {
                write!(f, "no response from device (target timeout), cmd={cmd}")
            }
            Self::DebugRecv(e) => write!(f, "failed to receive debug message: {e}"),
            Self::LoadFileOpen { path, source } => {
                write!(f, "failed to open prototype object '{path}': {source}")
            }
            Self::StartAppOnMonitor { x, y } => {
                write!(f, "cannot start application on monitor core of chip ({x},{y})")
            }
            Self::VirtualPortRange { port } => {
                write!(f, "virtual port {port} not within range [1,7]")
            }
            Self::CoreIdRange { core_id } => {
                write!(f, "core id {core_id} outside valid range")
            }
            Self::OutOfCores { node_count, grid_w, grid_h } => write!(
                f,
                "mapper has run out of available cores: {node_count} nodes do not fit a {grid_w}x{grid_h} grid"
            ),
            Self::MappingHashOverflow => write!(f, "mapping hash table overflow"),
            Self::InterruptHashOverflow { node_id } => {
                write!(f, "interrupt hash table overflow for node {node_id}")
            }
            Self::RoutingTableOverflow { chip_x, chip_y } => {
                write!(f, "routing table overflow on chip ({chip_x},{chip_y})")
            }
            Self::DtcmTooBig { node_id, size, max } => write!(
                f,
                "node {node_id} DTCM data part size ({size} bytes) exceeds limit ({max} bytes)"
            ),
            Self::ValidationMismatch { node_id, detail } => {
                write!(f, "node {node_id} validation mismatch: {detail}")
            }
            Self::LinkerUnexpectedEof => write!(f, "unexpected end found in linker file"),
            Self::LinkerStringTooLong { what } => {
                write!(f, "{what} string too long for buffer")
            }
            Self::LinkerFileOpen { path, source } => {
                write!(f, "failed to open linker file '{path}': {source}")
            }
            Self::LinkerBadTag { tag } => write!(f, "log record has unknown tag {tag} (want 1 or 2)"),
        }
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigMissing { source, .. }
            | Self::BootFileMissing { source, .. }
            | Self::SocketBind { source, .. }
            | Self::LoadFileOpen { source, .. }
            | Self::LinkerFileOpen { source, .. } => Some(source),
            Self::BootSend(e) | Self::SocketCreate(e) | Self::SdpSend(e) | Self::SdpRecv(e) | Self::DebugRecv(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, LoaderError>;
