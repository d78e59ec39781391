//! SDP control client (spec.md §4.B): connected UDP request/response RPC
//! to the fabric's monitor processors, chunked read/write, the APLX-FILL
//! zeroing trick, and application start/load.

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::ops::Range;
use std::path::Path;
use std::thread::sleep;

use crate::constants::{
    APLX_FILL_SCRATCH_ADDRESS, APLX_FILL_SETTLE_DELAY, APLX_OP_FILL, APLX_TERMINATOR, CMD_APLX, CMD_IPTAG,
    CMD_P2PC, CMD_READ, CMD_SVER, CMD_WRITE, IPTAG_AUTO, IPTAG_CLR, MAX_CORES_PER_CHIP, MONITOR_CORE_ID,
    SDP_CMD_TIMEOUT, SDP_DATA_MAX, SPINNAKER_CMD_DELAY, SPINNAKER_CMD_PORT, SPINNAKER_DEBUG_OUTPUT_PORT,
    TYPE_BYTE,
};
use crate::error::{LoaderError, Result};
use crate::wire::{SdpHeader, SdpRespHeader, SDP_RESP_HEADER_LEN};

/// A core's address as targeted by the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    pub chip_x: u32,
    pub chip_y: u32,
    pub core_id: u32,
}

impl DeviceAddress {
    /// # Errors
    /// [`LoaderError::CoreIdRange`] if `core_id` is outside `[0, MAX_CORES_PER_CHIP)`.
    pub fn new(chip_x: u32, chip_y: u32, core_id: u32) -> Result<Self> {
        if core_id >= MAX_CORES_PER_CHIP {
            return Err(LoaderError::CoreIdRange { core_id });
        }
        Ok(Self { chip_x, chip_y, core_id })
    }

    fn dst_cpu(self) -> u16 {
        ((self.chip_x as u16) << 8) | (self.chip_y as u16 & 0xff)
    }

    fn dst_core(self) -> u8 {
        self.core_id as u8
    }
}

/// Finds the maximal runs of consecutive non-zero bytes in `window`, in order.
fn nonzero_runs(window: &[u8]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < window.len() {
        if window[i] == 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < window.len() && window[i] != 0 {
            i += 1;
        }
        runs.push(start..i);
    }
    runs
}

/// Owns the connected UDP endpoint used for all SDP control traffic.
pub struct ControlClient {
    socket: UdpSocket,
}

impl ControlClient {
    /// Connects to `(device_ip, SPINNAKER_CMD_PORT)`.
    ///
    /// # Errors
    /// [`LoaderError::SocketCreate`] if the socket cannot be created, bound,
    /// connected, or have its read timeout set.
    pub fn connect(device_ip: IpAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(LoaderError::SocketCreate)?;
        socket
            .connect(SocketAddr::new(device_ip, SPINNAKER_CMD_PORT))
            .map_err(LoaderError::SocketCreate)?;
        socket.set_read_timeout(Some(SDP_CMD_TIMEOUT)).map_err(LoaderError::SocketCreate)?;
        Ok(Self { socket })
    }

    /// Sends one SDP request and waits up to `SDP_CMD_TIMEOUT` for its response.
    ///
    /// # Errors
    /// [`LoaderError::SdpSend`]/[`LoaderError::SdpRecv`] on socket faults,
    /// [`LoaderError::SdpTimeout`] if no response arrives in time.
    pub fn send_cmd(
        &self,
        dev: DeviceAddress,
        cmd: u16,
        arg1: u32,
        arg2: u32,
        arg3: u32,
        data: &[u8],
    ) -> Result<(SdpRespHeader, Vec<u8>)> {
        let hdr = SdpHeader {
            cmd,
            arg1,
            arg2,
            arg3,
            dst_cpu: dev.dst_cpu(),
            dst_core: dev.dst_core(),
            ..SdpHeader::defaults()
        };
        let mut packet = hdr.encode().to_vec();
        packet.extend_from_slice(data);
        self.socket.send(&packet).map_err(LoaderError::SdpSend)?;

        let mut buf = [0_u8; SDP_RESP_HEADER_LEN + SDP_DATA_MAX];
        let n = self.socket.recv(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => LoaderError::SdpTimeout { cmd },
            _ => LoaderError::SdpRecv(e),
        })?;
        let resp_hdr = SdpRespHeader::decode(&buf[..n])
            .ok_or_else(|| LoaderError::SdpRecv(io::Error::new(io::ErrorKind::UnexpectedEof, "short SDP response")))?;
        let payload = buf[SDP_RESP_HEADER_LEN..n].to_vec();

        sleep(SPINNAKER_CMD_DELAY);
        Ok((resp_hdr, payload))
    }

    /// Reads `size` bytes starting at `addr`, in `SDP_DATA_MAX`-byte windows.
    ///
    /// # Errors
    /// Anything [`Self::send_cmd`] can raise.
    pub fn read_memory(&self, dev: DeviceAddress, addr: u32, size: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(size as usize);
        let mut offset = 0_u32;
        while offset < size {
            let window = (size - offset).min(SDP_DATA_MAX as u32);
            let (_, payload) = self.send_cmd(dev, CMD_READ, addr + offset, window, TYPE_BYTE, &[])?;
            out.extend_from_slice(&payload[..window as usize]);
            offset += window;
        }
        Ok(out)
    }

    /// Writes `buf` starting at `addr`, in `SDP_DATA_MAX`-byte windows.
    ///
    /// # Errors
    /// Anything [`Self::send_cmd`] can raise.
    pub fn write_memory(&self, dev: DeviceAddress, addr: u32, buf: &[u8]) -> Result<()> {
        let mut offset = 0_usize;
        while offset < buf.len() {
            let window = (buf.len() - offset).min(SDP_DATA_MAX);
            let chunk = &buf[offset..offset + window];
            self.send_cmd(dev, CMD_WRITE, addr + offset as u32, window as u32, TYPE_BYTE, chunk)?;
            offset += window;
        }
        Ok(())
    }

    /// Like [`Self::write_memory`] but skips zero bytes, writing only
    /// maximal non-zero runs within each window. Valid only when the
    /// destination region has already been zero-filled (the APLX-FILL
    /// trick); see [`Self::aplx_fill`].
    ///
    /// # Errors
    /// Anything [`Self::send_cmd`] can raise.
    pub fn write_nonzero_memory(&self, dev: DeviceAddress, addr: u32, buf: &[u8]) -> Result<()> {
        let mut offset = 0_usize;
        while offset < buf.len() {
            let window_len = (buf.len() - offset).min(SDP_DATA_MAX);
            let window = &buf[offset..offset + window_len];
            for run in nonzero_runs(window) {
                let run_addr = addr + (offset + run.start) as u32;
                let run_len = (run.end - run.start) as u32;
                self.send_cmd(dev, CMD_WRITE, run_addr, run_len, TYPE_BYTE, &window[run])?;
            }
            offset += window_len;
        }
        Ok(())
    }

    /// Zero-fills `length` bytes at `start` via the APLX FILL descriptor
    /// trick, then sleeps `APLX_FILL_SETTLE_DELAY` before returning.
    ///
    /// # Errors
    /// Anything [`Self::write_memory`] or [`Self::send_cmd`] can raise.
    pub fn aplx_fill(&self, dev: DeviceAddress, regions: &[(u32, u32)]) -> Result<()> {
        let mut descriptor = Vec::with_capacity(regions.len() * 16 + 4);
        for &(start, length) in regions {
            descriptor.extend_from_slice(&APLX_OP_FILL.to_le_bytes());
            descriptor.extend_from_slice(&start.to_le_bytes());
            descriptor.extend_from_slice(&length.to_le_bytes());
            descriptor.extend_from_slice(&0_u32.to_le_bytes());
        }
        descriptor.extend_from_slice(&APLX_TERMINATOR.to_le_bytes());

        self.write_memory(dev, APLX_FILL_SCRATCH_ADDRESS, &descriptor)?;
        self.send_cmd(dev, CMD_APLX, APLX_FILL_SCRATCH_ADDRESS, 0, 0, &[])?;
        sleep(APLX_FILL_SETTLE_DELAY);
        Ok(())
    }

    /// Starts the application already loaded at `addr` on `dev`.
    ///
    /// # Errors
    /// [`LoaderError::StartAppOnMonitor`] if `dev.core_id == MONITOR_CORE_ID`,
    /// else anything [`Self::send_cmd`] can raise.
    pub fn start_application_at(&self, dev: DeviceAddress, addr: u32) -> Result<()> {
        if dev.core_id == MONITOR_CORE_ID {
            return Err(LoaderError::StartAppOnMonitor { x: dev.chip_x, y: dev.chip_y });
        }
        self.send_cmd(dev, CMD_APLX, addr, 0, 0, &[])?;
        Ok(())
    }

    /// Reads `path` and writes it contiguously to `addr` on `dev`.
    ///
    /// # Errors
    /// [`LoaderError::LoadFileOpen`] if `path` cannot be read, else anything
    /// [`Self::write_memory`] can raise.
    pub fn load_application_at(&self, dev: DeviceAddress, addr: u32, path: &Path) -> Result<()> {
        let data = fs::read(path).map_err(|source| LoaderError::LoadFileOpen {
            path: path.display().to_string(),
            source,
        })?;
        self.write_memory(dev, addr, &data)
    }

    /// Queries the yBoot version string as a lightweight connectivity check.
    ///
    /// # Errors
    /// Anything [`Self::send_cmd`] can raise.
    pub fn test_connection(&self, dev: DeviceAddress) -> Result<Vec<u8>> {
        let (_, payload) = self.send_cmd(dev, CMD_SVER, 0, 0, 0, &[])?;
        Ok(payload)
    }

    /// Issues the IPTAG clear/auto-assign and point-to-point routing
    /// configuration for the debug tag, once, before any node is loaded.
    ///
    /// # Errors
    /// Anything [`Self::send_cmd`] can raise.
    pub fn configure_debug_routing(&self, dev: DeviceAddress, node_id: u32, grid_w: u32, grid_h: u32) -> Result<()> {
        self.send_cmd(dev, CMD_IPTAG, IPTAG_CLR << 16, 0, 0, &[])?;
        self.send_cmd(dev, CMD_IPTAG, IPTAG_AUTO << 16, u32::from(SPINNAKER_DEBUG_OUTPUT_PORT), 0, &[])?;
        self.send_cmd(
            dev,
            CMD_P2PC,
            0x003e_0000 | node_id,
            (grid_w << 24) | (grid_h << 16),
            0x0000_3ff8,
            &[],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_address_encodes_chip_coords_into_dst_cpu() {
        let dev = DeviceAddress::new(3, 7, 2).unwrap();
        assert_eq!(dev.dst_cpu(), (3_u16 << 8) | 7);
        assert_eq!(dev.dst_core(), 2);
    }

    #[test]
    fn device_address_rejects_out_of_range_core() {
        assert!(matches!(
            DeviceAddress::new(0, 0, MAX_CORES_PER_CHIP),
            Err(LoaderError::CoreIdRange { .. })
        ));
    }

    #[test]
    fn nonzero_runs_skips_zero_bytes() {
        let window = [0, 1, 2, 0, 0, 5, 0];
        let runs: Vec<_> = nonzero_runs(&window).into_iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(runs, vec![(1, 3), (5, 6)]);
    }

    #[test]
    fn nonzero_runs_handles_all_zero_and_all_nonzero() {
        assert!(nonzero_runs(&[0, 0, 0]).is_empty());
        assert_eq!(nonzero_runs(&[1, 2, 3]), vec![0..3]);
    }
}
