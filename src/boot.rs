//! Boot-image upload over the dedicated boot UDP channel (spec.md §6):
//! `boot.bin` split into 1024-byte blocks, each sent as a big-endian,
//! word-swapped boot packet.

use std::fs;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::Path;
use std::thread::sleep;

use crate::constants::{
    BOOT_CMD_DATA, BOOT_CMD_END, BOOT_CMD_START, BOOT_PROT_VER, BOOT_SETTLE_DELAY, SPINNAKER_BOOT_DATA_MAX,
    SPINNAKER_BOOT_PORT, SPINNAKER_CMD_DELAY, SPINNAKER_MAX_BOOT_SIZE,
};
use crate::error::{LoaderError, Result};
use crate::wire::{swap_payload_words, BootHeader};

/// Reads `path` and uploads it to `device_ip` over the boot channel.
///
/// # Errors
/// [`LoaderError::BootFileMissing`] if the file cannot be read,
/// [`LoaderError::BootFileTooLarge`] if it exceeds `SPINNAKER_MAX_BOOT_SIZE`,
/// [`LoaderError::SocketCreate`]/[`LoaderError::BootSend`] on socket faults.
pub fn upload_boot_image(path: &Path, device_ip: IpAddr) -> Result<()> {
    let data = fs::read(path).map_err(|source| LoaderError::BootFileMissing {
        path: path.display().to_string(),
        source,
    })?;
    if data.len() > SPINNAKER_MAX_BOOT_SIZE {
        return Err(LoaderError::BootFileTooLarge {
            size: data.len() as u64,
            max: SPINNAKER_MAX_BOOT_SIZE,
        });
    }

    let socket = UdpSocket::bind("0.0.0.0:0").map_err(LoaderError::SocketCreate)?;
    let boot_addr = SocketAddr::new(device_ip, SPINNAKER_BOOT_PORT);

    let blocks: Vec<&[u8]> = if data.is_empty() {
        Vec::new()
    } else {
        data.chunks(SPINNAKER_BOOT_DATA_MAX).collect()
    };
    let block_count = blocks.len().max(1);

    send_packet(
        &socket,
        boot_addr,
        BootHeader { prot_ver: BOOT_PROT_VER, op: BOOT_CMD_START, a1: 0, a2: 0, a3: (block_count - 1) as u32 },
        &[],
    )?;
    sleep(SPINNAKER_CMD_DELAY);

    for (index, block) in blocks.iter().enumerate() {
        let mut payload = (*block).to_vec();
        payload.resize(SPINNAKER_BOOT_DATA_MAX, 0);
        let swapped = swap_payload_words(&payload);
        let a1 = (255_u32 << 8) | (index as u32 & 0xff);
        send_packet(
            &socket,
            boot_addr,
            BootHeader { prot_ver: BOOT_PROT_VER, op: BOOT_CMD_DATA, a1, a2: 0, a3: 0 },
            &swapped,
        )?;
        sleep(SPINNAKER_CMD_DELAY);
    }

    send_packet(
        &socket,
        boot_addr,
        BootHeader { prot_ver: BOOT_PROT_VER, op: BOOT_CMD_END, a1: 1, a2: 0, a3: 0 },
        &[],
    )?;
    sleep(BOOT_SETTLE_DELAY);

    Ok(())
}

fn send_packet(socket: &UdpSocket, addr: SocketAddr, header: BootHeader, payload: &[u8]) -> Result<()> {
    let mut buf = Vec::with_capacity(18 + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    socket.send_to(&buf, addr).map_err(LoaderError::BootSend)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_matches_boot_data_max_chunking() {
        let data = vec![0xAB_u8; SPINNAKER_BOOT_DATA_MAX + 1];
        let blocks: Vec<&[u8]> = data.chunks(SPINNAKER_BOOT_DATA_MAX).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), SPINNAKER_BOOT_DATA_MAX);
        assert_eq!(blocks[1].len(), 1);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let path = std::env::temp_dir().join("damson-loader-test-oversized-boot.bin");
        fs::write(&path, vec![0_u8; SPINNAKER_MAX_BOOT_SIZE + 1]).unwrap();
        let err = upload_boot_image(&path, IpAddr::from([127, 0, 0, 1]));
        fs::remove_file(&path).ok();
        assert!(matches!(err, Err(LoaderError::BootFileTooLarge { .. })));
    }

    #[test]
    fn missing_file_is_rejected() {
        let path = std::env::temp_dir().join("damson-loader-test-missing-boot.bin");
        fs::remove_file(&path).ok();
        let err = upload_boot_image(&path, IpAddr::from([127, 0, 0, 1]));
        assert!(matches!(err, Err(LoaderError::BootFileMissing { .. })));
    }
}
