//! Reader for `spinnaker.ini` (spec.md §6): a single line of
//! `"<ip> <grid_w> <grid_h>"`. Missing or malformed is fatal; there is no
//! partial-config fallback, matching the original `fscanf`-based reader's
//! all-or-nothing behavior.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use crate::error::{LoaderError, Result};

/// The fabric's device address and grid dimensions, as read from `spinnaker.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub ip: Ipv4Addr,
    pub grid_w: u32,
    pub grid_h: u32,
}

impl DeviceConfig {
    /// Reads and parses a config file at `path`.
    ///
    /// # Errors
    /// [`LoaderError::ConfigMissing`] if the file cannot be opened,
    /// [`LoaderError::ConfigMalformed`] if its first line isn't
    /// `"<ip> <grid_w> <grid_h>"`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| LoaderError::ConfigMissing {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|detail| LoaderError::ConfigMalformed {
            path: path.display().to_string(),
            detail,
        })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let line = text
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| "file is empty".to_string())?;
        let mut fields = line.split_whitespace();
        let ip = fields
            .next()
            .ok_or_else(|| "missing ip field".to_string())?;
        let grid_w = fields
            .next()
            .ok_or_else(|| "missing grid_w field".to_string())?;
        let grid_h = fields
            .next()
            .ok_or_else(|| "missing grid_h field".to_string())?;
        let ip = Ipv4Addr::from_str(ip).map_err(|e| format!("bad ip '{ip}': {e}"))?;
        let grid_w = grid_w
            .parse::<u32>()
            .map_err(|e| format!("bad grid_w '{grid_w}': {e}"))?;
        let grid_h = grid_h
            .parse::<u32>()
            .map_err(|e| format!("bad grid_h '{grid_h}': {e}"))?;
        Ok(Self { ip, grid_w, grid_h })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_config() {
        let cfg = DeviceConfig::parse("192.168.1.1 2 2\n").unwrap();
        assert_eq!(cfg.ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(cfg.grid_w, 2);
        assert_eq!(cfg.grid_h, 2);
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(DeviceConfig::parse("192.168.1.1 2\n").is_err());
    }

    #[test]
    fn rejects_empty_file() {
        assert!(DeviceConfig::parse("").is_err());
    }

    #[test]
    fn rejects_bad_ip() {
        assert!(DeviceConfig::parse("not-an-ip 2 2").is_err());
    }
}
