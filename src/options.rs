//! Mount option parsing (§6), grounded on `set_common_options`/
//! `ods5_show_options` in the reference implementation.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Ods5Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Vtf7,
}

/// Parsed, resolved mount options. Construction always produces a single
/// internally-consistent set: conflicting tokens are resolved the way the
/// reference parser resolves them, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    /// Underlying device block size; one of {512, 1024, 2048, 4096}.
    pub block_size: usize,
    /// Home block LBN override.
    pub home_lbn: u32,
    /// Extra permission bits OR'd into every derived inode.
    pub mode: u16,
    /// Hide the MFD self-entry from directory listings.
    pub nomfd: bool,
    /// Separate name and version with `.` instead of `;`. Always false
    /// when `syml` is set (see below).
    pub dotversion: bool,
    /// Enable symbolic-link name resolution.
    pub syml: bool,
    /// UCS-2 rendering mode.
    pub charset: Charset,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            block_size: 512,
            home_lbn: 1,
            mode: 0,
            nomfd: false,
            dotversion: false,
            syml: false,
            charset: Charset::Utf8,
        }
    }
}

const VALID_BLOCK_SIZES: [usize; 4] = [512, 1024, 2048, 4096];

impl MountOptions {
    /// Parses a comma-separated option string. Later tokens win within a
    /// family (`bs=`, `home=`, `mode=`). `syml` always wins over
    /// `dotversion` regardless of which token appears first or last,
    /// because the reference implementation evaluates `syml` after
    /// `dotversion` unconditionally, clearing `dotversion` if both are
    /// present. `utf8` is the default; the only thing that flips it to
    /// vtf7 rendering is the literal presence of a `vtf7` token anywhere in
    /// the string — an explicit `utf8` token is accepted but redundant.
    pub fn parse(options: &str) -> Result<Self> {
        let mut out = Self::default();
        let mut vtf7_seen = false;

        for token in options.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(value) = token.strip_prefix("bs=") {
                let bs: usize = value.parse().map_err(|_| Ods5Error::Invalid)?;
                if !VALID_BLOCK_SIZES.contains(&bs) {
                    return Err(Ods5Error::Invalid);
                }
                out.block_size = bs;
            } else if let Some(value) = token.strip_prefix("home=") {
                out.home_lbn = value.parse().map_err(|_| Ods5Error::Invalid)?;
            } else if let Some(value) = token.strip_prefix("mode=") {
                let mode = u16::from_str_radix(value, 8).map_err(|_| Ods5Error::Invalid)?;
                out.mode = mode & 0o777;
            } else if token == "nomfd" {
                out.nomfd = true;
            } else if token == "dotversion" {
                out.dotversion = true;
            } else if token == "syml" {
                out.syml = true;
            } else if token == "vtf7" {
                vtf7_seen = true;
            } else if token == "utf8" {
                // Accepted, but resolution below depends only on vtf7_seen.
            } else {
                return Err(Ods5Error::Invalid);
            }
        }

        if out.syml {
            out.dotversion = false;
        }
        out.charset = if vtf7_seen { Charset::Vtf7 } else { Charset::Utf8 };

        Ok(out)
    }

    /// Re-serializes the active options, mirroring `ods5_show_options`.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.block_size != 512 {
            parts.push(format!("bs={}", self.block_size));
        }
        if self.home_lbn != 1 {
            parts.push(format!("home={}", self.home_lbn));
        }
        if self.mode != 0 {
            parts.push(format!("mode={:03o}", self.mode));
        }
        if self.nomfd {
            parts.push("nomfd".into());
        }
        if self.dotversion {
            parts.push("dotversion".into());
        }
        if self.syml {
            parts.push("syml".into());
        }
        match self.charset {
            Charset::Vtf7 => parts.push("vtf7".into()),
            Charset::Utf8 => {}
        }
        parts.join(",")
    }
}
