//! VMS quadword time conversion (C2).

/// 100ns ticks per second.
pub const V_TICKS: u64 = 10_000_000;
/// Offset between the VMS epoch (1858-11-17) and the Unix epoch
/// (1970-01-01), in 100ns ticks.
pub const VU_DELTA: u64 = 0x007c_9567_4beb_4000;

/// UTC timestamp as (seconds, nanoseconds) since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixTime {
    pub sec: i64,
    pub nsec: u32,
}

/// Converts a VMS absolute quadword time to a Unix timestamp.
pub fn v2utime(bintime: u64) -> UnixTime {
    let adjusted = bintime.wrapping_sub(VU_DELTA);
    let sec = adjusted / V_TICKS;
    let nsec = (adjusted - sec * V_TICKS) * 100;
    UnixTime {
        sec: sec as i64,
        nsec: nsec as u32,
    }
}
