//! Fixed palette used to color rendered segmentation masks.

use std::sync::OnceLock;

/// Channel levels enumerated per channel.
pub const CHANNEL_LEVELS: [u8; 5] = [0, 64, 128, 192, 255];

/// Number of palette entries (5^3 minus pure black).
pub const PALETTE_LEN: usize = 124;

/// Enumerate the 5x5x5 level grid (r outermost, b innermost) and drop the
/// leading all-zero entry.
pub fn create_color_map() -> Vec<[u8; 3]> {
    let mut colors = Vec::with_capacity(PALETTE_LEN + 1);
    for r in CHANNEL_LEVELS {
        for g in CHANNEL_LEVELS {
            for b in CHANNEL_LEVELS {
                colors.push([r, g, b]);
            }
        }
    }
    colors.into_iter().skip(1).collect()
}

/// Process-wide memoized palette.
pub fn color_map() -> &'static [[u8; 3]] {
    static PALETTE: OnceLock<Vec<[u8; 3]>> = OnceLock::new();
    PALETTE.get_or_init(create_color_map)
}
