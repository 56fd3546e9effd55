//! Fixed per-user color palette: a freshly-registered user is assigned a
//! color by cycling the palette with `user_count mod len`.

pub const USER_COLOR_PALETTE: &[&str] = &[
    "#e63946", "#f1a208", "#f4d35e", "#52b788", "#2a9d8f", "#457b9d", "#1d3557", "#7209b7",
    "#b5179e", "#f72585", "#ff6d00", "#06d6a0", "#118ab2", "#073b4c", "#8d99ae",
];

/// Pick a color for the `user_count`-th (0-indexed) registered user.
pub fn color_for(user_count: i64) -> &'static str {
    let idx = (user_count.max(0) as usize) % USER_COLOR_PALETTE.len();
    USER_COLOR_PALETTE[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_after_exhausting_palette() {
        assert_eq!(color_for(0), USER_COLOR_PALETTE[0]);
        assert_eq!(
            color_for(USER_COLOR_PALETTE.len() as i64),
            USER_COLOR_PALETTE[0]
        );
        assert_eq!(
            color_for(USER_COLOR_PALETTE.len() as i64 + 2),
            USER_COLOR_PALETTE[2]
        );
    }
}
