use std::path::Path;

use ab_glyph::FontArc;
use anyhow::{Context, Result};

static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// The bundled DejaVu Sans face.
pub fn default_font() -> Result<FontArc> {
    FontArc::try_from_slice(DEJAVU_SANS).context("Bundled font is corrupt")
}

/// Loads a TrueType/OpenType font from `path`, or the bundled one.
pub fn load_font(path: Option<&Path>) -> Result<FontArc> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {path:?}"))?;
            FontArc::try_from_vec(bytes).with_context(|| format!("Invalid font file {path:?}"))
        }
        None => default_font(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_glyph::Font;

    #[test]
    fn test_default_font_has_arrow_glyph() {
        let font = default_font().unwrap();
        assert_ne!(font.glyph_id('→').0, 0);
        assert_ne!(font.glyph_id('A').0, 0);
    }

    #[test]
    fn test_bundled_font_ships_with_license() {
        let license = include_str!("../assets/LICENSE-DejaVu.txt");
        assert!(license.contains("Bitstream Vera"));
        assert!(license.contains("DejaVu changes are in public domain"));
    }

    #[test]
    fn test_load_font_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("rutting-font-{}.ttf", std::process::id()));
        std::fs::write(&path, b"definitely not a font").unwrap();
        assert!(load_font(Some(&path)).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
