//! Jump-table analysis output.
//!
//! Scans an image for the four dispatch shapes and renders the result as a
//! TOML document of `[[switch]]` entries, consumed back through
//! `switch_table_file_path`.

use std::fmt::Write;

use wur_cfg::{scan_kind, SwitchKind, SwitchTable};
use wur_rpx::RpxImage;

/// Scan `image` and render the switch-table document.
pub fn scan_to_toml(image: &RpxImage) -> (String, usize) {
    let mut out = String::new();
    out.push_str("# Discovered jump tables\n");

    let mut count = 0;
    for (banner, kinds) in [
        ("# ---- ABSOLUTE JUMPTABLE ----", &[SwitchKind::Absolute][..]),
        ("# ---- COMPUTED JUMPTABLE ----", &[SwitchKind::Computed][..]),
        ("# ---- OFFSETED JUMPTABLE ----", &[SwitchKind::ByteOffset, SwitchKind::ShortOffset][..]),
    ] {
        writeln!(out, "{banner}").unwrap();
        for &kind in kinds {
            for table in scan_kind(image, kind) {
                write_table(&mut out, &table);
                count += 1;
            }
        }
    }

    (out, count)
}

fn write_table(out: &mut String, table: &SwitchTable) {
    out.push_str("[[switch]]\n");
    writeln!(out, "base = 0x{:X}", table.base).unwrap();
    writeln!(out, "r = {}", table.register).unwrap();
    writeln!(out, "default = 0x{:X}", table.default_target).unwrap();
    out.push_str("labels = [\n");
    for &label in &table.labels {
        writeln!(out, "    0x{label:X},").unwrap();
    }
    out.push_str("]\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wur_rpx::{Section, SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS};

    #[test]
    fn renders_switch_entries() {
        // One absolute dispatch site with its guard and target array.
        let words: [u32; 10] = [
            0x2B1D_0003, // cmplwi cr6, r29, 3
            0x4199_0020, // bgt cr6, +0x20
            0x3D60_0203, // lis r11, 0x0203
            0x396B_0000, // addi r11, r11, 0
            0x5400_103A, // slwi r0, r0, 2
            0x7C0B_002E, // lwzx r0, r11, r0
            0x7C09_03A6, // mtctr r0
            0x4E80_0420, // bctr
            0x4E80_0020, // blr
            0x4E80_0020, // blr
        ];
        let mut table_bytes = Vec::new();
        for _ in 0..4 {
            table_bytes.extend_from_slice(&0x0200_0020u32.to_be_bytes());
        }
        let image = RpxImage {
            base: 0x0200_0000,
            sections: vec![
                Section {
                    name: ".text".into(),
                    base: 0x0200_0000,
                    size: 40,
                    sh_type: SHT_PROGBITS,
                    sh_flags: SHF_ALLOC | SHF_EXECINSTR,
                    was_compressed: false,
                    data: Some(words.iter().flat_map(|w| w.to_be_bytes()).collect()),
                },
                Section {
                    name: ".rodata".into(),
                    base: 0x0203_0000,
                    size: table_bytes.len() as u32,
                    sh_type: SHT_PROGBITS,
                    sh_flags: SHF_ALLOC,
                    was_compressed: false,
                    data: Some(table_bytes),
                },
            ],
            ..Default::default()
        };

        let (doc, count) = scan_to_toml(&image);
        assert_eq!(count, 1);
        assert!(doc.contains("# ---- ABSOLUTE JUMPTABLE ----"));
        assert!(doc.contains("[[switch]]"));
        assert!(doc.contains("base = 0x2000008"));
        assert!(doc.contains("r = 29"));
        assert!(doc.contains("default = 0x2000024"));
        assert_eq!(doc.matches("0x2000020,").count(), 4);
    }

    #[test]
    fn empty_image_yields_banners_only() {
        let image = RpxImage::default();
        let (doc, count) = scan_to_toml(&image);
        assert_eq!(count, 0);
        assert!(!doc.contains("[[switch]]"));
        assert!(doc.contains("# ---- COMPUTED JUMPTABLE ----"));
    }
}
