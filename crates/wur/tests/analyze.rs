//! Jump-table analysis end to end: image bytes in, TOML document out, and
//! back through the recompiler configuration.

mod common;

use common::{build_rpx, scratch_dir, TestSection};
use wur::{analyze, RecompilerConfig, RpxImage};

const BASE: u32 = 0x0200_0000;
const BLR: u32 = 0x4E80_0020;

/// A guarded absolute dispatch over four cases, plus its target array.
fn dispatch_image() -> Vec<u8> {
    let words = [
        0x2B1D_0003, // cmplwi cr6, r29, 3
        0x4199_0020, // bgt cr6, +0x20 (default)
        0x3D60_0203, // lis r11, 0x0203
        0x396B_0000, // addi r11, r11, 0
        0x5400_103A, // slwi r0, r0, 2
        0x7C0B_002E, // lwzx r0, r11, r0
        0x7C09_03A6, // mtctr r0
        0x4E80_0420, // bctr
        BLR,         // case target
        BLR,         // default target
    ];
    let mut table = Vec::new();
    for _ in 0..4 {
        table.extend_from_slice(&(BASE + 0x20).to_be_bytes());
    }
    build_rpx(
        BASE,
        &[TestSection::code(BASE, &words), TestSection::rodata(0x0203_0000, table)],
    )
}

#[test]
fn absolute_dispatch_produces_one_switch_entry() {
    let image = RpxImage::parse(&dispatch_image()).unwrap();
    let (doc, count) = analyze::scan_to_toml(&image);

    assert_eq!(count, 1);
    assert!(doc.contains("[[switch]]"));
    assert!(doc.contains("base = 0x2000008"));
    assert!(doc.contains("r = 29"));
    assert!(doc.contains("default = 0x2000024"));
    assert_eq!(doc.matches("0x2000020,").count(), 4);
}

#[test]
fn emitted_document_round_trips_through_config() {
    let image = RpxImage::parse(&dispatch_image()).unwrap();
    let (doc, _) = analyze::scan_to_toml(&image);

    let dir = scratch_dir("wur_analyze_roundtrip");
    std::fs::write(dir.join("switch.toml"), &doc).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        r#"
[main]
file_path = "game.rpx"
out_directory_path = "out"
switch_table_file_path = "switch.toml"
"#,
    )
    .unwrap();

    let config = RecompilerConfig::load(&dir.join("config.toml")).unwrap();
    let table = config.switch_tables.get(&(BASE + 8)).expect("switch entry loaded");
    assert_eq!(table.r, 29);
    assert_eq!(table.default_target, BASE + 0x24);
    assert_eq!(table.labels, vec![BASE + 0x20; 4]);
}

#[test]
fn labels_and_default_stay_inside_code() {
    let image = RpxImage::parse(&dispatch_image()).unwrap();
    let tables = wur_cfg::scan_image(&image);
    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert!(image.is_code_address(table.default_target));
    for &label in &table.labels {
        assert!(image.is_code_address(label));
    }
    assert_eq!(table.labels.len(), 4);
}

#[test]
fn unparsable_input_is_an_error() {
    assert!(RpxImage::parse(&[0u8; 16]).is_err());
    let mut bad = dispatch_image();
    bad[5] = 1; // little-endian marker
    assert!(RpxImage::parse(&bad).is_err());
}
