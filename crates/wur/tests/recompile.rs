//! End-to-end recompilation over synthetic images.

mod common;

use common::{build_rpx, scratch_dir, TestSection};
use wur::{Pipeline, RecompilerConfig, RpxImage};

const BASE: u32 = 0x0200_0000;
const BLR: u32 = 0x4E80_0020;

fn pipeline_for(image: RpxImage, dir: &std::path::Path) -> Pipeline {
    let mut config = RecompilerConfig::wiiu_defaults();
    config.directory_path = dir.to_path_buf();
    config.out_directory_path = "out".into();
    Pipeline::new(image, config)
}

fn run(name: &str, sections: &[TestSection]) -> (std::path::PathBuf, wur::PipelineStats) {
    let dir = scratch_dir(name);
    let file = build_rpx(BASE, sections);
    let image = RpxImage::parse(&file).expect("image parses");
    let mut pipeline = pipeline_for(image, &dir);
    pipeline.discover();
    pipeline.rename_entry_symbol();
    let stats = pipeline.recompile(None).expect("recompiles");
    (dir, stats)
}

#[test]
fn minimal_image_translates_to_single_return() {
    let (dir, stats) = run("wur_e2e_minimal", &[TestSection::code(BASE, &[BLR])]);
    assert_eq!(stats.functions, 1);
    assert_eq!(stats.translated, 1);
    assert_eq!(stats.units, 1);

    let unit = std::fs::read_to_string(dir.join("out/ppc_recomp.0.cpp")).unwrap();
    // The walk-discovered function is the entry point, renamed _start.
    assert!(unit.contains("PPC_FUNC_IMPL(__imp___start)"));
    assert_eq!(unit.matches("\treturn;\n").count(), 1);

    let mapping = std::fs::read_to_string(dir.join("out/ppc_func_mapping.cpp")).unwrap();
    assert!(mapping.contains("{ 0x2000000, _start },"));
    assert!(mapping.contains("{ 0, nullptr }"));

    let shared = std::fs::read_to_string(dir.join("out/ppc_recomp_shared.h")).unwrap();
    assert!(shared.contains("PPC_EXTERN_FUNC(_start);"));
}

#[test]
fn compressed_section_matches_uncompressed_result() {
    let (plain_dir, plain_stats) =
        run("wur_e2e_zlib_plain", &[TestSection::code(BASE, &[BLR])]);
    let (zlib_dir, zlib_stats) =
        run("wur_e2e_zlib_packed", &[TestSection::compressed_code(BASE, &[BLR])]);

    assert_eq!(plain_stats.functions, zlib_stats.functions);
    let plain = std::fs::read(plain_dir.join("out/ppc_recomp.0.cpp")).unwrap();
    let packed = std::fs::read(zlib_dir.join("out/ppc_recomp.0.cpp")).unwrap();
    assert_eq!(plain, packed);
}

#[test]
fn forward_branch_emits_goto_and_two_returns() {
    let words = [0x4800_0008, BLR, BLR];
    let (dir, stats) = run("wur_e2e_branch", &[TestSection::code(BASE, &words)]);
    assert_eq!(stats.functions, 1);

    let unit = std::fs::read_to_string(dir.join("out/ppc_recomp.0.cpp")).unwrap();
    assert!(unit.contains("goto loc_02000008;"));
    assert!(unit.contains("loc_02000008:"));
    assert_eq!(unit.matches("\treturn;\n").count(), 2);
}

#[test]
fn conditional_branch_emits_if_with_two_arms() {
    // bne +8; blr; blr
    let words = [0x4082_0008, BLR, BLR];
    let (dir, stats) = run("wur_e2e_cond", &[TestSection::code(BASE, &words)]);
    assert_eq!(stats.functions, 1);
    assert_eq!(stats.translated, 1);

    let unit = std::fs::read_to_string(dir.join("out/ppc_recomp.0.cpp")).unwrap();
    assert!(unit.contains("if (!ctx.cr[0].eq) goto loc_02000008;"));
    assert_eq!(unit.matches("\treturn;\n").count(), 2);
}

#[test]
fn tail_call_thunk_is_one_function_of_size_eight() {
    // b +0; shifted-pointer marker word
    let words = [0x4800_0000, 0x0400_0048];
    let dir = scratch_dir("wur_e2e_thunk");
    let file = build_rpx(BASE, &[TestSection::code(BASE, &words)]);
    let image = RpxImage::parse(&file).unwrap();
    let mut pipeline = pipeline_for(image, &dir);
    pipeline.discover();

    assert_eq!(pipeline.functions.len(), 1);
    assert_eq!(pipeline.functions[0].size, 8);
    assert_eq!(pipeline.functions[0].blocks.len(), 1);
}

#[test]
fn outputs_are_deterministic_and_not_rewritten() {
    let words = [0x3860_0001, 0x4800_0008, BLR, BLR];
    let sections = [TestSection::code(BASE, &words)];
    let (dir, _) = run("wur_e2e_determinism", &sections);

    let unit_path = dir.join("out/ppc_recomp.0.cpp");
    let first = std::fs::read(&unit_path).unwrap();
    let first_mtime = std::fs::metadata(&unit_path).unwrap().modified().unwrap();

    // Second run over the same input: identical bytes, untouched file.
    std::thread::sleep(std::time::Duration::from_millis(20));
    let file = build_rpx(BASE, &sections);
    let image = RpxImage::parse(&file).unwrap();
    let mut pipeline = pipeline_for(image, &dir);
    pipeline.discover();
    pipeline.rename_entry_symbol();
    pipeline.recompile(None).unwrap();

    let second = std::fs::read(&unit_path).unwrap();
    assert_eq!(first, second);
    let second_mtime = std::fs::metadata(&unit_path).unwrap().modified().unwrap();
    assert_eq!(first_mtime, second_mtime);
}

#[test]
fn config_header_carries_memory_layout() {
    let (dir, _) = run("wur_e2e_config_header", &[TestSection::code(BASE, &[BLR])]);
    let header = std::fs::read_to_string(dir.join("out/ppc_config.h")).unwrap();
    assert!(header.contains("#define PPC_IMAGE_BASE 0x2000000ull"));
    assert!(header.contains("#define PPC_MEM1_BASE 0x800000ull"));
    assert!(header.contains("#define PPC_MEM2_BASE 0x10000000ull"));
}

#[test]
fn manual_functions_and_helpers_are_synthesized() {
    let dir = scratch_dir("wur_e2e_helpers");
    // 32 return stubs so configured addresses stay inside the section.
    let words = vec![BLR; 32];
    let file = build_rpx(BASE, &[TestSection::code(BASE, &words)]);
    let image = RpxImage::parse(&file).unwrap();

    let mut config = RecompilerConfig::wiiu_defaults();
    config.directory_path = dir.clone();
    config.out_directory_path = "out".into();
    config.restgprlr_14_address = BASE;
    config.functions.push((BASE + 0x60, 4));

    let mut pipeline = Pipeline::new(image, config);
    pipeline.discover();

    let restore_14 = pipeline.image.symbols.by_name("__restgprlr_14").unwrap();
    assert_eq!(restore_14.address, BASE);
    assert_eq!(restore_14.size, (32 - 14) * 4 + 12);
    let restore_31 = pipeline.image.symbols.by_name("__restgprlr_31").unwrap();
    assert_eq!(restore_31.address, BASE + (31 - 14) * 4);
    assert_eq!(restore_31.size, 4 + 12);

    assert!(pipeline.image.symbols.by_name("sub_2000060").is_some());
    assert!(pipeline.functions.iter().any(|f| f.base == BASE + 0x60));

    // Discovery output is sorted and duplicate-free.
    for pair in pipeline.functions.windows(2) {
        assert!(pair[0].base < pair[1].base);
    }
}
