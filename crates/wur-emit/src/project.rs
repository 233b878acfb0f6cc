//! Generated artifact set.
//!
//! One recompilation produces `ppc_config.h`, `ppc_context.h`,
//! `ppc_recomp_shared.h`, `ppc_func_mapping.cpp` and numbered
//! `ppc_recomp.<N>.cpp` translation units. Outputs must be byte-identical
//! across runs on identical inputs, and a file is only rewritten when its
//! content changed, preserving incremental build timestamps.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use wur_rpx::RpxImage;

use crate::config::RecompilerConfig;

/// Functions per translation unit.
pub const FUNCTIONS_PER_UNIT: usize = 256;

/// Pre-reserved output capacity; keeps the hot translation loop from
/// reallocating.
const OUT_RESERVE: usize = 10 * 1024 * 1024;

/// Accumulates and writes the generated C++ project.
pub struct CppProject {
    out_dir: PathBuf,
    out: String,
    unit_index: usize,
}

impl CppProject {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            out: String::with_capacity(OUT_RESERVE),
            unit_index: 0,
        }
    }

    /// Translation units flushed so far.
    pub fn units_written(&self) -> usize {
        self.unit_index
    }

    /// Append raw text to the current unit.
    pub fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Start a translation unit: flush the previous one and emit the fixed
    /// include block.
    pub fn begin_unit(&mut self) -> std::io::Result<()> {
        self.flush_unit()?;
        self.out.push_str("#include \"ppc_recomp_shared.h\"\n");
        self.out.push_str("#include <bit>\n");
        self.out.push_str("#include <cmath>\n");
        self.out.push_str("#include <immintrin.h>\n");
        self.out.push('\n');
        Ok(())
    }

    /// Write the pending unit, if any, as `ppc_recomp.<N>.cpp`.
    pub fn flush_unit(&mut self) -> std::io::Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }
        let name = format!("ppc_recomp.{}.cpp", self.unit_index);
        self.unit_index += 1;
        self.save(&name)
    }

    /// Write the buffer to `name`, skipping the write when the file
    /// already holds identical bytes.
    fn save(&mut self, name: &str) -> std::io::Result<()> {
        let path = self.out_dir.join(name);
        let unchanged = matches!(std::fs::read(&path), Ok(existing) if existing == self.out.as_bytes());
        if unchanged {
            trace!(path = %path.display(), "output unchanged, skipping write");
        } else {
            trace!(path = %path.display(), bytes = self.out.len(), "writing output");
            std::fs::write(&path, &self.out)?;
        }
        self.out.clear();
        Ok(())
    }

    /// `ppc_config.h`: every optimization flag plus image and memory
    /// layout constants.
    pub fn write_config_header(
        &mut self,
        image: &RpxImage,
        config: &RecompilerConfig,
    ) -> std::io::Result<()> {
        debug_assert!(self.out.is_empty());
        self.out.push_str("#pragma once\n");
        self.out.push_str("#ifndef PPC_CONFIG_H_INCLUDED\n");
        self.out.push_str("#define PPC_CONFIG_H_INCLUDED\n\n");

        let flags = [
            (config.skip_lr, "PPC_CONFIG_SKIP_LR"),
            (config.skip_msr, "PPC_CONFIG_SKIP_MSR"),
            (config.ctr_as_local, "PPC_CONFIG_CTR_AS_LOCAL"),
            (config.xer_as_local, "PPC_CONFIG_XER_AS_LOCAL"),
            (config.reserved_as_local, "PPC_CONFIG_RESERVED_AS_LOCAL"),
            (config.cr_as_local, "PPC_CONFIG_CR_AS_LOCAL"),
            (config.non_argument_as_local, "PPC_CONFIG_NON_ARGUMENT_AS_LOCAL"),
            (config.non_volatile_as_local, "PPC_CONFIG_NON_VOLATILE_AS_LOCAL"),
            (config.generate_paired_single_support, "PPC_CONFIG_PAIRED_SINGLE"),
            (config.generate_gqr_support, "PPC_CONFIG_GQR"),
        ];
        for (enabled, define) in flags {
            if enabled {
                writeln!(self.out, "#define {define}").unwrap();
            }
        }
        self.out.push('\n');

        writeln!(self.out, "#define PPC_IMAGE_BASE 0x{:X}ull", image.base).unwrap();
        writeln!(self.out, "#define PPC_IMAGE_SIZE 0x{:X}ull", image.data.len()).unwrap();
        writeln!(self.out, "#define PPC_MEM1_BASE 0x{:X}ull", config.mem1_base).unwrap();
        writeln!(self.out, "#define PPC_MEM1_SIZE 0x{:X}ull", config.mem1_size).unwrap();
        writeln!(self.out, "#define PPC_MEM2_BASE 0x{:X}ull", config.mem2_base).unwrap();
        writeln!(self.out, "#define PPC_MEM2_SIZE 0x{:X}ull", config.mem2_size).unwrap();
        self.out.push('\n');
        self.out.push_str("#endif\n");

        self.save("ppc_config.h")
    }

    /// `ppc_context.h`: the machine-state definition, copied verbatim from
    /// the header supplied on the command line.
    pub fn write_context_header(&mut self, context_source: &str) -> std::io::Result<()> {
        debug_assert!(self.out.is_empty());
        self.out.push_str("#pragma once\n");
        self.out.push_str("#include \"ppc_config.h\"\n\n");
        self.out.push_str(context_source);
        if !context_source.ends_with('\n') {
            self.out.push('\n');
        }
        self.save("ppc_context.h")
    }

    /// `ppc_recomp_shared.h`: forward declarations for every function
    /// symbol plus the mapping-table lookup used for indirect calls.
    pub fn write_shared_header(&mut self, image: &RpxImage) -> std::io::Result<()> {
        debug_assert!(self.out.is_empty());
        self.out.push_str("#pragma once\n");
        self.out.push_str("#include \"ppc_config.h\"\n");
        self.out.push_str("#include \"ppc_context.h\"\n\n");

        for symbol in image.symbols.functions() {
            writeln!(self.out, "PPC_EXTERN_FUNC({});", symbol.name).unwrap();
        }

        self.out.push('\n');
        self.out.push_str("extern PPCFuncMapping PPCFuncMappings[];\n\n");
        self.out.push_str("inline PPCFunc PPCFindFunc(uint32_t address) {\n");
        self.out.push_str("\tfor (PPCFuncMapping* it = PPCFuncMappings; it->func; ++it) {\n");
        self.out.push_str("\t\tif (it->address == address) {\n");
        self.out.push_str("\t\t\treturn it->func;\n");
        self.out.push_str("\t\t}\n");
        self.out.push_str("\t}\n");
        self.out.push_str("\treturn nullptr;\n");
        self.out.push_str("}\n");

        self.save("ppc_recomp_shared.h")
    }

    /// `ppc_func_mapping.cpp`: the zero-terminated address to function
    /// pointer table, in address order.
    pub fn write_func_mapping(&mut self, image: &RpxImage) -> std::io::Result<()> {
        debug_assert!(self.out.is_empty());
        self.out.push_str("#include \"ppc_recomp_shared.h\"\n\n");
        self.out.push_str("PPCFuncMapping PPCFuncMappings[] = {\n");
        for symbol in image.symbols.functions() {
            writeln!(self.out, "\t{{ 0x{:X}, {} }},", symbol.address, symbol.name).unwrap();
        }
        self.out.push_str("\t{ 0, nullptr }\n");
        self.out.push_str("};\n");

        self.save("ppc_func_mapping.cpp")
    }
}

impl Drop for CppProject {
    fn drop(&mut self) {
        if !self.out.is_empty() {
            debug!("dropping project with unflushed output");
        }
    }
}
