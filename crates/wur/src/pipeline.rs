//! Recompilation pipeline: image -> discovered functions -> C++ units.

use std::path::Path;

use tracing::{info, warn};
use wur_cfg::Function;
use wur_emit::{CppProject, RecompilerConfig, Translator, FUNCTIONS_PER_UNIT};
use wur_rpx::{synthetic_name, RpxImage, Symbol, SymbolKind};

use crate::{Error, Result};

/// Counters reported after a run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub functions: usize,
    pub translated: usize,
    pub units: usize,
}

/// Drives discovery and translation over one image.
pub struct Pipeline {
    pub image: RpxImage,
    pub config: RecompilerConfig,
    /// Discovered functions, address ordered after `discover`.
    pub functions: Vec<Function>,
}

impl Pipeline {
    /// Read and parse the image named by the configuration.
    pub fn load(config: RecompilerConfig) -> Result<Self> {
        let path = config.input_path();
        let data = std::fs::read(&path).map_err(|source| Error::Read { path, source })?;
        let image = RpxImage::parse(&data)?;
        info!(
            path = %config.input_path().display(),
            size = format_args!("{:#X}", image.data.len()),
            base = format_args!("{:#010X}", image.base),
            "loaded image"
        );
        Ok(Self::new(image, config))
    }

    pub fn new(image: RpxImage, config: RecompilerConfig) -> Self {
        Self { image, config, functions: Vec::new() }
    }

    /// Function discovery, in a fixed order: synthesized register
    /// save/restore helpers, configured manual functions, function symbols
    /// from the image, then a forward sweep over every code section.
    pub fn discover(&mut self) {
        self.functions.clear();

        self.synthesize_helpers();
        self.install_manual_functions();
        self.lift_symbol_functions();
        self.sweep_code_sections();

        self.functions.sort_by_key(|f| f.base);
        // Keep the earlier entry when discovery produced duplicates.
        self.functions.dedup_by_key(|f| f.base);

        info!(count = self.functions.len(), "function discovery complete");
    }

    /// Register save/restore helper bodies are laid out as runs of one
    /// instruction per register, so each entry point N sits 4 bytes past
    /// N-1 and runs to the shared tail.
    fn synthesize_helpers(&mut self) {
        let helpers: [(u32, &str, u32); 4] = [
            (self.config.restgprlr_14_address, "__restgprlr_{}", 12),
            (self.config.savegprlr_14_address, "__savegprlr_{}", 8),
            (self.config.restfpr_14_address, "__restfpr_{}", 4),
            (self.config.savefpr_14_address, "__savefpr_{}", 4),
        ];

        for index in 14u32..32 {
            for &(base, name_template, tail) in &helpers {
                if base == 0 {
                    continue;
                }
                let address = base + (index - 14) * 4;
                let size = (32 - index) * 4 + tail;
                let name = name_template.replace("{}", &index.to_string());
                self.functions.push(Function::new(address, size));
                self.image.symbols.insert(Symbol::new(name, address, size, SymbolKind::Function));
            }
        }

        for (address, name) in [
            (self.config.longjmp_address, "longjmp"),
            (self.config.setjmp_address, "setjmp"),
        ] {
            if address != 0 {
                self.image.symbols.insert(Symbol::new(name, address, 0, SymbolKind::Function));
            }
        }
    }

    fn install_manual_functions(&mut self) {
        for &(address, size) in &self.config.functions {
            self.functions.push(Function::new(address, size));
            self.image.symbols.insert(Symbol::new(
                synthetic_name(address),
                address,
                size,
                SymbolKind::Function,
            ));
        }
    }

    fn lift_symbol_functions(&mut self) {
        let recorded: std::collections::BTreeSet<u32> =
            self.functions.iter().map(|f| f.base).collect();
        for symbol in self.image.symbols.functions() {
            if symbol.size > 0 && !recorded.contains(&symbol.address) {
                self.functions.push(Function::new(symbol.address, symbol.size));
            }
        }
    }

    fn sweep_code_sections(&mut self) {
        let max_window = self.config.max_function_size;
        let sections: Vec<(u32, Vec<u8>)> = self
            .image
            .sections
            .iter()
            .filter(|s| s.is_code())
            .filter_map(|s| Some((s.base, s.data.clone()?)))
            .collect();

        for (section_base, data) in sections {
            let mut pos = 0usize;
            while pos + 4 <= data.len() {
                let address = section_base + pos as u32;
                let word = u32::from_be_bytes([
                    data[pos],
                    data[pos + 1],
                    data[pos + 2],
                    data[pos + 3],
                ]);

                // Known data masquerading as code.
                if let Some(&skip) = self.config.invalid_instructions.get(&word) {
                    pos += skip.max(4) as usize;
                    continue;
                }

                // Jump over functions already recorded at this address.
                if let Some(symbol) = self
                    .image
                    .symbols
                    .get(address)
                    .filter(|s| s.kind == SymbolKind::Function && s.size > 0)
                {
                    pos += symbol.size as usize;
                    continue;
                }

                let mut window = data.len() - pos;
                if max_window != 0 {
                    window = window.min(max_window as usize);
                }
                let fn_ = Function::analyze(&data[pos..pos + window], address);
                if fn_.is_valid() && fn_.size >= 4 {
                    self.image.symbols.insert(Symbol::new(
                        synthetic_name(address),
                        address,
                        fn_.size,
                        SymbolKind::Function,
                    ));
                    pos += fn_.size as usize;
                    self.functions.push(fn_);
                } else {
                    pos += 4;
                }
            }
        }
    }

    /// The entry point gets the conventional crt name.
    pub fn rename_entry_symbol(&mut self) {
        let entry = self.image.entry_point;
        if let Some(symbol) = self.image.symbols.get_mut(entry) {
            symbol.name = "_start".to_string();
        }
    }

    /// Translate every discovered function in address order into numbered
    /// units, plus the config, context, shared and mapping artifacts.
    pub fn recompile(&mut self, context_header: Option<&str>) -> Result<PipelineStats> {
        let out_dir = self.config.out_dir();
        let mut project = CppProject::new(&out_dir);

        project.write_config_header(&self.image, &self.config)?;
        if let Some(source) = context_header {
            project.write_context_header(source)?;
        }
        project.write_shared_header(&self.image)?;
        project.write_func_mapping(&self.image)?;

        info!(count = self.functions.len(), "starting translation");
        let translator = Translator::new(&self.image, &self.config);
        let mut translated = 0usize;

        for (index, fn_) in self.functions.iter().enumerate() {
            if index % FUNCTIONS_PER_UNIT == 0 {
                project.begin_unit()?;
            }
            match translator.translate(fn_) {
                Some(result) => {
                    if result.complete {
                        translated += 1;
                    } else {
                        warn!(
                            address = format_args!("{:#010X}", fn_.base),
                            "function translated incompletely"
                        );
                    }
                    project.push(&result.code);
                }
                None => {
                    warn!(
                        address = format_args!("{:#010X}", fn_.base),
                        "function bytes not present in image"
                    );
                }
            }
        }
        project.flush_unit()?;

        let stats = PipelineStats {
            functions: self.functions.len(),
            translated,
            units: project.units_written(),
        };
        info!(
            functions = stats.functions,
            translated = stats.translated,
            units = stats.units,
            "recompilation complete"
        );
        Ok(stats)
    }
}

/// Batch test mode: recompile every `*.rpx` under `test_dir` into its own
/// subdirectory of `out_dir` with a default configuration.
pub fn recompile_tests(test_dir: &Path, out_dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(test_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("rpx")))
        .collect();
    entries.sort();

    for path in entries {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("test");
        let target = out_dir.join(stem);
        std::fs::create_dir_all(&target)?;

        let data = std::fs::read(&path).map_err(|source| Error::Read { path: path.clone(), source })?;
        let image = match RpxImage::parse(&data) {
            Ok(image) => image,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unparsable test image");
                continue;
            }
        };

        let mut config = RecompilerConfig::wiiu_defaults();
        config.treat_unknown_instructions_as_nop = true;
        config.directory_path = out_dir.to_path_buf();
        config.out_directory_path = stem.to_string();

        let mut pipeline = Pipeline::new(image, config);
        pipeline.discover();
        pipeline.rename_entry_symbol();
        let stats = pipeline.recompile(None)?;
        info!(
            test = stem,
            functions = stats.functions,
            translated = stats.translated,
            "test recompiled"
        );
    }
    Ok(())
}
