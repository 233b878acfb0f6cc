//! Recompiler configuration.
//!
//! The main document is a TOML file with a `[main]` table plus optional
//! `[[midasm_hook]]` entries. Jump tables live in a second TOML document
//! referenced by `switch_table_file_path`, produced by the analyzer.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use wur_rpx::{WIIU_MEM1_BASE, WIIU_MEM1_SIZE, WIIU_MEM2_BASE, WIIU_MEM2_SIZE};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("input file {0} does not exist")]
    InputFileMissing(PathBuf),
    #[error("output directory {0} does not exist")]
    OutputDirMissing(PathBuf),
    #[error("invalid memory layout: {0}")]
    InvalidMemoryLayout(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One `[[switch]]` entry from the jump-table document, keyed by the
/// address of the dispatch pattern.
#[derive(Clone, Debug, Deserialize)]
pub struct SwitchEntry {
    pub base: u32,
    pub r: u32,
    #[serde(rename = "default")]
    pub default_target: u32,
    pub labels: Vec<u32>,
}

/// A user hook invoked before or after one instruction in the emitted code.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MidAsmHook {
    pub name: String,
    pub address: u32,
    #[serde(default)]
    pub registers: Vec<String>,
    #[serde(default, rename = "return")]
    pub ret: bool,
    #[serde(default)]
    pub return_on_true: bool,
    #[serde(default)]
    pub return_on_false: bool,
    #[serde(default)]
    pub jump_address: u32,
    #[serde(default)]
    pub jump_address_on_true: u32,
    #[serde(default)]
    pub jump_address_on_false: u32,
    #[serde(default)]
    pub after_instruction: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    main: MainTable,
    #[serde(default)]
    midasm_hook: Vec<MidAsmHook>,
}

#[derive(Debug, Deserialize)]
struct FunctionEntry {
    address: u32,
    size: u32,
}

#[derive(Debug, Deserialize)]
struct InvalidInstructionEntry {
    data: u32,
    size: u32,
}

fn default_mem1_base() -> u32 {
    WIIU_MEM1_BASE
}
fn default_mem1_size() -> u32 {
    WIIU_MEM1_SIZE
}
fn default_mem2_base() -> u32 {
    WIIU_MEM2_BASE
}
fn default_mem2_size() -> u32 {
    WIIU_MEM2_SIZE
}
fn default_true() -> bool {
    true
}
fn default_max_function_size() -> u32 {
    0x10000
}

#[derive(Debug, Deserialize)]
struct MainTable {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    out_directory_path: String,
    #[serde(default)]
    switch_table_file_path: String,

    #[serde(default)]
    skip_lr: bool,
    #[serde(default)]
    skip_msr: bool,
    #[serde(default)]
    ctr_as_local: bool,
    #[serde(default)]
    xer_as_local: bool,
    #[serde(default)]
    reserved_as_local: bool,
    #[serde(default)]
    cr_as_local: bool,
    #[serde(default)]
    non_argument_as_local: bool,
    #[serde(default)]
    non_volatile_as_local: bool,

    #[serde(default)]
    restgprlr_14_address: u32,
    #[serde(default)]
    savegprlr_14_address: u32,
    #[serde(default)]
    restfpr_14_address: u32,
    #[serde(default)]
    savefpr_14_address: u32,
    #[serde(default)]
    longjmp_address: u32,
    #[serde(default)]
    setjmp_address: u32,

    #[serde(default)]
    gqr_0_load_address: u32,
    #[serde(default)]
    gqr_1_load_address: u32,
    #[serde(default)]
    gqr_2_load_address: u32,
    #[serde(default)]
    gqr_3_load_address: u32,
    #[serde(default)]
    gqr_4_load_address: u32,
    #[serde(default)]
    gqr_5_load_address: u32,
    #[serde(default)]
    gqr_6_load_address: u32,
    #[serde(default)]
    gqr_7_load_address: u32,
    #[serde(default)]
    gqr_0_store_address: u32,
    #[serde(default)]
    gqr_1_store_address: u32,
    #[serde(default)]
    gqr_2_store_address: u32,
    #[serde(default)]
    gqr_3_store_address: u32,
    #[serde(default)]
    gqr_4_store_address: u32,
    #[serde(default)]
    gqr_5_store_address: u32,
    #[serde(default)]
    gqr_6_store_address: u32,
    #[serde(default)]
    gqr_7_store_address: u32,

    #[serde(default = "default_mem1_base")]
    mem1_base: u32,
    #[serde(default = "default_mem1_size")]
    mem1_size: u32,
    #[serde(default = "default_mem2_base")]
    mem2_base: u32,
    #[serde(default = "default_mem2_size")]
    mem2_size: u32,

    #[serde(default = "default_true")]
    generate_paired_single_support: bool,
    #[serde(default = "default_true")]
    generate_gqr_support: bool,

    #[serde(default)]
    treat_unknown_instructions_as_nop: bool,
    #[serde(default = "default_max_function_size")]
    max_function_size: u32,

    #[serde(default)]
    functions: Vec<FunctionEntry>,
    #[serde(default)]
    invalid_instructions: Vec<InvalidInstructionEntry>,
}

#[derive(Debug, Deserialize)]
struct SwitchFile {
    #[serde(default, rename = "switch")]
    switches: Vec<SwitchEntry>,
}

/// Fully loaded and validated configuration.
#[derive(Clone, Debug, Default)]
pub struct RecompilerConfig {
    /// Directory of the config file; relative paths resolve against it.
    pub directory_path: PathBuf,
    pub file_path: String,
    pub out_directory_path: String,
    pub switch_table_file_path: String,

    pub skip_lr: bool,
    pub skip_msr: bool,
    pub ctr_as_local: bool,
    pub xer_as_local: bool,
    pub reserved_as_local: bool,
    pub cr_as_local: bool,
    pub non_argument_as_local: bool,
    pub non_volatile_as_local: bool,

    pub restgprlr_14_address: u32,
    pub savegprlr_14_address: u32,
    pub restfpr_14_address: u32,
    pub savefpr_14_address: u32,
    pub longjmp_address: u32,
    pub setjmp_address: u32,
    pub gqr_load_addresses: [u32; 8],
    pub gqr_store_addresses: [u32; 8],

    pub mem1_base: u32,
    pub mem1_size: u32,
    pub mem2_base: u32,
    pub mem2_size: u32,

    pub generate_paired_single_support: bool,
    pub generate_gqr_support: bool,
    pub treat_unknown_instructions_as_nop: bool,
    pub max_function_size: u32,

    /// Manual function definitions, address to size.
    pub functions: Vec<(u32, u32)>,
    /// Word patterns that are data, mapped to the byte count to skip.
    pub invalid_instructions: FxHashMap<u32, u32>,
    /// Jump tables keyed by dispatch-pattern address.
    pub switch_tables: FxHashMap<u32, SwitchEntry>,
    /// Hooks keyed by instruction address.
    pub midasm_hooks: FxHashMap<u32, MidAsmHook>,
}

impl RecompilerConfig {
    /// A configuration with the Wii U memory layout and code-gen defaults
    /// but no file paths; used by the batch test mode.
    pub fn wiiu_defaults() -> Self {
        Self {
            mem1_base: WIIU_MEM1_BASE,
            mem1_size: WIIU_MEM1_SIZE,
            mem2_base: WIIU_MEM2_BASE,
            mem2_size: WIIU_MEM2_SIZE,
            generate_paired_single_support: true,
            generate_gqr_support: true,
            max_function_size: default_max_function_size(),
            ..Default::default()
        }
    }

    /// Load the main document and, when referenced, the switch-table
    /// document next to it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let file: ConfigFile = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        let directory_path = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let main = file.main;

        let mut config = RecompilerConfig {
            directory_path,
            file_path: main.file_path,
            out_directory_path: main.out_directory_path,
            switch_table_file_path: main.switch_table_file_path,
            skip_lr: main.skip_lr,
            skip_msr: main.skip_msr,
            ctr_as_local: main.ctr_as_local,
            xer_as_local: main.xer_as_local,
            reserved_as_local: main.reserved_as_local,
            cr_as_local: main.cr_as_local,
            non_argument_as_local: main.non_argument_as_local,
            non_volatile_as_local: main.non_volatile_as_local,
            restgprlr_14_address: main.restgprlr_14_address,
            savegprlr_14_address: main.savegprlr_14_address,
            restfpr_14_address: main.restfpr_14_address,
            savefpr_14_address: main.savefpr_14_address,
            longjmp_address: main.longjmp_address,
            setjmp_address: main.setjmp_address,
            gqr_load_addresses: [
                main.gqr_0_load_address,
                main.gqr_1_load_address,
                main.gqr_2_load_address,
                main.gqr_3_load_address,
                main.gqr_4_load_address,
                main.gqr_5_load_address,
                main.gqr_6_load_address,
                main.gqr_7_load_address,
            ],
            gqr_store_addresses: [
                main.gqr_0_store_address,
                main.gqr_1_store_address,
                main.gqr_2_store_address,
                main.gqr_3_store_address,
                main.gqr_4_store_address,
                main.gqr_5_store_address,
                main.gqr_6_store_address,
                main.gqr_7_store_address,
            ],
            mem1_base: main.mem1_base,
            mem1_size: main.mem1_size,
            mem2_base: main.mem2_base,
            mem2_size: main.mem2_size,
            generate_paired_single_support: main.generate_paired_single_support,
            generate_gqr_support: main.generate_gqr_support,
            treat_unknown_instructions_as_nop: main.treat_unknown_instructions_as_nop,
            max_function_size: main.max_function_size,
            functions: main.functions.iter().map(|f| (f.address, f.size)).collect(),
            invalid_instructions: main
                .invalid_instructions
                .iter()
                .map(|i| (i.data, i.size))
                .collect(),
            switch_tables: FxHashMap::default(),
            midasm_hooks: FxHashMap::default(),
        };

        if !config.switch_table_file_path.is_empty() {
            config.load_switch_tables()?;
        }

        for hook in file.midasm_hook {
            if (hook.ret && hook.jump_address != 0)
                || (hook.return_on_true && hook.jump_address_on_true != 0)
                || (hook.return_on_false && hook.jump_address_on_false != 0)
            {
                warn!(hook = %hook.name, "hook cannot both return and jump");
            }
            if (hook.ret || hook.jump_address != 0)
                && (hook.return_on_true
                    || hook.return_on_false
                    || hook.jump_address_on_true != 0
                    || hook.jump_address_on_false != 0)
            {
                warn!(hook = %hook.name, "hook mixes direct and conditional return/jump");
            }
            config.midasm_hooks.insert(hook.address, hook);
        }

        if config.restgprlr_14_address == 0 {
            warn!("__restgprlr_14 address is unspecified");
        }
        if config.savegprlr_14_address == 0 {
            warn!("__savegprlr_14 address is unspecified");
        }
        if config.restfpr_14_address == 0 {
            warn!("__restfpr_14 address is unspecified");
        }
        if config.savefpr_14_address == 0 {
            warn!("__savefpr_14 address is unspecified");
        }

        Ok(config)
    }

    fn load_switch_tables(&mut self) -> Result<()> {
        let path = self.directory_path.join(&self.switch_table_file_path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) => {
                warn!(path = %path.display(), %error, "could not load switch table file");
                return Ok(());
            }
        };
        let file: SwitchFile =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
        for entry in file.switches {
            self.switch_tables.insert(entry.base, entry);
        }
        Ok(())
    }

    /// Structural checks; fatal on missing paths or degenerate memory
    /// layout, warnings for suspicious addresses.
    pub fn validate(&self) -> Result<()> {
        if self.file_path.is_empty() {
            return Err(ConfigError::MissingField("file_path"));
        }
        if self.out_directory_path.is_empty() {
            return Err(ConfigError::MissingField("out_directory_path"));
        }

        let input = self.input_path();
        if !input.exists() {
            return Err(ConfigError::InputFileMissing(input));
        }
        let out_dir = self.out_dir();
        if !out_dir.exists() {
            return Err(ConfigError::OutputDirMissing(out_dir));
        }

        if self.mem1_size == 0 || self.mem2_size == 0 {
            return Err(ConfigError::InvalidMemoryLayout("zero-size memory region".into()));
        }
        if self.mem1_base.checked_add(self.mem1_size).is_none()
            || self.mem2_base.checked_add(self.mem2_size).is_none()
        {
            return Err(ConfigError::InvalidMemoryLayout("memory region overflows".into()));
        }

        let check = |address: u32, name: &str| {
            if address != 0 && !self.is_valid_address(address) {
                warn!(
                    name,
                    address = format_args!("{address:#010X}"),
                    "address outside configured memory ranges"
                );
            }
        };
        check(self.restgprlr_14_address, "__restgprlr_14");
        check(self.savegprlr_14_address, "__savegprlr_14");
        check(self.restfpr_14_address, "__restfpr_14");
        check(self.savefpr_14_address, "__savefpr_14");
        check(self.longjmp_address, "longjmp");
        check(self.setjmp_address, "setjmp");
        for i in 0..8 {
            check(self.gqr_load_addresses[i], "gqr_load");
            check(self.gqr_store_addresses[i], "gqr_store");
        }

        for &(address, size) in &self.functions {
            if !self.is_valid_address(address) {
                warn!(
                    address = format_args!("{address:#010X}"),
                    "manual function outside memory ranges"
                );
            }
            if size == 0 || size > self.max_function_size {
                warn!(
                    address = format_args!("{address:#010X}"),
                    size, "manual function has suspicious size"
                );
            }
        }

        Ok(())
    }

    pub fn input_path(&self) -> PathBuf {
        self.directory_path.join(&self.file_path)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.directory_path.join(&self.out_directory_path)
    }

    pub fn is_valid_address(&self, address: u32) -> bool {
        (address >= self.mem1_base && address < self.mem1_base + self.mem1_size)
            || (address >= self.mem2_base && address < self.mem2_base + self.mem2_size)
    }

    /// Human name of the memory region holding `address`.
    pub fn region_name(&self, address: u32) -> &'static str {
        if address >= self.mem1_base && address < self.mem1_base + self.mem1_size {
            "MEM1"
        } else if address >= self.mem2_base && address < self.mem2_base + self.mem2_size {
            "MEM2"
        } else {
            "UNKNOWN"
        }
    }
}
