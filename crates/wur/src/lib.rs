//! WUR - Wii U Recompiler
//!
//! Statically recompiles Wii U executable images (RPX) into C++ source
//! that links against a small PowerPC machine-state runtime.
//!
//! # Example
//!
//! ```ignore
//! use wur::Pipeline;
//! use wur_emit::RecompilerConfig;
//!
//! let config = RecompilerConfig::load(Path::new("config.toml"))?;
//! let mut pipeline = Pipeline::load(config)?;
//! pipeline.discover();
//! pipeline.recompile(Some(&context_header))?;
//! ```

pub mod analyze;
mod pipeline;

pub use pipeline::*;

// Re-export from sub-crates.
pub use wur_cfg::{BasicBlock, Function, SwitchKind, SwitchTable};
pub use wur_emit::{ConfigError, CppProject, RecompilerConfig, TranslatedFunction, Translator};
pub use wur_ppc::{decode, Instr, OpId};
pub use wur_rpx::{RpxImage, RpxError, Symbol, SymbolKind};

use std::path::PathBuf;

use thiserror::Error;

/// Recompiler errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("image error: {0}")]
    Rpx(#[from] RpxError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
