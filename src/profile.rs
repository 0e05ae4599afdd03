//! Compilation profiles
//!
//! A profile is the tuple of three independent axes that govern one
//! compilation: optimization level, debug-info presence, and target
//! class. Code generation queries the profile; it never branches on a
//! named configuration, so adding a new axis or target stays additive.

/// Optimization level selected for the generated module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// No optimization; the module is emitted as generated
    None,
    /// Standard per-function pipeline
    Moderate,
    /// Per-function pipeline plus a whole-module sweep, for
    /// single-module whole-program builds
    Aggressive,
}

/// Target class for the emitted module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The host machine
    Native,
    /// Portable sandboxed target (wasm32-wasi)
    Sandboxed,
}

impl Target {
    /// Target triple recorded in the emitted module
    pub fn triple(&self) -> &'static str {
        match self {
            Target::Sandboxed => "wasm32-unknown-wasi",
            Target::Native => {
                if cfg!(all(target_arch = "aarch64", target_os = "macos")) {
                    "arm64-apple-macosx"
                } else if cfg!(all(target_arch = "x86_64", target_os = "macos")) {
                    "x86_64-apple-macosx"
                } else if cfg!(target_arch = "aarch64") {
                    "aarch64-unknown-linux-gnu"
                } else {
                    "x86_64-unknown-linux-gnu"
                }
            }
        }
    }

    /// Data layout string matching the triple
    pub fn data_layout(&self) -> &'static str {
        match self {
            Target::Sandboxed => {
                "e-m:e-p:32:32-p10:8:8-p20:8:8-i64:64-i128:128-n32:64-S128-ni:1:10:20"
            }
            Target::Native => {
                if cfg!(target_os = "macos") {
                    "e-m:o-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-n32:64-S128-Fn32"
                } else {
                    "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128"
                }
            }
        }
    }

    /// The sandboxed runtime's startup stub resolves this symbol instead
    /// of the conventional entry point, so a hidden external alias with
    /// this name must point at the entry function.
    pub fn entry_alias(&self) -> Option<&'static str> {
        match self {
            Target::Sandboxed => Some("__main_void"),
            Target::Native => None,
        }
    }

    /// PIC level module flag, where the target requires one
    pub fn pic_level(&self) -> Option<u32> {
        match self {
            Target::Native => Some(2),
            Target::Sandboxed => None,
        }
    }
}

/// The profile threaded through code generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub opt: OptLevel,
    pub debug_info: bool,
    pub target: Target,
}

impl Profile {
    /// Debug build: no optimization, debug info on
    pub fn debug(target: Target) -> Self {
        Self { opt: OptLevel::None, debug_info: true, target }
    }

    /// Development build: moderate optimization, debug info on
    pub fn development(target: Target) -> Self {
        Self { opt: OptLevel::Moderate, debug_info: true, target }
    }

    /// Shipping build: whole-program optimization, no debug info
    pub fn shipping(target: Target) -> Self {
        Self { opt: OptLevel::Aggressive, debug_info: false, target }
    }
}
