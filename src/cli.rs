// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;
use std::path::PathBuf;

use grapnel::{ResolverKind, Soundness};

#[derive(Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ResolverArg {
    NoResolve,
    Cha,
    Rta,
    Dta,
    Vta,
    Otf,
}

impl fmt::Display for ResolverArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolverArg::NoResolve => "no-resolve",
            ResolverArg::Cha => "cha",
            ResolverArg::Rta => "rta",
            ResolverArg::Dta => "dta",
            ResolverArg::Vta => "vta",
            ResolverArg::Otf => "otf",
        };
        write!(f, "{}", s)
    }
}

impl From<ResolverArg> for ResolverKind {
    fn from(a: ResolverArg) -> Self {
        match a {
            ResolverArg::NoResolve => ResolverKind::NoResolve,
            ResolverArg::Cha => ResolverKind::Cha,
            ResolverArg::Rta => ResolverKind::Rta,
            ResolverArg::Dta => ResolverKind::Dta,
            ResolverArg::Vta => ResolverKind::Vta,
            ResolverArg::Otf => ResolverKind::Otf,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum SoundnessArg {
    Sound,
    Soundy,
    Unsound,
}

impl fmt::Display for SoundnessArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SoundnessArg::Sound => "sound",
            SoundnessArg::Soundy => "soundy",
            SoundnessArg::Unsound => "unsound",
        };
        write!(f, "{}", s)
    }
}

impl From<SoundnessArg> for Soundness {
    fn from(a: SoundnessArg) -> Self {
        match a {
            SoundnessArg::Sound => Soundness::Sound,
            SoundnessArg::Soundy => Soundness::Soundy,
            SoundnessArg::Unsound => Soundness::Unsound,
        }
    }
}

/// Whole-program call-graph construction for LLVM bitcode
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Entry points; `__ALL__` selects every defined function
    #[arg(short, long, default_value = "main")]
    pub entry: Vec<String>,

    /// Call-resolution strategy
    #[arg(long, default_value_t = ResolverArg::Otf)]
    pub resolver: ResolverArg,

    /// Soundness level forwarded to the resolver
    #[arg(long, default_value_t = SoundnessArg::Soundy)]
    pub soundness: SoundnessArg,

    /// Model global constructors and destructors around the entry points
    #[arg(long)]
    pub include_globals: bool,

    /// Write the call graph as DOT
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// Write the call graph as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Top-level key of the JSON export
    #[arg(long, default_value = "CallGraph")]
    pub json_id: String,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,

    /// LLVM bitcode module(s); whole-program analysis expects one
    #[arg(required = true)]
    pub module: Vec<PathBuf>,
}
