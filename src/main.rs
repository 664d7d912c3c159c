// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt, prelude::*};

use grapnel::{check_whole_program, loader, Icfg, IcfgConfig, TypeHierarchy};

mod cli;

fn setup_global_subscriber() -> impl Drop {
    let filter_layer = tracing::level_filters::LevelFilter::TRACE;
    let fmt_layer = fmt::Layer::default();
    let (flame_layer, guard) = FlameLayer::with_file("./tracing.folded").unwrap();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .init();
    guard
}

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let _guard = if args.tracing {
        Some(setup_global_subscriber())
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::level_filters::LevelFilter::WARN)
            .init();
        None
    };

    let config = IcfgConfig {
        entry_points: args.entry.clone(),
        resolver: args.resolver.clone().into(),
        soundness: args.soundness.clone().into(),
        include_globals: args.include_globals,
        json_id: args.json_id.clone(),
    };
    check_whole_program(args.module.len(), &config)?;
    if args.module.len() != 1 {
        return Err(anyhow!(
            "whole-program analysis expects one linked module, got {}",
            args.module.len()
        ));
    }
    let path = &args.module[0];

    let llvm_module = llvm_ir::Module::from_bc_path(path)
        .map_err(Error::msg)
        .with_context(|| format!("Couldn't parse LLVM bitcode module at {}", path.display()))?;
    let module = loader::module(&llvm_module).context("Malformed LLVM module")?;
    let hierarchy = TypeHierarchy::of_module(&module);

    let icfg = Icfg::new(module, hierarchy, &config)?;

    if let Some(dot_path) = &args.dot {
        std::fs::write(dot_path, icfg.to_dot())
            .with_context(|| format!("Couldn't write DOT graph to {}", dot_path.display()))?;
    }
    if let Some(json_path) = &args.json {
        std::fs::write(json_path, serde_json::to_string_pretty(&icfg.to_json())?)
            .with_context(|| format!("Couldn't write JSON graph to {}", json_path.display()))?;
    }

    if !args.quiet {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "functions: {}", icfg.graph().vertex_count())?;
        writeln!(stdout, "call edges: {}", icfg.graph().edge_count())?;
        for site in icfg.unresolved_call_sites() {
            writeln!(stdout, "unresolved: {}", site)?;
        }
        if args.dot.is_none() && args.json.is_none() {
            write!(stdout, "{}", icfg.to_dot())?;
        }
    }

    Ok(())
}
