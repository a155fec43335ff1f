//
// main.rs
//
// Copyright (C) 2022-2025 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use std::env;
use std::path::PathBuf;

use scopeman::backend;
use scopeman::config::ScopeConfig;

fn print_usage() {
    println!(
        "scopeman {}, a scope coordinator for JavaScript analysis engines.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: scopeman [OPTIONS]

Available options:

--stdio                      Start the LSP server using stdio transport
--engine <program>           Analysis engine to run as a subprocess
--engine-arg <arg>           Argument for the engine (repeatable)
--defs <dir>                 Directory holding definition JSON files
--version                    Print the version
--help                       Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut use_stdio = false;
    let mut config = ScopeConfig::default();
    let mut engine_program: Option<String> = None;
    let mut engine_args: Vec<String> = Vec::new();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--stdio" => use_stdio = true,
            "--engine" => {
                let program = argv
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--engine requires a program"))?;
                engine_program = Some(program);
            }
            "--engine-arg" => {
                let value = argv
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--engine-arg requires a value"))?;
                engine_args.push(value);
            }
            "--defs" => {
                let dir = argv
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--defs requires a directory"))?;
                config.defs_dir = PathBuf::from(dir);
            }
            "--version" => {
                println!("scopeman {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    if !use_stdio {
        print_usage();
        return Ok(());
    }

    if let Some(program) = engine_program {
        let mut command = vec![program];
        command.extend(engine_args);
        config.engine_command = Some(command);
    } else if !engine_args.is_empty() {
        return Err(anyhow::anyhow!("--engine-arg given without --engine"));
    }

    env_logger::init();

    backend::start_lsp(config).await
}
