mod app;

use std::io::Read;

use anyhow::{bail, Context};
use clap::Parser;
use liftscope::{
    ir::bitcode,
    lifter::{EntityLifter, LifterOptions},
    spec::parse_program,
};

use crate::app::Cli;

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show liftscope info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("liftscope", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let spec_path = if cli.spec == "/dev/stdin" {
        "-".to_string()
    } else {
        cli.spec.clone()
    };
    let text = if spec_path == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("unable to read JSON spec from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(&spec_path)
            .with_context(|| format!("unable to read JSON spec file '{spec_path}'"))?
    };

    let program = parse_program(&text, cli.arch.as_deref(), cli.os.as_deref())
        .with_context(|| format!("unable to parse JSON spec file '{spec_path}'"))?;

    let mut lifter = EntityLifter::new(
        program.arch().clone(),
        LifterOptions::default(),
        &program,
        &program,
        &program,
    );

    program.for_each_variable(|decl| {
        lifter.lift_variable(decl);
    });
    program.for_each_function(|decl| {
        let _ = lifter.lift_entity(decl);
    });

    // Apply symbol names, then make the reserved globals self-contained.
    program.for_each_symbol(|address, name| {
        lifter.name_entity(address, name);
    });
    lifter.module_mut().internalize_reserved_globals();

    let module = lifter.into_module();

    if let Some(path) = &cli.ir_out {
        if std::fs::write(path, module.to_string()).is_err() {
            bail!("could not save IR to {}", path.display());
        }
    }
    if let Some(path) = &cli.bc_out {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("could not save binary IR to {}", path.display()))?;
        if bitcode::write_module(&module, &mut file).is_err() {
            bail!("could not save binary IR to {}", path.display());
        }
    }

    Ok(())
}
