mod builder;
mod cli;
mod ds;
mod encoder;
mod error;
mod isa;
mod rom;

use std::io::{self, Write};
use std::time::Instant;

use builder::{build_microprogram, Microprogram};
use clap::Parser;
use cli::Cli;
use error::BuildError;
use rom::RomImage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    log::info!("Building ROM...");
    let start = Instant::now();

    let program = build_microprogram(isa::INSTRUCTION_SET)?;
    let output = render(&program, &cli.format)?;
    write_output(&cli.output, &output)?;

    let duration = start.elapsed();
    log::info!(
        "Wrote {} to '{}' in {}ms ({}ns)",
        cli.format,
        cli.output,
        duration.as_millis(),
        duration.as_nanos()
    );
    Ok(())
}

fn render(program: &Microprogram, format: &str) -> Result<String, BuildError> {
    match format {
        "hex" => RomImage::from_microprogram(program).render(),
        "listing" => Ok(rom::render_listing(program)),
        _ => Err(BuildError::UnknownFormat(format.to_string())),
    }
}

/// Writes the fully rendered artifact in one call
fn write_output(path: &str, contents: &str) -> Result<(), BuildError> {
    let result = if path == "-" {
        io::stdout().lock().write_all(contents.as_bytes())
    } else {
        std::fs::write(path, contents)
    };
    result.map_err(|source| BuildError::Io {
        path: path.to_string(),
        source,
    })
}
