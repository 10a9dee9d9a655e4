use clap::Parser;

#[derive(Parser)]
#[command(name = "WH-02 ROM Builder")]
#[command(version = "1.0")]
#[command(
    about = "Compiles the WH-02 microprogram into a control-logic ROM image",
    long_about = None
)]
pub(crate) struct Cli {
    /// Output file ("-" for stdout)
    #[arg(short, long, default_value = "rom.bin")]
    pub(crate) output: String,

    /// Output format: "hex" or "listing"
    #[arg(short, long, default_value = "hex")]
    pub(crate) format: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["wh02-microcode"]);
        assert_eq!(cli.output, "rom.bin");
        assert_eq!(cli.format, "hex");
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["wh02-microcode", "-o", "-", "-f", "listing"]);
        assert_eq!(cli.output, "-");
        assert_eq!(cli.format, "listing");
    }
}
