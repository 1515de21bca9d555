//! Command-line definition.

use std::path::PathBuf;

use clap::Parser;

/// Lift machine code described by a JSON specification into IR.
#[derive(Debug, Parser)]
#[command(name = "liftscope", version, about)]
pub struct Cli {
    /// Path to a JSON specification of code to lift ('-' reads stdin).
    #[arg(long)]
    pub spec: String,

    /// Path to file where the textual IR should be saved.
    #[arg(long = "ir_out")]
    pub ir_out: Option<PathBuf>,

    /// Path to file where the binary IR should be saved.
    #[arg(long = "bc_out")]
    pub bc_out: Option<PathBuf>,

    /// Architecture to assume when the spec does not name one.
    #[arg(long)]
    pub arch: Option<String>,

    /// Operating system to assume when the spec does not name one.
    #[arg(long)]
    pub os: Option<String>,

    /// Enable debug logging.
    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation_parses() {
        let cli = Cli::try_parse_from(["liftscope", "--spec", "in.json"]).unwrap();
        assert_eq!(cli.spec, "in.json");
        assert!(cli.ir_out.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_spec_is_required() {
        assert!(Cli::try_parse_from(["liftscope"]).is_err());
    }

    #[test]
    fn test_outputs_and_fallbacks() {
        let cli = Cli::try_parse_from([
            "liftscope",
            "--spec",
            "-",
            "--ir_out",
            "out.ir",
            "--bc_out",
            "out.bc",
            "--arch",
            "amd64",
            "--os",
            "linux",
        ])
        .unwrap();
        assert_eq!(cli.spec, "-");
        assert!(cli.ir_out.is_some());
        assert!(cli.bc_out.is_some());
        assert_eq!(cli.arch.as_deref(), Some("amd64"));
        assert_eq!(cli.os.as_deref(), Some("linux"));
    }
}
