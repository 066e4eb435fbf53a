// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Run a shell as if it were attached through a slow serial line.
///
/// Keystrokes reach the shell immediately; its output is shown no faster
/// than BAUD bits per second would allow. Type `~` at the start of a line
/// to quit.
#[derive(Parser, Debug, Clone)]
#[command(name = "baudsim")]
#[command(version)]
pub struct CliArgs {
    /// Line speed in bits per second (150 to 200000)
    #[arg(value_name = "BAUD")]
    pub baud: u32,

    /// Path to a JSON config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Shell to run instead of the configured one
    #[arg(short, long, value_name = "SHELL")]
    pub shell: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn baud_is_the_only_required_argument() {
        let args = CliArgs::try_parse_from(["baudsim", "9600"]).unwrap();
        assert_eq!(args.baud, 9600);
        assert!(args.config.is_none());
        assert!(args.shell.is_none());
    }

    #[test_log::test]
    fn missing_or_non_numeric_baud_is_a_usage_error() {
        assert!(CliArgs::try_parse_from(["baudsim"]).is_err());
        assert!(CliArgs::try_parse_from(["baudsim", "fast"]).is_err());
        assert!(CliArgs::try_parse_from(["baudsim", "-300"]).is_err());
    }

    #[test_log::test]
    fn overrides() {
        let args =
            CliArgs::try_parse_from(["baudsim", "--shell", "/bin/bash", "-c", "x.json", "300"])
                .unwrap();
        assert_eq!(args.shell, Some(PathBuf::from("/bin/bash")));
        assert_eq!(args.config, Some(PathBuf::from("x.json")));
        assert_eq!(args.baud, 300);
    }
}
