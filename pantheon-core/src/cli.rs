//! CLI argument parsing for pantheon.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pantheon")]
#[command(about = "Provision a pantheon host from the Arch Linux live installer")]
#[command(long_about = "Provision a pantheon host from the Arch Linux live installer.\n\n\
    Formats, partitions and mounts the host's drives, installs the base system under the \
    staging root and hands off to a chroot for post-install configuration.\n\n\
    Must be run as root. Every destructive step asks for confirmation first.")]
pub struct Cli {
    /// Host to provision: ASTER, APOLLO, HEPHAESTUS or THEMIS
    #[arg(value_name = "HOST")]
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn parses_single_positional_host() {
        let cli = Cli::try_parse_from(["pantheon", "THEMIS"]).unwrap();
        assert_eq!(cli.host, "THEMIS");
    }

    #[test]
    fn host_is_required() {
        let err = Cli::try_parse_from(["pantheon"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn help_is_a_display_request() {
        let err = Cli::try_parse_from(["pantheon", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = Cli::try_parse_from(["pantheon", "--dry-run", "ASTER"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
