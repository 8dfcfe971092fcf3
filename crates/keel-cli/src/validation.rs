use crate::cli_args::Cli;

/// Startup validation run before any client is built. Returns the first
/// configuration problem as a user-facing message.
pub fn validate_run_configuration(cli: &Cli) -> Result<(), String> {
    if cli.rpc_url.trim().is_empty() {
        return Err("--rpc-url cannot be empty".to_string());
    }
    if cli.sender.trim().is_empty() {
        return Err("--sender cannot be empty".to_string());
    }

    if cli.verify && !cli.dry_run {
        let api_url_missing = cli
            .verification_api_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .is_none();
        let api_key_missing = cli
            .verification_api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .is_none();
        if api_url_missing {
            return Err(
                "--verification-api-url is required when verification is enabled (or pass --verify=false)"
                    .to_string(),
            );
        }
        if api_key_missing {
            return Err(
                "--verification-api-key is required when verification is enabled (or pass --verify=false)"
                    .to_string(),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::validate_run_configuration;
    use crate::cli_args::Cli;

    fn cli_from(args: &[&str]) -> Cli {
        let mut full = vec![
            "keel",
            "--rpc-url",
            "http://127.0.0.1:8545",
            "--chain-id",
            "80001",
            "--sender",
            "0x6fc51d05be9df5d4f14ed785b993ee305eb32466",
        ];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).expect("parse")
    }

    #[test]
    fn verification_enabled_requires_api_configuration() {
        let cli = cli_from(&[]);
        let error = validate_run_configuration(&cli).expect_err("missing api url");
        assert!(error.contains("--verification-api-url"));

        let cli = cli_from(&["--verification-api-url", "https://api.example/api"]);
        let error = validate_run_configuration(&cli).expect_err("missing api key");
        assert!(error.contains("--verification-api-key"));

        let cli = cli_from(&[
            "--verification-api-url",
            "https://api.example/api",
            "--verification-api-key",
            "secret",
        ]);
        assert!(validate_run_configuration(&cli).is_ok());
    }

    #[test]
    fn disabled_verification_needs_no_api_configuration() {
        let cli = cli_from(&["--verify=false"]);
        assert!(validate_run_configuration(&cli).is_ok());
    }

    #[test]
    fn dry_runs_skip_verification_requirements() {
        let cli = cli_from(&["--dry-run"]);
        assert!(validate_run_configuration(&cli).is_ok());
    }
}
