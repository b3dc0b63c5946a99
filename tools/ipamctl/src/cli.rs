//! Command-line structure.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use prism_client::{DEFAULT_PORT, ManagementEndpoint};
use std::time::Duration;
use subnet_ipam::ReservationRequest;

/// Reserve and unreserve IP addresses and ranges in Prism Central subnets
#[derive(Debug, Parser)]
#[command(name = "ipamctl", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Address of Prism Central (`host`, `host:port` or `https://host:port`), required
    #[arg(long, global = true)]
    pub prism_endpoint: Option<String>,

    /// Prism Central username
    #[arg(long, env = "NUTANIX_USER", global = true, hide_env_values = true)]
    pub user: Option<String>,

    /// Prism Central password
    #[arg(long, env = "NUTANIX_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Subnet to work in, either UUID or name
    #[arg(long, global = true)]
    pub subnet: Option<String>,

    /// AOS cluster scoping a subnet name, either UUID or name
    #[arg(long, visible_alias = "cluster", global = true)]
    pub aos_cluster: Option<String>,

    /// Skip Prism Central certificate validation
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Show Prism Central API traffic
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Give up after this long
    #[arg(long, global = true, default_value = "60s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Delay between attempts while the task is running
    #[arg(long, global = true, default_value = "1s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reserve IP addresses in a subnet.
    ///
    /// No arguments reserves one address; a single `from-to` argument
    /// reserves a range; otherwise every argument is an address.
    Reserve {
        addresses: Vec<String>,
    },
    /// Unreserve IP addresses in a subnet: one `from-to` range or a list
    Unreserve {
        #[arg(required = true, num_args = 1..)]
        addresses: Vec<String>,
    },
}

impl GlobalArgs {
    pub fn endpoint(&self) -> Result<ManagementEndpoint> {
        let raw = required(&self.prism_endpoint, "--prism-endpoint")?;
        let (address, port) = parse_endpoint(raw)?;
        Ok(ManagementEndpoint {
            address,
            port,
            username: required(&self.user, "--user or NUTANIX_USER")?.to_string(),
            password: required(&self.password, "--password or NUTANIX_PASSWORD")?.to_string(),
            insecure: self.insecure,
            additional_trust_bundle: None,
        })
    }

    pub fn subnet(&self) -> Result<&str> {
        required(&self.subnet, "--subnet")
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{what} is required"),
    }
}

/// Host and port from an endpoint, with or without scheme
pub fn parse_endpoint(raw: &str) -> Result<(String, u16)> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = reqwest::Url::parse(&with_scheme)
        .with_context(|| format!("failed to parse endpoint {raw:?}"))?;
    let host = url
        .host_str()
        .with_context(|| format!("endpoint {raw:?} has no host"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    Ok((host, url.port().unwrap_or(DEFAULT_PORT)))
}

fn is_range(arg: &str) -> bool {
    arg.contains('-')
}

/// No args: one address; one `from-to`: range; otherwise a list
pub fn reserve_request(args: &[String]) -> Result<ReservationRequest> {
    match args {
        [] => Ok(ReservationRequest::count(1)?),
        [range] if is_range(range) => ReservationRequest::parse_range(range)
            .context("failed to create reserve IP range"),
        [first, _, ..] if is_range(first) => {
            bail!("only one argument is allowed when reserving an IP range")
        }
        list => ReservationRequest::list(list).context("failed to create reserve IP list"),
    }
}

/// One `from-to`: range; otherwise a list
pub fn unreserve_request(args: &[String]) -> Result<ReservationRequest> {
    match args {
        [] => bail!("at least one address or range is required"),
        [range] if is_range(range) => ReservationRequest::parse_range(range)
            .context("failed to create unreserve IP range"),
        [first, _, ..] if is_range(first) => {
            bail!("only one argument is allowed when unreserving an IP range")
        }
        list => ReservationRequest::list(list).context("failed to create unreserve IP list"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use subnet_ipam::RequestKind;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reserve_with_cluster_alias() {
        let cli = Cli::try_parse_from([
            "ipamctl",
            "--prism-endpoint",
            "pc.lab:9440",
            "--user",
            "admin",
            "--password",
            "secret",
            "--subnet",
            "vlan-10",
            "--cluster",
            "pe-1",
            "reserve",
            "10.0.0.10-10.0.0.12",
        ])
        .unwrap();
        assert_eq!(cli.global.aos_cluster.as_deref(), Some("pe-1"));
        assert_eq!(cli.global.timeout, Duration::from_secs(60));
        assert_eq!(cli.global.poll_interval, Duration::from_secs(1));
        let Command::Reserve { addresses } = cli.command else {
            panic!("expected reserve");
        };
        assert_eq!(addresses, vec!["10.0.0.10-10.0.0.12"]);
    }

    #[test]
    fn test_unreserve_needs_an_argument() {
        let result = Cli::try_parse_from([
            "ipamctl",
            "--prism-endpoint",
            "pc",
            "--user",
            "u",
            "--password",
            "p",
            "--subnet",
            "s",
            "unreserve",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_connection_settings_are_reported() {
        let cli = Cli::try_parse_from(["ipamctl", "--subnet", "s", "reserve"]).unwrap();
        let err = cli.global.endpoint().unwrap_err();
        assert_eq!(err.to_string(), "--prism-endpoint is required");

        let cli = Cli::try_parse_from(["ipamctl", "--prism-endpoint", "pc", "reserve"]).unwrap();
        assert!(cli.global.subnet().is_err());
    }

    #[test]
    fn test_endpoint_forms() {
        assert_eq!(parse_endpoint("pc.lab").unwrap(), ("pc.lab".to_string(), 9440));
        assert_eq!(parse_endpoint("pc.lab:443").unwrap(), ("pc.lab".to_string(), 443));
        assert_eq!(
            parse_endpoint("https://10.0.0.1:9440").unwrap(),
            ("10.0.0.1".to_string(), 9440)
        );
        assert_eq!(parse_endpoint("[fd00::1]").unwrap(), ("fd00::1".to_string(), 9440));
    }

    #[test]
    fn test_reserve_request_shapes() {
        assert_eq!(reserve_request(&[]).unwrap().kind(), &RequestKind::Count(1));
        assert!(matches!(
            reserve_request(&args(&["10.0.0.10-10.0.0.12"])).unwrap().kind(),
            RequestKind::Range { count: 3, .. }
        ));
        assert!(matches!(
            reserve_request(&args(&["10.0.0.1", "10.0.0.7"])).unwrap().kind(),
            RequestKind::List(ips) if ips.len() == 2
        ));
        assert!(reserve_request(&args(&["10.0.0.1-10.0.0.2", "10.0.0.7"])).is_err());
        assert!(reserve_request(&args(&["not-an-ip"])).is_err());
    }

    #[test]
    fn test_unreserve_request_shapes() {
        assert!(unreserve_request(&[]).is_err());
        assert!(matches!(
            unreserve_request(&args(&["10.0.0.5"])).unwrap().kind(),
            RequestKind::List(_)
        ));
        assert!(matches!(
            unreserve_request(&args(&["10.0.0.5-10.0.0.6"])).unwrap().kind(),
            RequestKind::Range { count: 2, .. }
        ));
    }
}
