use crate::config::{
    DefaultsPrefix, RoleConfig, SecretPathTemplate, SecretProviderKind, DEFAULT_COMPOSE_COMMAND,
    DEFAULT_COMPOSE_FILE, DEFAULT_EXTERNAL_PROXY_NET, DEFAULT_MIN_SECRET_LENGTH,
    DEFAULT_ROLE_NAME, DEFAULT_SECRET_TEMPLATE,
};
use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Turn a docker-compose descriptor into deployment-role defaults
#[derive(Parser, Debug, Clone)]
#[command(
    name = "compose-role",
    about = "Turn a docker-compose descriptor into templated deployment-role defaults",
    version,
    long_about = "compose-role canonicalizes a docker-compose descriptor, extracts every \
                  environment value, published port, bind mount and image tag into prefixed \
                  default variables, and rewrites the descriptor to reference them. Secret-like \
                  values become password-store lookups.\n\n\
                  Examples:\n  \
                  compose-role -p myapp\n  \
                  compose-role -p myapp -f stack/docker-compose.yml -o role.json\n  \
                  compose-role -p myapp --proxy-container web --uid 1001 --format yaml"
)]
pub struct CliArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "FILE",
        default_value = DEFAULT_COMPOSE_FILE,
        help = "Compose file to transform"
    )]
    pub file: PathBuf,

    #[arg(
        short = 'p',
        long,
        value_name = "PREFIX",
        value_parser = parse_defaults_prefix,
        help = "Prefix for every generated variable, e.g. 'myapp' (no spaces or hyphens)"
    )]
    pub defaults_prefix: DefaultsPrefix,

    #[arg(
        long,
        value_enum,
        default_value = "passwordstore",
        help = "Secret backend the lookup expressions target"
    )]
    pub secret_provider: SecretProviderArg,

    #[arg(
        long,
        value_name = "TEMPLATE",
        default_value = DEFAULT_SECRET_TEMPLATE,
        value_parser = parse_secret_template,
        help = "Secret path template using {role_name}, {service_name} and {env_key}"
    )]
    pub secret_string_template: SecretPathTemplate,

    #[arg(
        long,
        value_name = "SERVICE",
        help = "Service to attach to the external proxy network"
    )]
    pub proxy_container: Option<String>,

    #[arg(
        short = 'n',
        long,
        value_name = "NAME",
        default_value = DEFAULT_ROLE_NAME,
        help = "Role name used in secret paths"
    )]
    pub role_name: String,

    #[arg(
        long,
        value_name = "LENGTH",
        default_value_t = DEFAULT_MIN_SECRET_LENGTH,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from),
        help = "Minimum length of generated secrets"
    )]
    pub min_secret_length: usize,

    #[arg(
        short = 'e',
        long,
        value_name = "NETWORK",
        default_value = DEFAULT_EXTERNAL_PROXY_NET,
        help = "Name of the external proxy network"
    )]
    pub ext_proxy_net: String,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub out: Option<PathBuf>,

    #[arg(long, value_name = "UID", help = "Replace numeric ids of service users")]
    pub uid: Option<u32>,

    #[arg(
        long = "secret-pattern",
        value_name = "REGEX",
        help = "Additional pattern marking an env key as secret (repeatable)"
    )]
    pub secret_patterns: Vec<String>,

    #[arg(
        long,
        value_name = "COMMAND",
        default_value = DEFAULT_COMPOSE_COMMAND,
        help = "Compose command used to canonicalize the descriptor"
    )]
    pub compose_command: String,

    #[arg(long, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

impl CliArgs {
    /// Run configuration described by the arguments
    pub fn to_config(&self) -> RoleConfig {
        let mut config =
            RoleConfig::new(self.defaults_prefix.clone()).with_role_name(&self.role_name);
        config.secret_provider = self.secret_provider.into();
        config.secret_path_template = self.secret_string_template.clone();
        config.extra_secret_patterns = self.secret_patterns.clone();
        config.min_secret_length = self.min_secret_length;
        config.proxy_container = self.proxy_container.clone();
        config.external_proxy_net = self.ext_proxy_net.clone();
        config.uid = self.uid;
        config
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretProviderArg {
    Passwordstore,
}

impl From<SecretProviderArg> for SecretProviderKind {
    fn from(arg: SecretProviderArg) -> Self {
        match arg {
            SecretProviderArg::Passwordstore => SecretProviderKind::Passwordstore,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
        }
    }
}

fn parse_defaults_prefix(s: &str) -> Result<DefaultsPrefix, String> {
    DefaultsPrefix::parse(s).map_err(|e| e.to_string())
}

fn parse_secret_template(s: &str) -> Result<SecretPathTemplate, String> {
    SecretPathTemplate::parse(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["compose-role", "-p", "myapp"]);
        assert_eq!(args.file, PathBuf::from("docker-compose.yml"));
        assert_eq!(args.defaults_prefix.as_str(), "myapp_");
        assert_eq!(args.secret_provider, SecretProviderArg::Passwordstore);
        assert_eq!(args.role_name, "docker_");
        assert_eq!(args.min_secret_length, 12);
        assert_eq!(args.ext_proxy_net, "proxy-tier");
        assert_eq!(args.compose_command, "docker compose");
        assert_eq!(args.format, OutputFormatArg::Json);
        assert!(args.out.is_none());
        assert!(args.uid.is_none());
        assert!(args.proxy_container.is_none());
    }

    #[test]
    fn test_prefix_is_required() {
        assert!(CliArgs::try_parse_from(["compose-role"]).is_err());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(CliArgs::try_parse_from(["compose-role", "-p", "my-role"]).is_err());
        assert!(CliArgs::try_parse_from(["compose-role", "-p", "my role"]).is_err());
    }

    #[test]
    fn test_invalid_template_rejected() {
        let result = CliArgs::try_parse_from([
            "compose-role",
            "-p",
            "app",
            "--secret-string-template",
            "{host}/{env_key}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_min_secret_length_rejected() {
        let result =
            CliArgs::try_parse_from(["compose-role", "-p", "app", "--min-secret-length", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_all_options() {
        let args = CliArgs::parse_from([
            "compose-role",
            "-f",
            "stack/compose.yml",
            "-p",
            "phh_",
            "-n",
            "Pi Hole",
            "--proxy-container",
            "web",
            "-e",
            "edge",
            "--min-secret-length",
            "24",
            "--uid",
            "1001",
            "--secret-pattern",
            "_KEY$",
            "--secret-pattern",
            "^AUTH",
            "--compose-command",
            "podman-compose",
            "--format",
            "yaml",
            "-o",
            "out.json",
        ]);

        let config = args.to_config();
        assert_eq!(config.defaults_prefix.as_str(), "phh_");
        assert_eq!(config.role_name, "pi_hole");
        assert_eq!(config.proxy_container.as_deref(), Some("web"));
        assert_eq!(config.external_proxy_net, "edge");
        assert_eq!(config.min_secret_length, 24);
        assert_eq!(config.uid, Some(1001));
        assert_eq!(config.extra_secret_patterns, vec!["_KEY$", "^AUTH"]);
        assert_eq!(args.compose_command, "podman-compose");
        assert_eq!(args.format, OutputFormatArg::Yaml);
        assert_eq!(args.out, Some(PathBuf::from("out.json")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["compose-role", "-p", "app", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_log_level_flag() {
        let args = CliArgs::parse_from(["compose-role", "-p", "app", "--log-level", "debug"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
