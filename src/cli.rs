use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::NamespaceScope;

const MIN_REFRESH_MS: u64 = 500;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubedeck",
    version,
    about = "A keyboard and mouse driven terminal dashboard for Kubernetes and OpenShift."
)]
pub struct CliArgs {
    /// Path to a kubeconfig file (defaults to $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to start in
    #[arg(long)]
    pub context: Option<String>,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long, conflicts_with = "namespace")]
    pub all_namespaces: bool,

    /// Full refresh interval of the active tab in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub refresh_ms: u64,

    /// Shorthand for --log-filter debug
    #[arg(long)]
    pub debug: bool,

    /// tracing filter (for example: info,kubedeck=debug)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write diagnostics to this file; they are discarded otherwise
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Draw on the main screen instead of the alternate screen
    #[arg(long)]
    pub no_alt_screen: bool,

    /// Do not capture mouse events
    #[arg(long)]
    pub no_mouse: bool,

    /// Path to a kubedeck YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(MIN_REFRESH_MS))
    }

    pub fn log_filter(&self) -> &str {
        if self.debug { "debug" } else { &self.log_filter }
    }

    /// Initial namespace scope; `fallback` is the kubeconfig default.
    pub fn namespace_scope(&self, fallback: &str) -> NamespaceScope {
        if self.all_namespaces {
            return NamespaceScope::All;
        }
        match self.namespace.as_deref().map(str::trim) {
            Some(namespace) if !namespace.is_empty() => {
                NamespaceScope::Named(namespace.to_string())
            }
            _ if fallback.is_empty() => NamespaceScope::All,
            _ => NamespaceScope::Named(fallback.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use crate::model::NamespaceScope;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["kubedeck"]);
        assert_eq!(args.refresh_interval(), Duration::from_millis(2_000));
        assert_eq!(args.log_filter(), "info");
        assert_eq!(
            args.namespace_scope("default"),
            NamespaceScope::Named("default".to_string())
        );
        assert!(!args.no_mouse);
    }

    #[test]
    fn refresh_interval_has_a_floor() {
        let args = CliArgs::parse_from(["kubedeck", "--refresh-ms", "100"]);
        assert_eq!(args.refresh_interval(), Duration::from_millis(500));
    }

    #[test]
    fn namespace_flags() {
        let args = CliArgs::parse_from(["kubedeck", "-A"]);
        assert_eq!(args.namespace_scope("default"), NamespaceScope::All);

        let args = CliArgs::parse_from(["kubedeck", "-n", "shop", "--debug"]);
        assert_eq!(
            args.namespace_scope("default"),
            NamespaceScope::Named("shop".to_string())
        );
        assert_eq!(args.log_filter(), "debug");

        assert!(CliArgs::try_parse_from(["kubedeck", "-A", "-n", "shop"]).is_err());
    }
}
