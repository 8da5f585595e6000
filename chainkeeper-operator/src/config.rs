//! Operator configuration.

use std::time::Duration;

/// Runtime settings shared by every controller.
#[derive(Debug, Clone, clap::Args)]
pub struct OperatorConfig {
    /// Whether defaulting and validation run in the admission webhook.
    /// When false, controllers default and validate inline.
    #[arg(
        long,
        env = "ENABLE_WEBHOOKS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_webhooks: bool,

    /// Upper bound on a single API server round-trip, in seconds.
    #[arg(long, env = "STORE_TIMEOUT_SECS", default_value_t = 10)]
    pub store_timeout_secs: u64,

    /// Reconciles running in parallel per controller.
    #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Delay before retrying a failed reconcile, in seconds.
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            enable_webhooks: true,
            store_timeout_secs: 10,
            concurrency: 4,
            error_requeue_secs: 30,
        }
    }
}

impl OperatorConfig {
    /// Bound on one store call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Requeue delay after a transient error.
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: OperatorConfig,
    }

    #[test]
    fn defaults_match_flags() {
        let cli = Cli::try_parse_from(["operator"]).unwrap();
        let defaults = OperatorConfig::default();
        assert_eq!(cli.config.enable_webhooks, defaults.enable_webhooks);
        assert_eq!(cli.config.store_timeout(), defaults.store_timeout());
        assert_eq!(cli.config.concurrency, defaults.concurrency);
        assert_eq!(cli.config.error_requeue(), Duration::from_secs(30));
    }

    #[test]
    fn webhooks_can_be_disabled() {
        let cli = Cli::try_parse_from(["operator", "--enable-webhooks", "false"]).unwrap();
        assert!(!cli.config.enable_webhooks);
    }
}
