//! Command-line configuration.
//!
//! Flag names and defaults follow the deployment conventions for admission
//! webhooks: the TLS key pair is mounted into the pod and passed by path.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::webhook::mutation::{AllowAllMutator, GpuLimitMutator, Mutate};

/// Kubernetes mutating admission webhook server.
#[derive(Parser, Clone, Debug)]
#[command(name = "gpu-admission-webhook", version, about)]
pub struct Config {
    /// Webhook server port.
    #[arg(long, default_value_t = 443)]
    pub port: u16,

    /// File containing the x509 certificate for HTTPS.
    #[arg(long = "tlsCertFile", default_value = "/etc/webhook/certs/cert.pem")]
    pub tls_cert_file: PathBuf,

    /// File containing the x509 private key to --tlsCertFile.
    #[arg(long = "tlsKeyFile", default_value = "/etc/webhook/certs/key.pem")]
    pub tls_key_file: PathBuf,

    /// Plain-HTTP port for health probes and metrics.
    #[arg(long, default_value_t = 8080)]
    pub health_port: u16,

    /// Seconds in-flight requests get to finish during shutdown before
    /// their connections are closed.
    #[arg(long, default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    /// How envelope or object decode failures are reported to the caller.
    #[arg(long, value_enum, default_value = "review")]
    pub decode_failure_policy: DecodeFailurePolicy,

    /// Mutation strategy applied to admitted pods.
    #[arg(long, value_enum, default_value = "gpu-limit")]
    pub mutation: MutationStrategy,
}

/// Where a decode failure surfaces.
///
/// The admission convention is that the control plane prefers a parseable
/// envelope even on failure, so `review` is the default; `status` trades
/// that for an unmissable transport-level error.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// HTTP 200 carrying `allowed: false` and the error as a status message.
    #[default]
    Review,
    /// HTTP 500 with the error in the body.
    Status,
}

/// Selectable patch strategies.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MutationStrategy {
    /// Inject a GPU limit into the target container.
    #[default]
    GpuLimit,
    /// Admit every pod unchanged.
    AllowAll,
}

impl MutationStrategy {
    /// Construct the strategy this variant names.
    pub fn mutator(self) -> Box<dyn Mutate> {
        match self {
            MutationStrategy::GpuLimit => Box::new(GpuLimitMutator::default()),
            MutationStrategy::AllowAll => Box::new(AllowAllMutator),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["gpu-admission-webhook"]).unwrap();
        assert_eq!(config.port, 443);
        assert_eq!(
            config.tls_cert_file,
            PathBuf::from("/etc/webhook/certs/cert.pem")
        );
        assert_eq!(
            config.tls_key_file,
            PathBuf::from("/etc/webhook/certs/key.pem")
        );
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.shutdown_grace_secs, 30);
        assert_eq!(config.decode_failure_policy, DecodeFailurePolicy::Review);
        assert_eq!(config.mutation, MutationStrategy::GpuLimit);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "gpu-admission-webhook",
            "--port",
            "8443",
            "--tlsCertFile",
            "/certs/tls.crt",
            "--tlsKeyFile",
            "/certs/tls.key",
            "--shutdown-grace-secs",
            "5",
            "--decode-failure-policy",
            "status",
            "--mutation",
            "allow-all",
        ])
        .unwrap();
        assert_eq!(config.port, 8443);
        assert_eq!(config.tls_cert_file, PathBuf::from("/certs/tls.crt"));
        assert_eq!(config.decode_failure_policy, DecodeFailurePolicy::Status);
        assert_eq!(config.mutation, MutationStrategy::AllowAll);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = Config::try_parse_from([
            "gpu-admission-webhook",
            "--decode-failure-policy",
            "crash",
        ]);
        assert!(result.is_err());
    }
}
