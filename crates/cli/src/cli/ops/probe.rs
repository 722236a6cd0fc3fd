use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use common::crypto::DerivationError;
use common::liveness::{ProbeKind, ProbeTarget, Prober, Response};
use common::path::DerivationPath;
use common::transport::TcpTransport;
use keyring_cli::state::StateError;

/// Probe servers once and print a status table
#[derive(Args, Debug, Clone)]
pub struct Probe {
    /// Servers to probe (every server in the topology when empty)
    pub targets: Vec<DerivationPath>,

    /// ping, challenge or status
    #[arg(long, short, default_value = "ping")]
    pub kind: ProbeKind,

    /// Per-probe timeout, overriding the config
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error("no servers to probe")]
    NoTargets,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Probe {
    type Error = ProbeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let master = state.load_master()?;

        let paths = state.resolve_targets(&self.targets)?;
        if paths.is_empty() {
            return Err(ProbeError::NoTargets);
        }
        let targets = paths
            .iter()
            .map(|path| Ok(ProbeTarget::new(path.to_string(), master.public_key_for(path)?)))
            .collect::<Result<Vec<_>, DerivationError>>()?;

        let mut options = state.config.probe.options();
        options.kind = self.kind;
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }

        let prober = Prober::new(Arc::new(TcpTransport::new(state.address_book(&master)?)));
        let results = prober.bulk_check(&targets, &options).await;

        let alive = results.iter().filter(|r| r.success()).count();
        let mut output = format!("{:<32} {:<8} {:>10}  DETAIL\n", "SERVER", "STATUS", "LATENCY");
        for result in &results {
            let line = match &result.outcome {
                Ok(report) => format!(
                    "{:<32} {:<8} {:>8}ms  {}\n",
                    result.target.label,
                    "alive",
                    report.latency.as_millis(),
                    describe(&report.response, report.verified)
                ),
                Err(e) => format!("{:<32} {:<8} {:>10}  {}\n", result.target.label, "down", "-", e),
            };
            output.push_str(&line);
        }
        output.push_str(&format!("{}/{} alive", alive, results.len()));
        Ok(output)
    }
}

fn describe(response: &Response, verified: Option<bool>) -> String {
    match (response, verified) {
        (Response::StatusReport { uptime, version, .. }, _) => {
            format!("v{} up {:.0}s", version, uptime)
        }
        (_, Some(true)) => "signature verified".to_string(),
        (_, Some(false)) => "signature INVALID".to_string(),
        (other, None) => other.kind().to_string(),
    }
}
