//! Checks run once before the loop starts.

use crate::fault::{Fault, FaultHandler, SELF_TEST};
use tracing::info;

/// Shows the indicator works and reports environment problems.
///
/// Nothing found here stops the agent; problems are raised as Short faults.
pub async fn run_checks(faults: &mut FaultHandler, endpoint: Option<(String, u16)>) {
    faults.pulse(SELF_TEST).await;

    if !cfg!(target_os = "linux") {
        faults
            .raise(Fault::short(format!(
                "Running on {}, hardware sensors need Linux",
                std::env::consts::OS
            )))
            .await;
    }

    if let Some((host, port)) = endpoint {
        let resolved = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map(|addrs| addrs.count());
        match resolved {
            Ok(count) if count > 0 => {
                info!("Backend host {}:{} resolves to {} addresses", host, port, count);
            }
            Ok(_) => {
                faults
                    .raise(Fault::short(format!(
                        "Backend host {} resolved to no addresses",
                        host
                    )))
                    .await;
            }
            Err(e) => {
                faults
                    .raise(Fault::short(format!(
                        "Internet not available or host {} is down: {}",
                        host, e
                    )))
                    .await;
            }
        }
    }
}
