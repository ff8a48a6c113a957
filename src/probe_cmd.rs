//! Probe command: report which devices work on this machine.

use anyhow::{Context, Result};
use tracing::info_span;

use cadenza_knn::{DeviceKind, probe, select_backend};

use crate::cli::ProbeArgs;
use crate::config::CadenzaConfig;
use crate::convert;

/// Probes every compiled-in device kind, then runs the selector.
pub fn run(args: ProbeArgs) -> Result<()> {
    let _cmd = info_span!("probe").entered();
    let config = CadenzaConfig::load(args.config.as_deref())?;
    let knn = convert::build_knn_config(&config.search, &config.backend)?;

    for &kind in DeviceKind::all() {
        match probe(kind, &knn) {
            Ok(capability) => println!("{kind:<6} ok      {}", capability.name()),
            Err(e) => println!("{kind:<6} failed  {e}"),
        }
    }

    let selection = select_backend(&knn).context("backend selection failed")?;
    println!("selected backend: {}", selection.backend());
    Ok(())
}
