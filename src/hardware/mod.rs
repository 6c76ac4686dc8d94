//! Reader abstraction.
//!
//! - `capabilities`: the [`ReaderDevice`] trait the engine drives
//! - `operations`: tag memory operations and their results
//! - `mock`: a software reader used by tests and by `sim` addresses

pub mod capabilities;
pub mod mock;
pub mod operations;

pub use capabilities::{DeviceEvent, ReaderDevice, RfSettings};
pub use mock::{
    ChannelThreshold, HumiditySensor, SimulatedReader, SimulatedTag, SimulationConfig,
};
pub use operations::{
    Execution, MemoryBank, OpId, OpKind, OpPayload, OpResult, OperationSequence, TagOperation,
};

use crate::error::{ProbeError, ProbeResult};
use std::sync::Arc;

/// Resolve a reader address to a device.
///
/// Addresses beginning with `sim` (e.g. `sim`, `sim://bench`) resolve to a
/// [`SimulatedReader`] built from `simulation`. No network transport ships with
/// this crate, so any other address is a connection failure.
pub fn open_reader(
    address: &str,
    simulation: &SimulationConfig,
) -> ProbeResult<Arc<dyn ReaderDevice>> {
    if address.trim().to_ascii_lowercase().starts_with("sim") {
        tracing::info!(address, "Using simulated reader");
        Ok(Arc::new(SimulatedReader::new(simulation.clone())))
    } else {
        Err(ProbeError::connection(format!(
            "no transport available for '{address}' (use a sim:// address)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_addresses_resolve() {
        let simulation = SimulationConfig::default();
        assert!(open_reader("sim", &simulation).is_ok());
        assert!(open_reader("SIM://bench", &simulation).is_ok());
    }

    #[test]
    fn network_addresses_are_fatal() {
        let err = open_reader("169.254.116.164", &SimulationConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ProbeError::Connection(_)));
    }
}
