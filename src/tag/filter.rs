//! Observation filter.

use super::epc::TargetSpec;
use super::observation::TagObservation;

/// Whether `observation` belongs to `target`.
///
/// Side-effect free. The observation's EPC is already canonical, so this is a
/// plain comparison against the (equally canonical) target.
pub fn accept(observation: &TagObservation, target: &TargetSpec) -> bool {
    target.matches(&observation.epc)
}

/// Filter bound to a session's target.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    target: TargetSpec,
}

impl TagFilter {
    /// Create a filter for `target`.
    pub fn new(target: TargetSpec) -> Self {
        Self { target }
    }

    /// The target this filter was created with.
    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    /// See [`accept`].
    pub fn accept(&self, observation: &TagObservation) -> bool {
        accept(observation, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::epc::Epc;

    fn observation(epc: &str) -> TagObservation {
        TagObservation {
            epc: Epc::parse(epc).unwrap(),
            antenna_id: 1,
            rssi_dbm: -60.0,
            timestamp_ms: 0,
            channel_mhz: None,
            xpc_w2: None,
        }
    }

    #[test]
    fn match_all_accepts_everything() {
        let filter = TagFilter::default();
        assert!(filter.accept(&observation("AB12")));
        assert!(filter.accept(&observation("000000A93C0000000003000E00000DAD")));
    }

    #[test]
    fn exact_target_is_case_and_whitespace_insensitive() {
        let filter = TagFilter::new(TargetSpec::exact(Some("ab 12")).unwrap());
        assert!(filter.accept(&observation("AB12")));
        assert!(filter.accept(&observation("ab12")));
        assert!(!filter.accept(&observation("AB13")));
        assert!(!filter.accept(&observation("AB120")));
    }
}
