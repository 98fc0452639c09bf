use super::StageId;
use crate::metrics::MetricsTracker;
use std::collections::BTreeMap;

/// Mutable state owned by one stage instance.
///
/// Definitions (markers, tiers, thresholds) are immutable and live on the
/// stage; everything that accumulates across calls lives here.
#[derive(Debug, Clone)]
pub struct StageState {
    id: StageId,
    metrics: MetricsTracker,
    channels: BTreeMap<String, StageId>,
}

impl StageState {
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            metrics: MetricsTracker::new(),
            channels: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MetricsTracker {
        &mut self.metrics
    }

    /// Links a named channel to another stage. Re-connecting replaces the target.
    pub fn connect(&mut self, channel: impl Into<String>, target: StageId) {
        self.channels.insert(channel.into(), target);
    }

    pub fn channel(&self, channel: &str) -> Option<StageId> {
        self.channels.get(channel).copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, StageId)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_resolve_by_name() {
        let mut state = StageState::new(StageId::new(4, "compassion"));
        state.connect("limits", StageId::new(5, "boundaries"));
        assert_eq!(state.channel("limits"), Some(StageId::new(5, "boundaries")));
        assert_eq!(state.channel("missing"), None);
        assert_eq!(state.metrics().activations(), 0);
        assert_eq!(state.channels().count(), 1);
    }
}
