//! Event types for EarMix

use crate::ids::InstanceId;

/// Timing of one mixer iteration, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixTimingEvent {
    /// Drain, mix, meter and submit together
    pub total_time_us: u64,
    /// Time spent inside the locked mix pass
    pub mixing_time_us: u64,
    /// Time spent handing buffers to the sink
    pub submit_time_us: u64,
    /// Instances that contributed to this pass
    pub mixed_instances: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EarMixEvent {
    InstanceStarted { instance_id: InstanceId },
    InstanceCompleted { instance_id: InstanceId },
    InstanceStopped { instance_id: InstanceId },
    /// The sink ran dry on this channel since the previous iteration
    BufferUnderrun { channel: usize, count: usize },
    MixTiming(MixTimingEvent),
    EngineStarted,
    EngineStopped,
    EngineError { error: String },
}

impl EarMixEvent {
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::InstanceStarted { instance_id }
            | Self::InstanceCompleted { instance_id }
            | Self::InstanceStopped { instance_id } => Some(*instance_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::BufferUnderrun { .. } | Self::EngineError { .. })
    }

    pub fn is_instance_event(&self) -> bool {
        self.instance_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let done = EarMixEvent::InstanceCompleted {
            instance_id: InstanceId(3),
        };
        assert_eq!(done.instance_id(), Some(InstanceId(3)));
        assert!(done.is_instance_event());
        assert!(!done.is_error());

        let error = EarMixEvent::EngineError {
            error: "sink gone".into(),
        };
        assert!(error.is_error());
        assert_eq!(error.instance_id(), None);
    }
}
