//! Greedy assignment of devices to logical monitors.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::{
    candidates::{Candidates, MatchKind},
    device::MappedDevice,
    mapper::{InputEntry, OutputEntry},
    monitor::{LogicalMonitorId, MonitorLayout},
};

/// How devices with the same best match quality are ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Processing order is kept among equals.
    #[default]
    Stable,
    /// Each new device goes in front of the first queued device that is not
    /// strictly better, so the latest of several equals is served first.
    NewestFirst,
}

#[derive(Debug)]
pub(crate) struct PendingAssignment {
    pub input: usize,
    pub candidates: Candidates,
}

impl PendingAssignment {
    fn rank(&self) -> usize {
        self.candidates
            .best()
            .map(MatchKind::index)
            .unwrap_or(MatchKind::COUNT)
    }
}

#[derive(Debug)]
pub(crate) struct AssignmentQueue {
    tie_break: TieBreak,
    pending: Vec<PendingAssignment>,
}

impl AssignmentQueue {
    pub fn new(tie_break: TieBreak) -> Self {
        Self {
            tie_break,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, input: usize, candidates: Candidates) {
        let item = PendingAssignment { input, candidates };
        match self.tie_break {
            TieBreak::Stable => self.pending.push(item),
            TieBreak::NewestFirst => {
                let rank = item.rank();
                let pos = self
                    .pending
                    .iter()
                    .position(|queued| queued.rank() >= rank)
                    .unwrap_or(self.pending.len());
                self.pending.insert(pos, item);
            }
        }
    }

    pub fn into_ordered(mut self) -> Vec<PendingAssignment> {
        if self.tie_break == TieBreak::Stable {
            self.pending.sort_by_key(PendingAssignment::rank);
        }
        self.pending
    }
}

/// Decide which input claims which output.
///
/// Inputs are expected to be unbound. Claims are only ever added: a device
/// that finds every candidate taken by a device of its own class stays
/// unbound.
pub(crate) fn apply<D: MappedDevice>(
    queue: AssignmentQueue,
    inputs: &mut [InputEntry<D>],
    outputs: &mut HashMap<LogicalMonitorId, OutputEntry<D>>,
    layout: &MonitorLayout,
) {
    for pending in queue.into_ordered() {
        let input = &mut inputs[pending.input];
        let caps = input.device.capabilities();

        for (kind, monitor_id) in pending.candidates.iter() {
            let Some(logical_monitor) = layout
                .monitor(monitor_id)
                .and_then(|monitor| monitor.logical_monitor)
            else {
                continue;
            };
            let Some(output) = outputs.get_mut(&logical_monitor) else {
                continue;
            };

            if output.attached_caps.intersects(caps) {
                trace!(
                    device = %input.device.name(),
                    ?kind,
                    %logical_monitor,
                    "output already has a device of this class"
                );
                continue;
            }

            debug!(
                device = %input.device.name(),
                ?kind,
                %monitor_id,
                %logical_monitor,
                "claiming output"
            );
            output.add_input(input, monitor_id);
            break;
        }
    }
}
