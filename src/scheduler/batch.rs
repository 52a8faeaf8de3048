//! Visible-first, round-robin batch selection

use std::collections::HashSet;

use crate::types::identifiers::InstanceId;
use crate::types::record::RefreshRequest;

/// Instances one batch refreshes, in refresh order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Rows currently shown, top to bottom
    pub visible: Vec<InstanceId>,
    /// Off-screen instances picked by the round-robin cursor
    pub round_robin: Vec<InstanceId>,
    /// Cursor position for the next batch
    pub next_cursor: usize,
}

impl BatchPlan {
    /// Every planned id, visible ones first
    pub fn ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.visible.iter().chain(self.round_robin.iter())
    }

    /// Number of planned ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len() + self.round_robin.len()
    }

    /// Whether the batch has nothing to refresh
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plan one batch over the registry `order`
///
/// Visible ids come from the request; when it lists none, the viewport
/// window over `order` is used instead. Up to `batch_size` other instances
/// follow, scanning forward from `cursor` and wrapping around, so that
/// with nothing visible every instance is covered within
/// `ceil(len / batch_size)` consecutive batches.
#[must_use]
pub fn select_batch(
    order: &[InstanceId],
    request: &RefreshRequest,
    batch_size: usize,
    cursor: usize,
) -> BatchPlan {
    let known: HashSet<&InstanceId> = order.iter().collect();
    let mut seen: HashSet<&InstanceId> = HashSet::new();

    let visible: Vec<InstanceId> = if request.visible.is_empty() {
        order
            .iter()
            .skip(request.viewport_offset)
            .take(request.viewport_size)
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    } else {
        request
            .visible
            .iter()
            .filter(|id| known.contains(id) && seen.insert(*id))
            .cloned()
            .collect()
    };

    let len = order.len();
    if len == 0 {
        return BatchPlan {
            visible,
            round_robin: Vec::new(),
            next_cursor: 0,
        };
    }

    let start = cursor % len;
    let mut round_robin = Vec::with_capacity(batch_size.min(len));
    let mut next_cursor = start;
    for step in 0..len {
        if round_robin.len() >= batch_size {
            break;
        }
        let pos = (start + step) % len;
        next_cursor = (pos + 1) % len;
        let id = &order[pos];
        if seen.insert(id) {
            round_robin.push(id.clone());
        }
    }

    BatchPlan {
        visible,
        round_robin,
        next_cursor,
    }
}
