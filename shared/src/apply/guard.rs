//! Reentrancy guard suppressing the echo loop between "apply a remote
//! change" and "detect a local change, send it as a new request".
//!
//! Every engine write the core performs is wrapped in a scoped guard for
//! the feature being written. The event-listener shims that watch the
//! traffic engine check [`local_apply_active`] and no-op while the guard
//! for their feature is held on the same thread.

use std::cell::RefCell;

use crate::features::FeatureKind;

thread_local! {
    static DEPTHS: RefCell<[u32; FeatureKind::COUNT]> = const { RefCell::new([0; FeatureKind::COUNT]) };
}

/// Release-on-drop token returned by [`LocalApplyGuard::scoped_acquire`].
pub struct LocalApplyGuard {
    kind: FeatureKind,
}

impl LocalApplyGuard {
    /// Enter the local-apply scope for one feature on this thread.
    pub fn scoped_acquire(kind: FeatureKind) -> Self {
        DEPTHS.with(|depths| {
            depths.borrow_mut()[kind.index()] += 1;
        });
        Self { kind }
    }
}

impl Drop for LocalApplyGuard {
    fn drop(&mut self) {
        DEPTHS.with(|depths| {
            let mut depths = depths.borrow_mut();
            let depth = &mut depths[self.kind.index()];
            *depth = depth.saturating_sub(1);
        });
    }
}

/// Is a local apply for this feature in progress on the current thread?
pub fn local_apply_active(kind: FeatureKind) -> bool {
    DEPTHS.with(|depths| depths.borrow()[kind.index()] > 0)
}
