//! Scoped scheduling-priority elevation.

use crate::platform::Platform;

/// Raises the calling thread's priority and restores it on drop.
///
/// Elevation only happens when `level` is strictly higher priority (a lower
/// nice value) than the current one. If the OS refuses, the guard does
/// nothing and nothing is restored.
pub(crate) struct PriorityGuard<'a, P: Platform + ?Sized> {
    platform: &'a P,
    saved: Option<i32>,
}

impl<'a, P: Platform + ?Sized> PriorityGuard<'a, P> {
    pub(crate) fn raise(platform: &'a P, level: i32) -> Self {
        let saved = match platform.priority() {
            Ok(current) if current > level => match platform.set_priority(level) {
                Ok(()) => Some(current),
                Err(err) => {
                    log::debug!("priority boost to {} refused: {}", level, err);
                    None
                }
            },
            Ok(_) => None,
            Err(err) => {
                log::debug!("cannot read thread priority: {}", err);
                None
            }
        };
        PriorityGuard { platform, saved }
    }

    /// Whether the priority was actually changed.
    #[cfg(test)]
    pub(crate) fn is_raised(&self) -> bool {
        self.saved.is_some()
    }
}

impl<P: Platform + ?Sized> Drop for PriorityGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(err) = self.platform.set_priority(saved) {
                log::warn!("failed to restore thread priority {}: {}", saved, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recording;

    #[test]
    fn raises_then_restores() {
        let platform = Recording::new();
        {
            let guard = PriorityGuard::raise(&platform, -10);
            assert!(guard.is_raised());
            assert_eq!(platform.current_priority(), -10);
        }
        assert_eq!(platform.current_priority(), 0);
        assert_eq!(platform.priority_changes(), 2);
    }

    #[test]
    fn leaves_higher_priority_alone() {
        let platform = Recording::new();
        platform.set_priority(-15).unwrap();
        let before = platform.priority_changes();
        {
            let guard = PriorityGuard::raise(&platform, -10);
            assert!(!guard.is_raised());
        }
        assert_eq!(platform.current_priority(), -15);
        assert_eq!(platform.priority_changes(), before);
    }

    #[test]
    fn refused_boost_is_a_no_op() {
        let platform = Recording::new().refuse_boost();
        {
            let guard = PriorityGuard::raise(&platform, -10);
            assert!(!guard.is_raised());
        }
        assert_eq!(platform.current_priority(), 0);
        assert_eq!(platform.priority_changes(), 0);
    }

    #[test]
    fn restores_during_unwind() {
        let platform = Recording::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = PriorityGuard::raise(&platform, -5);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(platform.current_priority(), 0);
    }
}
