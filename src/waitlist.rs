//! Imports parked on a dependency whose commit is still being resolved.

use std::sync::{Mutex, PoisonError};

use crate::types::ImportSpec;

/// Specs waiting on one dependency. Cleared exactly once, after which
/// appends are refused and callers fall back to the cached resolution.
#[derive(Debug, Default)]
pub struct SpecWaitingList {
    /// Parked specs and whether the list has been released.
    state: Mutex<WaitingState>,
}

/// Lock-protected contents of a waiting list.
#[derive(Debug, Default)]
struct WaitingState {
    /// Set by the one call to `clear` that releases the specs.
    cleared: bool,
    /// Specs parked so far.
    specs: Vec<ImportSpec>,
}

impl SpecWaitingList {
    /// Park `spec`. Hands it back if the list was already cleared.
    ///
    /// # Errors
    ///
    /// Returns the spec unchanged when the list no longer accepts entries.
    pub fn add(&self, spec: ImportSpec) -> Result<(), ImportSpec> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cleared {
            return Err(spec);
        }
        state.specs.push(spec);
        return Ok(());
    }

    /// Release every parked spec. Only the first call gets them.
    pub fn clear(&self) -> Option<Vec<ImportSpec>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cleared {
            return None;
        }
        state.cleared = true;
        return Some(std::mem::take(&mut state.specs));
    }

    /// A list holding `first`.
    pub fn new(first: ImportSpec) -> Self {
        return Self {
            state: Mutex::new(WaitingState {
                cleared: false,
                specs: vec![first],
            }),
        };
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn spec(n: usize) -> ImportSpec {
        return ImportSpec {
            file: PathBuf::from(format!("file{n}.go")),
            import_path: "github.com/a/b".to_string(),
            range: n..n.saturating_add(1),
        };
    }

    #[test]
    fn clear_releases_everything_once() {
        let list = SpecWaitingList::new(spec(0));
        list.add(spec(1)).unwrap();
        list.add(spec(2)).unwrap();

        let released = list.clear().unwrap();
        assert_eq!(released, [spec(0), spec(1), spec(2)]);
        assert_eq!(list.clear(), None);
        assert_eq!(list.add(spec(4)), Err(spec(4)));
    }

    #[test]
    fn late_additions_are_refused() {
        let list = SpecWaitingList::default();
        assert_eq!(list.clear(), Some(Vec::new()));
        assert_eq!(list.add(spec(3)), Err(spec(3)));
    }

    #[test]
    fn concurrent_adds_all_land() {
        let list = SpecWaitingList::default();
        std::thread::scope(|scope| {
            for n in 0..8 {
                let list = &list;
                scope.spawn(move || {
                    list.add(spec(n)).unwrap();
                });
            }
        });
        assert_eq!(list.clear().map(|specs| return specs.len()), Some(8));
    }
}
