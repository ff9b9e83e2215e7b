//! Sequential and parallel solver schedules.

use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub solver: String,
    pub seconds: f64,
}

impl Slot {
    pub fn new(solver: impl Into<String>, seconds: f64) -> Self {
        Self {
            solver: solver.into(),
            seconds,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:.2})", self.solver, self.seconds)
    }
}

pub type Schedule = Vec<Slot>;

pub fn total_seconds(schedule: &[Slot]) -> f64 {
    schedule.iter().map(|slot| slot.seconds).sum()
}

/// Concatenates `first` and `second`, merging adjacent slots of the same solver.
pub fn merge(first: &[Slot], second: &[Slot]) -> Schedule {
    first
        .iter()
        .chain(second)
        .cloned()
        .coalesce(|a, b| {
            if a.solver == b.solver {
                Ok(Slot::new(a.solver, a.seconds + b.seconds))
            } else {
                Err((a, b))
            }
        })
        .collect()
}

/// Output of the predictor: a warm-start part run verbatim followed by the
/// predicted part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub static_slots: Schedule,
    pub dynamic: Schedule,
}

impl Prediction {
    pub fn sequential(&self) -> Schedule {
        merge(&self.static_slots, &self.dynamic)
    }
}

/// A schedule projected onto a fixed number of cores.
///
/// `dedicated` solvers each own a core for the whole run. `shared` is the
/// time-sliced queue of the remaining core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParallelSchedule {
    pub dedicated: Vec<String>,
    pub shared: Schedule,
}

impl ParallelSchedule {
    pub fn is_empty(&self) -> bool {
        self.dedicated.is_empty() && self.shared.iter().all(|slot| slot.seconds <= 0.0)
    }
}

impl fmt::Display for ParallelSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dedicated [{}], shared [{}]",
            self.dedicated.iter().join(", "),
            self.shared.iter().join(", ")
        )
    }
}

/// Spreads `prediction` over `cores` cores within `timeout` seconds.
///
/// The `cores - 1` longest predicted slots get a dedicated core. The other
/// predicted slots are rescaled to share what is left of `timeout` on the
/// last core after the static slots. A static slot of a dedicated solver is
/// kept with a zero allocation.
pub fn parallelize(prediction: &Prediction, cores: usize, timeout: f64) -> ParallelSchedule {
    let n_dedicated = cores.saturating_sub(1).min(prediction.dynamic.len());

    let dedicated: Vec<String> = prediction
        .dynamic
        .iter()
        .sorted_by(|a, b| b.seconds.total_cmp(&a.seconds))
        .take(n_dedicated)
        .map(|slot| slot.solver.clone())
        .collect();

    let static_slots: Schedule = prediction
        .static_slots
        .iter()
        .map(|slot| {
            if dedicated.contains(&slot.solver) {
                Slot::new(slot.solver.clone(), 0.0)
            } else {
                slot.clone()
            }
        })
        .collect();
    let residual = (timeout - total_seconds(&static_slots)).max(0.0);

    let remaining: Schedule = prediction
        .dynamic
        .iter()
        .filter(|slot| !dedicated.contains(&slot.solver))
        .cloned()
        .collect();
    let seq_time = total_seconds(&remaining);
    let rescaled: Schedule = remaining
        .into_iter()
        .map(|slot| {
            let seconds = if seq_time > 0.0 {
                slot.seconds * residual / seq_time
            } else {
                0.0
            };
            Slot::new(slot.solver, seconds)
        })
        .collect();

    ParallelSchedule {
        dedicated,
        shared: merge(&static_slots, &rescaled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(list: &[(&str, f64)]) -> Schedule {
        list.iter().map(|(s, t)| Slot::new(*s, *t)).collect()
    }

    #[test]
    fn test_merge_adjacent() {
        let merged = merge(&slots(&[("a", 3.0), ("b", 2.0)]), &slots(&[("b", 5.0), ("c", 1.0)]));
        assert_eq!(merged, slots(&[("a", 3.0), ("b", 7.0), ("c", 1.0)]));
    }

    #[test]
    fn test_merge_keeps_non_adjacent_repeats() {
        let merged = merge(&slots(&[("a", 1.0), ("b", 1.0)]), &slots(&[("a", 1.0)]));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_single_core_keeps_sequential_schedule() {
        let prediction = Prediction {
            static_slots: slots(&[("s", 5.0)]),
            dynamic: slots(&[("a", 10.0), ("b", 15.0)]),
        };
        let par = parallelize(&prediction, 1, 30.0);
        assert!(par.dedicated.is_empty());
        assert_eq!(par.shared, prediction.sequential());
    }

    #[test]
    fn test_dedicated_count_and_conservation() {
        let dynamic = slots(&[("a", 4.0), ("b", 12.0), ("c", 6.0), ("d", 8.0)]);
        let prediction = Prediction {
            static_slots: Vec::new(),
            dynamic,
        };
        for cores in 1..=6 {
            let par = parallelize(&prediction, cores, 30.0);
            assert_eq!(par.dedicated.len(), (cores - 1).min(4));
            if par.dedicated.len() < 4 {
                assert!((total_seconds(&par.shared) - 30.0).abs() < 1e-9);
            }
        }
        let par = parallelize(&prediction, 3, 30.0);
        assert_eq!(par.dedicated, vec!["b".to_owned(), "d".to_owned()]);
        assert_eq!(par.shared, slots(&[("a", 12.0), ("c", 18.0)]));
    }

    #[test]
    fn test_ties_keep_schedule_order() {
        let prediction = Prediction {
            static_slots: Vec::new(),
            dynamic: slots(&[("x", 10.0), ("y", 10.0), ("z", 10.0)]),
        };
        let par = parallelize(&prediction, 2, 30.0);
        assert_eq!(par.dedicated, vec!["x".to_owned()]);
    }

    #[test]
    fn test_static_slot_of_dedicated_solver_gets_zero() {
        let prediction = Prediction {
            static_slots: slots(&[("b", 5.0), ("s", 5.0)]),
            dynamic: slots(&[("a", 5.0), ("b", 15.0)]),
        };
        let par = parallelize(&prediction, 2, 30.0);
        assert_eq!(par.dedicated, vec!["b".to_owned()]);
        assert_eq!(par.shared, slots(&[("b", 0.0), ("s", 5.0), ("a", 25.0)]));
        let residual = 30.0 - 5.0;
        let dynamic_part: f64 = par.shared[2..].iter().map(|s| s.seconds).sum();
        assert!((dynamic_part - residual).abs() < 1e-9);
    }

    #[test]
    fn test_all_dedicated_leaves_static_only() {
        let prediction = Prediction {
            static_slots: slots(&[("s", 3.0)]),
            dynamic: slots(&[("a", 20.0)]),
        };
        let par = parallelize(&prediction, 4, 30.0);
        assert_eq!(par.dedicated, vec!["a".to_owned()]);
        assert_eq!(par.shared, slots(&[("s", 3.0)]));
    }
}
