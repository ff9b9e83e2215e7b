//! SUNNY sub-portfolio selection and time allocation.
//!
//! Every sub-portfolio of the candidate portfolio is scored against the
//! neighborhood, so the search is exponential in the portfolio size. This is
//! fine for the handful of solvers a portfolio usually has.

use crate::combinations;
use crate::knowledge_base::Entry;
use crate::logging;
use crate::schedule::{Schedule, Slot};

/// Portfolio size above which the exhaustive search is reported as slow.
const LARGE_PORTFOLIO: usize = 20;

/// Leftover time below this is rounding noise and is not scheduled.
const TIME_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct SelectionParams<'a> {
    pub portfolio: &'a [String],
    pub backup: &'a str,
    pub timeout: f64,
    pub min_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub sub_portfolio: Vec<String>,
    /// Sorted by the neighborhood time of each solver, fastest first.
    pub schedule: Schedule,
}

/// Per-solver statistics over the neighborhood.
#[derive(Debug, Clone)]
struct Stats {
    /// Per neighbor: solved (CSP, 0 or 1) or score (COP).
    credit: Vec<f64>,
    time: f64,
    area: f64,
}

impl Stats {
    fn total_credit(&self) -> f64 {
        self.credit.iter().sum()
    }
}

/// Quality of a candidate sub-portfolio. Higher `gain` is better, then lower
/// `time`, then lower `area`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    gain: f64,
    time: f64,
    area: f64,
}

impl Candidate {
    fn improves_on(&self, best: &Candidate) -> bool {
        self.gain > best.gain
            || (self.gain == best.gain && self.time < best.time)
            || (self.gain == best.gain && self.time == best.time && self.area < best.area)
    }
}

pub fn csp_schedule(neighbors: &[&Entry], params: &SelectionParams) -> Selection {
    let stats: Vec<Stats> = params
        .portfolio
        .iter()
        .map(|solver| {
            let mut stats = Stats {
                credit: Vec::with_capacity(neighbors.len()),
                time: 0.0,
                area: 0.0,
            };
            for entry in neighbors {
                // A solver missing from the row counts as a timeout.
                let time = entry
                    .outcome(solver)
                    .map_or(params.timeout, |outcome| outcome.time);
                stats.credit.push(if time < params.timeout { 1.0 } else { 0.0 });
                stats.time += time;
            }
            stats
        })
        .collect();

    select(neighbors.len(), &stats, params, false)
}

pub fn cop_schedule(neighbors: &[&Entry], params: &SelectionParams) -> Selection {
    let stats: Vec<Stats> = params
        .portfolio
        .iter()
        .map(|solver| {
            let mut stats = Stats {
                credit: Vec::with_capacity(neighbors.len()),
                time: 0.0,
                area: 0.0,
            };
            for entry in neighbors {
                match entry.outcome(solver) {
                    Some(outcome) => {
                        stats.credit.push(outcome.score.unwrap_or(0.0));
                        stats.time += outcome.time;
                        stats.area += outcome.area.unwrap_or(0.0);
                    }
                    None => {
                        stats.credit.push(0.0);
                        stats.time += params.timeout;
                    }
                }
            }
            stats
        })
        .collect();

    select(neighbors.len(), &stats, params, true)
}

fn evaluate(subset: &[usize], stats: &[Stats], k: usize, use_area: bool) -> Candidate {
    // CSP coverage is the size of the union, COP score is the virtual best;
    // with 0/1 credits both are the per-neighbor maximum.
    let gain = (0..k)
        .map(|h| {
            subset
                .iter()
                .map(|&s| stats[s].credit[h])
                .fold(0.0, f64::max)
        })
        .sum();
    Candidate {
        gain,
        time: subset.iter().map(|&s| stats[s].time).sum(),
        area: if use_area {
            subset.iter().map(|&s| stats[s].area).sum()
        } else {
            0.0
        },
    }
}

fn select(k: usize, stats: &[Stats], params: &SelectionParams, use_area: bool) -> Selection {
    let m = params.portfolio.len();
    let timeout = params.timeout;

    if k == 0 || m == 0 {
        logging::warning!("empty neighborhood or portfolio, running only the backup solver");
        return Selection {
            sub_portfolio: Vec::new(),
            schedule: vec![Slot::new(params.backup, timeout)],
        };
    }
    if m > LARGE_PORTFOLIO {
        logging::warning!("searching all 2^{m} sub-portfolios of a portfolio of {m} solvers");
    }

    let indices: Vec<usize> = (0..m).collect();
    let mut best_subset: Vec<usize> = Vec::new();
    let mut best = Candidate {
        gain: 0.0,
        time: f64::INFINITY,
        area: f64::INFINITY,
    };
    for size in params.min_size.clamp(1, m)..=m {
        for subset in combinations::subsets(size, &indices) {
            let candidate = evaluate(&subset, stats, k, use_area);
            if candidate.improves_on(&best) {
                best = candidate;
                best_subset = subset;
            }
        }
    }

    // Neighbors no member handles still count in the denominator.
    let n = best_subset
        .iter()
        .map(|&s| stats[s].total_credit())
        .sum::<f64>()
        + (k as f64 - best.gain);

    let mut schedule: Schedule = Vec::new();
    for &s in &best_subset {
        let ns = stats[s].total_credit();
        if ns == 0.0 || (timeout / n * ns).round() == 0.0 {
            continue;
        }
        schedule.push(Slot::new(params.portfolio[s].clone(), timeout / n * ns));
    }

    let total: f64 = schedule.iter().map(|slot| slot.seconds).sum();
    let leftover = timeout - total;
    if leftover > TIME_TOLERANCE {
        match schedule.iter_mut().find(|slot| slot.solver == params.backup) {
            Some(slot) => slot.seconds += leftover,
            None => schedule.push(Slot::new(params.backup, leftover)),
        }
    }

    let neighborhood_time = |solver: &str| {
        params
            .portfolio
            .iter()
            .position(|name| name == solver)
            .map_or(f64::INFINITY, |s| stats[s].time)
    };
    schedule.sort_by(|a, b| neighborhood_time(&a.solver).total_cmp(&neighborhood_time(&b.solver)));

    Selection {
        sub_portfolio: best_subset
            .into_iter()
            .map(|s| params.portfolio[s].clone())
            .collect(),
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::KnowledgeBase;
    use crate::knowledge_base::LoadOptions;
    use crate::schedule::total_seconds;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn kb(rows: &str) -> KnowledgeBase {
        KnowledgeBase::parse(rows, LoadOptions::default()).unwrap()
    }

    const ABC: &str = "\
i1|[0.0]|{\"A\": {\"time\": 3.0}, \"B\": {\"time\": 30.0}, \"C\": {\"time\": 30.0}}
i2|[0.1]|{\"A\": {\"time\": 4.0}, \"B\": {\"time\": 5.0}, \"C\": {\"time\": 30.0}}
i3|[0.2]|{\"A\": {\"time\": 30.0}, \"B\": {\"time\": 6.0}, \"C\": {\"time\": 30.0}}
";

    #[test]
    fn test_csp_picks_covering_pair() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A", "B", "C"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "C",
            timeout: 30.0,
            min_size: 1,
        };
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.sub_portfolio, names(&["A", "B"]));
        assert_eq!(
            selection.schedule,
            vec![Slot::new("A", 15.0), Slot::new("B", 15.0)]
        );
    }

    #[test]
    fn test_csp_leftover_goes_to_backup() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries()[..1].iter().collect();
        let portfolio = names(&["A", "B", "C"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "C",
            timeout: 30.0,
            min_size: 1,
        };
        // Only A solves i1: n = 1 + 0, A gets everything.
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.schedule, vec![Slot::new("A", 30.0)]);

        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A", "C"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "C",
            ..params
        };
        // A solves 2 of 3: n = 2 + 1, A gets 20s and the backup the rest.
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.sub_portfolio, names(&["A"]));
        assert_eq!(
            selection.schedule,
            vec![Slot::new("A", 20.0), Slot::new("C", 10.0)]
        );
    }

    #[test]
    fn test_backup_outside_portfolio_runs_last() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "Z",
            timeout: 30.0,
            min_size: 1,
        };
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(
            selection.schedule,
            vec![Slot::new("A", 20.0), Slot::new("Z", 10.0)]
        );
    }

    #[test]
    fn test_min_size_forces_larger_portfolio() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A", "B", "C"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "A",
            timeout: 30.0,
            min_size: 3,
        };
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.sub_portfolio, names(&["A", "B", "C"]));
        // C solves nothing and gets no slot.
        assert!(selection.schedule.iter().all(|slot| slot.solver != "C"));
    }

    #[test]
    fn test_empty_neighborhood_runs_backup() {
        let portfolio = names(&["A", "B"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "B",
            timeout: 12.0,
            min_size: 1,
        };
        let selection = csp_schedule(&[], &params);
        assert_eq!(selection.schedule, vec![Slot::new("B", 12.0)]);
    }

    #[test]
    fn test_missing_solver_counts_as_failure() {
        let kb = kb("i1|[0.0]|{\"A\": {\"time\": 2.0}}\n");
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["B", "A"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "B",
            timeout: 10.0,
            min_size: 1,
        };
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.sub_portfolio, names(&["A"]));
        assert_eq!(selection.schedule, vec![Slot::new("A", 10.0)]);
    }

    const COP: &str = "\
i1|[0.0]|{\"A\": {\"time\": 10.0, \"score\": 1.0, \"area\": 2.0}, \"B\": {\"time\": 20.0, \"score\": 0.5, \"area\": 5.0}, \"C\": {\"time\": 10.0, \"score\": 1.0, \"area\": 1.0}}
i2|[0.1]|{\"A\": {\"time\": 20.0, \"score\": 0.25, \"area\": 6.0}, \"B\": {\"time\": 5.0, \"score\": 1.0, \"area\": 1.0}, \"C\": {\"time\": 20.0, \"score\": 0.25, \"area\": 3.0}}
";

    #[test]
    fn test_cop_virtual_best_and_area_tie_break() {
        let kb = kb(COP);
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A", "B", "C"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "A",
            timeout: 20.0,
            min_size: 1,
        };
        let selection = cop_schedule(&neighbors, &params);
        // {A,B} and {B,C} both reach score 2 in 55s, {B,C} has less area.
        assert_eq!(selection.sub_portfolio, names(&["B", "C"]));
        // n = 1.5 + 1.25 + 0 = 2.75
        let total = total_seconds(&selection.schedule);
        assert!((total - 20.0).abs() < 1e-9);
        assert_eq!(selection.schedule[0].solver, "B");
        assert!((selection.schedule[0].seconds - 20.0 / 2.75 * 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_timeout_has_no_empty_backup_slot() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries()[..1].iter().collect();
        let portfolio = names(&["A", "B"]);
        let params = SelectionParams {
            portfolio: &portfolio,
            backup: "B",
            timeout: 10.4,
            min_size: 1,
        };
        let selection = csp_schedule(&neighbors, &params);
        assert_eq!(selection.schedule, vec![Slot::new("A", 10.4)]);
    }

    #[test]
    fn test_allocations_are_positive_and_bounded() {
        let kb = kb(ABC);
        let neighbors: Vec<&Entry> = kb.entries().iter().collect();
        let portfolio = names(&["A", "B", "C"]);
        for timeout in [1.0, 7.0, 10.4, 29.7, 30.0, 31.0, 100.0] {
            let params = SelectionParams {
                portfolio: &portfolio,
                backup: "C",
                timeout,
                min_size: 1,
            };
            let selection = csp_schedule(&neighbors, &params);
            assert!(selection.schedule.iter().all(|slot| slot.seconds > 0.0));
            assert!(total_seconds(&selection.schedule) <= timeout + 1e-9);
        }
    }
}
