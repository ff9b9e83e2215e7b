//! State shared by everything taking part in one solving run.

use crate::problem::{ObjectiveType, ObjectiveValue};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Why a solver's answer ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proof {
    /// A solution of a satisfaction problem.
    Satisfied,
    Optimal,
    Unsatisfiable,
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub solver: String,
    pub proof: Proof,
}

#[derive(Debug, Default)]
struct Shared {
    best: Option<ObjectiveValue>,
    winner: Option<Winner>,
}

/// Best objective bound and first-success winner of a run.
///
/// The bound only ever improves, and is frozen once a winner is declared.
#[derive(Debug)]
pub struct RunContext {
    goal: ObjectiveType,
    shared: Mutex<Shared>,
    token: CancellationToken,
}

impl RunContext {
    pub fn new(goal: ObjectiveType, token: CancellationToken) -> Self {
        Self {
            goal,
            shared: Mutex::new(Shared::default()),
            token,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn goal(&self) -> ObjectiveType {
        self.goal
    }

    /// Replaces the best bound with `value` if it is strictly better.
    /// Returns whether it was accepted.
    pub fn offer_bound(&self, value: ObjectiveValue) -> bool {
        if !self.goal.is_optimization() {
            return false;
        }
        let mut shared = self.lock();
        if shared.winner.is_some() || !self.goal.is_better(shared.best, value) {
            return false;
        }
        shared.best = Some(value);
        true
    }

    pub fn best_bound(&self) -> Option<ObjectiveValue> {
        self.lock().best
    }

    /// Records `solver` as the winner unless one exists already, and cancels
    /// the run. Returns whether this call won.
    pub fn declare_winner(&self, solver: &str, proof: Proof) -> bool {
        let won = {
            let mut shared = self.lock();
            if shared.winner.is_some() {
                false
            } else {
                shared.winner = Some(Winner {
                    solver: solver.to_owned(),
                    proof,
                });
                true
            }
        };
        if won {
            self.token.cancel();
        }
        won
    }

    pub fn winner(&self) -> Option<Winner> {
        self.lock().winner.clone()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
