pub mod neighbors;
pub mod selector;

use crate::knowledge_base::limits::{self, Limits, NormalizeOptions};
use crate::knowledge_base::{self, KnowledgeBase};
use crate::logging;
use crate::problem::ObjectiveType;
use crate::schedule::{Prediction, Schedule, total_seconds};
use selector::{Selection, SelectionParams};
use std::sync::Arc;

pub type Features = Vec<f64>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    KnowledgeBase(#[from] knowledge_base::Error),
    #[error(transparent)]
    Limits(#[from] limits::Error),
    #[error("static schedule uses {used:.2}s of a {timeout:.2}s timeout")]
    StaticScheduleTooLong { used: f64, timeout: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Ai {
    fn schedule(&mut self, features: &Features, goal: ObjectiveType) -> Result<Prediction>;
}

/// Parameters of the SUNNY prediction.
#[derive(Debug, Clone)]
pub struct SunnyParams {
    pub portfolio: Vec<String>,
    pub backup: String,
    pub timeout: f64,
    /// Neighborhood size, defaults to the square root of the knowledge base size.
    pub k: Option<usize>,
    pub min_size: usize,
}

pub struct SunnyAi {
    kb: Arc<KnowledgeBase>,
    limits: Limits,
    params: SunnyParams,
    static_slots: Schedule,
}

impl SunnyAi {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        limits: Limits,
        params: SunnyParams,
        static_slots: Schedule,
    ) -> Self {
        Self {
            kb,
            limits,
            params,
            static_slots,
        }
    }

    pub fn k(&self) -> usize {
        self.params
            .k
            .unwrap_or_else(|| neighbors::default_k(self.kb.len()))
    }
}

impl Ai for SunnyAi {
    fn schedule(&mut self, features: &Features, goal: ObjectiveType) -> Result<Prediction> {
        let static_time = total_seconds(&self.static_slots);
        let timeout = self.params.timeout - static_time;
        if timeout < 0.0 {
            return Err(Error::StaticScheduleTooLong {
                used: static_time,
                timeout: self.params.timeout,
            });
        }

        let normalized = self
            .limits
            .normalize(features, NormalizeOptions::default())?;
        let k = self.k();
        let neighborhood = neighbors::find_neighbors(&self.kb, &normalized, k)?;
        logging::info!(
            "neighborhood ({k}): {}",
            neighborhood
                .iter()
                .map(|entry| entry.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let params = SelectionParams {
            portfolio: &self.params.portfolio,
            backup: &self.params.backup,
            timeout,
            min_size: self.params.min_size,
        };
        let Selection {
            sub_portfolio,
            schedule,
        } = if timeout > 0.0 {
            match goal {
                ObjectiveType::Satisfy => selector::csp_schedule(&neighborhood, &params),
                ObjectiveType::Minimize | ObjectiveType::Maximize => {
                    selector::cop_schedule(&neighborhood, &params)
                }
            }
        } else {
            Selection::default()
        };
        logging::info!("selected sub-portfolio: {}", sub_portfolio.join(", "));

        Ok(Prediction {
            static_slots: self.static_slots.clone(),
            dynamic: schedule,
        })
    }
}
