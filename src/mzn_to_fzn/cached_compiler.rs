use super::Conversion;
use super::compilation;
use super::convert_mzn;
use crate::solver_config::Solver;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Converts the model at most once per solver; restarts reuse the result.
pub struct CachedCompiler {
    model: PathBuf,
    data: Option<PathBuf>,
    cache: RwLock<HashMap<String, Arc<Conversion>>>,
}

impl CachedCompiler {
    pub fn new(model: PathBuf, data: Option<PathBuf>) -> Self {
        Self {
            model,
            data,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn compile(
        &self,
        solver: &Solver,
        cancellation_token: CancellationToken,
    ) -> compilation::Result<Arc<Conversion>> {
        {
            let cache = self.cache.read().await;
            if let Some(conversion) = cache.get(&solver.name) {
                return Result::Ok(conversion.clone());
            }
        }

        let conversion = Arc::new(
            convert_mzn(solver, &self.model, self.data.as_deref(), cancellation_token).await?,
        );
        let mut cache = self.cache.write().await;
        cache.insert(solver.name.clone(), conversion.clone());
        Ok(conversion)
    }
}
