//! Transform pipeline runner
//!
//! A chain is stored in declared order. Execution runs it last-to-first: the
//! last declared stage sees the raw input and each earlier stage wraps the
//! output of the one declared after it.

use crate::cache::{CacheKey, TransformCache};
use crate::component::ComponentExt;
use crate::error::BuildError;
use crate::transform::{Artifact, Transform, TransformOutput};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One stage of a chain
#[derive(Clone)]
pub struct ChainStage {
    pub transform: Arc<dyn Transform>,
    /// A failing optional stage is skipped with a warning
    pub optional: bool,
}

impl std::fmt::Debug for ChainStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStage")
            .field("transform", &self.transform.identity())
            .field("optional", &self.optional)
            .finish()
    }
}

/// Ordered transform chain, in declared order
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    stages: Vec<ChainStage>,
}

impl TransformChain {
    pub fn new(stages: Vec<ChainStage>) -> Self {
        Self { stages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Stages as declared
    pub fn declared(&self) -> &[ChainStage] {
        &self.stages
    }

    /// Stages in the order they run: last declared first
    pub fn execution_order(&self) -> impl Iterator<Item = &ChainStage> {
        self.stages.iter().rev()
    }

    /// Stage identities in execution order, joined by `>`
    pub fn identity(&self) -> String {
        self.execution_order()
            .map(|stage| {
                let id = stage.transform.identity();
                if stage.optional {
                    format!("{}?", id)
                } else {
                    id
                }
            })
            .collect::<Vec<_>>()
            .join(">")
    }
}

/// A stage that failed but was marked optional
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStage {
    pub stage: String,
    pub message: String,
}

/// Final output of a whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    /// Last primary artifact plus side artifacts from every stage
    pub output: TransformOutput,
    pub skipped: Vec<SkippedStage>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: Arc<ChainOutput>,
    pub cache_hit: bool,
}

/// Executes transform chains, consulting the cache when one is attached
#[derive(Debug, Clone, Default)]
pub struct TransformRunner {
    cache: Option<Arc<TransformCache>>,
}

impl TransformRunner {
    pub fn new(cache: Option<Arc<TransformCache>>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> Option<&Arc<TransformCache>> {
        self.cache.as_ref()
    }

    pub fn run(
        &self,
        chain: &TransformChain,
        input: Artifact,
        path: &Path,
    ) -> Result<RunOutcome, BuildError> {
        self.run_cancellable(chain, input, path, &AtomicBool::new(false))
    }

    /// Like [`run`](Self::run), but stops between stages once `cancel` is set
    pub fn run_cancellable(
        &self,
        chain: &TransformChain,
        input: Artifact,
        path: &Path,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome, BuildError> {
        let cache = match &self.cache {
            Some(cache) if !chain.is_empty() => cache,
            _ => {
                let output = execute(chain, input, path, cancel)?;
                return Ok(RunOutcome {
                    output: Arc::new(output),
                    cache_hit: false,
                });
            }
        };

        let key = CacheKey::new(chain, &input);
        let (output, cache_hit) =
            cache.get_or_try_insert_with(key, || execute(chain, input, path, cancel))?;
        if cache_hit {
            trace!(target: "sheaf::transform", path = %path.display(), "Transform cache hit");
        }
        Ok(RunOutcome { output, cache_hit })
    }
}

fn execute(
    chain: &TransformChain,
    input: Artifact,
    path: &Path,
    cancel: &AtomicBool,
) -> Result<ChainOutput, BuildError> {
    let mut current = input;
    let mut side = Vec::new();
    let mut skipped = Vec::new();

    for stage in chain.execution_order() {
        if cancel.load(Ordering::Acquire) {
            return Err(BuildError::Cancelled);
        }
        let name = stage.transform.name();
        debug!(target: "sheaf::transform", path = %path.display(), stage = name, "Applying transform");

        match stage.transform.apply(&current, path) {
            Ok(out) => {
                current = out.primary;
                side.extend(out.side);
            }
            Err(err) if stage.optional => {
                warn!(
                    target: "sheaf::transform",
                    path = %path.display(),
                    stage = name,
                    error = %err,
                    "Optional transform failed, skipping"
                );
                skipped.push(SkippedStage {
                    stage: name.to_string(),
                    message: err.to_string(),
                });
            }
            Err(source) => {
                return Err(BuildError::Transform {
                    path: path.to_path_buf(),
                    stage: name.to_string(),
                    source,
                })
            }
        }
    }

    Ok(ChainOutput {
        output: TransformOutput {
            primary: current,
            side,
        },
        skipped,
    })
}
