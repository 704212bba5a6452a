//! Install/uninstall scripts embedded in module manifests.
//!
//! A script is raw text holding SQL statements separated by the
//! [`STATEMENT_DELIMITER`] line. Statements run one at a time with no
//! transaction around them: when statement *k* fails, statements before it
//! stay applied and statements after it never run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

pub const STATEMENT_DELIMITER: &str = "-- command split --";

/// Anything that can run a single raw statement against the live store.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute_raw(&self, statement: &str) -> Result<()>;
}

/// Ordered, trimmed, non-empty statements of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(Vec<String>);

impl Script {
    pub fn parse(raw: &str) -> Self {
        Self(split_statements(raw))
    }

    pub fn statements(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<String>> for Script {
    fn from(statements: Vec<String>) -> Self {
        Self(statements)
    }
}

pub fn split_statements(raw: &str) -> Vec<String> {
    raw.split(STATEMENT_DELIMITER)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run `script` statement by statement, stopping at the first failure.
///
/// Returns the number of statements executed. An empty script is a no-op.
pub async fn run_script<E>(script: &Script, executor: &E) -> Result<usize>
where
    E: StatementExecutor + ?Sized,
{
    for (index, statement) in script.statements().iter().enumerate() {
        debug!("Executing script statement #{}", index);
        if let Err(e) = executor.execute_raw(statement).await {
            warn!(
                "Script statement #{} failed after {} applied statements: {}",
                index, index, e
            );
            return Err(RegistryError::ScriptExecution {
                index,
                statement: statement.clone(),
                source: Box::new(e),
            });
        }
    }

    Ok(script.len())
}

/// Split and run raw script text. Absent or blank text is a no-op.
pub async fn run_raw_script<E>(raw: Option<&str>, executor: &E) -> Result<usize>
where
    E: StatementExecutor + ?Sized,
{
    match raw {
        Some(raw) => run_script(&Script::parse(raw), executor).await,
        None => Ok(0),
    }
}
