// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The one concrete task kind shipped by the engine.

use serde::{Deserialize, Serialize};

use crate::holder::Holder;
use crate::task::{SimpleTask, TaskBody};

/// Invokes a named operation on the holder via [`Holder::invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    operation: String,
}

/// Persistence tag for function-call tasks.
pub const FUNCTION_CALL_KIND: &str = "cadence/function-call";

impl FunctionCall {
    /// Body calling `operation` on the holder.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Operation identifier passed to [`Holder::invoke`].
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl TaskBody for FunctionCall {
    const KIND: &'static str = FUNCTION_CALL_KIND;

    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        holder.invoke(&self.operation)
    }
}

/// Function-call task for `operation`.
pub fn function_call(operation: impl Into<String>) -> SimpleTask<FunctionCall> {
    SimpleTask::new(FunctionCall::new(operation))
}
