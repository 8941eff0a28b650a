use crate::{Decision, PolicyInput, PolicyResult, Rule, TrustData};
use std::path::Path;
use std::sync::Arc;

/// Shareable evaluator bound to one immutable trust document.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    data: Arc<TrustData>,
}

impl PolicyEngine {
    pub fn new(data: TrustData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> PolicyResult<Self> {
        Ok(Self::new(TrustData::load_from_path(path)?))
    }

    pub fn data(&self) -> &TrustData {
        &self.data
    }

    pub fn evaluate(&self, input: &PolicyInput) -> Decision {
        Decision {
            allow: Rule::Allow.evaluate(input, &self.data),
            is_admin: Rule::IsAdmin.evaluate(input, &self.data),
            is_user: Rule::IsUser.evaluate(input, &self.data),
        }
    }

    pub fn evaluate_rule(&self, rule: Rule, input: &PolicyInput) -> bool {
        rule.evaluate(input, &self.data)
    }
}
