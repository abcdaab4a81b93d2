//! Plans and their append-only pass history

use crate::id::PlanId;
use crate::value::StructuredValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project's generation effort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Plan identifier
    pub id: PlanId,
    /// Plan name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Owning project's title
    pub project_title: String,
    /// Owning project's one-line pitch
    pub project_logline: String,
    /// Accepted vision payload, if the vision phase has run
    #[serde(default)]
    pub vision: Option<StructuredValue>,
    /// Ordered, append-only pass history
    #[serde(default)]
    pub passes: Vec<PlanPass>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create a new plan
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            description: description.into(),
            project_title: String::new(),
            project_logline: String::new(),
            vision: None,
            passes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// With project title and logline
    #[inline]
    #[must_use]
    pub fn with_project(mut self, title: impl Into<String>, logline: impl Into<String>) -> Self {
        self.project_title = title.into();
        self.project_logline = logline.into();
        self
    }

    /// Append a pass; indices are dense and start at zero
    pub fn append_pass(
        &mut self,
        title: impl Into<String>,
        summary: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &PlanPass {
        let index = u32::try_from(self.passes.len()).unwrap_or(u32::MAX);
        self.passes.push(PlanPass {
            index,
            title: title.into(),
            summary: summary.into(),
            created_at: now,
        });
        self.updated_at = now;
        &self.passes[self.passes.len() - 1]
    }

    /// Look up a pass by index
    #[must_use]
    pub fn pass(&self, index: u32) -> Option<&PlanPass> {
        self.passes.iter().find(|p| p.index == index)
    }

    /// Most recent pass
    #[must_use]
    pub fn latest_pass(&self) -> Option<&PlanPass> {
        self.passes.last()
    }
}

/// One iteration over a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPass {
    /// Position in the pass sequence
    pub index: u32,
    /// Pass title
    pub title: String,
    /// Pass summary
    pub summary: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_are_indexed_in_order() {
        let now = Utc::now();
        let mut plan = Plan::new("Ember", "A story of ash", now);
        plan.append_pass("Seed", "first", now);
        let second = plan.append_pass("Grow", "second", now).index;

        assert_eq!(second, 1);
        assert_eq!(plan.pass(0).map(|p| p.title.as_str()), Some("Seed"));
        assert_eq!(plan.latest_pass().map(|p| p.index), Some(1));
        assert!(plan.pass(7).is_none());
    }
}
