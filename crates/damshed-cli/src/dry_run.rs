use crate::output::OutputWriter;
use crate::output_types::{ActionLabel, PlannedRow};
use damshed_pipeline::{PlannedAction, PlannedDam};
use serde::Serialize;

/// What a command would do, gathered instead of running it
#[derive(Debug, Clone, Serialize)]
pub struct DryRunPlan {
    pub command: String,
    pub details: Vec<String>,
    pub items: Vec<PlannedRow>,
}

impl DryRunPlan {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            details: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn push(&mut self, key: impl Into<String>, action: PlannedAction) {
        self.items.push(PlannedRow {
            key: key.into(),
            action: ActionLabel(action),
        });
    }

    pub fn with_dams(mut self, dams: Vec<PlannedDam>) -> Self {
        for dam in dams {
            self.push(dam.dam_id.to_string(), dam.action);
        }
        self
    }

    pub fn count(&self, action: PlannedAction) -> usize {
        self.items.iter().filter(|item| item.action.0 == action).count()
    }
}

/// Display a dry-run plan
pub fn display_plan(output: &OutputWriter, plan: &DryRunPlan) -> anyhow::Result<()> {
    if output.is_json() {
        return output.result(serde_json::json!({
            "dry_run": true,
            "command": plan.command,
            "details": plan.details,
            "create": plan.count(PlannedAction::Create),
            "replace": plan.count(PlannedAction::Replace),
            "skip": plan.count(PlannedAction::Skip),
            "planned": plan.items,
        }));
    }

    output.section(format!("Planned Actions (Dry Run): {}", plan.command));
    for detail in &plan.details {
        output.info(detail);
    }
    output.kv("Create", plan.count(PlannedAction::Create));
    output.kv("Replace", plan.count(PlannedAction::Replace));
    output.kv("Skip", plan.count(PlannedAction::Skip));
    output.table(plan.items.clone());
    output.info("No changes were made. Run without --dry-run to execute these actions.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use damshed_core::models::DamId;

    #[test]
    fn test_plan_counts() {
        let plan = DryRunPlan::new("delineate-fhred-primary")
            .with_detail("Catchments: fhred_catch_1")
            .with_dams(vec![
                PlannedDam { dam_id: DamId::new("1"), action: PlannedAction::Create },
                PlannedDam { dam_id: DamId::new("2"), action: PlannedAction::Skip },
                PlannedDam { dam_id: DamId::new("3"), action: PlannedAction::Skip },
            ]);

        assert_eq!(plan.count(PlannedAction::Create), 1);
        assert_eq!(plan.count(PlannedAction::Skip), 2);
        assert_eq!(plan.count(PlannedAction::Replace), 0);
        assert_eq!(plan.details.len(), 1);
    }

    #[test]
    fn test_plan_serialization() {
        let mut plan = DryRunPlan::new("build-variable-rasters");
        plan.push("RC1", PlannedAction::Replace);
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"replace\""));
        assert!(json.contains("RC1"));
    }
}
