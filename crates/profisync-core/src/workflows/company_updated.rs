//! The company-updated workflow.
//!
//! Routes company events by their discriminator:
//!
//! ```text
//! route-change --CompanyChange--------> update-company  -> company-succeed
//!              --CompanyLocationChange-> update-location -> location-succeed
//!              --otherwise------------> nothing-to-process
//! ```
//!
//! Both updaters carry the shared fixed retry policy; there are no catches.

use serde_json::json;

use profisync_types::workflow::{
    ChoiceRule, RetryPolicy, StepConfig, StepDefinition, WorkflowDefinition,
};

/// Registered name of this workflow.
pub const WORKFLOW_NAME: &str = "company-updated";

fn function_retry() -> RetryPolicy {
    RetryPolicy {
        on: None,
        max_attempts: 2,
        interval_secs: 1,
        backoff_rate: 1.0,
    }
}

/// Build the company-updated workflow definition.
pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: WORKFLOW_NAME.to_string(),
        comment: Some("Propagates company and company-location changes to profiles".to_string()),
        start_at: "route-change".to_string(),
        timeout_secs: Some(30),
        steps: vec![
            route_change(),
            update_company(),
            update_location(),
            succeed("company-succeed", None),
            succeed("location-succeed", None),
            succeed("nothing-to-process", Some("nothing to process")),
        ],
    }
}

/// Decide whether this is a company update or a company-location update.
fn route_change() -> StepDefinition {
    StepDefinition {
        id: "route-change".to_string(),
        comment: Some(
            "Decide if this is a company update or a company location update".to_string(),
        ),
        config: StepConfig::Choice {
            rules: vec![
                ChoiceRule {
                    variable: "$.detailType".to_string(),
                    equals: "CompanyChange".to_string(),
                    next: "update-company".to_string(),
                },
                ChoiceRule {
                    variable: "$.detailType".to_string(),
                    equals: "CompanyLocationChange".to_string(),
                    next: "update-location".to_string(),
                },
            ],
            otherwise: Some("nothing-to-process".to_string()),
        },
        next: None,
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

fn update_company() -> StepDefinition {
    StepDefinition {
        id: "update-company".to_string(),
        comment: Some("Updates profiles from the company change".to_string()),
        config: StepConfig::FunctionInvoke {
            function: "company-updater".to_string(),
            payload: None,
            result_path: None,
        },
        next: Some("company-succeed".to_string()),
        end: false,
        retry: vec![function_retry()],
        catch: vec![],
    }
}

fn update_location() -> StepDefinition {
    StepDefinition {
        id: "update-location".to_string(),
        comment: Some("Updates profiles from the company location change".to_string()),
        config: StepConfig::FunctionInvoke {
            function: "company-location-updater".to_string(),
            payload: None,
            result_path: None,
        },
        next: Some("location-succeed".to_string()),
        end: false,
        retry: vec![function_retry()],
        catch: vec![],
    }
}

fn succeed(id: &str, comment: Option<&str>) -> StepDefinition {
    StepDefinition {
        id: id.to_string(),
        comment: comment.map(String::from),
        config: StepConfig::Succeed {},
        next: None,
        end: false,
        retry: vec![],
        catch: vec![],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_validates() {
        crate::definition::validate_definition(&definition()).expect("should validate");
    }

    #[test]
    fn test_routes_cover_both_change_kinds_and_a_default() {
        let def = definition();
        let StepConfig::Choice { rules, otherwise } = &def.step("route-change").unwrap().config
        else {
            panic!("expected choice");
        };
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].equals, "CompanyChange");
        assert_eq!(rules[0].next, "update-company");
        assert_eq!(rules[1].equals, "CompanyLocationChange");
        assert_eq!(rules[1].next, "update-location");
        assert_eq!(otherwise.as_deref(), Some("nothing-to-process"));
    }

    #[test]
    fn test_updaters_retry_but_never_catch() {
        let def = definition();
        for id in ["update-company", "update-location"] {
            let step = def.step(id).unwrap();
            assert_eq!(step.retry[0].max_attempts, 2);
            assert_eq!(step.retry[0].interval_secs, 1);
            assert!(step.catch.is_empty(), "{id} should have no catches");
        }
    }
}
