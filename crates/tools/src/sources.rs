//! Data-source registry and scoping rules
//!
//! Each tool key maps to a table, its selectable columns, and which columns
//! filter team versus user scope. Sources without either column are
//! platform-wide.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Requested visibility of a tool-data query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    UserSpecific,
    TeamSpecific,
    All,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::UserSpecific => "user_specific",
            Scope::TeamSpecific => "team_specific",
            Scope::All => "all",
        }
    }
}

/// One data source the agent may query
#[derive(Debug, Clone, Copy)]
pub struct DataSourceConfig {
    pub table: &'static str,
    pub select: &'static str,
    pub team_column: Option<&'static str>,
    pub user_column: Option<&'static str>,
}

static DATA_SOURCES: Lazy<HashMap<&'static str, DataSourceConfig>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("business_info", DataSourceConfig {
        table: "business_info",
        select: "id, user_id, full_name, business_name, email, phone_number, role, job_title, \
                 manager, department, team_id, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: Some("user_id"),
    });
    map.insert("business_owner_instructions", DataSourceConfig {
        table: "business_owner_instructions",
        select: "id, user_id, title, content, content_type, url, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("company_onboarding", DataSourceConfig {
        table: "company_onboarding",
        select: "id, user_id, onboarding_data, completed, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("departments", DataSourceConfig {
        table: "departments",
        select: "id, name, team_id, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: None,
    });
    map.insert("finance_analysis", DataSourceConfig {
        table: "finance_analysis",
        select: "id, file_id, user_id, team_id, analysis_result, summary, status, period_type, \
                 created_at, updated_at",
        team_column: Some("team_id"),
        user_column: Some("user_id"),
    });
    map.insert("google_calendar_events", DataSourceConfig {
        table: "google_calendar_events",
        select: "id, user_id, title, description, location, start_time, end_time, all_day, \
                 status, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("global_services", DataSourceConfig {
        table: "global_services",
        select: "id, service_name, description, category, is_active, display_order, created_at, \
                 updated_at",
        team_column: None,
        user_column: None,
    });
    map.insert("leave_approvals", DataSourceConfig {
        table: "leave_approvals",
        select: "id, leave_id, approver_id, action, comments, created_at",
        team_column: None,
        user_column: Some("approver_id"),
    });
    map.insert("leave_entitlements", DataSourceConfig {
        table: "leave_entitlements",
        select: "id, team_id, total_entitlement_days, year, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: None,
    });
    map.insert("machines", DataSourceConfig {
        table: "machines",
        select: "id, user_id, enginename, enginetype, description, triggeringevents, endingevent, \
                 actionsactivities, service_name, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("performance_kpis", DataSourceConfig {
        table: "performance_kpis",
        select: "id, session_id, revenue, revenue_status, ad_spend, leads, jobs_completed, roas, \
                 roi_pounds, roi_percent, google_reviews, created_at, updated_at",
        team_column: None,
        user_column: None,
    });
    map.insert("playbook_assignments", DataSourceConfig {
        table: "playbook_assignments",
        select: "id, user_id, playbook_id, assignment_type, created_at",
        team_column: None,
        user_column: None,
    });
    map.insert("software", DataSourceConfig {
        table: "software",
        select: "id, software, url, description, price_monthly, department_id, team_id, \
                 pricing_period, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: None,
    });
    map.insert("sop_data", DataSourceConfig {
        table: "sop_data",
        select: "id, user_id, title, content, version, is_current, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("tasks", DataSourceConfig {
        table: "tasks",
        select: "id, title, description, task_type, status, priority, start_date, due_date, \
                 assigned_to, created_by, team_id, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: Some("assigned_to"),
    });
    map.insert("team_leaves", DataSourceConfig {
        table: "team_leaves",
        select: "id, user_id, leave_type, start_date, end_date, status, duration_days, \
                 description, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("team_services", DataSourceConfig {
        table: "team_services",
        select: "id, team_id, service_id, created_at, updated_at",
        team_column: Some("team_id"),
        user_column: None,
    });
    map.insert("battle_plan", DataSourceConfig {
        table: "battle_plan",
        select: "id, user_id, missionstatement, visionstatement, purposewhy, corevalues, \
                 oneyeartarget, fiveyeartarget, tenyeartarget, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map.insert("playbooks", DataSourceConfig {
        table: "playbooks",
        select: "id, user_id, playbookname, description, enginetype, status, link, \
                 department_id, content, created_at, updated_at",
        team_column: None,
        user_column: Some("user_id"),
    });
    map
});

/// Look up a data source by tool key
pub fn data_source(tool_key: &str) -> Option<&'static DataSourceConfig> {
    DATA_SOURCES.get(tool_key)
}

/// Default scope for a tool based on its supported columns
pub fn default_scope(tool_key: &str) -> Scope {
    let Some(config) = data_source(tool_key) else {
        return Scope::TeamSpecific;
    };
    if config.team_column.is_none() && config.user_column.is_none() {
        Scope::All
    } else if config.team_column.is_some() {
        Scope::TeamSpecific
    } else {
        Scope::UserSpecific
    }
}

/// Whether a scope is usable for a tool
pub fn is_valid_scope(tool_key: &str, scope: Scope) -> bool {
    let Some(config) = data_source(tool_key) else {
        return false;
    };
    match scope {
        Scope::All => true,
        // team scope falls back to the user column when no team column exists
        Scope::TeamSpecific => config.team_column.is_some() || config.user_column.is_some(),
        Scope::UserSpecific => config.user_column.is_some(),
    }
}
