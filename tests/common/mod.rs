//! Entities shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use quarry::Entity;

#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[table_name = "roles"]
pub struct Role {
    #[primary_key]
    #[has_default]
    pub id: i32,
    pub name: String,
    #[has_default]
    pub created_at: Option<DateTime<Utc>>,
    #[has_default]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[table_name = "public.memberships"]
pub struct Membership {
    #[primary_key]
    pub user_id: i64,
    #[primary_key]
    pub group_id: i64,
    pub level: i32,
    #[has_default]
    pub note: Option<String>,
    #[updated_at]
    pub modified: Option<NaiveDateTime>,
}

/// `updated_at` here is epoch seconds owned by the caller, not a stamped column.
#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[table_name = "events"]
pub struct Event {
    #[primary_key]
    pub id: i64,
    pub name: String,
    pub updated_at: i64,
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn role(name: &str) -> Role {
    Role {
        name: name.to_string(),
        ..Default::default()
    }
}
