use serde::Deserialize;
use time::Date;

#[derive(Debug, Deserialize)]
pub struct ContactCreate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<Date>,
    pub information: Option<String>,
}

/// Partial update: only the fields present in the payload change.
#[derive(Debug, Default, Deserialize)]
pub struct ContactUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub information: Option<String>,
}

/// Optional substring filters, OR-combined when several are given.
#[derive(Debug, Default, Deserialize)]
pub struct ContactFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct BirthdayQuery {
    #[serde(default = "default_window_days")]
    pub days: i64,
}

fn default_window_days() -> i64 {
    7
}
