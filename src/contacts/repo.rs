use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::contacts::dto::{ContactCreate, ContactFilter, ContactUpdate};
use crate::error::ApiError;

/// Address-book entry owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<Date>,
    pub information: Option<String>,
    pub owner_id: i64,
}

const COLUMNS: &str = "id, first_name, last_name, email, phone, date_of_birth, information, owner_id";

fn map_constraint_err(e: sqlx::Error) -> ApiError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::Duplicate("contact")
        }
        _ => ApiError::Internal(e.into()),
    }
}

pub async fn create(db: &PgPool, owner_id: i64, data: &ContactCreate) -> Result<Contact, ApiError> {
    sqlx::query_as::<_, Contact>(&format!(
        r#"
        INSERT INTO contacts (first_name, last_name, email, phone, date_of_birth, information, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(data.date_of_birth)
    .bind(&data.information)
    .bind(owner_id)
    .fetch_one(db)
    .await
    .map_err(map_constraint_err)
}

pub async fn get(db: &PgPool, owner_id: i64, id: i64) -> anyhow::Result<Option<Contact>> {
    let contact = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE id = $1 AND owner_id = $2"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(db)
    .await?;
    Ok(contact)
}

/// Owner-scoped listing. A NULL filter makes its ILIKE branch NULL, which is
/// falsy, so only the provided filters participate in the OR.
pub async fn list(
    db: &PgPool,
    owner_id: i64,
    filter: &ContactFilter,
) -> anyhow::Result<Vec<Contact>> {
    let rows = sqlx::query_as::<_, Contact>(&format!(
        r#"
        SELECT {COLUMNS} FROM contacts
        WHERE owner_id = $1
          AND (($2::text IS NULL AND $3::text IS NULL AND $4::text IS NULL)
               OR first_name ILIKE '%' || $2 || '%'
               OR last_name  ILIKE '%' || $3 || '%'
               OR email      ILIKE '%' || $4 || '%')
        ORDER BY last_name, first_name
        "#
    ))
    .bind(owner_id)
    .bind(&filter.first_name)
    .bind(&filter.last_name)
    .bind(&filter.email)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn search(db: &PgPool, owner_id: i64, query: &str) -> anyhow::Result<Vec<Contact>> {
    let like = format!("%{query}%");
    let rows = sqlx::query_as::<_, Contact>(&format!(
        r#"
        SELECT {COLUMNS} FROM contacts
        WHERE owner_id = $1
          AND (first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)
        ORDER BY last_name, first_name
        "#
    ))
    .bind(owner_id)
    .bind(&like)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// COALESCE keeps every column the payload left out. `None` means the id
/// does not exist for this owner; the caller decides the HTTP semantics.
pub async fn update(
    db: &PgPool,
    owner_id: i64,
    id: i64,
    data: &ContactUpdate,
) -> Result<Option<Contact>, ApiError> {
    sqlx::query_as::<_, Contact>(&format!(
        r#"
        UPDATE contacts SET
            first_name    = COALESCE($3, first_name),
            last_name     = COALESCE($4, last_name),
            email         = COALESCE($5, email),
            phone         = COALESCE($6, phone),
            date_of_birth = COALESCE($7, date_of_birth),
            information   = COALESCE($8, information)
        WHERE id = $1 AND owner_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner_id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(data.date_of_birth)
    .bind(&data.information)
    .fetch_optional(db)
    .await
    .map_err(map_constraint_err)
}

/// True if a row was removed, false if the id did not exist for this owner.
pub async fn delete(db: &PgPool, owner_id: i64, id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upcoming_birthdays(
    db: &PgPool,
    owner_id: i64,
    window_days: i64,
) -> anyhow::Result<Vec<Contact>> {
    let contacts = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE owner_id = $1 AND date_of_birth IS NOT NULL"
    ))
    .bind(owner_id)
    .fetch_all(db)
    .await?;

    let today = OffsetDateTime::now_utc().date();
    Ok(filter_upcoming(contacts, today, window_days))
}

fn birthday_in_year(dob: Date, year: i32) -> Date {
    // Feb 29 projects to Mar 1 when the target year is not a leap year.
    Date::from_calendar_date(year, dob.month(), dob.day())
        .unwrap_or_else(|_| Date::from_calendar_date(year, Month::March, 1).expect("Mar 1 exists"))
}

/// Birthday projected onto the current year, rolled to next year once it has
/// already passed.
fn project_birthday(dob: Date, today: Date) -> Date {
    let projected = birthday_in_year(dob, today.year());
    if projected < today {
        birthday_in_year(dob, today.year() + 1)
    } else {
        projected
    }
}

/// Keeps contacts whose projected birthday falls within
/// `[today, today + window_days]` inclusive, sorted by projected date.
fn filter_upcoming(contacts: Vec<Contact>, today: Date, window_days: i64) -> Vec<Contact> {
    let horizon = today + Duration::days(window_days);
    let mut upcoming: Vec<(Date, Contact)> = contacts
        .into_iter()
        .filter_map(|contact| {
            let dob = contact.date_of_birth?;
            let projected = project_birthday(dob, today);
            (projected >= today && projected <= horizon).then_some((projected, contact))
        })
        .collect();
    upcoming.sort_by_key(|(projected, _)| *projected);
    upcoming.into_iter().map(|(_, contact)| contact).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn contact(id: i64, dob: Option<Date>) -> Contact {
        Contact {
            id,
            first_name: format!("First{id}"),
            last_name: format!("Last{id}"),
            email: format!("contact{id}@example.com"),
            phone: "123456".into(),
            date_of_birth: dob,
            information: None,
            owner_id: 1,
        }
    }

    #[test]
    fn projection_keeps_future_birthday_this_year() {
        let today = date!(2024 - 06 - 01);
        assert_eq!(
            project_birthday(date!(1990 - 06 - 05), today),
            date!(2024 - 06 - 05)
        );
    }

    #[test]
    fn projection_rolls_past_birthday_to_next_year() {
        let today = date!(2024 - 06 - 01);
        assert_eq!(
            project_birthday(date!(1990 - 05 - 20), today),
            date!(2025 - 05 - 20)
        );
    }

    #[test]
    fn projection_today_stays_today() {
        let today = date!(2024 - 06 - 01);
        assert_eq!(
            project_birthday(date!(1985 - 06 - 01), today),
            date!(2024 - 06 - 01)
        );
    }

    #[test]
    fn leap_day_projects_to_march_first_in_common_years() {
        let today = date!(2023 - 02 - 01);
        assert_eq!(
            project_birthday(date!(1996 - 02 - 29), today),
            date!(2023 - 03 - 01)
        );
        // In a leap year the real date survives.
        let today = date!(2024 - 02 - 01);
        assert_eq!(
            project_birthday(date!(1996 - 02 - 29), today),
            date!(2024 - 02 - 29)
        );
    }

    #[test]
    fn window_filters_and_sorts_by_projected_date() {
        let today = date!(2024 - 06 - 01);
        let within = contact(1, Some(date!(1990 - 06 - 05)));
        let passed = contact(2, Some(date!(1990 - 05 - 20)));
        let beyond = contact(3, Some(date!(1990 - 06 - 10)));
        let sooner = contact(4, Some(date!(1992 - 06 - 02)));
        let no_dob = contact(5, None);

        let result = filter_upcoming(vec![within, passed, beyond, sooner, no_dob], today, 7);
        let ids: Vec<i64> = result.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 1]);
    }

    #[test]
    fn wide_window_reaches_into_next_year() {
        let today = date!(2024 - 06 - 01);
        let passed = contact(1, Some(date!(1990 - 05 - 20)));
        // 354 days spans to 2025-05-21, one day past the rolled projection.
        let result = filter_upcoming(vec![passed.clone()], today, 354);
        assert_eq!(result.len(), 1);
        let result = filter_upcoming(vec![passed], today, 350);
        assert!(result.is_empty());
    }
}
