//! Aggregates behind the teacher and student dashboards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::gateway::{Filter, Gateway, OrderBy, Table, from_row, from_rows};
use crate::model::{AbsenceRecord, AccountRecord, Gender, ScheduleEntry, YearLevel};

pub const NO_DATA: &str = "No data found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearFilter {
    #[default]
    All,
    Year(YearLevel),
}

impl YearFilter {
    fn admits(self, year: YearLevel) -> bool {
        match self {
            YearFilter::All => true,
            YearFilter::Year(y) => y == year,
        }
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::All => f.write_str("All"),
            YearFilter::Year(y) => write!(f, "{}", y),
        }
    }
}

impl FromStr for YearFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(YearFilter::All);
        }
        s.parse()
            .map(YearFilter::Year)
            .map_err(|_| AppError::validation(format!("Unknown year: {}", s)))
    }
}

/// One chart bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Slice {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Demographic {
    gender: Gender,
    year: YearLevel,
}

/// Gender and year-level make-up of the `users` table.
#[derive(Debug, Clone, Default)]
pub struct Demographics {
    entries: Vec<Demographic>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub year_options: Vec<String>,
    pub selected_year: String,
    pub total_students: usize,
    pub gender: Vec<Slice>,
    pub years: Vec<Slice>,
    /// Set when there are no students to chart.
    pub message: Option<String>,
}

impl Demographics {
    #[instrument(name = "demographics_load", skip(gateway))]
    pub async fn load<G: Gateway>(gateway: &G) -> AppResult<Self> {
        let rows = gateway
            .query_rows(Table::Users, &[], Some(OrderBy::asc("id")))
            .await
            .map_err(|e| {
                error!(error = %e, "Error fetching dashboard data");
                e
            })?;
        Ok(Self {
            entries: from_rows(rows)?,
        })
    }

    /// "All" followed by the year levels present, lowest first.
    pub fn year_options(&self) -> Vec<String> {
        let mut years: Vec<YearLevel> = self.entries.iter().map(|e| e.year).collect();
        years.sort_by_key(|y| y.number());
        years.dedup();
        std::iter::once(YearFilter::All.to_string())
            .chain(years.into_iter().map(|y| y.to_string()))
            .collect()
    }

    pub fn gender_breakdown(&self, filter: YearFilter) -> Vec<Slice> {
        self.count_by(filter, |e| e.gender.to_string())
    }

    pub fn year_breakdown(&self, filter: YearFilter) -> Vec<Slice> {
        self.count_by(filter, |e| e.year.to_string())
    }

    fn count_by(&self, filter: YearFilter, key: impl Fn(&Demographic) -> String) -> Vec<Slice> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in self.entries.iter().filter(|e| filter.admits(e.year)) {
            *counts.entry(key(e)).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(name, value)| Slice { name, value })
            .collect()
    }

    pub fn summary(&self, filter: YearFilter) -> DashboardSummary {
        let years = self.year_breakdown(filter);
        DashboardSummary {
            year_options: self.year_options(),
            selected_year: filter.to_string(),
            total_students: years.iter().map(|s| s.value).sum(),
            gender: self.gender_breakdown(filter),
            years,
            message: self.entries.is_empty().then(|| NO_DATA.to_string()),
        }
    }
}

/// Everything the student dashboard shows for the signed-in student.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentOverview {
    pub account: AccountRecord,
    pub absences: Vec<AbsenceRecord>,
    pub schedule: Vec<ScheduleEntry>,
}

#[instrument(skip(gateway))]
pub async fn student_overview<G: Gateway>(gateway: &G, email: &str) -> AppResult<StudentOverview> {
    let by_account = [Filter::eq("email", email)?];
    let account = gateway
        .query_rows(Table::Accounts, &by_account, None)
        .await
        .map_err(|e| {
            error!(error = %e, "Error fetching student data");
            e
        })?
        .into_iter()
        .next()
        .ok_or(AppError::AccountNotFound)?;
    let account: AccountRecord = from_row(account)?;

    let by_student = [Filter::eq("student_email", email)?];
    let absences = gateway
        .query_rows(Table::Absences, &by_student, Some(OrderBy::asc("date")))
        .await?;
    let schedule = gateway
        .query_rows(Table::Schedules, &by_student, Some(OrderBy::asc("id")))
        .await?;

    Ok(StudentOverview {
        account,
        absences: from_rows(absences)?,
        schedule: from_rows(schedule)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demographics(entries: &[(Gender, YearLevel)]) -> Demographics {
        Demographics {
            entries: entries
                .iter()
                .map(|&(gender, year)| Demographic { gender, year })
                .collect(),
        }
    }

    #[test]
    fn year_options_start_with_all_and_sort_numerically() {
        let d = demographics(&[
            (Gender::Male, YearLevel::Third),
            (Gender::Female, YearLevel::First),
            (Gender::Female, YearLevel::Third),
        ]);
        assert_eq!(d.year_options(), vec!["All", "1st", "3rd"]);
    }

    #[test]
    fn year_filter_narrows_both_breakdowns() {
        let d = demographics(&[
            (Gender::Male, YearLevel::First),
            (Gender::Female, YearLevel::First),
            (Gender::Female, YearLevel::Second),
        ]);

        let all = d.summary(YearFilter::All);
        assert_eq!(all.total_students, 3);
        assert_eq!(
            all.gender,
            vec![
                Slice { name: "Female".into(), value: 2 },
                Slice { name: "Male".into(), value: 1 },
            ]
        );

        let second: YearFilter = "2nd Year".parse().unwrap();
        let summary = d.summary(second);
        assert_eq!(summary.selected_year, "2nd");
        assert_eq!(summary.years, vec![Slice { name: "2nd".into(), value: 1 }]);
        assert_eq!(summary.gender, vec![Slice { name: "Female".into(), value: 1 }]);
    }

    #[actix_web::test]
    async fn empty_roster_is_an_empty_summary_not_an_error() {
        let gw = crate::gateway::MemoryGateway::new();
        let summary = Demographics::load(&gw).await.unwrap().summary(YearFilter::All);

        assert_eq!(summary.total_students, 0);
        assert!(summary.gender.is_empty());
        assert_eq!(summary.year_options, vec!["All"]);
        assert_eq!(summary.message.as_deref(), Some(NO_DATA));
    }

    #[test]
    fn populated_summary_has_no_message() {
        let d = demographics(&[(Gender::Male, YearLevel::First)]);
        assert!(d.summary(YearFilter::All).message.is_none());
    }

    #[test]
    fn unknown_year_filter_is_a_validation_error() {
        assert_eq!("all".parse::<YearFilter>().unwrap(), YearFilter::All);
        assert!(matches!("5th".parse::<YearFilter>(), Err(AppError::Validation(_))));
    }
}
