//! Roster cache and student record maintenance.

use std::str::FromStr;

use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::gateway::{Filter, Gateway, OrderBy, Table, from_rows, to_row};
use crate::model::{Course, Gender, StudentProfile, StudentRecord, YearLevel};

const FILL_ALL_FIELDS: &str = "Please fill in all fields.";
const INVALID_NUMBERS: &str = "Please enter valid numbers for Student ID, Phone number, and Age.";

/// Student form as submitted, before validation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StudentForm {
    #[schema(example = "Juan Dela Cruz")]
    pub name: String,
    #[schema(example = "20231234")]
    pub student_id: String,
    #[schema(example = "BSIT")]
    pub course: String,
    #[schema(example = "1st")]
    pub year: String,
    #[schema(example = "09171234567")]
    pub number: String,
    #[schema(example = "19")]
    pub age: String,
    #[schema(example = "Male")]
    pub gender: String,
}

fn parse_choice<T: FromStr>(value: &str, label: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|_| AppError::validation(format!("Unknown {}: {}", label, value)))
}

impl StudentForm {
    /// Every field is required; student number, phone and age must be numeric.
    pub fn validate(&self) -> AppResult<StudentProfile> {
        let fields = [
            &self.name,
            &self.student_id,
            &self.course,
            &self.year,
            &self.number,
            &self.age,
            &self.gender,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::validation(FILL_ALL_FIELDS));
        }

        let phone = self.number.trim();
        let student_id = self.student_id.trim().parse::<u64>();
        let age = self.age.trim().parse::<u32>();
        let phone_ok = phone.chars().all(|c| c.is_ascii_digit());
        let (Ok(student_id), Ok(age), true) = (student_id, age, phone_ok) else {
            return Err(AppError::validation(INVALID_NUMBERS));
        };
        if age == 0 {
            return Err(AppError::validation(INVALID_NUMBERS));
        }

        Ok(StudentProfile {
            name: self.name.trim().to_string(),
            student_id,
            course: parse_choice::<Course>(self.course.trim(), "course")?,
            year: parse_choice::<YearLevel>(self.year.trim(), "year")?,
            phone: phone.to_string(),
            age,
            gender: parse_choice::<Gender>(self.gender.trim(), "gender")?,
        })
    }
}

/// Students for the teacher's views, ordered by id. Rebuilt from the backend on
/// load; mutated only after the backend confirms a write.
pub struct Roster<G> {
    gateway: G,
    students: Vec<StudentRecord>,
    /// A confirmed write has not been read back yet. Duplicate checks must not
    /// run against this cache until it is refreshed.
    stale: bool,
}

impl<G: Gateway> Roster<G> {
    pub async fn load(gateway: G) -> AppResult<Self> {
        let students = fetch_students(&gateway).await?;
        Ok(Self {
            gateway,
            students,
            stale: false,
        })
    }

    pub async fn refresh(&mut self) -> AppResult<()> {
        self.students = fetch_students(&self.gateway).await?;
        self.stale = false;
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    async fn ensure_fresh(&mut self) -> AppResult<()> {
        if self.stale {
            info!("Re-reading roster before the next write");
            self.refresh().await?;
        }
        Ok(())
    }

    pub fn students(&self) -> &[StudentRecord] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&StudentRecord> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Which field of `profile` collides with a cached student other than `exclude`.
    pub fn find_duplicate(&self, profile: &StudentProfile, exclude: Option<u64>) -> Option<&'static str> {
        let others = || self.students.iter().filter(move |s| Some(s.id) != exclude);
        if others().any(|s| s.profile.name == profile.name) {
            Some("name")
        } else if others().any(|s| s.profile.student_id == profile.student_id) {
            Some("student number")
        } else {
            None
        }
    }

    #[instrument(name = "roster_create", skip(self, form), fields(name = %form.name))]
    pub async fn create_user(&mut self, form: &StudentForm) -> AppResult<()> {
        let profile = form.validate()?;
        self.ensure_fresh().await?;
        if let Some(field) = self.find_duplicate(&profile, None) {
            return Err(AppError::Duplicate { field });
        }

        self.gateway
            .insert_rows(Table::Users, vec![to_row(&profile)?])
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create student");
                e
            })?;

        info!("Student created");
        // the backend assigns the id, so read the roster back
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Student saved but the roster could not be re-read");
            self.stale = true;
        }
        Ok(())
    }

    #[instrument(name = "roster_update", skip(self, form))]
    pub async fn update_user(&mut self, id: u64, form: &StudentForm) -> AppResult<&StudentRecord> {
        let profile = form.validate()?;
        self.ensure_fresh().await?;
        let Some(index) = self.students.iter().position(|s| s.id == id) else {
            return Err(AppError::validation("Student not found."));
        };
        if let Some(field) = self.find_duplicate(&profile, Some(id)) {
            return Err(AppError::Duplicate { field });
        }

        let touched = self
            .gateway
            .update_rows(Table::Users, to_row(&profile)?, &[Filter::eq("id", id)?])
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update student");
                e
            })?;
        if touched == 0 {
            // gone from the backend since the roster was loaded
            self.students.remove(index);
            return Err(AppError::validation("Student not found."));
        }

        info!("Student updated");
        self.students[index].profile = profile;
        Ok(&self.students[index])
    }

    /// Remove a student. The last remaining student cannot be removed.
    #[instrument(name = "roster_delete", skip(self))]
    pub async fn delete_user(&mut self, id: u64) -> AppResult<StudentRecord> {
        self.ensure_fresh().await?;
        let Some(index) = self.students.iter().position(|s| s.id == id) else {
            return Err(AppError::validation("User not found."));
        };
        if self.students.len() == 1 {
            return Err(AppError::validation("Cannot delete the last user."));
        }

        self.gateway
            .delete_rows(Table::Users, &[Filter::eq("id", id)?])
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete student");
                e
            })?;

        info!("Student deleted");
        Ok(self.students.remove(index))
    }

    /// Case-insensitive name search, optionally narrowed to one course.
    pub fn search(&self, query: &str, course: Option<Course>) -> Vec<&StudentRecord> {
        let needle = query.trim().to_lowercase();
        self.students
            .iter()
            .filter(|s| needle.is_empty() || s.profile.name.to_lowercase().contains(&needle))
            .filter(|s| course.is_none_or(|c| s.profile.course == c))
            .collect()
    }

    pub fn in_course(&self, course: Option<Course>) -> Vec<&StudentRecord> {
        self.search("", course)
    }

    /// Distinct courses in first-seen order.
    pub fn courses(&self) -> Vec<Course> {
        let mut seen = Vec::new();
        for s in &self.students {
            if !seen.contains(&s.profile.course) {
                seen.push(s.profile.course);
            }
        }
        seen
    }
}

async fn fetch_students<G: Gateway>(gateway: &G) -> AppResult<Vec<StudentRecord>> {
    let rows = gateway
        .query_rows(Table::Users, &[], Some(OrderBy::asc("id")))
        .await
        .map_err(|e| {
            error!(error = %e, "Error fetching users");
            e
        })?;
    Ok(from_rows(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, student_id: &str) -> StudentForm {
        StudentForm {
            name: name.into(),
            student_id: student_id.into(),
            course: "BSIT".into(),
            year: "2nd".into(),
            number: "09170000000".into(),
            age: "20".into(),
            gender: "Female".into(),
        }
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut f = form("Ana", "1001");
        f.gender = "   ".into();
        assert_eq!(f.validate().unwrap_err().to_string(), FILL_ALL_FIELDS);
    }

    #[test]
    fn numeric_fields_must_be_numbers() {
        let mut f = form("Ana", "10O1");
        assert_eq!(f.validate().unwrap_err().to_string(), INVALID_NUMBERS);
        f.student_id = "1001".into();
        f.age = "0".into();
        assert_eq!(f.validate().unwrap_err().to_string(), INVALID_NUMBERS);
        f.age = "20".into();
        f.number = "0917-000".into();
        assert_eq!(f.validate().unwrap_err().to_string(), INVALID_NUMBERS);
    }

    #[test]
    fn enums_are_parsed_and_names_trimmed() {
        let mut f = form("  Ana Reyes ", "1001");
        f.year = "2nd Year".into();
        let profile = f.validate().unwrap();
        assert_eq!(profile.name, "Ana Reyes");
        assert_eq!(profile.year, YearLevel::Second);
        assert_eq!(profile.course, Course::Bsit);

        f.course = "BSN".into();
        assert_eq!(f.validate().unwrap_err().to_string(), "Unknown course: BSN");
    }
}
