use serde::{Deserialize, Serialize};

use crate::auth::repo_types::Admin;
use crate::content::repo_types::{NewEducation, NewExperience, NewService, NewSkill, Profile};
use crate::error::AppError;

pub const DEFAULT_ICON_CLASS: &str = "fa-pencil";
/// Longest free text accepted for about text, blog titles and service descriptions.
pub const MAX_TEXT_CHARS: usize = 5000;

pub fn check_length(field: &str, value: &str) -> Result<(), AppError> {
    if value.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

/// `{ message, data }` envelope used by the write endpoints and get-profile.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Public profile card: the profile record merged with the admin's details.
/// Unset text fields render as empty strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
    pub profile_pic2: String,
    pub pdf: Option<String>,
    pub video: Option<String>,
    pub about_text: String,
    pub phone_number: String,
    pub degree: String,
    pub birthday: String,
    pub address: String,
    pub experience: Option<i32>,
}

impl ProfileView {
    pub fn new(profile: Profile, admin: Admin) -> Self {
        Self {
            name: profile.name,
            email: admin.email,
            profile_pic: profile.profile_pic,
            profile_pic2: profile.profile_pic2.unwrap_or_default(),
            pdf: profile.pdf,
            video: profile.video,
            about_text: profile.about_text.unwrap_or_default(),
            phone_number: admin.phone_number.unwrap_or_default(),
            degree: admin.degree.unwrap_or_default(),
            birthday: admin.birthday.unwrap_or_default(),
            address: admin.address.unwrap_or_default(),
            experience: admin.experience,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TechnologyImage {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 20 }

impl Pagination {
    pub const MAX_LIMIT: i64 = 100;

    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

fn filled(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integers may be sent as numbers or numeric strings.
fn whole_number(v: &Option<serde_json::Value>) -> Option<i64> {
    match v.as_ref()? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationInput {
    pub degree_name: Option<String>,
    pub college_name: Option<String>,
    pub from_year: Option<String>,
    pub to_year: Option<String>,
    pub description: Option<String>,
}

impl EducationInput {
    pub fn validate(&self) -> Result<NewEducation, AppError> {
        match (
            filled(&self.degree_name),
            filled(&self.college_name),
            filled(&self.from_year),
            filled(&self.to_year),
        ) {
            (Some(degree_name), Some(college_name), Some(from_year), Some(to_year)) => Ok(NewEducation {
                degree_name,
                college_name,
                from_year,
                to_year,
                description: filled(&self.description),
            }),
            _ => Err(AppError::Validation(
                "Each education object must include degreeName, collegeName, fromYear, and toYear".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceInput {
    pub designation: Option<String>,
    pub company_name: Option<String>,
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    pub description: Option<String>,
}

impl ExperienceInput {
    pub fn validate(&self) -> Result<NewExperience, AppError> {
        match (
            filled(&self.designation),
            filled(&self.company_name),
            filled(&self.from_time),
            filled(&self.to_time),
        ) {
            (Some(designation), Some(company_name), Some(from_time), Some(to_time)) => Ok(NewExperience {
                designation,
                company_name,
                from_time,
                to_time,
                description: filled(&self.description),
            }),
            _ => Err(AppError::Validation(
                "Each experience object must include designation, companyName, fromTime and toTime".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SkillInput {
    pub name: Option<String>,
    pub percentage: Option<serde_json::Value>,
    pub color: Option<String>,
}

impl SkillInput {
    pub fn validate(&self) -> Result<NewSkill, AppError> {
        let (Some(name), Some(color)) = (filled(&self.name), filled(&self.color)) else {
            return Err(AppError::Validation(
                "Each skill object must include name, percentage and color".into(),
            ));
        };
        let percentage = whole_number(&self.percentage)
            .filter(|p| (0..=100).contains(p))
            .ok_or_else(|| AppError::Validation(format!("percentage of {name} must be 0-100")))?;
        Ok(NewSkill {
            name,
            percentage: percentage as i32,
            color,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon_class: Option<String>,
}

impl ServiceInput {
    pub fn validate(&self) -> Result<NewService, AppError> {
        match (filled(&self.title), filled(&self.description)) {
            (Some(title), Some(description)) => {
                check_length("description", &description)?;
                Ok(NewService {
                    title,
                    description,
                    icon_class: filled(&self.icon_class).unwrap_or_else(|| DEFAULT_ICON_CLASS.into()),
                })
            }
            _ => Err(AppError::Validation(
                "Each service object must include title and description".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn education_requires_the_four_core_fields() {
        let ok: EducationInput = serde_json::from_value(json!({
            "degreeName": "BSc", "collegeName": "Uni", "fromYear": "2015", "toYear": "2019"
        }))
        .unwrap();
        let entry = ok.validate().unwrap();
        assert_eq!(entry.degree_name, "BSc");
        assert!(entry.description.is_none());

        let missing: EducationInput =
            serde_json::from_value(json!({ "degreeName": "BSc", "collegeName": " " })).unwrap();
        assert!(matches!(missing.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn skill_percentage_is_bounded() {
        let parse = |v: serde_json::Value| serde_json::from_value::<SkillInput>(v).unwrap().validate();
        assert_eq!(
            parse(json!({ "name": "Rust", "percentage": "90", "color": "#f00" })).unwrap().percentage,
            90
        );
        assert_eq!(
            parse(json!({ "name": "Rust", "percentage": 0, "color": "#f00" })).unwrap().percentage,
            0
        );
        assert!(parse(json!({ "name": "Rust", "percentage": 101, "color": "#f00" })).is_err());
        assert!(parse(json!({ "name": "Rust", "percentage": "lots", "color": "#f00" })).is_err());
        assert!(parse(json!({ "name": "Rust", "color": "#f00" })).is_err());
    }

    #[test]
    fn service_icon_defaults() {
        let s: ServiceInput =
            serde_json::from_value(json!({ "title": "Web", "description": "Sites" })).unwrap();
        assert_eq!(s.validate().unwrap().icon_class, DEFAULT_ICON_CLASS);
    }

    #[test]
    fn service_description_is_length_limited() {
        let at_limit: ServiceInput = serde_json::from_value(
            json!({ "title": "Web", "description": "x".repeat(MAX_TEXT_CHARS) }),
        )
        .unwrap();
        assert!(at_limit.validate().is_ok());
        let over: ServiceInput = serde_json::from_value(
            json!({ "title": "Web", "description": "é".repeat(MAX_TEXT_CHARS + 1) }),
        )
        .unwrap();
        assert!(matches!(over.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination { limit: 0, offset: -4 };
        assert_eq!(p.clamped(), (1, 0));
        let p = Pagination { limit: 5_000, offset: 10 };
        assert_eq!(p.clamped(), (Pagination::MAX_LIMIT, 10));
    }
}
