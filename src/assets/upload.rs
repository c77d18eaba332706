use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::{AppError, AppResult};

/// A file part of a multipart request; lives only for the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub body: Bytes,
}

/// Text fields and file parts of a multipart form, grouped by field name.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = mp.next_field().await? {
            let Some(name) = field.name().map(|n| n.trim_end_matches("[]").to_string()) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(original_name) => {
                    let mime_type = field
                        .content_type()
                        .map(str::to_string)
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let body = field.bytes().await?;
                    if body.is_empty() {
                        continue;
                    }
                    form.files.entry(name).or_default().push(UploadedFile {
                        original_name,
                        mime_type,
                        body,
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// Non-blank text value of a field.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required_text(&self, name: &str) -> AppResult<String> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    /// At most one file for `name`.
    pub fn single_file(&mut self, name: &str) -> AppResult<Option<UploadedFile>> {
        let mut files = self.files.remove(name).unwrap_or_default();
        if files.len() > 1 {
            return Err(AppError::Validation(format!("only one {name} file is allowed")));
        }
        Ok(files.pop())
    }

    pub fn files(&mut self, name: &str, max: usize) -> AppResult<Vec<UploadedFile>> {
        let files = self.files.remove(name).unwrap_or_default();
        if files.len() > max {
            return Err(AppError::Validation(format!(
                "at most {max} {name} files are allowed"
            )));
        }
        Ok(files)
    }

    #[cfg(test)]
    pub fn from_parts(fields: &[(&str, &str)], files: Vec<(&str, UploadedFile)>) -> Self {
        let mut form = MultipartForm::default();
        for (k, v) in fields {
            form.fields.insert(k.to_string(), v.to_string());
        }
        for (k, f) in files {
            form.files.entry(k.to_string()).or_default().push(f);
        }
        form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> UploadedFile {
        UploadedFile {
            original_name: name.into(),
            mime_type: "image/png".into(),
            body: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let form = MultipartForm::from_parts(&[("name", "  "), ("title", " Hello ")], vec![]);
        assert!(form.text("name").is_none());
        assert_eq!(form.text("title").as_deref(), Some("Hello"));
        assert!(matches!(form.required_text("name"), Err(AppError::Validation(_))));
    }

    #[test]
    fn file_count_limits_are_enforced() {
        let mut form = MultipartForm::from_parts(
            &[],
            vec![("profilePic", png("a.png")), ("profilePic", png("b.png"))],
        );
        assert!(form.single_file("profilePic").is_err());

        let mut form = MultipartForm::from_parts(&[], vec![("images", png("a.png"))]);
        assert_eq!(form.files("images", 10).unwrap().len(), 1);
        assert!(form.files("images", 10).unwrap().is_empty());
    }
}
