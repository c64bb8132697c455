use garde::Validate;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// The form fields posted to edit an asset's details.
#[derive(Deserialize, Validate)]
pub struct DetailsForm {
    #[garde(length(chars, max = 200))]
    #[serde(default)]
    pub title: String,
    #[garde(length(chars, max = 5000))]
    #[serde(default)]
    pub description: String,
}

pub fn validate_details(form: &DetailsForm) -> Result<()> {
    form.validate()
        .map_err(|report| AppError::Validation(format!("Invalid details: {}", report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_bounds() {
        let ok = DetailsForm {
            title: "é".repeat(200),
            description: String::new(),
        };
        assert!(validate_details(&ok).is_ok());

        let long_title = DetailsForm {
            title: "x".repeat(201),
            description: String::new(),
        };
        assert!(validate_details(&long_title).is_err());

        let long_description = DetailsForm {
            title: String::new(),
            description: "x".repeat(5001),
        };
        assert!(validate_details(&long_description).is_err());
    }
}
