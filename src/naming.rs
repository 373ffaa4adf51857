use serde::{Deserialize, Serialize};

/// Suffix rules threaded through every stage.
///
/// Inputs must carry one of `allowed_suffixes` (a compound suffix compared
/// against everything after the first `.` of the file name). Registration
/// outputs of interest end in `warped_marker` but not `inverse_marker`, and
/// are renamed to end in `final_suffix` for the inference tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingContract {
    pub allowed_suffixes: Vec<String>,
    pub warped_marker: String,
    pub inverse_marker: String,
    pub final_suffix: String,
}

impl Default for NamingContract {
    fn default() -> Self {
        Self {
            allowed_suffixes: vec!["nii.gz".to_string()],
            warped_marker: "Warped.nii.gz".to_string(),
            inverse_marker: "InverseWarped.nii.gz".to_string(),
            final_suffix: "_0000.nii.gz".to_string(),
        }
    }
}

impl NamingContract {
    /// Checks the dotted remainder of `name` (after the first `.`) against the
    /// allowed suffixes. Names without a dot are never allowed.
    pub fn allowed_file(&self, name: &str) -> bool {
        match name.split_once('.') {
            Some((_, extension)) => self.allowed_suffixes.iter().any(|s| s == extension),
            None => false,
        }
    }

    /// Whether a stage should pick up `name` as one of its inputs.
    pub fn matches_input(&self, name: &str) -> bool {
        self.allowed_suffixes.iter().any(|suffix| {
            name.strip_suffix(suffix.as_str())
                .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    /// The subject identifier used as registration output prefix: the name up
    /// to its first `.`.
    pub fn subject_id<'a>(&self, name: &'a str) -> &'a str {
        name.split('.').next().unwrap_or(name)
    }

    pub fn is_registered_candidate(&self, name: &str) -> bool {
        name.ends_with(&self.warped_marker) && !name.ends_with(&self.inverse_marker)
    }

    /// Name a registered image takes before inference, or `None` when `name`
    /// is not a registration candidate.
    pub fn renamed(&self, name: &str) -> Option<String> {
        if !self.is_registered_candidate(name) {
            return None;
        }
        let mut base = name.strip_suffix(self.warped_marker.as_str())?;
        if let Some(separator) = self
            .final_suffix
            .chars()
            .next()
            .filter(|c| !c.is_alphanumeric())
        {
            base = base.strip_suffix(separator).unwrap_or(base);
        }
        Some(format!("{base}{}", self.final_suffix))
    }

    pub fn is_final(&self, name: &str) -> bool {
        name.ends_with(&self.final_suffix)
    }

    pub fn describe_allowed(&self) -> String {
        self.allowed_suffixes.join(", ")
    }
}
