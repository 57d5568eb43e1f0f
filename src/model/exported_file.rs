//! Exported files and the filename pattern that carries their shot number.

use std::fmt;
use std::path::PathBuf;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholder the pattern must contain exactly once.
const SHOT_PLACEHOLDER: &str = "{shot}";

/// A movie filename template such as `{shot}.ats` or `0{shot}.RAW`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    prefix: String,
    suffix: String,
}

impl FilenamePattern {
    /// Parse a template containing exactly one `{shot}` placeholder.
    pub fn parse(template: &str) -> Result<Self, String> {
        let Some((prefix, suffix)) = template.split_once(SHOT_PLACEHOLDER) else {
            return Err(format!("filename pattern '{template}' has no {SHOT_PLACEHOLDER}"));
        };
        if suffix.contains(SHOT_PLACEHOLDER) {
            return Err(format!(
                "filename pattern '{template}' has more than one {SHOT_PLACEHOLDER}"
            ));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// The filename a movie for `shot` should carry.
    pub fn render(&self, shot: u32) -> String {
        format!("{}{shot}{}", self.prefix, self.suffix)
    }

    /// The shot number embedded in `name`, if it matches the pattern.
    ///
    /// Leading zeros in the number are accepted.
    pub fn shot_from(&self, name: &str) -> Option<u32> {
        let digits = name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for FilenamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SHOT_PLACEHOLDER}{}", self.prefix, self.suffix)
    }
}

impl Serialize for FilenamePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilenamePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let template = String::deserialize(deserializer)?;
        Self::parse(&template).map_err(serde::de::Error::custom)
    }
}

/// A file found in a camera's export directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub modified_at: Timestamp,
    pub age: SignedDuration,
    pub shot: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_parses_plain_pattern() {
        let pattern = FilenamePattern::parse("{shot}.ats").unwrap();

        assert_eq!(pattern.render(44123), "44123.ats");
        assert_eq!(pattern.shot_from("44123.ats"), Some(44123));
        assert_eq!(pattern.shot_from("044123.ats"), Some(44123));
    }

    #[test]
    fn literal_prefix_is_part_of_the_pattern() {
        let pattern = FilenamePattern::parse("0{shot}.RAW").unwrap();

        assert_eq!(pattern.render(44123), "044123.RAW");
        assert_eq!(pattern.shot_from("044123.RAW"), Some(44123));
        assert_eq!(pattern.shot_from("44123.RAW"), None);
    }

    #[test]
    fn non_matching_names_have_no_shot() {
        let pattern = FilenamePattern::parse("{shot}.seq").unwrap();

        assert_eq!(pattern.shot_from("44123.ats"), None);
        assert_eq!(pattern.shot_from("Rec-000123.seq"), None);
        assert_eq!(pattern.shot_from(".seq"), None);
        assert_eq!(pattern.shot_from("12a4.seq"), None);
    }

    #[test]
    fn rejects_pattern_without_placeholder() {
        assert!(FilenamePattern::parse("movie.ats").is_err());
    }

    #[test]
    fn rejects_pattern_with_two_placeholders() {
        assert!(FilenamePattern::parse("{shot}_{shot}.ats").is_err());
    }

    #[test]
    fn displays_as_template() {
        let pattern = FilenamePattern::parse("0{shot}.RAW").unwrap();
        assert_eq!(pattern.to_string(), "0{shot}.RAW");
    }
}
