use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use itertools::{EitherOrBoth, Itertools};
use crate::MigrationError;

/// A dotted, numeric migration version such as `5.7.1`.
///
/// Versions compare component by component, with missing components counting as zero,
/// so `5.7` and `5.7.0` are the same version.
#[derive(Debug, Clone)]
pub struct MigrationVersion {
    components: Vec<u32>,
}

impl MigrationVersion {
    pub fn new(components: impl Into<Vec<u32>>) -> Self {
        MigrationVersion {
            components: components.into(),
        }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    fn significant_components(&self) -> &[u32] {
        let len = self
            .components
            .iter()
            .rposition(|c| *c != 0)
            .map_or(0, |idx| idx + 1);
        &self.components[..len]
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Err(MigrationError::InvalidVersion(s.to_string()));
        }

        let invalid = || MigrationError::InvalidVersion(s.to_string());

        // `u32::from_str` also takes a leading `+`.
        let components = trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MigrationVersion { components })
    }
}

impl Display for MigrationVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.components.iter().join("."))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for pair in self.components.iter().zip_longest(other.components.iter()) {
            let ordering = match pair {
                EitherOrBoth::Both(a, b) => a.cmp(b),
                EitherOrBoth::Left(a) => a.cmp(&0),
                EitherOrBoth::Right(b) => 0u32.cmp(b),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_components().hash(state);
    }
}
