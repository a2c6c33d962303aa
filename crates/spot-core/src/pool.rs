//! Pool identity: `(instance type, availability zone)` and its canonical
//! string form `"{az}:{type}"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A spot pool: an instance type held in a specific availability zone.
///
/// Region is derived from the AZ by dropping its trailing letter, never
/// stored separately, so the two can never drift out of sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId {
    availability_zone: String,
    instance_type: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolIdError {
    #[error("pool id must be of the form \"az:type\", got {0:?}")]
    BadShape(String),
    #[error("availability zone {0:?} does not match ^[a-z]+-[a-z]+-\\d+[a-z]$")]
    BadAz(String),
    #[error("instance type {0:?} does not match ^[a-z0-9]+\\.[a-z0-9]+$")]
    BadType(String),
}

impl PoolId {
    pub fn new(
        availability_zone: impl Into<String>,
        instance_type: impl Into<String>,
    ) -> Result<Self, PoolIdError> {
        let availability_zone = availability_zone.into();
        let instance_type = instance_type.into();
        validate_az(&availability_zone)?;
        validate_type(&instance_type)?;
        Ok(Self {
            availability_zone,
            instance_type,
        })
    }

    pub fn availability_zone(&self) -> &str {
        &self.availability_zone
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    /// Region is the AZ with its trailing lowercase letter dropped.
    pub fn region(&self) -> &str {
        let az = &self.availability_zone;
        &az[..az.len().saturating_sub(1)]
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.availability_zone, self.instance_type)
    }
}

impl FromStr for PoolId {
    type Err = PoolIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (az, ty) = s
            .split_once(':')
            .ok_or_else(|| PoolIdError::BadShape(s.to_string()))?;
        PoolId::new(az, ty)
    }
}

fn validate_az(az: &str) -> Result<(), PoolIdError> {
    let ok = {
        let bytes = az.as_bytes();
        let mut parts = az.split('-');
        let region_word = parts.next().unwrap_or("");
        let locale_word = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();
        !region_word.is_empty()
            && region_word.bytes().all(|b| b.is_ascii_lowercase())
            && !locale_word.is_empty()
            && locale_word.bytes().all(|b| b.is_ascii_lowercase())
            && rest.len() == 1
            && {
                let last = rest[0];
                let (digits, letter) = last.split_at(last.len().saturating_sub(1));
                !digits.is_empty()
                    && digits.bytes().all(|b| b.is_ascii_digit())
                    && letter.len() == 1
                    && letter.bytes().all(|b| b.is_ascii_lowercase())
            }
            && !bytes.is_empty()
    };
    if ok {
        Ok(())
    } else {
        Err(PoolIdError::BadAz(az.to_string()))
    }
}

fn validate_type(ty: &str) -> Result<(), PoolIdError> {
    let ok = match ty.split_once('.') {
        Some((family, size)) => {
            !family.is_empty()
                && !size.is_empty()
                && family.bytes().all(|b| b.is_ascii_alphanumeric())
                && size.bytes().all(|b| b.is_ascii_alphanumeric())
                && family.bytes().all(|b| !b.is_ascii_uppercase())
                && size.bytes().all(|b| !b.is_ascii_uppercase())
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(PoolIdError::BadType(ty.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let p = PoolId::new("us-east-1a", "c5.large").unwrap();
        assert_eq!(p.to_string(), "us-east-1a:c5.large");
        let parsed: PoolId = p.to_string().parse().unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn region_drops_trailing_letter() {
        let p = PoolId::new("us-east-1a", "c5.large").unwrap();
        assert_eq!(p.region(), "us-east-1");
    }

    #[test]
    fn rejects_bad_az() {
        assert!(matches!(
            PoolId::new("useast1a", "c5.large"),
            Err(PoolIdError::BadAz(_))
        ));
    }

    #[test]
    fn rejects_bad_type() {
        assert!(matches!(
            PoolId::new("us-east-1a", "C5Large"),
            Err(PoolIdError::BadType(_))
        ));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!("us-east-1a-c5.large".parse::<PoolId>().is_err());
    }
}
