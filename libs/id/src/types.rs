//! Typed ID definitions for jobs and users.

use crate::{define_numeric_id, IdError};

// =============================================================================
// Jobs
// =============================================================================

define_numeric_id!(JobId, u64);

impl JobId {
    /// Renders the ID as four dot-separated groups of four hex digits.
    #[must_use]
    pub fn to_dothex(&self) -> String {
        let v = self.0;
        format!(
            "{:04x}.{:04x}.{:04x}.{:04x}",
            (v >> 48) & 0xffff,
            (v >> 32) & 0xffff,
            (v >> 16) & 0xffff,
            v & 0xffff
        )
    }

    /// Returns the KVS key for a record belonging to this job.
    ///
    /// `kvs_key("R")` is the job's resource-set record.
    pub fn kvs_key(&self, suffix: &str) -> Result<String, IdError> {
        if suffix.is_empty() || suffix.starts_with('.') || suffix.ends_with('.') {
            return Err(IdError::InvalidKeySuffix(suffix.to_string()));
        }
        Ok(format!("job.{}.{}", self.to_dothex(), suffix))
    }

    /// Parses a job ID in decimal, `0x` hex, or dothex form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        if let Some(hex) = s.strip_prefix("0x") {
            return u64::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|_| IdError::InvalidNumber {
                    kind: "job",
                    input: s.to_string(),
                });
        }

        if s.contains('.') {
            return Self::parse_dothex(s);
        }

        s.parse::<u64>().map(Self).map_err(|_| IdError::InvalidNumber {
            kind: "job",
            input: s.to_string(),
        })
    }

    fn parse_dothex(s: &str) -> Result<Self, IdError> {
        let groups: Vec<&str> = s.split('.').collect();
        if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
            return Err(IdError::InvalidDothex(s.to_string()));
        }

        let mut value = 0u64;
        for group in groups {
            let part = u16::from_str_radix(group, 16)
                .map_err(|_| IdError::InvalidDothex(s.to_string()))?;
            value = (value << 16) | u64::from(part);
        }
        Ok(Self(value))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Users
// =============================================================================

define_numeric_id!(UserId, u32);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        s.parse::<u32>().map(Self).map_err(|_| IdError::InvalidNumber {
            kind: "user",
            input: s.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_job_id_dothex() {
        let id = JobId::new(0x0000_0004_b200_0000);
        assert_eq!(id.to_dothex(), "0000.0004.b200.0000");
    }

    #[test]
    fn test_job_id_kvs_key() {
        let id = JobId::new(0x0000_0004_b200_0000);
        assert_eq!(id.kvs_key("R").unwrap(), "job.0000.0004.b200.0000.R");
    }

    #[test]
    fn test_job_id_kvs_key_rejects_bad_suffix() {
        let id = JobId::new(1);
        assert!(matches!(id.kvs_key(""), Err(IdError::InvalidKeySuffix(_))));
        assert!(matches!(id.kvs_key(".R"), Err(IdError::InvalidKeySuffix(_))));
    }

    #[test]
    fn test_job_id_parse_forms() {
        assert_eq!(JobId::parse("42").unwrap(), JobId::new(42));
        assert_eq!(JobId::parse("0x2a").unwrap(), JobId::new(42));
        assert_eq!(JobId::parse("0000.0000.0000.002a").unwrap(), JobId::new(42));
    }

    #[test]
    fn test_job_id_parse_errors() {
        assert!(JobId::parse("").unwrap_err().is_empty());
        assert!(matches!(
            JobId::parse("abc"),
            Err(IdError::InvalidNumber { kind: "job", .. })
        ));
        assert!(matches!(
            JobId::parse("0000.002a"),
            Err(IdError::InvalidDothex(_))
        ));
        assert!(matches!(
            JobId::parse("0000.0000.0000.zzzz"),
            Err(IdError::InvalidDothex(_))
        ));
    }

    #[test]
    fn test_job_id_json_is_bare_integer() {
        let id = JobId::new(12345);
        assert_eq!(serde_json::to_string(&id).unwrap(), "12345");
        let parsed: JobId = serde_json::from_str("12345").unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<JobId>("\"12345\"").is_err());
        assert!(serde_json::from_str::<JobId>("-1").is_err());
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!("1000".parse::<UserId>().unwrap(), UserId::new(1000));
        assert!("".parse::<UserId>().unwrap_err().is_empty());
        assert!("-5".parse::<UserId>().is_err());
    }

    #[test]
    fn test_job_ids_order_numerically() {
        assert!(JobId::new(9) < JobId::new(10));
    }

    proptest! {
        #[test]
        fn prop_dothex_parses_back(raw in any::<u64>()) {
            let id = JobId::new(raw);
            prop_assert_eq!(JobId::parse(&id.to_dothex()).unwrap(), id);
        }
    }
}
