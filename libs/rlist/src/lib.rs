//! Resource set (R) parsing.
//!
//! R describes a concrete assignment of resources to a job. Version 1:
//!
//! ```text
//! {
//!   "version": 1,
//!   "execution": {
//!     "R_lite": [ { "rank": "0-1", "children": { "core": "0-3" } } ],
//!     "nodelist": [ "node[0-1]" ],
//!     "properties": { "gpu-node": "1" },
//!     "starttime": 0,
//!     "expiration": 0
//!   }
//! }
//! ```
//!
//! Parsing is a structural check only: it does not consult any inventory of
//! the resources that actually exist. Error `Display` strings are written to
//! be embedded in user-facing diagnostics.

mod hostlist;
mod idset;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

pub use hostlist::expand as expand_hostlist;
pub use idset::IdSet;

/// The only R version understood.
pub const R_VERSION: i64 = 1;

/// Upper bound on execution targets in one R, and on hosts in a nodelist.
pub const MAX_RANKS: usize = 65536;

/// R parse errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RlistError {
    #[error("R must be a JSON object")]
    NotAnObject,

    #[error("missing R version")]
    MissingVersion,

    #[error("invalid version={0}")]
    UnsupportedVersion(String),

    #[error("missing R.execution")]
    MissingExecution,

    #[error("R.execution.R_lite must be an array")]
    InvalidRLite,

    #[error("R_lite[{index}]: {message}")]
    InvalidEntry { index: usize, message: String },

    #[error("invalid idset '{0}'")]
    InvalidIdset(String),

    #[error("invalid hostlist '{0}'")]
    InvalidHostlist(String),

    #[error("rank {0} appears more than once")]
    DuplicateRank(u32),

    #[error("R has {count} ranks, more than the limit of {max}")]
    TooManyRanks { count: usize, max: usize },

    #[error("hostlist expands to more than {0} hosts")]
    TooManyHosts(usize),

    #[error("nodelist has {hosts} hosts but R_lite has {ranks} ranks")]
    NodelistMismatch { hosts: usize, ranks: usize },

    #[error("property '{name}' references unknown ranks {ranks}")]
    UnknownPropertyRanks { name: String, ranks: String },

    #[error("{0}")]
    InvalidField(String),

    #[error("expiration {expiration} is before starttime {starttime}")]
    ExpiredBeforeStart { starttime: f64, expiration: f64 },
}

/// One `R_lite` entry: every rank in `ranks` holds the same children.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    ranks: IdSet,
    /// Resource kind (e.g. "core", "gpu") to ids on each rank.
    children: BTreeMap<String, IdSet>,
}

/// A parsed, structurally valid resource set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSet {
    entries: Vec<Entry>,
    ranks: IdSet,
    hosts: Option<Vec<String>>,
    properties: BTreeMap<String, IdSet>,
    expiration: f64,
}

impl ResourceSet {
    /// Parse and validate an R document.
    pub fn from_json(value: &Value) -> Result<Self, RlistError> {
        let obj = value.as_object().ok_or(RlistError::NotAnObject)?;

        match obj.get("version") {
            None => return Err(RlistError::MissingVersion),
            Some(v) if v.as_i64() == Some(R_VERSION) => {}
            Some(v) => return Err(RlistError::UnsupportedVersion(v.to_string())),
        }

        let execution = obj
            .get("execution")
            .and_then(Value::as_object)
            .ok_or(RlistError::MissingExecution)?;

        let items = execution
            .get("R_lite")
            .and_then(Value::as_array)
            .ok_or(RlistError::InvalidRLite)?;

        let mut seen = IdSet::default();
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let entry_err = |message: &str| RlistError::InvalidEntry {
                index,
                message: message.to_string(),
            };

            let rank_str = item
                .get("rank")
                .and_then(Value::as_str)
                .ok_or_else(|| entry_err("missing rank"))?;
            let ranks = IdSet::parse(rank_str)?;

            if let Some(dup) = seen.intersection(&ranks).first() {
                return Err(RlistError::DuplicateRank(dup));
            }
            seen.extend(&ranks);
            if seen.len() > MAX_RANKS {
                return Err(RlistError::TooManyRanks {
                    count: seen.len(),
                    max: MAX_RANKS,
                });
            }

            let children_obj = item
                .get("children")
                .and_then(Value::as_object)
                .ok_or_else(|| entry_err("missing children"))?;
            if children_obj.is_empty() {
                return Err(entry_err("children is empty"));
            }

            let mut children = BTreeMap::new();
            for (kind, ids) in children_obj {
                let ids = ids
                    .as_str()
                    .ok_or_else(|| entry_err(&format!("children.{kind} must be an idset string")))?;
                children.insert(kind.clone(), IdSet::parse(ids)?);
            }

            entries.push(Entry { ranks, children });
        }

        let hosts = match execution.get("nodelist") {
            None => None,
            Some(nodelist) => {
                let hosts = parse_nodelist(nodelist)?;
                if hosts.len() != seen.len() {
                    return Err(RlistError::NodelistMismatch {
                        hosts: hosts.len(),
                        ranks: seen.len(),
                    });
                }
                Some(hosts)
            }
        };

        let mut properties = BTreeMap::new();
        if let Some(props) = execution.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                RlistError::InvalidField("R.execution.properties must be an object".to_string())
            })?;
            for (name, ids) in props {
                let ids = ids.as_str().ok_or_else(|| {
                    RlistError::InvalidField(format!("property '{name}' must be an idset string"))
                })?;
                let ids = IdSet::parse(ids)?;
                let unknown = ids.difference(&seen);
                if !unknown.is_empty() {
                    return Err(RlistError::UnknownPropertyRanks {
                        name: name.clone(),
                        ranks: unknown.to_string(),
                    });
                }
                properties.insert(name.clone(), ids);
            }
        }

        let starttime = time_field(execution, "starttime")?;
        let expiration = time_field(execution, "expiration")?;
        if expiration > 0.0 && expiration < starttime {
            return Err(RlistError::ExpiredBeforeStart {
                starttime,
                expiration,
            });
        }

        Ok(Self {
            entries,
            ranks: seen,
            hosts,
            properties,
            expiration,
        })
    }

    /// Number of execution targets.
    pub fn nnodes(&self) -> usize {
        self.ranks.len()
    }

    /// Total count of one resource kind across all ranks.
    pub fn count(&self, kind: &str) -> usize {
        self.entries
            .iter()
            .filter_map(|e| {
                let ids = e.children.get(kind)?;
                Some(e.ranks.len().saturating_mul(ids.len()))
            })
            .fold(0, usize::saturating_add)
    }

    /// Host names in rank order, if R carried a nodelist.
    pub fn nodelist(&self) -> Option<Vec<&str>> {
        self.hosts
            .as_ref()
            .map(|hosts| hosts.iter().map(String::as_str).collect())
    }

    /// Ranks carrying a property.
    pub fn property(&self, name: &str) -> Option<&IdSet> {
        self.properties.get(name)
    }

    pub fn expiration(&self) -> f64 {
        self.expiration
    }
}

fn parse_nodelist(value: &Value) -> Result<Vec<String>, RlistError> {
    let exprs = value.as_array().ok_or_else(|| {
        RlistError::InvalidField("R.execution.nodelist must be an array".to_string())
    })?;
    let mut hosts = Vec::new();
    for expr in exprs {
        let expr = expr.as_str().ok_or_else(|| {
            RlistError::InvalidField("R.execution.nodelist entries must be strings".to_string())
        })?;
        hosts.extend(hostlist::expand_within(expr, MAX_RANKS - hosts.len())?);
    }
    Ok(hosts)
}

fn time_field(execution: &serde_json::Map<String, Value>, name: &str) -> Result<f64, RlistError> {
    match execution.get(name) {
        None => Ok(0.0),
        Some(v) => v
            .as_f64()
            .filter(|t| *t >= 0.0)
            .ok_or_else(|| RlistError::InvalidField(format!("invalid R.execution.{name}"))),
    }
}
