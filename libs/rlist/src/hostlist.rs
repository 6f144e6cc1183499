//! Hostlist expansion: `node[0-3,7],login` → individual host names.

use crate::{IdSet, RlistError, MAX_RANKS};

/// Expand a hostlist expression into host names, in order.
///
/// Fails with [`RlistError::TooManyHosts`] past [`MAX_RANKS`] hosts.
pub fn expand(expr: &str) -> Result<Vec<String>, RlistError> {
    expand_within(expr, MAX_RANKS)
}

/// Expand, failing before more than `budget` hosts are produced.
pub(crate) fn expand_within(expr: &str, budget: usize) -> Result<Vec<String>, RlistError> {
    let invalid = || RlistError::InvalidHostlist(expr.to_string());
    let too_many = || RlistError::TooManyHosts(MAX_RANKS);

    let mut hosts = Vec::new();
    for term in split_terms(expr).ok_or_else(invalid)? {
        let term = term.trim();
        if term.is_empty() {
            return Err(invalid());
        }
        match term.find('[') {
            None => {
                if hosts.len() >= budget {
                    return Err(too_many());
                }
                hosts.push(term.to_string());
            }
            Some(open) => {
                let close = term.rfind(']').ok_or_else(invalid)?;
                if close < open {
                    return Err(invalid());
                }
                let (prefix, ranges, suffix) =
                    (&term[..open], &term[open + 1..close], &term[close + 1..]);
                let width = zero_pad_width(ranges);
                let ids = IdSet::parse(ranges).map_err(|_| invalid())?;
                if ids.len() > budget - hosts.len() {
                    return Err(too_many());
                }
                hosts.extend(
                    ids.iter()
                        .map(|id| format!("{prefix}{id:0width$}{suffix}", width = width)),
                );
            }
        }
    }
    Ok(hosts)
}

/// Split on commas that are not inside brackets.
fn split_terms(expr: &str) -> Option<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                terms.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if depth < 0 || depth > 1 {
            return None;
        }
    }
    if depth != 0 {
        return None;
    }
    terms.push(&expr[start..]);
    Some(terms)
}

/// `[00-15]` keeps two digits; `[0-15]` keeps none.
fn zero_pad_width(ranges: &str) -> usize {
    ranges
        .split([',', '-'])
        .map(str::trim)
        .filter(|n| n.len() > 1 && n.starts_with('0'))
        .map(str::len)
        .max()
        .unwrap_or(0)
}
