//! Subject names and subscription patterns
//!
//! Subjects are dot-separated elements, e.g. `C2MS.D1.D2.MSN.CNST.SAT.SAT.MSG.HB.COMP`.
//! Elements use `A-Z`, `0-9`, `-` and `_`. Patterns may also use:
//!
//! - `*` matches exactly one element
//! - `>` as the last element matches one or more remaining elements
//! - `+` as the last element matches zero or more remaining elements

use crate::{TypesError, TypesResult};

pub const SEPARATOR: char = '.';
pub const SINGLE_WILDCARD: &str = "*";
pub const ONE_OR_MORE_WILDCARD: &str = ">";
pub const ZERO_OR_MORE_WILDCARD: &str = "+";

fn is_valid_element(element: &str) -> bool {
    !element.is_empty()
        && element
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Check that `subject` is a concrete, publishable subject
pub fn validate_subject(subject: &str) -> TypesResult<()> {
    let invalid = |reason: &str| TypesError::InvalidSubject {
        subject: subject.to_string(),
        reason: reason.to_string(),
    };

    if subject.is_empty() {
        return Err(invalid("subject is empty"));
    }
    for element in subject.split(SEPARATOR) {
        if element.is_empty() {
            return Err(invalid("subject contains an empty element"));
        }
        if matches!(element, SINGLE_WILDCARD | ONE_OR_MORE_WILDCARD | ZERO_OR_MORE_WILDCARD) {
            return Err(invalid("wildcards are only allowed in subscription patterns"));
        }
        if !is_valid_element(element) {
            return Err(invalid("elements may only contain A-Z, 0-9, '-' and '_'"));
        }
    }
    Ok(())
}

/// Check that `pattern` is a usable subscription pattern
pub fn validate_pattern(pattern: &str) -> TypesResult<()> {
    let invalid = |reason: &str| TypesError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("pattern is empty"));
    }
    let elements: Vec<&str> = pattern.split(SEPARATOR).collect();
    let last = elements.len() - 1;
    for (index, element) in elements.iter().enumerate() {
        match *element {
            "" => return Err(invalid("pattern contains an empty element")),
            SINGLE_WILDCARD => {}
            ONE_OR_MORE_WILDCARD | ZERO_OR_MORE_WILDCARD if index != last => {
                return Err(invalid("'>' and '+' may only appear as the last element"));
            }
            ONE_OR_MORE_WILDCARD | ZERO_OR_MORE_WILDCARD => {}
            other if !is_valid_element(other) => {
                return Err(invalid("elements may only contain A-Z, 0-9, '-' and '_'"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Does `subject` match subscription `pattern`?
pub fn matches(subject: &str, pattern: &str) -> bool {
    if subject.is_empty() || pattern.is_empty() {
        return false;
    }

    let subject: Vec<&str> = subject.split(SEPARATOR).collect();
    let pattern: Vec<&str> = pattern.split(SEPARATOR).collect();

    for (index, element) in pattern.iter().enumerate() {
        match *element {
            ONE_OR_MORE_WILDCARD => return subject.len() > index,
            ZERO_OR_MORE_WILDCARD => return true,
            _ => {}
        }
        let Some(actual) = subject.get(index) else {
            return false;
        };
        if *element != SINGLE_WILDCARD && element != actual {
            return false;
        }
    }

    subject.len() == pattern.len()
}

/// Join elements into a subject, substituting `FILL` for blanks
pub fn build_subject<I, S>(elements: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    elements
        .into_iter()
        .map(|element| {
            let element = element.as_ref().trim();
            if element.is_empty() {
                "FILL".to_string()
            } else {
                element.to_ascii_uppercase()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
