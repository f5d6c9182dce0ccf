//! Sequential display-id allocation for tickets ("00007") and financial
//! tickets ("FT-00007").
//!
//! Ids are derived by max-scanning the existing set rather than keeping a
//! counter row, so gaps below the current maximum are left alone instead of
//! being refilled (deleting the highest id does let its value be issued
//! again). Two writers can
//! still derive the same candidate from a stale read; the insert is what
//! arbitrates, and [`insert_with_retry`] re-derives on a unique-constraint
//! violation up to a fixed budget.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::warn;

use crate::shared::error::ServiceError;

/// Insert attempts per allocation before giving up. Exceeding this means
/// sustained write contention and is reported as an allocation failure.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// Width of the numeric part of a display id.
const SEQUENCE_PAD: usize = 5;

fn numeric_part(id: &str, prefix: Option<&str>) -> Option<u64> {
    let rest = match prefix {
        Some(p) => id.strip_prefix(p).unwrap_or(id),
        None => id,
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

fn format_sequence(n: u64, prefix: Option<&str>) -> String {
    format!("{}{:0pad$}", prefix.unwrap_or(""), n, pad = SEQUENCE_PAD)
}

/// Next display id for a class of tickets given a snapshot of the ids that
/// already exist. Non-numeric legacy ids are skipped; an empty set starts
/// the sequence at 1.
pub fn next_sequence<S: AsRef<str>>(existing: &[S], prefix: Option<&str>) -> String {
    let max = existing
        .iter()
        .filter_map(|id| numeric_part(id.as_ref(), prefix))
        .max()
        .unwrap_or(0);
    format_sequence(max + 1, prefix)
}

/// Candidate after a collision: the collided id's numeric value plus one.
/// Returns `None` when the collided id itself is not in sequence form.
pub fn bump_sequence(id: &str, prefix: Option<&str>) -> Option<String> {
    numeric_part(id, prefix).map(|n| format_sequence(n + 1, prefix))
}

/// Drives an insert closure through the allocation retry protocol.
///
/// The closure receives the candidate id and performs the actual insert.
/// A unique-constraint violation re-derives the candidate and tries again;
/// any other database error aborts immediately so a failed write is never
/// repeated. Returns the id that was successfully inserted.
pub fn insert_with_retry<F>(
    existing: &[String],
    prefix: Option<&str>,
    mut attempt: F,
) -> Result<String, ServiceError>
where
    F: FnMut(&str) -> Result<(), DieselError>,
{
    let mut candidate = next_sequence(existing, prefix);

    for tries in 1..=MAX_ALLOCATION_ATTEMPTS {
        match attempt(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(
                    "id {} lost an allocation race (attempt {}/{})",
                    candidate, tries, MAX_ALLOCATION_ATTEMPTS
                );
                candidate = bump_sequence(&candidate, prefix).ok_or_else(|| {
                    ServiceError::Allocation(format!("cannot advance candidate {}", candidate))
                })?;
            }
            Err(other) => return Err(ServiceError::Storage(other.to_string())),
        }
    }

    Err(ServiceError::Allocation(format!(
        "retry budget exhausted after {} attempts, last candidate {}",
        MAX_ALLOCATION_ATTEMPTS, candidate
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    fn unique_violation() -> DieselError {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value violates unique constraint".to_string()),
        )
    }

    #[test]
    fn empty_set_starts_at_one() {
        assert_eq!(next_sequence::<&str>(&[], None), "00001");
        assert_eq!(next_sequence::<&str>(&[], Some("FT-")), "FT-00001");
    }

    #[test]
    fn max_scan_tolerates_gaps() {
        let ids = ["00001", "00005", "00003"];
        assert_eq!(next_sequence(&ids, None), "00006");
    }

    #[test]
    fn non_numeric_legacy_ids_are_ignored() {
        let ids = ["00007", "legacy-9", "", "draft"];
        assert_eq!(next_sequence(&ids, None), "00008");

        let ft = ["FT-00009", "FT-rascunho", "FT-"];
        assert_eq!(next_sequence(&ft, Some("FT-")), "FT-00010");
    }

    #[test]
    fn sequence_keeps_growing_past_the_pad_width() {
        let ids = ["99999"];
        assert_eq!(next_sequence(&ids, None), "100000");
    }

    #[test]
    fn signed_looking_ids_do_not_count() {
        // u64 parsing alone would accept a leading '+'.
        let ids = ["+9999", "00002"];
        assert_eq!(next_sequence(&ids, None), "00003");
    }

    #[test]
    fn bump_advances_the_numeric_value() {
        assert_eq!(bump_sequence("00099", None).as_deref(), Some("00100"));
        assert_eq!(bump_sequence("FT-00033", Some("FT-")).as_deref(), Some("FT-00034"));
        assert_eq!(bump_sequence("garbage", None), None);
    }

    #[test]
    fn first_attempt_wins_without_contention() {
        let existing = vec!["00004".to_string()];
        let id = insert_with_retry(&existing, None, |_| Ok(())).unwrap();
        assert_eq!(id, "00005");
    }

    #[test]
    fn concurrent_creators_get_distinct_ids() {
        // Five creators all start from the same stale snapshot; the shared
        // set plays the role of the unique index. The worst-placed creator
        // needs its entire retry budget.
        let snapshot: Vec<String> = vec!["00010".to_string()];
        let taken: RefCell<HashSet<String>> = RefCell::new(HashSet::new());

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let id = insert_with_retry(&snapshot, None, |candidate| {
                let mut taken = taken.borrow_mut();
                if taken.contains(candidate) {
                    return Err(unique_violation());
                }
                taken.insert(candidate.to_string());
                Ok(())
            })
            .unwrap();
            assert!(id.parse::<u64>().unwrap() > 10);
        }

        assert_eq!(taken.borrow().len(), MAX_ALLOCATION_ATTEMPTS as usize);
    }

    #[test]
    fn budget_exhaustion_is_an_allocation_error() {
        let calls = RefCell::new(0u32);
        let err = insert_with_retry(&[], Some("FT-"), |_| {
            *calls.borrow_mut() += 1;
            Err(unique_violation())
        })
        .unwrap_err();

        assert_eq!(*calls.borrow(), MAX_ALLOCATION_ATTEMPTS);
        assert!(matches!(err, ServiceError::Allocation(_)));
    }

    #[test]
    fn non_collision_errors_abort_without_retry() {
        let calls = RefCell::new(0u32);
        let err = insert_with_retry(&[], None, |_| {
            *calls.borrow_mut() += 1;
            Err(DieselError::NotInTransaction)
        })
        .unwrap_err();

        assert_eq!(*calls.borrow(), 1);
        assert!(matches!(err, ServiceError::Storage(_)));
    }
}
