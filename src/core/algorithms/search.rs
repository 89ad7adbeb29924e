//! Bounded random search.
//!
//! Valency adaptation and annealing repeatedly draw random candidates until one satisfies a
//! predicate. Every such loop runs under an explicit retry budget and reports exhaustion as
//! a value, so the caller decides whether it is a skip or a failure.

use thiserror::Error;

/// A bounded search ran out of attempts.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("No valid candidate found in {attempts} attempts")]
pub struct SearchExhausted {
    /// Number of attempts made.
    pub attempts: usize,
}

/// Calls `attempt` up to `budget` times and returns the first `Some`.
///
/// # Errors
///
/// Returns [`SearchExhausted`] if every attempt yields `None`.
///
/// # Examples
///
/// ```
/// use fibernet::core::algorithms::search::{SearchExhausted, bounded_search};
///
/// assert_eq!(bounded_search(10, |i| (i == 3).then_some(i)), Ok(3));
/// assert_eq!(
///     bounded_search(5, |_| None::<usize>),
///     Err(SearchExhausted { attempts: 5 })
/// );
/// ```
pub fn bounded_search<T, F>(budget: usize, mut attempt: F) -> Result<T, SearchExhausted>
where
    F: FnMut(usize) -> Option<T>,
{
    (0..budget)
        .find_map(&mut attempt)
        .ok_or(SearchExhausted { attempts: budget })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_exhausted_immediately() {
        let mut calls = 0;
        let result = bounded_search(0, |_| {
            calls += 1;
            Some(())
        });
        assert_eq!(result, Err(SearchExhausted { attempts: 0 }));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_stops_at_first_hit() {
        let mut calls = 0;
        let result = bounded_search(100, |i| {
            calls += 1;
            (i >= 2).then_some(i * 10)
        });
        assert_eq!(result, Ok(20));
        assert_eq!(calls, 3);
    }
}
