//! Ranking of k-subsets without materializing the powerset.
//!
//! `unrank(h, k, elements)` yields the (h+1)-th k-subset of `elements` in
//! lexicographic order over positions, so sub-portfolios of one cardinality
//! can be visited with a plain counter.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("negative argument in binomial coefficient: n = {n}, k = {k}")]
    NegativeArgument { n: i64, k: i64 },
    #[error("subset rank {rank} is out of range: there are only {count} subsets")]
    RankOutOfRange { rank: u64, count: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Binomial coefficient "n choose k".
pub fn binom(n: i64, k: i64) -> Result<u64> {
    if n < 0 || k < 0 {
        return Err(Error::NegativeArgument { n, k });
    }
    Ok(choose(n as u64, k as u64))
}

/// Iterative "n choose k" that never builds factorials. Saturates at `u64::MAX`.
pub(crate) fn choose(n: u64, k: u64) -> u64 {
    if n < k {
        return 0;
    }
    if k == 0 || n == k {
        return 1;
    }
    let (delta, i_max) = if k < n - k { (n - k, k) } else { (k, n - k) };
    let delta = delta as u128;
    let mut ans = delta + 1;
    for i in 2..=i_max as u128 {
        // ans is C(delta + i - 1, i - 1) here, so the division is exact.
        ans = ans * (delta + i) / i;
        if ans > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    ans as u64
}

fn largest_v(a: u64, b: u64, x: u64) -> u64 {
    let mut v = a - 1;
    while choose(v, b) > x {
        v -= 1;
    }
    v
}

/// Returns the (h+1)-th subset of cardinality `k` of `elements`.
pub fn unrank<T: Clone>(h: u64, k: usize, elements: &[T]) -> Result<Vec<T>> {
    let n = elements.len() as u64;
    let count = choose(n, k as u64);
    if h >= count {
        return Err(Error::RankOutOfRange { rank: h, count });
    }

    let mut subset = Vec::with_capacity(k);
    let mut a = n;
    let mut b = k as u64;
    // x is the "dual" of h.
    let mut x = count - 1 - h;
    for _ in 0..k {
        let v = largest_v(a, b, x);
        x -= choose(v, b);
        a = v;
        b -= 1;
        subset.push(elements[(n - 1 - v) as usize].clone());
    }
    Ok(subset)
}

/// All subsets of cardinality `k`, in rank order.
pub fn subsets<T: Clone>(k: usize, elements: &[T]) -> impl Iterator<Item = Vec<T>> + '_ {
    let count = choose(elements.len() as u64, k as u64);
    (0..count).filter_map(move |h| unrank(h, k, elements).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_binom_small_values() {
        assert_eq!(binom(0, 0), Ok(1));
        assert_eq!(binom(5, 0), Ok(1));
        assert_eq!(binom(5, 5), Ok(1));
        assert_eq!(binom(5, 2), Ok(10));
        assert_eq!(binom(12, 6), Ok(924));
        assert_eq!(binom(3, 7), Ok(0));
    }

    #[test]
    fn test_binom_rejects_negative_arguments() {
        assert_eq!(binom(-1, 2), Err(Error::NegativeArgument { n: -1, k: 2 }));
        assert_eq!(binom(4, -3), Err(Error::NegativeArgument { n: 4, k: -3 }));
    }

    #[test]
    fn test_binom_large_values_do_not_overflow() {
        assert_eq!(binom(60, 30), Ok(118_264_581_564_861_424));
        assert_eq!(choose(200, 100), u64::MAX);
    }

    #[test]
    fn test_unrank_is_lexicographic() {
        let elements = ["a", "b", "c", "d"];
        let all: Vec<Vec<&str>> = (0..6).map(|h| unrank(h, 2, &elements).unwrap()).collect();
        assert_eq!(
            all,
            vec![
                vec!["a", "b"],
                vec!["a", "c"],
                vec!["a", "d"],
                vec!["b", "c"],
                vec!["b", "d"],
                vec!["c", "d"],
            ]
        );
    }

    #[test]
    fn test_unrank_is_a_bijection() {
        let elements: Vec<usize> = (0..9).collect();
        for k in 0..=elements.len() {
            let count = choose(elements.len() as u64, k as u64);
            let mut seen = HashSet::new();
            for h in 0..count {
                let subset = unrank(h, k, &elements).unwrap();
                assert_eq!(subset.len(), k);
                let distinct: HashSet<_> = subset.iter().collect();
                assert_eq!(distinct.len(), k, "subset {subset:?} repeats an element");
                assert!(seen.insert(subset));
            }
            assert_eq!(seen.len() as u64, count);
        }
    }

    #[test]
    fn test_unrank_out_of_range() {
        let elements = [1, 2, 3];
        assert_eq!(
            unrank(3, 2, &elements),
            Err(Error::RankOutOfRange { rank: 3, count: 3 })
        );
        assert!(unrank(0, 4, &elements).is_err());
    }

    #[test]
    fn test_subsets_iterates_every_rank() {
        let elements = ['x', 'y', 'z'];
        assert_eq!(subsets(0, &elements).collect::<Vec<_>>(), vec![Vec::<char>::new()]);
        assert_eq!(subsets(3, &elements).count(), 1);
        assert_eq!(subsets(1, &elements).count(), 3);
    }
}
