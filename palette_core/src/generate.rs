use std::fmt;

use num_bigint::BigUint;
use rand::Rng;
use rand::seq::{SliceRandom, index};
use std::collections::HashSet;

/// Above either bound the count goes straight to arbitrary precision.
const BIG_N_THRESHOLD: usize = 30;
const BIG_K_THRESHOLD: usize = 15;

/// Spaces up to this size are enumerated in full before sampling.
const ENUMERATION_LIMIT: u64 = 50_000;

/// All ordered `size`-selections of `items` without repetition.
///
/// Output order follows input index order: with `[a, b, c]` and size 2 the
/// result is `ab ac ba bc ca cb`. Empty input, `size == 0`, or
/// `size > items.len()` yield an empty list.
pub fn permutations<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if items.is_empty() || size == 0 || size > items.len() {
        return Vec::new();
    }

    let capacity = count_permutations(items.len(), size)
        .as_u64()
        .map_or(0, |n| n.min(1 << 16) as usize);
    let mut out = Vec::with_capacity(capacity);
    let mut taken = vec![false; items.len()];
    let mut current = Vec::with_capacity(size);

    backtrack(items, size, &mut taken, &mut current, &mut out);
    out
}

fn backtrack<T: Clone>(
    items: &[T],
    size: usize,
    taken: &mut [bool],
    current: &mut Vec<T>,
    out: &mut Vec<Vec<T>>,
) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }

    for i in 0..items.len() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        current.push(items[i].clone());
        backtrack(items, size, taken, current, out);
        current.pop();
        taken[i] = false;
    }
}

/// Up to `num_samples` permutations. When fewer than the full set are
/// wanted, a uniform random subset is drawn without replacement; otherwise
/// the full set comes back in generation order.
pub fn sample_permutations<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    size: usize,
    num_samples: usize,
    rng: &mut R,
) -> Vec<Vec<T>> {
    if num_samples == 0 || size == 0 || size > items.len() {
        return Vec::new();
    }

    if prefers_random_draw(&count_permutations(items.len(), size), num_samples) {
        let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(num_samples);
        let mut out = Vec::with_capacity(num_samples);
        while out.len() < num_samples {
            let picked = index::sample(rng, items.len(), size).into_vec();
            if seen.insert(picked.clone()) {
                out.push(picked.into_iter().map(|i| items[i].clone()).collect());
            }
        }
        return out;
    }

    let mut all = permutations(items, size);
    if all.len() > num_samples {
        all.shuffle(rng);
        all.truncate(num_samples);
    }
    all
}

/// True when the space is too large to enumerate and at least twice the
/// number of draws wanted, so rejection sampling finishes quickly.
fn prefers_random_draw(total: &PermutationCount, wanted: usize) -> bool {
    match total.as_u64() {
        None => true,
        Some(n) => n > ENUMERATION_LIMIT && n / 2 >= wanted as u64,
    }
}

/// `n! / (n - k)!`, exact at any size.
#[derive(Debug, Clone)]
pub enum PermutationCount {
    Exact(u64),
    Big(BigUint),
}

impl PermutationCount {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Exact(n) => Some(*n),
            Self::Big(n) => u64::try_from(n).ok(),
        }
    }

    pub fn to_biguint(&self) -> BigUint {
        match self {
            Self::Exact(n) => BigUint::from(*n),
            Self::Big(n) => n.clone(),
        }
    }

    /// Decimal digits grouped by thousands, e.g. `27,907,200`.
    pub fn formatted(&self) -> String {
        let digits = self.to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        out
    }
}

impl PartialEq for PermutationCount {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            _ => self.to_biguint() == other.to_biguint(),
        }
    }
}

impl Eq for PermutationCount {}

impl fmt::Display for PermutationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Big(n) => write!(f, "{n}"),
        }
    }
}

/// Number of distinct palettes of size `k` over `n` colors.
pub fn count_permutations(n: usize, k: usize) -> PermutationCount {
    if k == 0 || k > n {
        return PermutationCount::Exact(0);
    }

    if n > BIG_N_THRESHOLD || k > BIG_K_THRESHOLD {
        return PermutationCount::Big(big_product(n, 0, k, BigUint::from(1u32)));
    }

    let mut acc: u64 = 1;
    for i in 0..k {
        match acc.checked_mul((n - i) as u64) {
            Some(next) => acc = next,
            None => {
                tracing::debug!(n, k, "permutation count overflowed u64, switching to big integer");
                return PermutationCount::Big(big_product(n, i, k, BigUint::from(acc)));
            }
        }
    }
    PermutationCount::Exact(acc)
}

fn big_product(n: usize, from: usize, k: usize, seed: BigUint) -> BigUint {
    (from..k).fold(seed, |acc, i| acc * BigUint::from(n - i))
}
