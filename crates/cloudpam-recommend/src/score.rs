//! Allocation scoring — each factor is additive, final clamp
//! to 100.

use cloudpam_core::cidr::{is_rfc1918, Cidr};

const ALIGNMENT_BONUS: u32 = 30;
const SIZE_FIT_EXACT: u32 = 30;
const SIZE_FIT_CLOSE: u32 = 15;
const CONTIGUITY_BONUS: u32 = 20;
const RFC1918_BONUS: u32 = 20;

/// Score a candidate allocation block in `[0, 100]`.
///
/// `desired_prefix_len` is the caller's target prefix length, if any
/// (`0` or `None` means "no preference" — score against the generic
/// subnet-sized sweet spot instead). `existing_children` are the direct
/// children already under the parent pool, used for the contiguity bonus.
///
/// The alignment bonus is awarded to every [`Cidr`] unconditionally — a
/// `Cidr` is masked to its own block size by construction, so this factor
/// is redundant for canonical candidates (every block `range_to_cidrs`
/// emits) and only becomes discriminating if a caller scores a
/// non-canonical candidate directly.
pub fn score_allocation(
    candidate: &Cidr,
    desired_prefix_len: Option<u8>,
    existing_children: &[Cidr],
) -> u32 {
    let mut score = ALIGNMENT_BONUS;
    score += size_fit_bonus(candidate, desired_prefix_len);
    if touches_existing_child(candidate, existing_children) {
        score += CONTIGUITY_BONUS;
    }
    if is_rfc1918(candidate) {
        score += RFC1918_BONUS;
    }
    score.min(100)
}

fn size_fit_bonus(candidate: &Cidr, desired_prefix_len: Option<u8>) -> u32 {
    let bits = candidate.prefix_len();
    match desired_prefix_len.filter(|&d| d > 0) {
        Some(desired) => {
            if bits == desired {
                SIZE_FIT_EXACT
            } else if bits.abs_diff(desired) <= 2 {
                SIZE_FIT_CLOSE
            } else {
                0
            }
        }
        None => {
            if (24..=28).contains(&bits) {
                SIZE_FIT_EXACT
            } else if (20..=30).contains(&bits) {
                SIZE_FIT_CLOSE
            } else {
                0
            }
        }
    }
}

fn touches_existing_child(candidate: &Cidr, existing_children: &[Cidr]) -> bool {
    existing_children.iter().any(|child| {
        candidate.start() == child.end() + 1 || child.start() == candidate.end() + 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1918_scores_strictly_higher_than_equivalent_public_block() {
        let private = Cidr::parse("10.0.0.0/24").unwrap();
        let public = Cidr::parse("8.8.8.0/24").unwrap();
        assert!(score_allocation(&private, None, &[]) > score_allocation(&public, None, &[]));
    }

    #[test]
    fn desired_prefix_len_exact_match_beats_distant_candidate() {
        let exact = Cidr::parse("10.0.0.0/28").unwrap();
        let distant = Cidr::parse("10.0.0.0/20").unwrap();
        assert!(score_allocation(&exact, Some(28), &[]) > score_allocation(&distant, Some(28), &[]));
    }

    #[test]
    fn contiguous_block_scores_higher_than_isolated() {
        let existing = vec![Cidr::parse("10.0.0.0/25").unwrap()];
        let touching = Cidr::parse("10.0.0.128/25").unwrap();
        let isolated = Cidr::parse("10.0.5.0/25").unwrap();
        assert!(
            score_allocation(&touching, None, &existing)
                > score_allocation(&isolated, None, &existing)
        );
    }
}
