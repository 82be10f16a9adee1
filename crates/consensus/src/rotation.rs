//! # Candidate Rotation
//!
//! Picks the next candidate leader when a view change is needed.
//!
//! ## How It Works
//!
//! - The seed is `(ds_epoch, view_change_epoch, counter)`, hashed with a
//!   domain separator into a ChaCha20 seed
//! - Committee member indices are Fisher-Yates shuffled with that RNG
//! - The first member in the shuffled order that is not excluded (the stalled
//!   leader and every faulty leader of the round) is the candidate
//!
//! Every honest node computes the same order from the same inputs, so they
//! all nominate the same candidate without talking to each other. Each failed
//! attempt adds one exclusion, so a committee of `n` runs out of candidates
//! after at most `n` attempts.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use tracing::trace;
use vigil_crypto::BlsPublicKey;

use crate::committee::{CommitteeDirectory, CommitteeMember};

/// Domain separator for rotation seed generation
const ROTATION_DOMAIN: &[u8] = b"VIGIL_VIEW_CHANGE_ROTATION_V1";

/// Inputs that fix one rotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RotationSeed {
    /// DS epoch of the round
    pub ds_epoch: u64,
    /// Final-block epoch of the round
    pub view_change_epoch: u64,
    /// Attempt number being nominated for
    pub counter: u32,
}

impl RotationSeed {
    /// Create a seed.
    pub fn new(ds_epoch: u64, view_change_epoch: u64, counter: u32) -> Self {
        Self {
            ds_epoch,
            view_change_epoch,
            counter,
        }
    }

    fn rng(&self) -> ChaCha20Rng {
        let mut hasher = Sha256::new();
        hasher.update(ROTATION_DOMAIN);
        hasher.update(self.ds_epoch.to_be_bytes());
        hasher.update(self.view_change_epoch.to_be_bytes());
        hasher.update(self.counter.to_be_bytes());

        let hash = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hash);
        ChaCha20Rng::from_seed(seed)
    }
}

/// Member indices in rotation order for `seed`.
pub fn rotation_order(member_count: usize, seed: RotationSeed) -> Vec<usize> {
    let mut order: Vec<usize> = (0..member_count).collect();
    if member_count <= 1 {
        return order;
    }

    let mut rng = seed.rng();
    for i in (1..member_count).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }
    order
}

/// The first member in rotation order for which `is_excluded` is false.
///
/// Returns `None` once every member is excluded.
pub fn select_candidate<'a, D, F>(
    directory: &'a D,
    seed: RotationSeed,
    is_excluded: F,
) -> Option<&'a CommitteeMember>
where
    D: CommitteeDirectory + ?Sized,
    F: Fn(&BlsPublicKey) -> bool,
{
    let members = directory.members();
    let candidate = rotation_order(members.len(), seed)
        .into_iter()
        .map(|idx| &members[idx])
        .find(|member| !is_excluded(&member.public_key));

    trace!(
        ds_epoch = seed.ds_epoch,
        epoch = seed.view_change_epoch,
        counter = seed.counter,
        candidate = ?candidate.map(|m| m.public_key.short_hex()),
        "Rotation evaluated"
    );
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::Committee;
    use std::collections::HashSet;
    use vigil_crypto::BlsPrivateKey;

    fn committee(n: u8) -> Committee {
        let members = (1..=n)
            .map(|i| {
                let key = BlsPrivateKey::from_seed(&[i; 32]).unwrap().public_key();
                CommitteeMember::new(key, format!("10.0.0.{}:5000", i).parse().unwrap(), 1)
            })
            .collect();
        Committee::new(members).unwrap()
    }

    #[test]
    fn test_order_is_a_permutation() {
        let order = rotation_order(10, RotationSeed::new(1, 2, 3));
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(order.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_order_is_deterministic() {
        let seed = RotationSeed::new(4, 40, 1);
        assert_eq!(rotation_order(7, seed), rotation_order(7, seed));
    }

    #[test]
    fn test_order_depends_on_seed() {
        let orders: HashSet<Vec<usize>> = (1..=8)
            .map(|c| rotation_order(12, RotationSeed::new(1, 1, c)))
            .collect();
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_select_skips_excluded() {
        let committee = committee(4);
        let seed = RotationSeed::new(1, 1, 1);
        let first = select_candidate(&committee, seed, |_| false).unwrap().clone();
        let second = select_candidate(&committee, seed, |k| k == &first.public_key).unwrap();
        assert_ne!(first.public_key, second.public_key);
    }

    #[test]
    fn test_select_exhausted() {
        let committee = committee(3);
        assert!(select_candidate(&committee, RotationSeed::new(0, 0, 1), |_| true).is_none());
    }

    #[test]
    fn test_single_member_order() {
        assert_eq!(rotation_order(1, RotationSeed::new(9, 9, 9)), vec![0]);
        assert!(rotation_order(0, RotationSeed::new(9, 9, 9)).is_empty());
    }
}
