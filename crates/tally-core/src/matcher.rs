//! Nearest-identity matching over a repository snapshot.

use crate::error::MatchError;
use crate::repository::Snapshot;
use crate::types::{Encoding, Identity, MatchResult};

/// Strategy for resolving a probe encoding to a known identity.
///
/// A trait seam so an approximate nearest-neighbor index can replace the
/// linear scan behind the same contract at larger gallery sizes.
pub trait Matcher: Send + Sync {
    fn match_encoding(
        &self,
        probe: &Encoding,
        snapshot: &Snapshot,
        tolerance: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Linear-scan matcher over Euclidean distance.
///
/// The tolerance boundary is inclusive: `distance <= tolerance` counts as
/// a match. Equidistant candidates resolve to the first in snapshot
/// iteration order (sorted by id); callers must not depend on which
/// identity wins a tie.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn match_encoding(
        &self,
        probe: &Encoding,
        snapshot: &Snapshot,
        tolerance: f32,
    ) -> Result<MatchResult, MatchError> {
        if probe.dim() != snapshot.dim() {
            return Err(MatchError::DimensionMismatch {
                probe: probe.dim(),
                expected: snapshot.dim(),
            });
        }

        // An empty gallery is a miss, not an error.
        let mut best: Option<(&Identity, f32)> = None;
        for identity in snapshot.identities() {
            let distance = probe.euclidean_distance(&identity.encoding);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((identity, distance)),
            }
        }

        Ok(match best {
            Some((identity, distance)) if distance <= tolerance => {
                MatchResult::hit(identity, distance)
            }
            Some((_, distance)) => MatchResult::miss(distance),
            None => MatchResult::miss(f32::INFINITY),
        })
    }
}
