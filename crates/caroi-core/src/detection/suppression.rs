use crate::roi::RoiCoords;

use super::threshold::Candidate;

/// Greedy non-maximum suppression over score-ordered candidates.
///
/// Walks `candidates` in order and accepts a candidate unless it lies closer
/// than `min_distance` (pixels, Euclidean) to an already accepted one, or its
/// `footprint` rectangle overlaps an accepted footprint. Stops once
/// `max_accepted` centers have been accepted. A `min_distance` of 0 turns off
/// the distance check only; footprints stay disjoint.
pub fn suppress<F>(
    candidates: &[Candidate],
    min_distance: f64,
    max_accepted: usize,
    footprint: F,
) -> Vec<Candidate>
where
    F: Fn(&Candidate) -> RoiCoords,
{
    let min_sq = min_distance * min_distance;
    let mut accepted: Vec<(Candidate, RoiCoords)> = Vec::new();

    for cand in candidates {
        if accepted.len() >= max_accepted {
            break;
        }
        let too_close = min_distance > 0.0
            && accepted.iter().any(|(a, _)| {
                let dr = a.row as f64 - cand.row as f64;
                let dc = a.col as f64 - cand.col as f64;
                dr * dr + dc * dc < min_sq
            });
        if too_close {
            continue;
        }
        let rect = footprint(cand);
        if accepted.iter().any(|(_, r)| r.intersects(&rect)) {
            continue;
        }
        accepted.push((*cand, rect));
    }

    accepted.into_iter().map(|(c, _)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(row: usize, col: usize, score: f32) -> Candidate {
        Candidate { row, col, score }
    }

    fn pixel(c: &Candidate) -> RoiCoords {
        RoiCoords::new(c.col, c.row, c.col + 1, c.row + 1)
    }

    #[test]
    fn test_neighbor_suppressed() {
        let c = vec![cand(5, 5, 1.0), cand(5, 6, 0.9), cand(20, 20, 0.8)];
        let kept = suppress(&c, 3.0, 100, pixel);
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].row, kept[0].col), (5, 5));
        assert_eq!((kept[1].row, kept[1].col), (20, 20));
    }

    #[test]
    fn test_exact_min_distance_is_accepted() {
        let c = vec![cand(0, 0, 1.0), cand(0, 3, 0.5)];
        assert_eq!(suppress(&c, 3.0, 100, pixel).len(), 2);
    }

    #[test]
    fn test_zero_distance_respects_cap() {
        let c: Vec<Candidate> = (0..10).map(|i| cand(0, i, 1.0)).collect();
        assert_eq!(suppress(&c, 0.0, 4, pixel).len(), 4);
    }

    #[test]
    fn test_overlapping_footprints_rejected() {
        let square = |c: &Candidate| RoiCoords::new(c.col, c.row, c.col + 4, c.row + 4);
        let c = vec![cand(0, 0, 1.0), cand(0, 2, 0.9), cand(0, 4, 0.8)];
        let kept = suppress(&c, 0.0, 100, square);
        let cols: Vec<_> = kept.iter().map(|k| k.col).collect();
        assert_eq!(cols, vec![0, 4]);
    }
}
