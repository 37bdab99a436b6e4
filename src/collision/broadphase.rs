use glam::Vec3;

/// Group/mask test applied before any narrow-phase work.
pub fn filters_match(group_a: i32, mask_a: i32, group_b: i32, mask_b: i32) -> bool {
    (group_a & mask_b) != 0 && (group_b & mask_a) != 0
}

/// Bounding sphere entry fed to the broad phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseEntry {
    pub center: Vec3,
    /// Infinite for planes, which overlap everything.
    pub radius: f32,
}

impl BroadPhaseEntry {
    fn interval(&self) -> (f32, f32) {
        if self.radius.is_infinite() {
            (f32::NEG_INFINITY, f32::INFINITY)
        } else {
            (self.center.x - self.radius, self.center.x + self.radius)
        }
    }

    fn overlaps(&self, other: &BroadPhaseEntry) -> bool {
        if self.radius.is_infinite() || other.radius.is_infinite() {
            return true;
        }
        let reach = self.radius + other.radius;
        self.center.distance_squared(other.center) <= reach * reach
    }
}

/// Sort-and-sweep along X over bounding spheres.
pub struct SweepAndPrune;

impl SweepAndPrune {
    /// Index pairs `(i, j)` with `i < j` whose spheres overlap.
    pub fn pairs(entries: &[BroadPhaseEntry], margin: f32) -> Vec<(usize, usize)> {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| entries[a].interval().0.total_cmp(&entries[b].interval().0));

        let mut pairs = Vec::new();
        for (position, &i) in order.iter().enumerate() {
            let (_, max_i) = entries[i].interval();
            for &j in &order[position + 1..] {
                let (min_j, _) = entries[j].interval();
                if min_j > max_i + margin {
                    break;
                }
                let mut grown = entries[i];
                grown.radius += margin;
                if grown.overlaps(&entries[j]) {
                    pairs.push((i.min(j), i.max(j)));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}
